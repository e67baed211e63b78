//! Receiver core: capture → validate → classify → dedup → filter → emit
//! (spec.md §4.4). Single thread; the dedup structure and output sink are
//! owned exclusively here, no locking needed (spec.md §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::ScanConfig;
use crate::capture::Capture;
use crate::dedup::DedupEngine;
use crate::error::Result;
use crate::oracle::RunKey;
use crate::output::{self, translate, Filter, Sink};
use crate::probe::{FieldValue, ProbeModule, ValidationOutcome};
use crate::stats::Stats;
use crate::sync::ReadyGate;

const CAPTURE_TIMEOUT: Duration = Duration::from_millis(100);
/// Assumes a 14-byte Ethernet header with no 802.1Q tag, matching the BPF
/// filter's own offset assumptions (see `crate::capture`).
const ETHERNET_HEADER_LEN: usize = 14;

pub struct ReceiverContext {
    pub config: Arc<ScanConfig>,
    pub run_key: Arc<RunKey>,
    pub probe: Arc<dyn ProbeModule>,
    pub stats: Arc<Stats>,
    pub run_flag: Arc<AtomicBool>,
    pub ready_gate: Arc<ReadyGate>,
    pub scan_start: Instant,
    pub open_capture: Arc<dyn Fn() -> Result<Box<dyn Capture>> + Send + Sync>,
}

pub fn run_receiver(ctx: Arc<ReceiverContext>) -> Result<()> {
    let cfg = &ctx.config;
    let mut capture = (ctx.open_capture)()?;
    let mut dedup =
        DedupEngine::new(cfg.dedup_method, cfg.dedup_window_size, cfg.target_ports.len() == 1);
    let mut sink = output::open_sink(cfg)?;
    // spec.md §8 Scenario 3: with no explicit `-u/--output-filter`, only
    // successful results are emitted — validation-failing responses still
    // count toward stats but don't reach the sink.
    let filter = match &cfg.output_filter {
        Some(expr) => Filter::parse(expr)?,
        None => Filter::default_success_filter(),
    };

    ctx.ready_gate.signal_ready();

    while ctx.run_flag.load(Ordering::Relaxed) {
        let frame = match capture.next_frame(CAPTURE_TIMEOUT) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "capture read failed");
                continue;
            }
        };

        ctx.stats.packets_received.fetch_add(1, Ordering::Relaxed);

        if frame.data.len() <= ETHERNET_HEADER_LEN {
            continue;
        }
        let ip_payload = &frame.data[ETHERNET_HEADER_LEN..];

        let reported_src_ip = match ctx.probe.validate_packet(
            ip_payload,
            &ctx.run_key,
            cfg.source_port_range,
            cfg.validate_source_port,
        ) {
            ValidationOutcome::Rejected => {
                ctx.stats.validation_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            ValidationOutcome::Accepted { reported_src_ip } => reported_src_ip,
        };

        ctx.stats.record_response_time(ctx.scan_start);
        let timestamp = frame.timestamp.saturating_duration_since(ctx.scan_start);
        let record = ctx.probe.process_packet(ip_payload, reported_src_ip, timestamp);

        if record.success() {
            ctx.stats.successes.fetch_add(1, Ordering::Relaxed);
        }
        if matches!(record.get("app_success"), Some(FieldValue::Bool(true))) {
            ctx.stats.app_successes.fetch_add(1, Ordering::Relaxed);
        }

        let sport = field_as_u16(&record, "sport");
        let dport = field_as_u16(&record, "dport");
        if dedup.is_duplicate(reported_src_ip, sport, dport, record.classification()) {
            ctx.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        if !filter.matches(&record) {
            ctx.stats.filtered.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let translated = translate(&record, &cfg.output_fields, ctx.probe.fields());
        if let Err(e) = sink.write_record(&translated) {
            warn!(error = %e, "output sink write failed, signalling shutdown");
            ctx.run_flag.store(false, Ordering::Relaxed);
            break;
        }
    }

    sink.flush()
}

fn field_as_u16(record: &crate::probe::FieldRecord, name: &str) -> u16 {
    match record.get(name) {
        Some(FieldValue::Int(v)) => (*v).clamp(0, u16::MAX as i64) as u16,
        _ => 0,
    }
}

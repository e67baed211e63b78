//! Sender core: one thread per `(shard, sender)` pair, rate-limited packet
//! emission (spec.md §4.3, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::iterator::{effective_senders_per_shard, group_order_for, CyclicGroup};
use crate::oracle::RunKey;
use crate::probe::ProbeModule;
use crate::stats::Stats;
use crate::sync::ReadyGate;
use crate::target::TargetSpace;
use crate::transmit::Transmit;

/// Everything a sender thread needs, shared immutably across all senders in
/// this process (spec.md §5 "Run configuration: immutable after startup").
pub struct SenderContext {
    pub config: Arc<ScanConfig>,
    pub target_space: Arc<TargetSpace>,
    pub run_key: Arc<RunKey>,
    pub probe: Arc<dyn ProbeModule>,
    pub stats: Arc<Stats>,
    pub run_flag: Arc<AtomicBool>,
    pub ready_gate: Arc<ReadyGate>,
    pub src_mac: [u8; 6],
    pub gw_mac: [u8; 6],
    pub resolved_max_targets: Option<u64>,
    /// Opens a fresh transmit handle; called once per sender thread so each
    /// thread owns its own socket (spec.md §9 "scoped ownership").
    pub open_transmit: Arc<dyn Fn() -> Result<Box<dyn Transmit>> + Send + Sync>,
}

/// A per-sender nanosecond token-bucket rate pacer. `None` when the sender
/// is unthrottled (`--rate 0`).
struct Pacer {
    nanos_per_packet: f64,
    budget_nanos: f64,
    last_tick: Instant,
}

impl Pacer {
    fn new(nanos_per_packet: f64) -> Self {
        Self { nanos_per_packet, budget_nanos: 0.0, last_tick: Instant::now() }
    }

    /// Blocks until the budget allows one more packet.
    fn throttle(&mut self) {
        self.budget_nanos -= self.nanos_per_packet;
        if self.budget_nanos >= 0.0 {
            return;
        }
        let now = Instant::now();
        self.budget_nanos += now.duration_since(self.last_tick).as_nanos() as f64;
        self.last_tick = now;
        if self.budget_nanos < 0.0 {
            std::thread::sleep(Duration::from_nanos((-self.budget_nanos) as u64));
            self.budget_nanos = 0.0;
        }
    }
}

pub fn run_sender(shard_id: u32, sender_id: u32, ctx: Arc<SenderContext>) -> Result<()> {
    let cfg = &ctx.config;
    let target_size = ctx.target_space.size();
    if target_size == 0 {
        return Err(ScanError::EmptyTargetSpace);
    }

    let probe_senders = effective_senders_per_shard(
        cfg.total_shards,
        cfg.senders_per_shard,
        group_order_for(target_size)?,
    );
    if sender_id >= probe_senders {
        debug!(shard_id, sender_id, "sender thread idle: fewer cycle elements than configured senders");
        return Ok(());
    }

    let global_index = (shard_id as usize) * (cfg.senders_per_shard as usize) + sender_id as usize;
    pin_to_configured_core(&cfg.cpu_cores, global_index);

    let transmit = (ctx.open_transmit)()?;
    let mut state = ctx.probe.thread_initialize();
    let mut template = Vec::with_capacity(ctx.probe.max_packet_length());
    ctx.probe.prepare_packet(&mut template, ctx.src_mac, ctx.gw_mac, &mut state);

    let total_senders = (cfg.total_shards as u64) * (probe_senders as u64);
    let nanos_per_packet = if cfg.rate_pps == 0 {
        None
    } else {
        Some(1_000_000_000.0 * total_senders as f64 / cfg.rate_pps as f64)
    };
    let mut pacer = nanos_per_packet.map(Pacer::new);

    ctx.ready_gate.wait_until_ready();

    let (port_lo, port_hi) = cfg.source_port_range;
    let port_span = (port_hi - port_lo) as u32 + 1;
    let mut send_failures: u64 = 0;

    'rounds: for round in 0..cfg.probes {
        let iter_seed = ctx.run_key.iterator_seed(shard_id, round);
        let group = CyclicGroup::new(target_size, iter_seed)?;
        let x0 = group.seed_to_x0(iter_seed);
        let stream = group.stream(x0, shard_id, cfg.total_shards, sender_id, probe_senders);

        for index in stream {
            if !ctx.run_flag.load(Ordering::Relaxed) {
                break 'rounds;
            }
            if let Some(max_results) = cfg.max_results {
                if ctx.stats.successes.load(Ordering::Relaxed) >= max_results {
                    break 'rounds;
                }
            }
            if let Some(max_targets) = ctx.resolved_max_targets {
                if ctx.stats.offered.load(Ordering::Relaxed) >= max_targets {
                    break 'rounds;
                }
            }

            if let Some(p) = pacer.as_mut() {
                p.throttle();
            }

            let Some((dst_ip, dst_port)) = ctx.target_space.decompose(index) else { continue };
            let src_ip = cfg.source_ips[(index as usize) % cfg.source_ips.len()];
            let validation = ctx.run_key.validation_word(src_ip, dst_ip, dst_port);
            let src_port =
                port_lo + (((validation % port_span) + round as u32) % port_span) as u16;

            let mut frame = template.clone();
            ctx.probe.make_packet(
                &mut frame,
                src_ip,
                dst_ip,
                src_port,
                dst_port,
                &ctx.run_key,
                round,
                &mut state,
            );

            ctx.stats.offered.fetch_add(1, Ordering::Relaxed);

            match send_with_retry(transmit.as_ref(), &frame) {
                Ok(()) => {
                    ctx.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    ctx.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                    send_failures += 1;
                    if send_failures > cfg.max_sendto_failures {
                        warn!(
                            shard_id,
                            sender_id,
                            send_failures,
                            "sender aborting: too many transmit failures"
                        );
                        return Err(ScanError::TooManySendFailures(send_failures));
                    }
                }
            }
        }
    }

    Ok(())
}

/// A transient write error (`EAGAIN`/`ENOBUFS`) gets one short-backoff
/// retry before counting as a failure (spec.md §4.3 "Send failures").
fn send_with_retry(transmit: &dyn Transmit, frame: &[u8]) -> std::io::Result<()> {
    const RETRY_BACKOFF: Duration = Duration::from_micros(50);
    match transmit.send(frame) {
        Ok(()) => Ok(()),
        Err(e) if is_transient(&e) => {
            std::thread::sleep(RETRY_BACKOFF);
            transmit.send(frame)
        }
        Err(e) => Err(e),
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

/// Pins the calling thread to `cores[index % cores.len()]` when a core list
/// was configured; a no-op otherwise (spec.md §5 "pinned to a configured
/// CPU by affinity").
#[cfg(target_os = "linux")]
fn pin_to_configured_core(cores: &[usize], index: usize) {
    if cores.is_empty() {
        return;
    }
    let core = cores[index % cores.len()];
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_configured_core(_cores: &[usize], _index: usize) {}

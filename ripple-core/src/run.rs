//! Top-level orchestration: resolve the environment, build the shared run
//! state, spawn senders/receiver, drive the monitor to completion, and write
//! the metadata file (spec.md §4.1 "Run lifecycle").

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Instant, SystemTime};

use tracing::info;

use crate::capture::{Capture, RecordedCapture};
use crate::config::{self, ScanConfig};
use crate::error::{Result, ScanError};
use crate::iface;
use crate::metadata::write_metadata_file;
use crate::monitor::{self, MonitorContext, MonitorOutcome};
use crate::oracle::RunKey;
use crate::probe::Registry;
use crate::receiver::{self, ReceiverContext};
use crate::sender::{self, SenderContext};
use crate::stats::Stats;
use crate::sync::ReadyGate;
use crate::target::TargetSpace;
use crate::transmit::{NullTransmit, Transmit};

#[cfg(target_os = "linux")]
use crate::capture::LinuxCapture;
#[cfg(target_os = "linux")]
use crate::transmit::LinuxRawSocket;

pub struct RunOutcome {
    pub outcome: MonitorOutcome,
}

/// Runs one scan to completion: resolves the interface/gateway, builds the
/// shared immutable run state, spawns the sender threads and the receiver
/// thread, installs the Ctrl-C handler, and drives the monitor loop. Mirrors
/// the orchestration shape of the teacher's per-protocol `run` entry point,
/// generalized across shards/senders instead of a fixed worker count.
pub fn run_scan(cfg: ScanConfig, registry: &Registry) -> Result<RunOutcome> {
    let cfg = Arc::new(cfg);
    let probe = registry
        .get(&cfg.probe_module)
        .ok_or_else(|| ScanError::Config(format!("unknown probe module '{}'", cfg.probe_module)))?;
    probe.global_initialize(&cfg.probe_args)?;

    let target_space = Arc::new(config::build_target_space(&cfg)?);
    if target_space.size() == 0 {
        return Err(ScanError::EmptyTargetSpace);
    }

    let run_key = Arc::new(match cfg.seed {
        Some(seed) => RunKey::from_seed(seed),
        None => RunKey::from_entropy(),
    });

    let resolved_interface = iface::resolve_interface(&cfg.interface)?;
    let gw_mac = match cfg.gateway_mac {
        Some(mac) => mac,
        None => iface::resolve_gateway_mac(&cfg.interface)?,
    };

    let stats = Arc::new(Stats::new());
    let run_flag = Arc::new(AtomicBool::new(true));
    let ready_gate = Arc::new(ReadyGate::new());
    monitor::install_ctrlc_handler(Arc::clone(&run_flag))?;

    let resolved_max_targets =
        cfg.max_targets.map(|mt| mt.resolve(target_space.size()));

    let pcap_filter = probe.pcap_filter().to_string();
    let interface_name = cfg.interface.clone();
    let open_transmit: Arc<dyn Fn() -> Result<Box<dyn Transmit>> + Send + Sync> = {
        let interface_name = interface_name.clone();
        Arc::new(move || open_transmit_backend(&interface_name))
    };
    let open_capture: Arc<dyn Fn() -> Result<Box<dyn Capture>> + Send + Sync> =
        Arc::new(move || open_capture_backend(&interface_name, &pcap_filter));

    let scan_start = Instant::now();
    let start_time = SystemTime::now();

    let receiver_ctx = Arc::new(ReceiverContext {
        config: Arc::clone(&cfg),
        run_key: Arc::clone(&run_key),
        probe: Arc::clone(&probe),
        stats: Arc::clone(&stats),
        run_flag: Arc::clone(&run_flag),
        ready_gate: Arc::clone(&ready_gate),
        scan_start,
        open_capture,
    });
    let receiver_handle = thread::Builder::new()
        .name("ripple-receiver".into())
        .spawn(move || receiver::run_receiver(receiver_ctx))
        .map_err(ScanError::Io)?;

    let mut sender_handles = Vec::new();
    for sender_id in 0..cfg.senders_per_shard {
        let ctx = Arc::new(SenderContext {
            config: Arc::clone(&cfg),
            target_space: Arc::clone(&target_space),
            run_key: Arc::clone(&run_key),
            probe: Arc::clone(&probe),
            stats: Arc::clone(&stats),
            run_flag: Arc::clone(&run_flag),
            ready_gate: Arc::clone(&ready_gate),
            src_mac: resolved_interface.src_mac,
            gw_mac,
            resolved_max_targets,
            open_transmit: Arc::clone(&open_transmit),
        });
        let shard_id = cfg.shard_id;
        let handle = thread::Builder::new()
            .name(format!("ripple-sender-{shard_id}-{sender_id}"))
            .spawn(move || sender::run_sender(shard_id, sender_id, ctx))
            .map_err(ScanError::Io)?;
        sender_handles.push(handle);
    }

    info!(
        interface = %cfg.interface,
        target_space_size = target_space.size(),
        shard_id = cfg.shard_id,
        total_shards = cfg.total_shards,
        senders_per_shard = cfg.senders_per_shard,
        probe_module = %cfg.probe_module,
        "scan starting"
    );

    let monitor_ctx = Arc::new(MonitorContext {
        config: Arc::clone(&cfg),
        stats: Arc::clone(&stats),
        run_flag: Arc::clone(&run_flag),
        scan_start,
    });
    let outcome = monitor::run_monitor(monitor_ctx, sender_handles)?;

    match receiver_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "receiver exited with error"),
        Err(_) => tracing::warn!("receiver thread panicked"),
    }

    probe.close(&cfg, &outcome.final_stats, &outcome.final_stats);

    let end_time = SystemTime::now();
    write_metadata_file(&cfg, outcome.final_stats, start_time, end_time, outcome.reason)?;

    info!(
        reason = outcome.reason.as_str(),
        sent = outcome.final_stats.sent,
        successes = outcome.final_stats.successes,
        "scan complete"
    );

    Ok(RunOutcome { outcome })
}

#[cfg(target_os = "linux")]
fn open_transmit_backend(interface: &str) -> Result<Box<dyn Transmit>> {
    Ok(Box::new(LinuxRawSocket::open(interface)?))
}

#[cfg(not(target_os = "linux"))]
fn open_transmit_backend(_interface: &str) -> Result<Box<dyn Transmit>> {
    Ok(Box::new(NullTransmit))
}

#[cfg(target_os = "linux")]
fn open_capture_backend(interface: &str, pcap_filter: &str) -> Result<Box<dyn Capture>> {
    Ok(Box::new(LinuxCapture::open(interface, pcap_filter)?))
}

#[cfg(not(target_os = "linux"))]
fn open_capture_backend(_interface: &str, _pcap_filter: &str) -> Result<Box<dyn Capture>> {
    Ok(Box::new(RecordedCapture::default()))
}

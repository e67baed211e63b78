//! Monitor thread: periodic progress reporting and termination
//! orchestration (spec.md §4.7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::stats::{Stats, StatsSnapshot};

/// Fixed warm-up window before `min_hitrate` is evaluated, so a scan isn't
/// aborted on the first empty tick before any responses could plausibly
/// have arrived.
const HITRATE_WARMUP: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ExternalSignal,
    MaxRuntime,
    MaxResults,
    MinHitrate,
    SendersExhausted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::ExternalSignal => "external_signal",
            TerminationReason::MaxRuntime => "max_runtime",
            TerminationReason::MaxResults => "max_results",
            TerminationReason::MinHitrate => "min_hitrate",
            TerminationReason::SendersExhausted => "senders_exhausted",
        }
    }
}

pub struct MonitorContext {
    pub config: Arc<ScanConfig>,
    pub stats: Arc<Stats>,
    pub run_flag: Arc<AtomicBool>,
    pub scan_start: Instant,
}

pub struct MonitorOutcome {
    pub reason: TerminationReason,
    pub final_stats: StatsSnapshot,
}

/// Runs the monitor loop to completion, then joins every sender thread
/// handed to it. Shutdown path per spec.md §4.7: flip the run-flag, join
/// senders, sleep the cooldown so in-flight responses drain, return (the
/// caller then closes capture and joins the receiver).
pub fn run_monitor(
    ctx: Arc<MonitorContext>,
    sender_handles: Vec<JoinHandle<Result<()>>>,
) -> Result<MonitorOutcome> {
    let reason = loop {
        std::thread::sleep(TICK);
        let snapshot = StatsSnapshot::from(ctx.stats.as_ref());
        let hit_rate = ctx.stats.hit_rate();
        let elapsed = ctx.scan_start.elapsed();

        info!(
            offered = snapshot.offered,
            sent = snapshot.sent,
            received = snapshot.packets_received,
            successes = snapshot.successes,
            duplicates = snapshot.duplicates,
            hit_rate = format!("{hit_rate:.4}"),
            elapsed_secs = elapsed.as_secs(),
            "scan progress"
        );

        if !ctx.run_flag.load(Ordering::Relaxed) {
            break TerminationReason::ExternalSignal;
        }
        if let Some(max_runtime) = ctx.config.max_runtime {
            if elapsed >= max_runtime {
                break TerminationReason::MaxRuntime;
            }
        }
        if let Some(max_results) = ctx.config.max_results {
            if snapshot.successes >= max_results {
                break TerminationReason::MaxResults;
            }
        }
        if let Some(min_hitrate) = ctx.config.min_hitrate {
            if elapsed >= HITRATE_WARMUP && hit_rate < min_hitrate {
                break TerminationReason::MinHitrate;
            }
        }
        if sender_handles.iter().all(|h| h.is_finished()) {
            break TerminationReason::SendersExhausted;
        }
    };

    info!(reason = reason.as_str(), "shutting down");
    ctx.run_flag.store(false, Ordering::Relaxed);

    for handle in sender_handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "sender exited with error"),
            Err(_) => warn!("sender thread panicked"),
        }
    }

    // Senders have fully stopped; this is now a dedicated drain window for
    // the receiver, not time shared with however long senders took to exit.
    std::thread::sleep(ctx.config.cooldown);

    Ok(MonitorOutcome { reason, final_stats: StatsSnapshot::from(ctx.stats.as_ref()) })
}

pub fn install_ctrlc_handler(run_flag: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        run_flag.store(false, Ordering::Relaxed);
    })
    .map_err(|e| ScanError::Environment(format!("installing Ctrl-C handler: {e}")))
}

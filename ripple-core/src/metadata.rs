//! Metadata file: a JSON object written at exit with a configuration echo,
//! final counters, timestamps, and user notes (spec.md §6 "Metadata file").

use std::net::Ipv4Addr;
use std::time::SystemTime;

use serde::Serialize;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::monitor::TerminationReason;
use crate::stats::StatsSnapshot;

#[derive(Serialize)]
struct ConfigEcho {
    target_ports: Vec<u16>,
    source_ips: Vec<Ipv4Addr>,
    interface: String,
    rate_pps: u64,
    probes: u32,
    probe_module: String,
    total_shards: u32,
    shard_id: u32,
    senders_per_shard: u32,
    seed: Option<u64>,
}

impl From<&ScanConfig> for ConfigEcho {
    fn from(cfg: &ScanConfig) -> Self {
        Self {
            target_ports: cfg.target_ports.clone(),
            source_ips: cfg.source_ips.clone(),
            interface: cfg.interface.clone(),
            rate_pps: cfg.rate_pps,
            probes: cfg.probes,
            probe_module: cfg.probe_module.clone(),
            total_shards: cfg.total_shards,
            shard_id: cfg.shard_id,
            senders_per_shard: cfg.senders_per_shard,
            seed: cfg.seed,
        }
    }
}

#[derive(Serialize)]
struct Metadata {
    config: ConfigEcho,
    counters: StatsSnapshotEcho,
    start_time_unix: u64,
    end_time_unix: u64,
    termination_reason: &'static str,
    notes: Option<String>,
    user_metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct StatsSnapshotEcho {
    offered: u64,
    sent: u64,
    send_failures: u64,
    packets_received: u64,
    validation_failed: u64,
    duplicates: u64,
    filtered: u64,
    successes: u64,
    app_successes: u64,
}

impl From<StatsSnapshot> for StatsSnapshotEcho {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            offered: s.offered,
            sent: s.sent,
            send_failures: s.send_failures,
            packets_received: s.packets_received,
            validation_failed: s.validation_failed,
            duplicates: s.duplicates,
            filtered: s.filtered,
            successes: s.successes,
            app_successes: s.app_successes,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn write_metadata_file(
    cfg: &ScanConfig,
    final_stats: StatsSnapshot,
    start_time: SystemTime,
    end_time: SystemTime,
    reason: TerminationReason,
) -> Result<()> {
    let Some(path) = &cfg.metadata_file else {
        return Ok(());
    };

    let metadata = Metadata {
        config: ConfigEcho::from(cfg),
        counters: final_stats.into(),
        start_time_unix: unix_seconds(start_time),
        end_time_unix: unix_seconds(end_time),
        termination_reason: reason.as_str(),
        notes: cfg.notes.clone(),
        user_metadata: cfg.user_metadata.clone(),
    };

    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| ScanError::Output(format!("serializing metadata: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| ScanError::Output(format!("writing {}: {e}", path.display())))
}

fn unix_seconds(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

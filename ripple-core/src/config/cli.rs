//! `clap`-derive CLI surface (spec.md §6), mirroring the teacher's
//! `Cli`/`#[command(author, version, about)]` usage in `ripple/src/main.rs`.
//! Every field here is raw user input; [`super::build::build_config`] is
//! the only place that turns it into a validated [`super::ScanConfig`].

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "A single-packet Internet-scale network scanner")]
pub struct RawArgs {
    /// Comma/range list of destination ports, e.g. "80,443,8000-8010".
    #[arg(short = 'p', long = "target-ports")]
    pub target_ports: String,

    /// Source port or inclusive range for probes, e.g. "40000-50000".
    #[arg(short = 's', long = "source-port", default_value = "32768-61000")]
    pub source_port: String,

    /// One or more source addresses, round-robin, e.g. "10.0.0.1,10.0.0.5-10.0.0.8".
    #[arg(short = 'S', long = "source-ip")]
    pub source_ip: String,

    /// Next-hop MAC address; if absent, resolved via the OS routing table/ARP cache.
    #[arg(short = 'G', long = "gateway-mac")]
    pub gateway_mac: Option<String>,

    /// Capture/send interface.
    #[arg(short = 'i', long = "interface")]
    pub interface: String,

    /// Global send rate in packets/sec; 0 = unlimited.
    #[arg(short = 'r', long = "rate", default_value_t = 0)]
    pub rate: u64,

    /// Alternative rate expressed in bits/sec, e.g. "100M", "1G".
    #[arg(short = 'B', long = "bandwidth")]
    pub bandwidth: Option<String>,

    /// Packets per sender batch, 1-65535.
    #[arg(long = "batch", default_value_t = 1)]
    pub batch: u16,

    /// Per-target retransmit count.
    #[arg(short = 'P', long = "probes", default_value_t = 1)]
    pub probes: u32,

    /// Cap on targets, absolute or percentage ("50%").
    #[arg(short = 'n', long = "max-targets")]
    pub max_targets: Option<String>,

    /// Cap on successful results.
    #[arg(short = 'N', long = "max-results")]
    pub max_results: Option<u64>,

    /// Maximum scan runtime in seconds.
    #[arg(short = 't', long = "max-runtime")]
    pub max_runtime_secs: Option<u64>,

    /// Post-sender drain interval in seconds.
    #[arg(short = 'c', long = "cooldown-time", default_value_t = 8)]
    pub cooldown_secs: u64,

    /// Minimum acceptable hit rate after warm-up before aborting.
    #[arg(long = "min-hitrate")]
    pub min_hitrate: Option<f64>,

    /// Cumulative transmit failures before aborting the scan.
    #[arg(long = "max-sendto-failures", default_value_t = 10_000)]
    pub max_sendto_failures: u64,

    /// This shard's id; sharded runs require an explicit --seed.
    #[arg(long = "shard", default_value_t = 0)]
    pub shard: u32,

    /// Total number of shards.
    #[arg(long = "shards", default_value_t = 1)]
    pub shards: u32,

    /// Sender threads per shard.
    #[arg(short = 'T', long = "sender-threads", default_value_t = 1)]
    pub sender_threads: u32,

    /// CPU pin list, e.g. "0,1,2,3".
    #[arg(long = "cores")]
    pub cores: Option<String>,

    /// Comma-separated output field names, or "*" for all declared fields.
    #[arg(short = 'f', long = "output-fields", default_value = "*")]
    pub output_fields: String,

    /// Output module: csv or json-lines.
    #[arg(short = 'O', long = "output-module", value_enum, default_value_t = CliOutputFormat::Csv)]
    pub output_module: CliOutputFormat,

    /// Filter expression over result fields, e.g. "classification==synack".
    #[arg(short = 'u', long = "output-filter")]
    pub output_filter: Option<String>,

    /// Output file path; defaults to stdout.
    #[arg(long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Suppress the CSV header row.
    #[arg(long = "no-header-row", default_value_t = false)]
    pub no_header_row: bool,

    /// Blocklist CIDR file.
    #[arg(short = 'b', long = "blocklist-file")]
    pub blocklist_file: Option<PathBuf>,

    /// Allowlist CIDR file.
    #[arg(short = 'w', long = "allowlist-file")]
    pub allowlist_file: Option<PathBuf>,

    /// Explicit target IP list file, one address per line.
    #[arg(short = 'I', long = "list-of-ips-file")]
    pub list_of_ips_file: Option<PathBuf>,

    /// Probe module name, as registered with ripple-probes.
    #[arg(short = 'M', long = "probe-module")]
    pub probe_module: String,

    /// Probe-specific key=value arguments, comma-separated.
    #[arg(long = "probe-args")]
    pub probe_args: Option<String>,

    /// Enable/disable source-port validation on responses.
    #[arg(long = "validate-source-port", default_value_t = true)]
    pub validate_source_port: bool,

    /// Dedup method: default, none, full, window.
    #[arg(long = "dedup-method", value_enum, default_value_t = CliDedupMethod::Default)]
    pub dedup_method: CliDedupMethod,

    /// Dedup window capacity, entries.
    #[arg(long = "dedup-window-size", default_value_t = 1_000_000)]
    pub dedup_window_size: usize,

    /// 64-bit run seed; required when --shards > 1.
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Path to write the JSON metadata file at exit.
    #[arg(long = "metadata-file")]
    pub metadata_file: Option<PathBuf>,

    /// Arbitrary user JSON embedded in the metadata file.
    #[arg(long = "user-metadata")]
    pub user_metadata: Option<String>,

    /// Free-text note embedded in the metadata file.
    #[arg(long = "notes")]
    pub notes: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliDedupMethod {
    Default,
    None,
    Full,
    Window,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliOutputFormat {
    Csv,
    JsonLines,
}

/// Parses `--probe-args k1=v1,k2=v2` into a map.
pub fn parse_probe_args(spec: &str) -> HashMap<String, String> {
    spec.split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Parses a bandwidth string like "100M", "1G", "500K" into bits/sec.
pub fn parse_bandwidth(spec: &str) -> crate::error::Result<u64> {
    use crate::error::ScanError;

    let spec = spec.trim();
    let (number, multiplier) = match spec.chars().last() {
        Some('G') | Some('g') => (&spec[..spec.len() - 1], 1_000_000_000),
        Some('M') | Some('m') => (&spec[..spec.len() - 1], 1_000_000),
        Some('K') | Some('k') => (&spec[..spec.len() - 1], 1_000),
        _ => (spec, 1),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| ScanError::Config(format!("invalid bandwidth '{spec}'")))?;
    Ok((value * multiplier as f64) as u64)
}

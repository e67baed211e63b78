use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// `-n/--max-targets`: either an absolute cap or a percentage of the
/// allowed address/port space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxTargets {
    Absolute(u64),
    Percent(f64),
}

impl MaxTargets {
    pub fn resolve(self, target_space_size: u64) -> u64 {
        match self {
            MaxTargets::Absolute(n) => n,
            MaxTargets::Percent(pct) => {
                ((target_space_size as f64) * (pct / 100.0)).round() as u64
            }
        }
    }
}

/// `--dedup-method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupMethod {
    /// Pick `Full` for single-port scans, `Window` otherwise (spec.md §4.6).
    #[default]
    Default,
    None,
    Full,
    Window,
}

/// `-O/--output-module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    JsonLines,
}

/// `-f/--output-fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFields {
    All,
    Explicit(Vec<String>),
}

/// The validated, immutable configuration for one scan run. Built once by
/// `config::build` and handed by `Arc` reference to every thread — mutating
/// it after startup is a bug (spec.md §9 "process-wide configuration
/// struct").
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target_ports: Vec<u16>,
    pub source_port_range: (u16, u16),
    pub source_ips: Vec<Ipv4Addr>,
    pub gateway_mac: Option<[u8; 6]>,
    pub interface: String,

    pub rate_pps: u64,
    pub bandwidth_bps: Option<u64>,
    pub batch: u16,
    pub probes: u32,

    pub max_targets: Option<MaxTargets>,
    pub max_results: Option<u64>,
    pub max_runtime: Option<Duration>,
    pub cooldown: Duration,
    pub min_hitrate: Option<f64>,
    pub max_sendto_failures: u64,

    pub shard_id: u32,
    pub total_shards: u32,
    pub senders_per_shard: u32,
    pub cpu_cores: Vec<usize>,

    pub output_fields: OutputFields,
    pub output_format: OutputFormat,
    pub output_filter: Option<String>,
    pub output_file: Option<PathBuf>,
    pub no_header_row: bool,

    pub blocklist_file: Option<PathBuf>,
    pub allowlist_file: Option<PathBuf>,
    pub list_of_ips_file: Option<PathBuf>,

    pub probe_module: String,
    pub probe_args: HashMap<String, String>,
    pub validate_source_port: bool,

    pub dedup_method: DedupMethod,
    pub dedup_window_size: usize,

    pub seed: Option<u64>,
    pub metadata_file: Option<PathBuf>,
    pub user_metadata: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl ScanConfig {
    pub fn is_sharded(&self) -> bool {
        self.total_shards > 1
    }
}

//! Configuration: raw CLI surface, validated/lowered [`ScanConfig`], and the
//! small parsers each step depends on.

mod addresses;
mod build;
mod cli;
mod ports;
mod types;

pub use build::{build_config, build_target_space};
pub use cli::{parse_bandwidth, parse_probe_args, CliDedupMethod, CliOutputFormat, RawArgs};
pub use ports::{parse_port_list, parse_port_range};
pub use types::{DedupMethod, MaxTargets, OutputFields, OutputFormat, ScanConfig};

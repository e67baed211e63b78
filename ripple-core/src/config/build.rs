//! Validates and lowers a [`RawArgs`] value into an immutable
//! [`ScanConfig`], mirroring the teacher's `load_from_path` +
//! `validate_config` split: parse first, then a separate validation pass
//! that returns a structured [`ScanError`] instead of panicking.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;

use crate::allowed::AllowedSet;
use crate::error::{Result, ScanError};
use crate::target::TargetSpace;

use super::addresses::parse_source_ips;
use super::cli::{parse_bandwidth, parse_probe_args, CliDedupMethod, CliOutputFormat, RawArgs};
use super::ports::{parse_port_list, parse_port_range};
use super::types::{DedupMethod, MaxTargets, OutputFields, OutputFormat, ScanConfig};

pub fn build_config(args: RawArgs) -> Result<ScanConfig> {
    let target_ports = parse_port_list(&args.target_ports)?;
    let source_port_range = parse_port_range(&args.source_port)?;
    let source_ips = parse_source_ips(&args.source_ip)?;

    let gateway_mac = args
        .gateway_mac
        .as_deref()
        .map(parse_mac)
        .transpose()?;

    let bandwidth_bps = args.bandwidth.as_deref().map(parse_bandwidth).transpose()?;

    let max_targets = args.max_targets.as_deref().map(parse_max_targets).transpose()?;
    let max_runtime = args.max_runtime_secs.map(Duration::from_secs);
    let cooldown = Duration::from_secs(args.cooldown_secs);

    if args.shards > 1 && args.seed.is_none() {
        return Err(ScanError::Config(
            "sharded runs (--shards > 1) require an explicit --seed".into(),
        ));
    }
    if args.shard >= args.shards {
        return Err(ScanError::Config(format!(
            "--shard {} must be less than --shards {}",
            args.shard, args.shards
        )));
    }
    if args.batch == 0 {
        return Err(ScanError::Config("--batch must be at least 1".into()));
    }

    let cpu_cores = args
        .cores
        .as_deref()
        .map(parse_core_list)
        .transpose()?
        .unwrap_or_default();

    let output_fields = parse_output_fields(&args.output_fields);
    let output_format = match args.output_module {
        CliOutputFormat::Csv => OutputFormat::Csv,
        CliOutputFormat::JsonLines => OutputFormat::JsonLines,
    };

    let dedup_method = match args.dedup_method {
        CliDedupMethod::Default => DedupMethod::Default,
        CliDedupMethod::None => DedupMethod::None,
        CliDedupMethod::Full => DedupMethod::Full,
        CliDedupMethod::Window => DedupMethod::Window,
    };
    // spec.md §4.6: full-bitmap dedup is only valid for single-port scans.
    if dedup_method == DedupMethod::Full && target_ports.len() > 1 {
        return Err(ScanError::Config(
            "--dedup-method full is only valid for single-port scans".into(),
        ));
    }

    let probe_args = args.probe_args.as_deref().map(parse_probe_args).unwrap_or_default();

    let user_metadata = args
        .user_metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| ScanError::Config(format!("invalid --user-metadata JSON: {e}")))?;

    Ok(ScanConfig {
        target_ports,
        source_port_range,
        source_ips,
        gateway_mac,
        interface: args.interface,

        rate_pps: args.rate,
        bandwidth_bps,
        batch: args.batch,
        probes: args.probes.max(1),

        max_targets,
        max_results: args.max_results,
        max_runtime,
        cooldown,
        min_hitrate: args.min_hitrate,
        max_sendto_failures: args.max_sendto_failures,

        shard_id: args.shard,
        total_shards: args.shards.max(1),
        senders_per_shard: args.sender_threads.max(1),
        cpu_cores,

        output_fields,
        output_format,
        output_filter: args.output_filter,
        output_file: args.output_file,
        no_header_row: args.no_header_row,

        blocklist_file: args.blocklist_file,
        allowlist_file: args.allowlist_file,
        list_of_ips_file: args.list_of_ips_file,

        probe_module: args.probe_module,
        probe_args,
        validate_source_port: args.validate_source_port,

        dedup_method,
        dedup_window_size: args.dedup_window_size,

        seed: args.seed,
        metadata_file: args.metadata_file,
        user_metadata,
        notes: args.notes,
    })
}

/// Builds the [`TargetSpace`] from the resolved allow/deny/explicit files
/// (spec.md §4.3 step 3's "blocklist exposes index -> ip" contract).
pub fn build_target_space(cfg: &ScanConfig) -> Result<TargetSpace> {
    let allowed = if let Some(path) = &cfg.list_of_ips_file {
        AllowedSet::from_explicit(read_ip_list(path)?)?
    } else {
        let allow = match &cfg.allowlist_file {
            Some(path) => read_cidr_list(path)?,
            None => Vec::new(),
        };
        let deny = match &cfg.blocklist_file {
            Some(path) => read_cidr_list(path)?,
            None => Vec::new(),
        };
        AllowedSet::from_cidrs(&allow, &deny)?
    };
    Ok(TargetSpace::new(Arc::new(allowed), cfg.target_ports.clone()))
}

fn read_cidr_list(path: &std::path::Path) -> Result<Vec<Ipv4Net>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ScanError::Config(format!("reading {}: {e}", path.display())))?;
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.parse::<Ipv4Net>()
                .map_err(|_| ScanError::Config(format!("invalid CIDR '{l}' in {}", path.display())))
        })
        .collect()
}

fn read_ip_list(path: &std::path::Path) -> Result<Vec<Ipv4Addr>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ScanError::Config(format!("reading {}: {e}", path.display())))?;
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.parse::<Ipv4Addr>()
                .map_err(|_| ScanError::Config(format!("invalid IP '{l}' in {}", path.display())))
        })
        .collect()
}

fn parse_max_targets(spec: &str) -> Result<MaxTargets> {
    let spec = spec.trim();
    if let Some(pct) = spec.strip_suffix('%') {
        let pct: f64 = pct
            .parse()
            .map_err(|_| ScanError::Config(format!("invalid --max-targets percentage '{spec}'")))?;
        return Ok(MaxTargets::Percent(pct));
    }
    let n: u64 = spec
        .parse()
        .map_err(|_| ScanError::Config(format!("invalid --max-targets value '{spec}'")))?;
    Ok(MaxTargets::Absolute(n))
}

fn parse_mac(spec: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = spec.split(':');
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| ScanError::Config(format!("invalid MAC address '{spec}'")))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| ScanError::Config(format!("invalid MAC address '{spec}'")))?;
    }
    if parts.next().is_some() {
        return Err(ScanError::Config(format!("invalid MAC address '{spec}'")));
    }
    Ok(mac)
}

fn parse_core_list(spec: &str) -> Result<Vec<usize>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| ScanError::Config(format!("invalid core id '{s}'"))))
        .collect()
}

fn parse_output_fields(spec: &str) -> OutputFields {
    if spec.trim() == "*" {
        OutputFields::All
    } else {
        OutputFields::Explicit(spec.split(',').map(|s| s.trim().to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> RawArgs {
        RawArgs {
            target_ports: "80".into(),
            source_port: "40000-41000".into(),
            source_ip: "10.0.0.1".into(),
            gateway_mac: None,
            interface: "eth0".into(),
            rate: 0,
            bandwidth: None,
            batch: 1,
            probes: 1,
            max_targets: None,
            max_results: None,
            max_runtime_secs: None,
            cooldown_secs: 1,
            min_hitrate: None,
            max_sendto_failures: 10,
            shard: 0,
            shards: 1,
            sender_threads: 1,
            cores: None,
            output_fields: "*".into(),
            output_module: CliOutputFormat::Csv,
            output_filter: None,
            output_file: None,
            no_header_row: false,
            blocklist_file: None,
            allowlist_file: None,
            list_of_ips_file: None,
            probe_module: "tcp_synscan".into(),
            probe_args: None,
            validate_source_port: true,
            dedup_method: CliDedupMethod::Default,
            dedup_window_size: 1000,
            seed: None,
            metadata_file: None,
            user_metadata: None,
            notes: None,
        }
    }

    #[test]
    fn sharded_run_without_seed_is_rejected() {
        let mut args = base_args();
        args.shards = 4;
        assert!(build_config(args).is_err());
    }

    #[test]
    fn full_dedup_with_multiple_ports_is_rejected() {
        let mut args = base_args();
        args.target_ports = "80,443".into();
        args.dedup_method = CliDedupMethod::Full;
        assert!(build_config(args).is_err());
    }

    #[test]
    fn percentage_max_targets_parses() {
        let mut args = base_args();
        args.max_targets = Some("50%".into());
        let cfg = build_config(args).unwrap();
        assert_eq!(cfg.max_targets, Some(MaxTargets::Percent(50.0)));
    }

    #[test]
    fn valid_single_shard_config_builds() {
        let cfg = build_config(base_args()).unwrap();
        assert_eq!(cfg.target_ports, vec![80]);
        assert!(!cfg.is_sharded());
    }
}

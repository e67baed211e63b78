//! Integration test for the metadata file spec.md §6 describes: a JSON
//! object with a configuration echo, final counters, timestamps, and
//! termination reason, written to whatever path `-m/--metadata-file` names.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use ripple_core::config::{DedupMethod, MaxTargets, OutputFields, OutputFormat, ScanConfig};
use ripple_core::metadata::write_metadata_file;
use ripple_core::monitor::TerminationReason;
use ripple_core::stats::StatsSnapshot;

fn base_config(metadata_file: std::path::PathBuf) -> ScanConfig {
    ScanConfig {
        target_ports: vec![80],
        source_port_range: (32768, 61000),
        source_ips: vec![Ipv4Addr::new(10, 0, 0, 1)],
        gateway_mac: None,
        interface: "eth0".to_string(),
        rate_pps: 1000,
        bandwidth_bps: None,
        batch: 1,
        probes: 1,
        max_targets: Some(MaxTargets::Absolute(100)),
        max_results: None,
        max_runtime: None,
        cooldown: Duration::from_secs(8),
        min_hitrate: None,
        max_sendto_failures: 10,
        shard_id: 0,
        total_shards: 1,
        senders_per_shard: 1,
        cpu_cores: Vec::new(),
        output_fields: OutputFields::All,
        output_format: OutputFormat::Csv,
        output_filter: None,
        output_file: None,
        no_header_row: false,
        blocklist_file: None,
        allowlist_file: None,
        list_of_ips_file: None,
        probe_module: "tcp_synscan".to_string(),
        probe_args: HashMap::new(),
        validate_source_port: false,
        dedup_method: DedupMethod::Default,
        dedup_window_size: 1_000_000,
        seed: Some(42),
        metadata_file: Some(metadata_file),
        user_metadata: None,
        notes: Some("integration test run".to_string()),
    }
}

#[test]
fn writes_a_well_formed_metadata_file_and_round_trips_its_fields() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("metadata.json");
    let cfg = base_config(path.clone());

    let stats = StatsSnapshot {
        offered: 100,
        sent: 100,
        send_failures: 0,
        packets_received: 37,
        validation_failed: 2,
        duplicates: 1,
        filtered: 5,
        successes: 29,
        app_successes: 0,
        ..StatsSnapshot::default()
    };

    let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let end = start + Duration::from_secs(30);

    write_metadata_file(&cfg, stats, start, end, TerminationReason::MaxResults)
        .expect("writing metadata file should succeed");

    let contents = std::fs::read_to_string(&path).expect("metadata file should exist");
    let parsed: serde_json::Value =
        serde_json::from_str(&contents).expect("metadata file should be valid JSON");

    assert_eq!(parsed["config"]["probe_module"], "tcp_synscan");
    assert_eq!(parsed["config"]["seed"], 42);
    assert_eq!(parsed["counters"]["sent"], 100);
    assert_eq!(parsed["counters"]["successes"], 29);
    assert_eq!(parsed["start_time_unix"], 1_700_000_000);
    assert_eq!(parsed["end_time_unix"], 1_700_000_030);
    assert_eq!(parsed["termination_reason"], "max_results");
    assert_eq!(parsed["notes"], "integration test run");
}

#[test]
fn skips_writing_when_no_metadata_file_is_configured() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("never-written.json");
    let mut cfg = base_config(path.clone());
    cfg.metadata_file = None;

    write_metadata_file(&cfg, StatsSnapshot::default(), SystemTime::now(), SystemTime::now(), TerminationReason::ExternalSignal)
        .expect("a None metadata_file should be a no-op, not an error");

    assert!(!path.exists());
}

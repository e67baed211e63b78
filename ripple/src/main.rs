use clap::Parser;
use ripple_core::config::{build_config, RawArgs};
use ripple_core::probe::Registry;
use ripple_core::run_scan;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let args = RawArgs::parse();
    let cfg = match build_config(args) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        probe_module = %cfg.probe_module,
        interface = %cfg.interface,
        target_ports = ?cfg.target_ports,
        "configuration loaded"
    );

    let registry = build_registry();
    match run_scan(cfg, &registry) {
        Ok(_) => {}
        Err(err) => {
            error!(%err, "scan exited with error");
            std::process::exit(1);
        }
    }
}

fn build_registry() -> Registry {
    let mut registry = Registry::new();
    ripple_probes::register_all(&mut registry);
    registry
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

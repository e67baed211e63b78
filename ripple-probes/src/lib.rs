//! Concrete probe modules: TCP SYN scan, ICMP echo scan, generic UDP, and
//! NTP. Each implements `ripple_core::probe::ProbeModule` and is registered
//! into a [`ripple_core::probe::Registry`] by name.

mod icmp_echoscan;
mod ntp;
mod tcp_synscan;
mod udp;
mod wire;

use std::sync::Arc;

use ripple_core::probe::{ProbeModule, Registry};
use tracing::debug;

pub use icmp_echoscan::IcmpEchoScan;
pub use ntp::Ntp;
pub use tcp_synscan::TcpSynScan;
pub use udp::Udp;

/// Registers every built-in probe module under its canonical name.
pub fn register_all(registry: &mut Registry) {
    let modules: Vec<Arc<dyn ProbeModule>> = vec![
        Arc::new(TcpSynScan),
        Arc::new(IcmpEchoScan),
        Arc::new(Udp::default()),
        Arc::new(Ntp),
    ];
    for module in modules {
        debug!(probe = module.name(), "registering probe module");
        registry.register(module);
    }
}

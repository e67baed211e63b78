//! The target space: `|allowed| * |ports|` (addr, port) pairs, addressed by
//! a single `u64` index (spec.md §3).

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::allowed::AllowedSet;

pub struct TargetSpace {
    pub allowed: Arc<AllowedSet>,
    pub ports: Vec<u16>,
}

impl TargetSpace {
    pub fn new(allowed: Arc<AllowedSet>, ports: Vec<u16>) -> Self {
        Self { allowed, ports }
    }

    pub fn size(&self) -> u64 {
        self.allowed.count() * self.ports.len() as u64
    }

    /// `i = addr_index * |ports| + port_index` (spec.md §4.3 step 2).
    pub fn decompose(&self, index: u64) -> Option<(Ipv4Addr, u16)> {
        let num_ports = self.ports.len() as u64;
        let addr_index = index / num_ports;
        let port_index = (index % num_ports) as usize;
        let ip = self.allowed.index_to_ip(addr_index)?;
        Some((ip, self.ports[port_index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_index_into_addr_and_port_row_major() {
        let allowed = Arc::new(
            AllowedSet::from_explicit(vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
            ])
            .unwrap(),
        );
        let space = TargetSpace::new(allowed, vec![80, 443]);
        assert_eq!(space.size(), 6);
        assert_eq!(space.decompose(0), Some((Ipv4Addr::new(10, 0, 0, 1), 80)));
        assert_eq!(space.decompose(1), Some((Ipv4Addr::new(10, 0, 0, 1), 443)));
        assert_eq!(space.decompose(2), Some((Ipv4Addr::new(10, 0, 0, 2), 80)));
        assert_eq!(space.decompose(5), Some((Ipv4Addr::new(10, 0, 0, 3), 443)));
        assert_eq!(space.decompose(6), None);
    }
}

//! Interface/gateway discovery: the OS query spec.md §1 calls out as an
//! external collaborator ("returns interface index, source IP, gateway
//! MAC"). Implemented narrowly for Linux so the crate is runnable end to
//! end; anything this can't resolve falls back to requiring an explicit
//! `--gateway-mac`.

use std::fs;
use std::net::Ipv4Addr;

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, Copy)]
pub struct ResolvedInterface {
    pub index: u32,
    pub src_mac: [u8; 6],
}

#[cfg(target_os = "linux")]
pub fn resolve_interface(name: &str) -> Result<ResolvedInterface> {
    let cname = std::ffi::CString::new(name)
        .map_err(|_| ScanError::Config(format!("invalid interface name: {name}")))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        return Err(ScanError::Environment(format!("no such interface: {name}")));
    }

    let src_mac = hw_address(name)?;
    Ok(ResolvedInterface { index, src_mac })
}

#[cfg(not(target_os = "linux"))]
pub fn resolve_interface(name: &str) -> Result<ResolvedInterface> {
    Err(ScanError::Environment(format!(
        "interface discovery for {name:?} requires Linux"
    )))
}

#[cfg(target_os = "linux")]
fn hw_address(name: &str) -> Result<[u8; 6]> {
    use std::os::fd::AsRawFd;

    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        None,
    )
    .map_err(|e| ScanError::Environment(format!("opening ioctl socket: {e}")))?;

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = src as libc::c_char;
    }

    let ret = unsafe { libc::ioctl(socket.as_raw_fd(), libc::SIOCGIFHWADDR, &mut ifr) };
    if ret < 0 {
        return Err(ScanError::Environment(format!(
            "reading hardware address of {name}: {}",
            std::io::Error::last_os_error()
        )));
    }

    let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
    let mut mac = [0u8; 6];
    for (dst, src) in mac.iter_mut().zip(sa_data.iter()) {
        *dst = *src as u8;
    }
    Ok(mac)
}

/// Reads the default route's gateway IPv4 address from `/proc/net/route`.
pub fn default_gateway_ip(interface: &str) -> Result<Ipv4Addr> {
    let contents = fs::read_to_string("/proc/net/route")
        .map_err(|e| ScanError::Environment(format!("reading /proc/net/route: {e}")))?;
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let (iface, destination, gateway) = (fields[0], fields[1], fields[2]);
        if iface != interface || destination != "00000000" {
            continue;
        }
        return parse_hex_le_ip(gateway);
    }
    Err(ScanError::Environment(format!(
        "no default route found for interface {interface}"
    )))
}

/// Resolves a gateway IP to a MAC address via the kernel's ARP table
/// (`/proc/net/arp`). This only succeeds if something has already triggered
/// ARP resolution (e.g. an OS-level ping); callers should treat failure as
/// a prompt to pass `--gateway-mac` explicitly rather than retry forever.
pub fn arp_mac_for(ip: Ipv4Addr) -> Result<[u8; 6]> {
    let contents = fs::read_to_string("/proc/net/arp")
        .map_err(|e| ScanError::Environment(format!("reading /proc/net/arp: {e}")))?;
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        if fields[0].parse::<Ipv4Addr>() != Ok(ip) {
            continue;
        }
        return parse_colon_mac(fields[3]);
    }
    Err(ScanError::Environment(format!(
        "no ARP entry for gateway {ip}; pass --gateway-mac explicitly"
    )))
}

pub fn resolve_gateway_mac(interface: &str) -> Result<[u8; 6]> {
    let gateway_ip = default_gateway_ip(interface)?;
    arp_mac_for(gateway_ip)
}

fn parse_hex_le_ip(field: &str) -> Result<Ipv4Addr> {
    let value = u32::from_str_radix(field, 16)
        .map_err(|_| ScanError::Environment(format!("malformed route table field: {field}")))?;
    Ok(Ipv4Addr::from(value.to_le_bytes()))
}

fn parse_colon_mac(field: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = field.split(':');
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| ScanError::Environment(format!("malformed MAC address: {field}")))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| ScanError::Environment(format!("malformed MAC address: {field}")))?;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_little_endian_hex_route_gateway() {
        // 0100A8C0 little-endian hex -> 192.168.0.1
        assert_eq!(parse_hex_le_ip("0100A8C0").unwrap(), Ipv4Addr::new(192, 168, 0, 1));
    }

    #[test]
    fn parses_colon_separated_mac() {
        assert_eq!(
            parse_colon_mac("aa:bb:cc:dd:ee:ff").unwrap(),
            [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]
        );
    }
}

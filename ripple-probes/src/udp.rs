//! Generic UDP probe with a user-suppliable payload, plus the shared
//! response-parsing helper reused by `ntp` (mirrors the original zmap UDP
//! module's `udp_do_validate_packet` being shared by its NTP variant).

use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::time::Duration;

use etherparse::{IpNumber, Ipv4HeaderSlice, UdpHeaderSlice};

use ripple_core::error::{Result, ScanError};
use ripple_core::oracle::RunKey;
use ripple_core::probe::{
    FieldDef, FieldKind, FieldRecord, FieldValue, OutputType, ProbeModule, ThreadState,
    ValidationOutcome,
};

use crate::wire;

const DEFAULT_PAYLOAD: &[u8] = b"ripple";
const ICMP_DEST_UNREACHABLE: u8 = 3;

/// Result of parsing a captured frame as either a direct UDP reply or an
/// ICMP "destination unreachable" carrying our original request.
pub(crate) enum UdpResponse<'a> {
    Reply {
        our_ip: Ipv4Addr,
        target_ip: Ipv4Addr,
        source_port: u16,
        dest_port: u16,
        payload: &'a [u8],
    },
    Unreachable {
        icmp_code: u8,
        original_target: Ipv4Addr,
        original_dest_port: u16,
    },
    Other,
}

/// Parses a captured IP payload as a UDP response or an ICMP unreachable
/// wrapping our original UDP request. Shared between `udp` and `ntp`.
pub(crate) fn parse_udp_response(ip_payload: &[u8]) -> UdpResponse<'_> {
    let Ok(ip) = Ipv4HeaderSlice::from_slice(ip_payload) else {
        return UdpResponse::Other;
    };
    let header_len = ip.slice().len();
    let rest = &ip_payload[header_len..];

    match ip.protocol() {
        IpNumber::UDP => {
            let Ok(udp) = UdpHeaderSlice::from_slice(rest) else {
                return UdpResponse::Other;
            };
            let udp_header_len = udp.slice().len();
            UdpResponse::Reply {
                our_ip: ip.destination_addr(),
                target_ip: ip.source_addr(),
                source_port: udp.source_port(),
                dest_port: udp.destination_port(),
                payload: &rest[udp_header_len..],
            }
        }
        IpNumber::ICMP if rest.first().copied() == Some(ICMP_DEST_UNREACHABLE) => {
            let icmp_code = rest.get(1).copied().unwrap_or(0);
            let inner = &rest[8.min(rest.len())..];
            let Ok(inner_ip) = Ipv4HeaderSlice::from_slice(inner) else {
                return UdpResponse::Other;
            };
            let inner_header_len = inner_ip.slice().len();
            let inner_rest = &inner[inner_header_len..];
            let Ok(inner_udp) = UdpHeaderSlice::from_slice(inner_rest) else {
                return UdpResponse::Other;
            };
            UdpResponse::Unreachable {
                icmp_code,
                original_target: inner_ip.destination_addr(),
                original_dest_port: inner_udp.destination_port(),
            }
        }
        _ => UdpResponse::Other,
    }
}

const FIELDS: &[FieldDef] = &[
    FieldDef { name: "classification", kind: FieldKind::String, description: "udp, unreachable, or other" },
    FieldDef { name: "success", kind: FieldKind::Bool, description: "true for a direct udp reply" },
    FieldDef { name: "saddr", kind: FieldKind::String, description: "responding address" },
    FieldDef { name: "sport", kind: FieldKind::Int, description: "UDP source port of the response" },
    FieldDef { name: "dport", kind: FieldKind::Int, description: "UDP destination port of the response" },
    FieldDef { name: "icmp_code", kind: FieldKind::Int, description: "ICMP code when unreachable" },
];

struct UdpState {
    src_mac: [u8; 6],
    gw_mac: [u8; 6],
}

#[derive(Default)]
pub struct Udp {
    payload: OnceLock<Vec<u8>>,
}

impl Udp {
    fn payload(&self) -> &[u8] {
        self.payload.get().map(|v| v.as_slice()).unwrap_or(DEFAULT_PAYLOAD)
    }
}

impl ProbeModule for Udp {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn pcap_filter(&self) -> &str {
        "udp || icmp"
    }

    fn max_packet_length(&self) -> usize {
        wire::ETH_HEADER_LEN + wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + self.payload().len()
    }

    fn fields(&self) -> &[FieldDef] {
        FIELDS
    }

    fn output_type(&self) -> OutputType {
        OutputType::Static
    }

    fn port_args(&self) -> bool {
        true
    }

    fn global_initialize(&self, args: &std::collections::HashMap<String, String>) -> Result<()> {
        if let Some(raw) = args.get("payload") {
            let bytes = if let Some(hex) = raw.strip_prefix("hex:") {
                decode_hex(hex).ok_or_else(|| {
                    ScanError::Config(format!("udp probe: invalid hex payload {hex:?}"))
                })?
            } else {
                raw.as_bytes().to_vec()
            };
            let _ = self.payload.set(bytes);
        }
        Ok(())
    }

    fn thread_initialize(&self) -> ThreadState {
        Box::new(UdpState { src_mac: [0; 6], gw_mac: [0; 6] })
    }

    fn prepare_packet(
        &self,
        buf: &mut Vec<u8>,
        src_mac: [u8; 6],
        gw_mac: [u8; 6],
        state: &mut ThreadState,
    ) {
        if let Some(s) = downcast(state) {
            s.src_mac = src_mac;
            s.gw_mac = gw_mac;
        }
        buf.clear();
        buf.resize(self.max_packet_length(), 0);
    }

    fn make_packet(
        &self,
        buf: &mut [u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        run_key: &RunKey,
        _stream_index: u32,
        state: &mut ThreadState,
    ) {
        let Some(s) = downcast(state) else { return };
        let payload = self.payload();
        let eth_end = wire::ETH_HEADER_LEN;
        let ip_end = eth_end + wire::IPV4_HEADER_LEN;
        let udp_end = ip_end + wire::UDP_HEADER_LEN + payload.len();

        wire::write_eth_header(&mut buf[0..eth_end], s.src_mac, s.gw_mac);
        wire::write_ipv4_header(
            &mut buf[eth_end..ip_end],
            src_ip,
            dst_ip,
            wire::IP_PROTO_UDP,
            (wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + payload.len()) as u16,
            (run_key.validation_word(src_ip, dst_ip, dst_port) & 0xffff) as u16,
        );
        wire::write_udp_header(&mut buf[ip_end..udp_end], src_ip, dst_ip, src_port, dst_port, payload);
    }

    fn validate_packet(
        &self,
        ip_payload: &[u8],
        _run_key: &RunKey,
        source_port_range: (u16, u16),
        validate_source_port: bool,
    ) -> ValidationOutcome {
        match parse_udp_response(ip_payload) {
            UdpResponse::Reply { target_ip, dest_port, .. } => {
                if validate_source_port {
                    let (lo, hi) = source_port_range;
                    if dest_port < lo || dest_port > hi {
                        return ValidationOutcome::Rejected;
                    }
                }
                ValidationOutcome::Accepted { reported_src_ip: target_ip }
            }
            UdpResponse::Unreachable { original_target, original_dest_port, .. } => {
                if validate_source_port {
                    let (lo, hi) = source_port_range;
                    if original_dest_port < lo || original_dest_port > hi {
                        return ValidationOutcome::Rejected;
                    }
                }
                ValidationOutcome::Accepted { reported_src_ip: original_target }
            }
            UdpResponse::Other => ValidationOutcome::Rejected,
        }
    }

    fn process_packet(
        &self,
        ip_payload: &[u8],
        reported_src_ip: Ipv4Addr,
        _timestamp: Duration,
    ) -> FieldRecord {
        let mut record = FieldRecord::new();
        match parse_udp_response(ip_payload) {
            UdpResponse::Reply { source_port, dest_port, .. } => {
                record.push("classification", FieldValue::Str("udp".into()));
                record.push("success", FieldValue::Bool(true));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
                record.push("sport", FieldValue::Int(source_port as i64));
                record.push("dport", FieldValue::Int(dest_port as i64));
            }
            UdpResponse::Unreachable { icmp_code, original_dest_port, .. } => {
                record.push("classification", FieldValue::Str("unreachable".into()));
                record.push("success", FieldValue::Bool(false));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
                record.push("dport", FieldValue::Int(original_dest_port as i64));
                record.push("icmp_code", FieldValue::Int(icmp_code as i64));
            }
            UdpResponse::Other => {
                record.push("classification", FieldValue::Str("other".into()));
                record.push("success", FieldValue::Bool(false));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
            }
        }
        record
    }
}

fn downcast(state: &mut ThreadState) -> Option<&mut UdpState> {
    (state as &mut (dyn std::any::Any + Send)).downcast_mut::<UdpState>()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_direct_udp_reply() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let payload = b"hello";
        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + payload.len()];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            dst,
            src,
            wire::IP_PROTO_UDP,
            frame.len() as u16,
            1,
        );
        wire::write_udp_header(&mut frame[wire::IPV4_HEADER_LEN..], dst, src, 123, 40000, payload);

        let probe = Udp::default();
        let run_key = RunKey::from_seed(7);
        let outcome = probe.validate_packet(&frame, &run_key, (40000, 40000), true);
        assert!(matches!(outcome, ValidationOutcome::Accepted { reported_src_ip } if reported_src_ip == dst));
    }

    #[test]
    fn hex_payload_decodes() {
        assert_eq!(decode_hex("00ff"), Some(vec![0x00, 0xff]));
        assert_eq!(decode_hex("0"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}

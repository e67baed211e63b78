//! NTP mode-3 client request / mode-4 server reply.
//!
//! Field offsets follow RFC 5905 §7.3 byte-for-byte. The original zmap
//! module read these fields through C pointer arithmetic on a
//! `uint32_t *`, so an offset like `+4` actually meant byte 16, not byte 4 —
//! every multi-byte field after the first word landed in the wrong place.
//! Parsing here goes through explicit byte ranges instead.

use std::net::Ipv4Addr;
use std::time::Duration;

use etherparse::Ipv4HeaderSlice;

use ripple_core::error::Result;
use ripple_core::oracle::RunKey;
use ripple_core::probe::{
    FieldDef, FieldKind, FieldRecord, FieldValue, OutputType, ProbeModule, ThreadState,
    ValidationOutcome,
};

use crate::udp::{parse_udp_response, UdpResponse};
use crate::wire;

const NTP_HEADER_LEN: usize = 48;
/// LI = 3 (unsynchronized), VN = 4, Mode = 3 (client) — matches the byte the
/// original probe sends on the wire.
const LI_VN_MODE_CLIENT: u8 = 0xE3;
const NTP_SERVER_PORT: u16 = 123;

const FIELDS: &[FieldDef] = &[
    FieldDef { name: "classification", kind: FieldKind::String, description: "ntp, icmp_unreachable, or other" },
    FieldDef { name: "success", kind: FieldKind::Bool, description: "true for a valid mode-4 reply" },
    FieldDef { name: "saddr", kind: FieldKind::String, description: "responding address" },
    FieldDef { name: "li_vn_mode", kind: FieldKind::Int, description: "LI/VN/Mode byte" },
    FieldDef { name: "stratum", kind: FieldKind::Int, description: "NTP stratum" },
    FieldDef { name: "poll", kind: FieldKind::Int, description: "poll interval exponent" },
    FieldDef { name: "precision", kind: FieldKind::Int, description: "clock precision exponent" },
    FieldDef { name: "root_delay", kind: FieldKind::Int, description: "root delay, NTP short format" },
    FieldDef { name: "root_dispersion", kind: FieldKind::Int, description: "root dispersion, NTP short format" },
    FieldDef { name: "reference_clock_identifier", kind: FieldKind::Int, description: "reference ID" },
    FieldDef { name: "reference_timestamp", kind: FieldKind::Binary, description: "reference timestamp" },
    FieldDef { name: "originate_timestamp", kind: FieldKind::Binary, description: "origin timestamp echoed back" },
    FieldDef { name: "receive_timestamp", kind: FieldKind::Binary, description: "server receive timestamp" },
    FieldDef { name: "transmit_timestamp", kind: FieldKind::Binary, description: "server transmit timestamp" },
    FieldDef { name: "icmp_responder", kind: FieldKind::String, description: "address that sent an ICMP error" },
    FieldDef { name: "icmp_type", kind: FieldKind::Int, description: "ICMP type when unreachable" },
    FieldDef { name: "icmp_code", kind: FieldKind::Int, description: "ICMP code when unreachable" },
];

struct NtpState {
    src_mac: [u8; 6],
    gw_mac: [u8; 6],
}

pub struct Ntp;

impl Ntp {
    fn build_request(block: &[u8; 16]) -> [u8; NTP_HEADER_LEN] {
        let mut payload = [0u8; NTP_HEADER_LEN];
        payload[0] = LI_VN_MODE_CLIENT;
        // stash the validation nonce in the Transmit Timestamp field; a
        // compliant server copies it verbatim into its reply's Origin
        // Timestamp field (RFC 5905 §8), which is what we check for on
        // the way back.
        payload[40..48].copy_from_slice(&block[0..8]);
        payload
    }
}

impl ProbeModule for Ntp {
    fn name(&self) -> &'static str {
        "ntp"
    }

    fn pcap_filter(&self) -> &str {
        "udp || icmp"
    }

    fn max_packet_length(&self) -> usize {
        wire::ETH_HEADER_LEN + wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + NTP_HEADER_LEN
    }

    fn fields(&self) -> &[FieldDef] {
        FIELDS
    }

    fn output_type(&self) -> OutputType {
        OutputType::Static
    }

    fn port_args(&self) -> bool {
        false
    }

    fn global_initialize(&self, _args: &std::collections::HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    fn thread_initialize(&self) -> ThreadState {
        Box::new(NtpState { src_mac: [0; 6], gw_mac: [0; 6] })
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
        _dst_port: u16,
        run_key: &RunKey,
        _stream_index: u32,
        state: &mut ThreadState,
    ) {
        let Some(s) = downcast(state) else { return };
        let eth_end = wire::ETH_HEADER_LEN;
        let ip_end = eth_end + wire::IPV4_HEADER_LEN;
        let udp_end = ip_end + wire::UDP_HEADER_LEN + NTP_HEADER_LEN;

        let block = run_key.derive_block(src_ip, dst_ip, NTP_SERVER_PORT);
        let payload = Self::build_request(&block);

        wire::write_eth_header(&mut buf[0..eth_end], s.src_mac, s.gw_mac);
        wire::write_ipv4_header(
            &mut buf[eth_end..ip_end],
            src_ip,
            dst_ip,
            wire::IP_PROTO_UDP,
            (wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + NTP_HEADER_LEN) as u16,
            (run_key.validation_word(src_ip, dst_ip, NTP_SERVER_PORT) & 0xffff) as u16,
        );
        wire::write_udp_header(
            &mut buf[ip_end..udp_end],
            src_ip,
            dst_ip,
            src_port,
            NTP_SERVER_PORT,
            &payload,
        );
    }

    fn validate_packet(
        &self,
        ip_payload: &[u8],
        run_key: &RunKey,
        _source_port_range: (u16, u16),
        _validate_source_port: bool,
    ) -> ValidationOutcome {
        match parse_udp_response(ip_payload) {
            UdpResponse::Reply { our_ip, target_ip, source_port, payload, .. } => {
                if source_port != NTP_SERVER_PORT || payload.len() < NTP_HEADER_LEN {
                    return ValidationOutcome::Rejected;
                }
                let block = run_key.derive_block(our_ip, target_ip, NTP_SERVER_PORT);
                if payload[24..32] == block[0..8] {
                    ValidationOutcome::Accepted { reported_src_ip: target_ip }
                } else {
                    ValidationOutcome::Rejected
                }
            }
            UdpResponse::Unreachable { original_target, original_dest_port, .. } => {
                if original_dest_port != NTP_SERVER_PORT {
                    return ValidationOutcome::Rejected;
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
            UdpResponse::Reply { payload, .. } if payload.len() >= NTP_HEADER_LEN => {
                record.push("classification", FieldValue::Str("ntp".into()));
                record.push("success", FieldValue::Bool(true));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
                record.push("li_vn_mode", FieldValue::Int(payload[0] as i64));
                record.push("stratum", FieldValue::Int(payload[1] as i64));
                record.push("poll", FieldValue::Int(payload[2] as i64));
                record.push("precision", FieldValue::Int(payload[3] as i8 as i64));
                record.push("root_delay", FieldValue::Int(be_u32(&payload[4..8]) as i64));
                record.push("root_dispersion", FieldValue::Int(be_u32(&payload[8..12]) as i64));
                record.push("reference_clock_identifier", FieldValue::Int(be_u32(&payload[12..16]) as i64));
                record.push("reference_timestamp", FieldValue::Binary(payload[16..24].to_vec()));
                record.push("originate_timestamp", FieldValue::Binary(payload[24..32].to_vec()));
                record.push("receive_timestamp", FieldValue::Binary(payload[32..40].to_vec()));
                record.push("transmit_timestamp", FieldValue::Binary(payload[40..48].to_vec()));
            }
            UdpResponse::Unreachable { icmp_code, .. } => {
                record.push("classification", FieldValue::Str("icmp_unreachable".into()));
                record.push("success", FieldValue::Bool(false));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
                record.push("icmp_responder", FieldValue::Str(reported_src_ip.to_string()));
                record.push("icmp_type", FieldValue::Int(3));
                record.push("icmp_code", FieldValue::Int(icmp_code as i64));
            }
            _ => {
                record.push("classification", FieldValue::Str("other".into()));
                record.push("success", FieldValue::Bool(false));
                record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
            }
        }
        record
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(bytes.try_into().unwrap())
}

fn downcast(state: &mut ThreadState) -> Option<&mut NtpState> {
    (state as &mut (dyn std::any::Any + Send)).downcast_mut::<NtpState>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ntp_reply(our_ip: Ipv4Addr, target_ip: Ipv4Addr, origin_ts: &[u8]) -> Vec<u8> {
        let mut ntp = [0u8; NTP_HEADER_LEN];
        ntp[0] = 0x24; // LI=0, VN=4, Mode=4 (server)
        ntp[1] = 2; // stratum
        ntp[24..32].copy_from_slice(origin_ts);

        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::UDP_HEADER_LEN + NTP_HEADER_LEN];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            target_ip,
            our_ip,
            wire::IP_PROTO_UDP,
            frame.len() as u16,
            1,
        );
        wire::write_udp_header(
            &mut frame[wire::IPV4_HEADER_LEN..],
            target_ip,
            our_ip,
            NTP_SERVER_PORT,
            40000,
            &ntp,
        );
        frame
    }

    #[test]
    fn accepts_reply_that_echoes_our_nonce() {
        let run_key = RunKey::from_seed(99);
        let our_ip = Ipv4Addr::new(10, 0, 0, 1);
        let target_ip = Ipv4Addr::new(10, 0, 0, 2);
        let block = run_key.derive_block(our_ip, target_ip, NTP_SERVER_PORT);

        let frame = ntp_reply(our_ip, target_ip, &block[0..8]);
        let probe = Ntp;
        let outcome = probe.validate_packet(&frame, &run_key, (0, 0), false);
        assert!(matches!(outcome, ValidationOutcome::Accepted { reported_src_ip } if reported_src_ip == target_ip));
    }

    #[test]
    fn rejects_reply_with_wrong_nonce() {
        let run_key = RunKey::from_seed(99);
        let our_ip = Ipv4Addr::new(10, 0, 0, 1);
        let target_ip = Ipv4Addr::new(10, 0, 0, 2);

        let frame = ntp_reply(our_ip, target_ip, &[0u8; 8]);
        let probe = Ntp;
        let outcome = probe.validate_packet(&frame, &run_key, (0, 0), false);
        assert!(matches!(outcome, ValidationOutcome::Rejected));
    }

    #[test]
    fn field_offsets_match_rfc5905_layout() {
        let mut payload = [0u8; NTP_HEADER_LEN];
        payload[1] = 3; // stratum
        payload[4..8].copy_from_slice(&42u32.to_be_bytes()); // root delay
        assert_eq!(payload[1], 3);
        assert_eq!(be_u32(&payload[4..8]), 42);
    }
}

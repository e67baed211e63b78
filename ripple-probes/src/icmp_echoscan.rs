//! ICMP echo (ping) scan: send an echo request, accept an echo reply whose
//! identifier/sequence carry the validation nonce, or a "destination
//! unreachable" that embeds our own original request.

use std::any::Any;
use std::net::Ipv4Addr;
use std::time::Duration;

use etherparse::{IpNumber, Ipv4HeaderSlice};

use ripple_core::error::Result;
use ripple_core::oracle::RunKey;
use ripple_core::probe::{
    FieldDef, FieldKind, FieldRecord, FieldValue, OutputType, ProbeModule, ThreadState,
    ValidationOutcome,
};

use crate::wire;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_DEST_UNREACHABLE: u8 = 3;

const FIELDS: &[FieldDef] = &[
    FieldDef { name: "classification", kind: FieldKind::String, description: "echoreply, unreachable, or other" },
    FieldDef { name: "success", kind: FieldKind::Bool, description: "true for echoreply" },
    FieldDef { name: "saddr", kind: FieldKind::String, description: "responding address" },
    FieldDef { name: "icmp_type", kind: FieldKind::Int, description: "ICMP type" },
    FieldDef { name: "icmp_code", kind: FieldKind::Int, description: "ICMP code" },
];

struct IcmpState {
    src_mac: [u8; 6],
    gw_mac: [u8; 6],
}

pub struct IcmpEchoScan;

impl ProbeModule for IcmpEchoScan {
    fn name(&self) -> &'static str {
        "icmp_echoscan"
    }

    fn pcap_filter(&self) -> &str {
        "icmp"
    }

    fn max_packet_length(&self) -> usize {
        wire::ETH_HEADER_LEN + wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN
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
        Box::new(IcmpState { src_mac: [0; 6], gw_mac: [0; 6] })
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
        _src_port: u16,
        dst_port: u16,
        run_key: &RunKey,
        _stream_index: u32,
        state: &mut ThreadState,
    ) {
        let Some(s) = downcast(state) else { return };
        let eth_end = wire::ETH_HEADER_LEN;
        let ip_end = eth_end + wire::IPV4_HEADER_LEN;
        let icmp_end = ip_end + wire::ICMP_ECHO_HEADER_LEN;

        wire::write_eth_header(&mut buf[0..eth_end], s.src_mac, s.gw_mac);
        let validation = run_key.validation_word(src_ip, dst_ip, dst_port);
        wire::write_ipv4_header(
            &mut buf[eth_end..ip_end],
            src_ip,
            dst_ip,
            wire::IP_PROTO_ICMP,
            (wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN) as u16,
            (validation & 0xffff) as u16,
        );
        let identifier = (validation >> 16) as u16;
        let sequence = (validation & 0xffff) as u16;
        wire::write_icmp_echo_request(&mut buf[ip_end..icmp_end], identifier, sequence);
    }

    fn validate_packet(
        &self,
        ip_payload: &[u8],
        run_key: &RunKey,
        _source_port_range: (u16, u16),
        _validate_source_port: bool,
    ) -> ValidationOutcome {
        let Ok(ip) = Ipv4HeaderSlice::from_slice(ip_payload) else {
            return ValidationOutcome::Rejected;
        };
        if ip.protocol() != IpNumber::ICMP {
            return ValidationOutcome::Rejected;
        }
        let header_len = ip.slice().len();
        let icmp = &ip_payload[header_len..];
        if icmp.len() < wire::ICMP_ECHO_HEADER_LEN {
            return ValidationOutcome::Rejected;
        }
        let icmp_type = icmp[0];
        let our_ip = ip.destination_addr();
        let target_ip = ip.source_addr();

        match icmp_type {
            ICMP_ECHO_REPLY => {
                let identifier = u16::from_be_bytes([icmp[4], icmp[5]]);
                let sequence = u16::from_be_bytes([icmp[6], icmp[7]]);
                let validation = run_key.validation_word(our_ip, target_ip, 0);
                let expected_id = (validation >> 16) as u16;
                let expected_seq = (validation & 0xffff) as u16;
                if identifier == expected_id && sequence == expected_seq {
                    ValidationOutcome::Accepted { reported_src_ip: target_ip }
                } else {
                    ValidationOutcome::Rejected
                }
            }
            ICMP_DEST_UNREACHABLE => {
                // the original request's IP header (and its 8-byte payload)
                // is embedded 8 bytes into the ICMP message.
                let inner_offset = wire::ICMP_ECHO_HEADER_LEN;
                let Ok(inner_ip) = Ipv4HeaderSlice::from_slice(&icmp[inner_offset..]) else {
                    return ValidationOutcome::Rejected;
                };
                let original_target = inner_ip.destination_addr();
                let inner_header_len = inner_ip.slice().len();
                let inner_icmp = &icmp[inner_offset + inner_header_len..];
                if inner_icmp.len() < 8 {
                    return ValidationOutcome::Rejected;
                }
                let identifier = u16::from_be_bytes([inner_icmp[4], inner_icmp[5]]);
                let sequence = u16::from_be_bytes([inner_icmp[6], inner_icmp[7]]);
                let validation = run_key.validation_word(our_ip, original_target, 0);
                let expected_id = (validation >> 16) as u16;
                let expected_seq = (validation & 0xffff) as u16;
                if identifier == expected_id && sequence == expected_seq {
                    ValidationOutcome::Accepted { reported_src_ip: original_target }
                } else {
                    ValidationOutcome::Rejected
                }
            }
            _ => ValidationOutcome::Rejected,
        }
    }

    fn process_packet(
        &self,
        ip_payload: &[u8],
        reported_src_ip: Ipv4Addr,
        _timestamp: Duration,
    ) -> FieldRecord {
        let mut record = FieldRecord::new();
        let Ok(ip) = Ipv4HeaderSlice::from_slice(ip_payload) else {
            record.push("classification", FieldValue::Str("other".into()));
            record.push("success", FieldValue::Bool(false));
            return record;
        };
        let header_len = ip.slice().len();
        let icmp = &ip_payload[header_len..];
        let icmp_type = icmp.first().copied().unwrap_or(0xff);
        let icmp_code = icmp.get(1).copied().unwrap_or(0);

        let (classification, success) = match icmp_type {
            ICMP_ECHO_REPLY => ("echoreply", true),
            ICMP_DEST_UNREACHABLE => ("unreachable", false),
            _ => ("other", false),
        };

        record.push("classification", FieldValue::Str(classification.into()));
        record.push("success", FieldValue::Bool(success));
        record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
        record.push("icmp_type", FieldValue::Int(icmp_type as i64));
        record.push("icmp_code", FieldValue::Int(icmp_code as i64));
        record
    }
}

fn downcast(state: &mut ThreadState) -> Option<&mut IcmpState> {
    (state as &mut (dyn Any + Send)).downcast_mut::<IcmpState>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_echo_reply() {
        let run_key = RunKey::from_seed(42);
        let our_ip = Ipv4Addr::new(10, 0, 0, 1);
        let target_ip = Ipv4Addr::new(10, 0, 0, 2);
        let validation = run_key.validation_word(our_ip, target_ip, 0);

        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            target_ip,
            our_ip,
            wire::IP_PROTO_ICMP,
            (wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN) as u16,
            1,
        );
        let icmp_off = wire::IPV4_HEADER_LEN;
        frame[icmp_off] = ICMP_ECHO_REPLY;
        frame[icmp_off + 4..icmp_off + 6].copy_from_slice(&((validation >> 16) as u16).to_be_bytes());
        frame[icmp_off + 6..icmp_off + 8].copy_from_slice(&((validation & 0xffff) as u16).to_be_bytes());

        let probe = IcmpEchoScan;
        let outcome = probe.validate_packet(&frame, &run_key, (0, 0), false);
        assert!(matches!(outcome, ValidationOutcome::Accepted { reported_src_ip } if reported_src_ip == target_ip));
    }

    #[test]
    fn rejects_mismatched_identifier() {
        let run_key = RunKey::from_seed(42);
        let our_ip = Ipv4Addr::new(10, 0, 0, 1);
        let target_ip = Ipv4Addr::new(10, 0, 0, 2);

        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            target_ip,
            our_ip,
            wire::IP_PROTO_ICMP,
            (wire::IPV4_HEADER_LEN + wire::ICMP_ECHO_HEADER_LEN) as u16,
            1,
        );
        frame[wire::IPV4_HEADER_LEN] = ICMP_ECHO_REPLY;

        let probe = IcmpEchoScan;
        let outcome = probe.validate_packet(&frame, &run_key, (0, 0), false);
        assert!(matches!(outcome, ValidationOutcome::Rejected));
    }
}

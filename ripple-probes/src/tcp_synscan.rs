//! TCP SYN scan: send a bare SYN, classify the reply as `synack` or `rst`.
//! Grounded in the general shape of zmap's default probe module and in the
//! retrieved `prtip-scanner` TCP packet builder for field naming.

use std::any::Any;
use std::net::Ipv4Addr;
use std::time::Duration;

use etherparse::{IpNumber, Ipv4HeaderSlice, TcpHeaderSlice};

use ripple_core::error::Result;
use ripple_core::oracle::RunKey;
use ripple_core::probe::{
    FieldDef, FieldKind, FieldRecord, FieldValue, OutputType, ProbeModule, ThreadState,
    ValidationOutcome,
};

use crate::wire;

const FIELDS: &[FieldDef] = &[
    FieldDef { name: "classification", kind: FieldKind::String, description: "synack, rst, or other" },
    FieldDef { name: "success", kind: FieldKind::Bool, description: "true for synack" },
    FieldDef { name: "saddr", kind: FieldKind::String, description: "responding address" },
    FieldDef { name: "sport", kind: FieldKind::Int, description: "TCP source port of the response" },
    FieldDef { name: "dport", kind: FieldKind::Int, description: "TCP destination port of the response" },
];

struct TcpState {
    src_mac: [u8; 6],
    gw_mac: [u8; 6],
}

pub struct TcpSynScan;

impl ProbeModule for TcpSynScan {
    fn name(&self) -> &'static str {
        "tcp_synscan"
    }

    fn pcap_filter(&self) -> &str {
        "tcp"
    }

    fn max_packet_length(&self) -> usize {
        wire::ETH_HEADER_LEN + wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN
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

    fn global_initialize(&self, _args: &std::collections::HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    fn thread_initialize(&self) -> ThreadState {
        Box::new(TcpState { src_mac: [0; 6], gw_mac: [0; 6] })
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
        let eth_end = wire::ETH_HEADER_LEN;
        let ip_end = eth_end + wire::IPV4_HEADER_LEN;
        let tcp_end = ip_end + wire::TCP_HEADER_LEN;

        wire::write_eth_header(&mut buf[0..eth_end], s.src_mac, s.gw_mac);
        wire::write_ipv4_header(
            &mut buf[eth_end..ip_end],
            src_ip,
            dst_ip,
            wire::IP_PROTO_TCP,
            (wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN) as u16,
            (run_key.validation_word(src_ip, dst_ip, dst_port) & 0xffff) as u16,
        );

        let block = run_key.derive_block(src_ip, dst_ip, dst_port);
        let isn = u32::from_be_bytes(block[4..8].try_into().unwrap());
        wire::write_tcp_syn_header(&mut buf[ip_end..tcp_end], src_ip, dst_ip, src_port, dst_port, isn);
    }

    fn validate_packet(
        &self,
        ip_payload: &[u8],
        run_key: &RunKey,
        source_port_range: (u16, u16),
        validate_source_port: bool,
    ) -> ValidationOutcome {
        let Ok(ip) = Ipv4HeaderSlice::from_slice(ip_payload) else {
            return ValidationOutcome::Rejected;
        };
        if ip.protocol() != IpNumber::TCP {
            return ValidationOutcome::Rejected;
        }
        let header_len = ip.slice().len();
        let Ok(tcp) = TcpHeaderSlice::from_slice(&ip_payload[header_len..]) else {
            return ValidationOutcome::Rejected;
        };

        if validate_source_port {
            let (lo, hi) = source_port_range;
            if tcp.destination_port() < lo || tcp.destination_port() > hi {
                return ValidationOutcome::Rejected;
            }
        }

        let our_ip = ip.destination_addr();
        let target_ip = ip.source_addr();
        let target_port = tcp.source_port();
        let block = run_key.derive_block(our_ip, target_ip, target_port);
        let expected_isn = u32::from_be_bytes(block[4..8].try_into().unwrap());

        let acks_our_syn = tcp.acknowledgment_number() == expected_isn.wrapping_add(1);
        if !acks_our_syn {
            return ValidationOutcome::Rejected;
        }

        ValidationOutcome::Accepted { reported_src_ip: target_ip }
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
        let tcp = TcpHeaderSlice::from_slice(&ip_payload[header_len..]).ok();

        let (classification, success, sport, dport) = match &tcp {
            Some(tcp) if tcp.syn() && tcp.ack() => {
                ("synack", true, tcp.source_port(), tcp.destination_port())
            }
            Some(tcp) if tcp.rst() => ("rst", false, tcp.source_port(), tcp.destination_port()),
            Some(tcp) => ("other", false, tcp.source_port(), tcp.destination_port()),
            None => ("other", false, 0, 0),
        };

        record.push("classification", FieldValue::Str(classification.into()));
        record.push("success", FieldValue::Bool(success));
        record.push("saddr", FieldValue::Str(reported_src_ip.to_string()));
        record.push("sport", FieldValue::Int(sport as i64));
        record.push("dport", FieldValue::Int(dport as i64));
        record
    }
}

fn downcast(state: &mut ThreadState) -> Option<&mut TcpState> {
    (state as &mut (dyn Any + Send)).downcast_mut::<TcpState>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_synack_as_success() {
        let run_key = RunKey::from_seed(1);
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let block = run_key.derive_block(src, dst, 80);
        let isn = u32::from_be_bytes(block[4..8].try_into().unwrap());

        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            dst,
            src,
            wire::IP_PROTO_TCP,
            (wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN) as u16,
            1,
        );
        wire::write_tcp_syn_header(
            &mut frame[wire::IPV4_HEADER_LEN..],
            dst,
            src,
            80,
            40000,
            0xaaaa_bbbb,
        );
        // flip to SYN+ACK with the correct ack number
        let tcp_off = wire::IPV4_HEADER_LEN;
        frame[tcp_off + 13] = wire::TCP_FLAG_SYN | wire::TCP_FLAG_ACK;
        frame[tcp_off + 8..tcp_off + 12].copy_from_slice(&isn.wrapping_add(1).to_be_bytes());
        frame[tcp_off + 16..tcp_off + 18].copy_from_slice(&0u16.to_be_bytes());

        let probe = TcpSynScan;
        let outcome = probe.validate_packet(&frame, &run_key, (40000, 40000), true);
        assert!(matches!(outcome, ValidationOutcome::Accepted { .. }));
    }

    #[test]
    fn rejects_when_ack_does_not_match_expected_isn() {
        let run_key = RunKey::from_seed(1);
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);

        let mut frame = vec![0u8; wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN];
        wire::write_ipv4_header(
            &mut frame[0..wire::IPV4_HEADER_LEN],
            dst,
            src,
            wire::IP_PROTO_TCP,
            (wire::IPV4_HEADER_LEN + wire::TCP_HEADER_LEN) as u16,
            1,
        );
        wire::write_tcp_syn_header(&mut frame[wire::IPV4_HEADER_LEN..], dst, src, 80, 40000, 123);

        let probe = TcpSynScan;
        let outcome = probe.validate_packet(&frame, &run_key, (40000, 40000), true);
        assert!(matches!(outcome, ValidationOutcome::Rejected));
    }
}

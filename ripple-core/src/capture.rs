//! Capture backend contract, mirroring [`crate::transmit::Transmit`]:
//! `open(interface, filter) -> handle`, `next_frame(handle) -> frame`,
//! `close(handle)` (spec.md §9).
//!
//! The Linux backend narrows capture at the kernel with a classic BPF
//! program built from the probe module's `pcap_filter` string. The parser
//! only understands the protocol-name filters ripple's own probe modules
//! emit (`"tcp"`, `"udp"`, `"icmp"`) — it is not a general tcpdump-filter
//! compiler.

use std::io;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanError};

/// One captured frame plus its monotonic capture timestamp (spec.md §4.4
/// "Timestamping").
pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub timestamp: Instant,
}

pub trait Capture: Send {
    /// Blocks for up to `timeout` waiting for the next frame; `Ok(None)`
    /// means the timeout elapsed with nothing captured, which lets the
    /// receiver re-check the run-flag (spec.md §5 "Suspension points").
    fn next_frame(&mut self, timeout: Duration) -> io::Result<Option<CapturedFrame>>;
}

/// IPv4 ethertype and the three protocol numbers our probe modules filter
/// on; offsets assume a 14-byte Ethernet header and no IP options, which is
/// true of every frame our own sender emits.
const ETHERTYPE_IPV4: u16 = 0x0800;
const IP_PROTO_OFFSET: u32 = 14 + 9;
const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

fn protocol_for_filter(filter: &str) -> Result<u8> {
    match filter.trim().to_ascii_lowercase().as_str() {
        "tcp" => Ok(PROTO_TCP),
        "udp" => Ok(PROTO_UDP),
        "icmp" => Ok(PROTO_ICMP),
        other => Err(ScanError::Config(format!(
            "unsupported capture filter {other:?}; expected one of tcp/udp/icmp"
        ))),
    }
}

/// Recorded-frames backend used by tests: replays a fixed queue of frames
/// without touching any socket, so the receiver pipeline is testable
/// without privilege.
#[derive(Default)]
pub struct RecordedCapture {
    frames: std::collections::VecDeque<Vec<u8>>,
}

impl RecordedCapture {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames: frames.into() }
    }
}

impl Capture for RecordedCapture {
    fn next_frame(&mut self, _timeout: Duration) -> io::Result<Option<CapturedFrame>> {
        Ok(self.frames.pop_front().map(|data| CapturedFrame { data, timestamp: Instant::now() }))
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxCapture;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::os::fd::AsRawFd;

    pub struct LinuxCapture {
        socket: Socket,
    }

    impl LinuxCapture {
        pub fn open(interface: &str, pcap_filter: &str) -> Result<Self> {
            let eth_p_all = (libc::ETH_P_ALL as u16).to_be() as i32;
            let socket = Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(eth_p_all)))
                .map_err(|e| ScanError::Environment(format!("opening capture socket: {e}")))?;

            let ifindex = interface_index(interface)?;
            bind_to_interface(socket.as_raw_fd(), ifindex, eth_p_all)?;

            let program = build_program(pcap_filter)?;
            attach_filter(socket.as_raw_fd(), &program)?;

            Ok(Self { socket })
        }
    }

    impl Capture for LinuxCapture {
        fn next_frame(&mut self, timeout: Duration) -> io::Result<Option<CapturedFrame>> {
            self.socket.set_read_timeout(Some(timeout))?;
            let mut buf = [std::mem::MaybeUninit::uninit(); 65536];
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    let timestamp = Instant::now();
                    let data: Vec<u8> =
                        buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();
                    Ok(Some(CapturedFrame { data, timestamp }))
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }

    fn interface_index(interface: &str) -> Result<libc::c_int> {
        let cname = std::ffi::CString::new(interface)
            .map_err(|_| ScanError::Config(format!("invalid interface name: {interface}")))?;
        let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
        if idx == 0 {
            return Err(ScanError::Environment(format!("no such interface: {interface}")));
        }
        Ok(idx as libc::c_int)
    }

    fn bind_to_interface(fd: libc::c_int, ifindex: libc::c_int, proto: i32) -> Result<()> {
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = proto as u16;
        addr.sll_ifindex = ifindex;

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if ret < 0 {
            return Err(ScanError::Environment(format!(
                "binding capture socket to interface: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// `SO_ATTACH_FILTER` expects a `struct sock_fprog { len, filter }`.
    fn attach_filter(fd: libc::c_int, program: &[libc::sock_filter]) -> Result<()> {
        let fprog = libc::sock_fprog {
            len: program.len() as u16,
            filter: program.as_ptr() as *mut libc::sock_filter,
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &fprog as *const libc::sock_fprog as *const libc::c_void,
                std::mem::size_of::<libc::sock_fprog>() as u32,
            )
        };
        if ret < 0 {
            return Err(ScanError::Environment(format!(
                "attaching BPF filter: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    const BPF_LD: u16 = 0x00;
    const BPF_H: u16 = 0x08;
    const BPF_B: u16 = 0x10;
    const BPF_ABS: u16 = 0x20;
    const BPF_JMP: u16 = 0x05;
    const BPF_JEQ: u16 = 0x10;
    const BPF_K: u16 = 0x00;
    const BPF_RET: u16 = 0x06;

    fn load(size: u16, offset: u32) -> libc::sock_filter {
        libc::sock_filter { code: BPF_LD | size | BPF_ABS, jt: 0, jf: 0, k: offset }
    }

    fn jeq(value: u32, jt: u8, jf: u8) -> libc::sock_filter {
        libc::sock_filter { code: BPF_JMP | BPF_JEQ | BPF_K, jt, jf, k: value }
    }

    fn ret(value: u32) -> libc::sock_filter {
        libc::sock_filter { code: BPF_RET | BPF_K, jt: 0, jf: 0, k: value }
    }

    /// Builds `load ethertype; jeq IPv4; load ip proto; jeq <proto>; ACCEPT;
    /// REJECT`, a flat chain where every failed check jumps straight to the
    /// trailing `REJECT`.
    fn build_program(pcap_filter: &str) -> Result<Vec<libc::sock_filter>> {
        let proto = protocol_for_filter(pcap_filter)?;

        // Checks, in order; the last two program slots are ACCEPT then
        // REJECT. Each check's `jf` counts instructions to skip to land on
        // REJECT; `jt` of 0 falls through to the next check.
        let checks = [load(BPF_H, 12), jeq(ETHERTYPE_IPV4 as u32, 0, 0), load(BPF_B, IP_PROTO_OFFSET), jeq(proto as u32, 0, 0)];
        let n = checks.len() as u8;
        let mut program = Vec::with_capacity(checks.len() + 2);
        for (i, mut insn) in checks.into_iter().enumerate() {
            if insn.code == BPF_JMP | BPF_JEQ | BPF_K {
                insn.jf = n - i as u8;
            }
            program.push(insn);
        }
        program.push(ret(0xffff)); // ACCEPT: whole frame
        program.push(ret(0)); // REJECT
        Ok(program)
    }
}

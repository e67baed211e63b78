//! Transmit backend contract (spec.md §9 "Transmit backend pluggability"):
//! `open(interface) -> handle`, `send(handle, frame) -> result`, `close`.
//!
//! The kernel-bypass and kernel-ring backends spec.md's design notes
//! mention are out of scope here (see the Open Question resolution in
//! SPEC_FULL.md): this module ships the one blocking Linux backend and a
//! no-op backend used by tests and non-Linux builds.

use std::io;

use crate::error::{Result, ScanError};

/// A place to write one prepared L2 frame. Implementations own whatever
/// socket/handle they need and release it on drop.
pub trait Transmit: Send {
    fn send(&self, frame: &[u8]) -> io::Result<()>;
}

/// Discards every frame. Used by the test harness and by any platform
/// without an `AF_PACKET`-shaped raw socket.
#[derive(Default)]
pub struct NullTransmit;

impl Transmit for NullTransmit {
    fn send(&self, _frame: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxRawSocket;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::os::fd::AsRawFd;

    /// A bound `AF_PACKET`/`SOCK_RAW` socket, sending whole L2 frames on a
    /// named interface. Grounded in the raw-socket send path of the
    /// retrieved `pattewadshubham/Custom-Network-Scanner` scanner, adapted
    /// from its capture loop to a send-only path.
    pub struct LinuxRawSocket {
        socket: Socket,
        ifindex: libc::c_int,
    }

    impl LinuxRawSocket {
        pub fn open(interface: &str) -> Result<Self> {
            let ifindex = interface_index(interface)?;
            // ETH_P_ALL in network byte order, matching the raw-socket
            // family zmap-style scanners open for a full-frame send path.
            let eth_p_all = (libc::ETH_P_ALL as u16).to_be() as i32;
            let socket = Socket::new(
                Domain::PACKET,
                Type::RAW,
                Some(Protocol::from(eth_p_all)),
            )
            .map_err(|e| ScanError::Environment(format!("opening AF_PACKET socket: {e}")))?;

            bind_to_interface(socket.as_raw_fd(), ifindex, eth_p_all)?;
            Ok(Self { socket, ifindex })
        }
    }

    impl Transmit for LinuxRawSocket {
        fn send(&self, frame: &[u8]) -> io::Result<()> {
            let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_ifindex = self.ifindex;
            addr.sll_halen = 6;

            let ret = unsafe {
                libc::sendto(
                    self.socket.as_raw_fd(),
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    0,
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_ll>() as u32,
                )
            };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
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
                "binding AF_PACKET socket to interface: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

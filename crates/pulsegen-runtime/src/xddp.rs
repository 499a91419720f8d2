//! XDDP datagram endpoint.
//!
//! XDDP is Xenomai's cross-domain datagram protocol: a bounded-buffer
//! message channel between the real-time domain and ordinary Linux
//! processes, addressed by a small logical port number. The constants below
//! come from Xenomai's `rtdm/ipc.h`; they are not part of the libc crate.

use crate::control::ControlEndpoint;
use pulsegen_common::{PulseError, PulseResult};
use std::os::fd::RawFd;
use tracing::{info, warn};

const AF_RTIPC: libc::c_int = 111;
const IPCPROTO_XDDP: libc::c_int = 1;
const SOL_XDDP: libc::c_int = 311;
const XDDP_POOLSZ: libc::c_int = 2;

/// `struct sockaddr_ipc` from `rtdm/ipc.h`.
#[repr(C)]
struct SockaddrIpc {
    sipc_family: libc::sa_family_t,
    sipc_port: i16,
}

/// Blocking XDDP endpoint bound to a logical port.
#[derive(Debug)]
pub struct XddpEndpoint {
    fd: RawFd,
    port: i16,
}

impl XddpEndpoint {
    /// Create and bind the endpoint.
    ///
    /// A create or bind failure is a fatal setup error. A failure to size
    /// the buffer pool is only logged: the default pool still works, just
    /// with less headroom for bursts.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Channel`] if the socket cannot be created or
    /// bound (e.g. the RTDM IPC driver is not loaded).
    pub fn bind(port: i16, pool_size: usize) -> PulseResult<Self> {
        // SAFETY: plain socket(2) with constant arguments.
        let fd = unsafe { libc::socket(AF_RTIPC, libc::SOCK_DGRAM, IPCPROTO_XDDP) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            return Err(PulseError::Channel(format!(
                "cannot create XDDP socket: {err}"
            )));
        }

        // SAFETY: fd is valid; pool_size outlives the call.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                SOL_XDDP,
                XDDP_POOLSZ,
                std::ptr::addr_of!(pool_size).cast(),
                std::mem::size_of::<usize>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            warn!(
                pool_size,
                error = %std::io::Error::last_os_error(),
                "cannot size XDDP buffer pool, using driver default"
            );
        }

        let addr = SockaddrIpc {
            sipc_family: AF_RTIPC as libc::sa_family_t,
            sipc_port: port,
        };
        // SAFETY: addr is a valid sockaddr_ipc; length matches.
        let rc = unsafe {
            libc::bind(
                fd,
                std::ptr::addr_of!(addr).cast(),
                std::mem::size_of::<SockaddrIpc>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // SAFETY: fd is valid and about to be abandoned.
            unsafe {
                libc::close(fd);
            }
            return Err(PulseError::Channel(format!(
                "cannot bind XDDP port {port}: {err}"
            )));
        }

        info!(port, pool_size, "XDDP control endpoint bound");
        Ok(Self { fd, port })
    }

    /// Logical port the endpoint is bound to.
    #[must_use]
    pub fn port(&self) -> i16 {
        self.port
    }
}

impl ControlEndpoint for XddpEndpoint {
    fn recv(&mut self, buf: &mut [u8]) -> PulseResult<usize> {
        // SAFETY: buf is valid for buf.len() bytes for the duration.
        let ret = unsafe {
            libc::recvfrom(
                self.fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return Err(PulseError::Channel(format!("recvfrom failed: {err}")));
        }
        if ret == 0 {
            // An empty datagram carries no divisor; report it as a
            // recoverable error rather than an endpoint close.
            return Err(PulseError::Channel("empty datagram".into()));
        }
        Ok(ret as usize)
    }
}

impl Drop for XddpEndpoint {
    fn drop(&mut self) {
        // SAFETY: fd came from a successful socket(2).
        unsafe {
            libc::close(self.fd);
        }
    }
}

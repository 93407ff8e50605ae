use crate::linux;
use libc;
use std::{
    ffi::CStr,
    io,
    mem::{self, MaybeUninit},
    os::unix::io::{AsRawFd, RawFd},
};

/// Represents an unbound `AF_PACKET` socket. At this phase of a socket's
/// lifecycle it can be configured: filters attached, blocking behaviour
/// set, interface properties queried.
pub struct Socket {
    fd: libc::c_int,
}

/// Represents an `AF_PACKET` socket bound to one interface. At this phase
/// of a socket's lifecycle it can be read from and written to.
pub struct BoundSocket {
    fd: libc::c_int,
    ifindex: libc::c_int,
    send_addr: libc::sockaddr_ll,
}

impl Socket {
    /// Creates a new unbound socket.
    pub fn new() -> io::Result<Self> {
        // This block uses FFI; we believe it safe because it touches no
        // Rust-owned memory and upholds the Socket invariant of returning
        // an Err when initialization fails.
        let fd = unsafe {
            let fd = libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                (libc::ETH_P_ALL as u16).to_be() as libc::c_int,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            fd
        };
        Ok(Self { fd })
    }

    /// Configures the socket's non-blocking status.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        // FFI believed safe: fcntl failures are handled and no Rust-owned
        // memory is borrowed.
        unsafe {
            let flags = libc::fcntl(self.fd, libc::F_GETFL);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            let new_flags = if nonblocking {
                flags | libc::O_NONBLOCK
            } else {
                flags & !libc::O_NONBLOCK
            };
            if libc::fcntl(self.fd, libc::F_SETFL, new_flags) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Attaches a classic BPF program; frames it rejects never reach
    /// `recv`. Attach before binding so early traffic is filtered too.
    pub fn attach_filter(&mut self, program: &[libc::sock_filter]) -> io::Result<()> {
        let prog = libc::sock_fprog {
            len: program.len() as libc::c_ushort,
            filter: program.as_ptr() as *mut libc::sock_filter,
        };
        // FFI believed safe: the program slice outlives the call, and the
        // kernel copies it during setsockopt.
        let err = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const _ as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if err < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Reads the hardware (MAC) address of a named interface.
    pub fn hardware_addr(&self, iface: impl AsRef<CStr>) -> io::Result<[u8; 6]> {
        let mut ifr = linux::ifreq_for(iface.as_ref());
        // FFI believed safe: the ifreq is exclusively ours and SIOCGIFHWADDR
        // only fills in the union.
        unsafe {
            if libc::ioctl(self.fd, libc::SIOCGIFHWADDR, &mut ifr) < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut mac = [0u8; 6];
            for (dst, src) in mac.iter_mut().zip(ifr.ifr_ifru.ifru_hwaddr.sa_data.iter()) {
                *dst = *src as u8;
            }
            Ok(mac)
        }
    }

    /// Binds the socket to a network interface, consuming the `Socket`
    /// since no more configuration may safely change.
    pub fn bind(self, iface: impl AsRef<CStr>) -> io::Result<BoundSocket> {
        let (ifindex, send_addr) = unsafe {
            let mut ifr = linux::ifreq_for(iface.as_ref());
            // ioctl(SIOCGIFINDEX) fills in the index field of the ifreq.
            if libc::ioctl(self.fd, libc::SIOCGIFINDEX, &mut ifr) < 0 {
                return Err(io::Error::last_os_error());
            }
            let ifindex = ifr.ifr_ifru.ifru_ivalue;

            let mut ll: libc::sockaddr_ll = MaybeUninit::zeroed().assume_init();
            ll.sll_family = libc::AF_PACKET as libc::c_ushort;
            ll.sll_ifindex = ifindex;
            if libc::bind(
                self.fd,
                &ll as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::c_uint,
            ) < 0
            {
                return Err(io::Error::last_os_error());
            }
            (ifindex, ll)
        };
        let fd = self.fd;
        // The fd now belongs to the BoundSocket; keep Drop from closing it.
        mem::forget(self);
        Ok(BoundSocket {
            fd,
            ifindex,
            send_addr,
        })
    }
}

impl BoundSocket {
    /// Joins or leaves the interface's promiscuous mode via packet-socket
    /// membership, so the setting cannot leak past the socket's lifetime.
    pub fn set_promiscuous(&mut self, enabled: bool) -> io::Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: self.ifindex,
            mr_type: libc::PACKET_MR_PROMISC as libc::c_ushort,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let option = if enabled {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };
        // FFI believed safe: the mreq is copied by the kernel.
        let err = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_PACKET,
                option,
                &mreq as *const _ as *const libc::c_void,
                mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        };
        if err < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Sends a frame to the NIC.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        // FFI believed safe: the frame is borrowed for the call only and its
        // length is passed alongside.
        unsafe {
            let bytes = libc::sendto(
                self.fd,
                frame.as_ptr() as *const _,
                frame.len(),
                0,
                &self.send_addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            );
            if bytes < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(bytes as usize)
            }
        }
    }

    /// Receives a frame from the NIC, returning its length.
    pub fn recv(&mut self, frame: &mut [u8]) -> io::Result<usize> {
        // See the safety note on `send`.
        unsafe {
            let bytes = libc::recvfrom(
                self.fd,
                frame.as_mut_ptr() as *mut _,
                frame.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            if bytes < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(bytes as usize)
            }
        }
    }
}

impl AsRawFd for BoundSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl Drop for BoundSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

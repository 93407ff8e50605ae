//! Interface address enumeration over `getifaddrs` and `SIOCGIFHWADDR`.

use polytalk_packets::MacAddr;
use std::ffi::{CStr, CString};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ptr;

/// Every address configured on the named interface. The multicast port
/// uses these to recognize its own datagrams coming back around.
pub fn interface_addrs(name: &str) -> io::Result<Vec<IpAddr>> {
    let mut addrs = Vec::new();
    // FFI believed safe: getifaddrs hands us a list we walk read-only and
    // free exactly once.
    unsafe {
        let mut list: *mut libc::ifaddrs = ptr::null_mut();
        if libc::getifaddrs(&mut list) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut cursor = list;
        while !cursor.is_null() {
            let entry = &*cursor;
            cursor = entry.ifa_next;

            if entry.ifa_name.is_null() || entry.ifa_addr.is_null() {
                continue;
            }
            if CStr::from_ptr(entry.ifa_name).to_bytes() != name.as_bytes() {
                continue;
            }
            match i32::from((*entry.ifa_addr).sa_family) {
                libc::AF_INET => {
                    let sin = &*(entry.ifa_addr as *const libc::sockaddr_in);
                    addrs.push(IpAddr::V4(Ipv4Addr::from(u32::from_be(
                        sin.sin_addr.s_addr,
                    ))));
                }
                libc::AF_INET6 => {
                    let sin6 = &*(entry.ifa_addr as *const libc::sockaddr_in6);
                    addrs.push(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)));
                }
                _ => {}
            }
        }
        libc::freeifaddrs(list);
    }
    Ok(addrs)
}

/// The interface's first IPv4 address; multicast group membership is
/// keyed on it.
pub fn interface_ipv4(name: &str) -> io::Result<Ipv4Addr> {
    interface_addrs(name)?
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("interface {} has no IPv4 address", name),
            )
        })
}

#[repr(C)]
struct ifreq_hwaddr {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_hwaddr: libc::sockaddr,
}

/// The interface's hardware address, via an AF_INET ioctl so no raw-socket
/// capability is needed.
pub fn hardware_addr(name: &str) -> io::Result<MacAddr> {
    let c_name =
        CString::new(name).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    // FFI believed safe: the throwaway socket is closed on every path and
    // the ioctl writes only into our ifreq.
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut ifr: ifreq_hwaddr = std::mem::zeroed();
        let bytes = c_name.to_bytes();
        let len = bytes.len().min(libc::IFNAMSIZ - 1);
        for (dst, src) in ifr.ifr_name.iter_mut().zip(bytes[..len].iter()) {
            *dst = *src as libc::c_char;
        }

        let err = libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr);
        libc::close(fd);
        if err < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(ifr.ifr_hwaddr.sa_data.iter()) {
            *dst = *src as u8;
        }
        Ok(MacAddr::new(mac))
    }
}

#![allow(non_camel_case_types)]

use libc;

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) union ifru {
    pub(crate) ifru_hwaddr: libc::sockaddr,
    pub(crate) ifru_flags: libc::c_short,
    pub(crate) ifru_ivalue: libc::c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) union ifrn {
    pub(crate) ifrn_name: [libc::c_char; libc::IFNAMSIZ],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct ifreq {
    pub(crate) ifr_ifrn: ifrn,
    pub(crate) ifr_ifru: ifru,
}

/// Copies an interface name into the request, truncating at IFNAMSIZ - 1 so
/// the kernel always sees a terminated name.
pub(crate) fn ifreq_for(iface: &std::ffi::CStr) -> ifreq {
    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    let name = iface.to_bytes();
    let len = name.len().min(libc::IFNAMSIZ - 1);
    unsafe {
        for (dst, src) in ifr.ifr_ifrn.ifrn_name.iter_mut().zip(name[..len].iter()) {
            *dst = *src as libc::c_char;
        }
    }
    ifr
}

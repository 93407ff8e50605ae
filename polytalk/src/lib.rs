//! polytalk bridges AppleTalk traffic across heterogeneous links so that
//! vintage machines on EtherTalk, LocalTalk serial, and LToU multicast all
//! see one logical AppleTalk internet.
//!
//! The pieces assemble like so: each configured wire becomes a port
//! adapter ([`ports`]); LLAP-native ports are wrapped by the runtime's
//! translator; every port attaches to one fan-out hub; the
//! [`supervisor`] owns the lot and runs until interrupted.

/// Command-line configuration and its validation rules.
pub mod config;

/// Interface address enumeration (getifaddrs, SIOCGIFHWADDR).
pub mod ifaddr;

/// One adapter per wire type: raw Ethernet, UDP multicast, TCP tunnels,
/// TashTalk serial.
pub mod ports;

/// The process-wide shutdown signal.
pub mod shutdown;

/// Construction and lifetime of the bridge itself.
pub mod supervisor;

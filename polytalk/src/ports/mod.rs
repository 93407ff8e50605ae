//! Port adapters: each realizes one kind of wire as a pair of packet
//! streams. Opening the wire happens in a fallible constructor so startup
//! can abort cleanly; `start` then launches the capture and transmit tasks.

pub mod ether;
pub mod multicast;
pub mod serial;
pub mod tcp;

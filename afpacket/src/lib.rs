//! This crate exposes Linux's AF_PACKET sockets in a safe way, with just
//! enough socket surface for an AppleTalk bridge: bind to an interface,
//! attach a classic BPF filter, look up hardware addresses, and move whole
//! link-layer frames.
#![deny(missing_docs)]
#![cfg(target_os = "linux")]

mod filter;
mod linux;
mod sockets;

#[cfg(feature = "tokio-support")]
mod tokio_sockets;

pub use filter::appletalk_filter;
pub use sockets::{BoundSocket, Socket};

#[cfg(feature = "tokio-support")]
pub use tokio_sockets::AsyncBoundSocket;

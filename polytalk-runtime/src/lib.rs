//! Flow machinery for the polytalk AppleTalk bridge.
//!
//! Ports deliver packets as streams; the hub drains every attached port and
//! broadcasts each packet to the other ports; the translator wraps
//! LLAP-native ports so the hub only ever sees EtherTalk frames. Producers
//! and consumers meet over small bounded channels, so a slow wire exerts
//! backpressure all the way back to the fast one.

/// Packet streams, awaitable bounded channels, and the task-park waking
/// cache the channels are built on.
pub mod link;

/// The fan-out hub: the ordered set of live ports and the broadcast loop.
pub mod hub;

/// LLAP to EtherTalk translation, including the AARP proxy.
pub mod translate;

/// Test helpers: immediate streams, exhaustive collectors, runtime setup.
pub mod utils;

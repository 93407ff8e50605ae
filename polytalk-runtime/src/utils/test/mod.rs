//! Helpers for exercising ports, links, and the hub in tests. Tests are
//! phrased Given/When/Then: the generators build the initial packet
//! streams, the behavior under test runs on a private runtime, and the
//! collectors expose what came out the far end.

pub mod packet_collectors;
pub mod packet_generators;

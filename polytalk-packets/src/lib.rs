//! Frame codecs for the polytalk AppleTalk bridge.
//!
//! Every packet type in this crate is an owned struct with a `decode` that
//! validates a byte sequence and an `encode` that produces one. All numeric
//! fields are big-endian on the wire.

mod types;
pub use self::types::*;

mod ethertalk;
pub use self::ethertalk::*;

mod ddp;
pub use self::ddp::*;

mod aarp;
pub use self::aarp::*;

mod llap;
pub use self::llap::*;

mod ltou;
pub use self::ltou::*;

pub mod fcs;

mod tash;
pub use self::tash::*;

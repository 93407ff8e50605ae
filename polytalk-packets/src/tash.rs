//! Framing for the TashTalk serial protocol.
//!
//! TashTalk forwards LocalTalk frames over a serial line. Inbound bytes use
//! a two-byte escape scheme (`00 xx`); outbound frames are prefixed with a
//! command byte and suffixed with the LocalTalk FCS. See the TashTalk
//! protocol documentation for the full command set.

use crate::{fcs, LlapPacket, Node, DDP_LENGTH_MASK, LLAP_ACK, LLAP_DDP, LLAP_ENQ, LLAP_EXT_DDP};
use std::convert::TryInto;
use thiserror::Error;

const ESCAPE: u8 = 0x00;
const ESCAPE_LITERAL_ZERO: u8 = 0xff;
const ESCAPE_FRAME_DONE: u8 = 0xfd;

const COMMAND_FRAME: u8 = 0x01;
const COMMAND_NODE_IDS: u8 = 0x02;

/// Number of no-op bytes that drive TashTalk's command parser back to a
/// known-idle state from anywhere.
const RESET_PREAMBLE_LEN: usize = 1024;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TashError {
    #[error("invalid DDP packet length: {0}")]
    InvalidDdpLength(usize),
    #[error("DDP packet length mismatch: {0} vs. {1}")]
    DdpLengthMismatch(usize, u16),
    #[error("control frame packet with payload")]
    ControlWithPayload,
    #[error("invalid packet type: ${0:02x}")]
    InvalidKind(u8),
}

/// Push-fed decoder for the TashTalk receive stream.
///
/// Feed it captured bytes one at a time; a completed, FCS-valid frame comes
/// back as a decoded LLAP packet. Malformed frames (bad FCS, framing error,
/// abort, undecodable LLAP) are dropped silently and the accumulator stays
/// ready for the next frame.
#[derive(Default)]
pub struct Accumulator {
    buf: Vec<u8>,
    escape: bool,
}

impl Accumulator {
    pub fn new() -> Accumulator {
        Accumulator::default()
    }

    pub fn feed(&mut self, byte: u8) -> Option<LlapPacket> {
        if !self.escape {
            if byte == ESCAPE {
                self.escape = true;
            } else {
                self.buf.push(byte);
            }
            return None;
        }

        self.escape = false;
        if byte != ESCAPE_FRAME_DONE {
            if byte == ESCAPE_LITERAL_ZERO {
                self.buf.push(0x00);
            } else {
                // Framing error or abort: whatever accumulated is garbage.
                self.buf.clear();
            }
            return None;
        }

        let frame = std::mem::take(&mut self.buf);
        if fcs::sum(&frame) != fcs::VALID || frame.len() < 2 {
            return None;
        }
        LlapPacket::decode(&frame[..frame.len() - 2]).ok()
    }

    /// Feeds a whole capture buffer, returning every completed frame in it.
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Vec<LlapPacket> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }
}

/// Encoder for the TashTalk transmit stream.
///
/// The encoder tracks whether the device is known to be listening for
/// commands. From a fresh start, or after the caller reports a write
/// failure, the next encoded buffer begins with a no-op preamble long
/// enough to drive the device's parser back to idle.
pub struct Encoder {
    ready: bool,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder { ready: false }
    }

    /// The caller must invoke this after a failed write so the next frame
    /// re-synchronizes the device.
    pub fn write_failed(&mut self) {
        self.ready = false;
    }

    /// Encodes one LLAP frame as a TashTalk transmit command.
    ///
    /// Short-DDP payloads must be internally consistent (the embedded
    /// 10-bit length equals the payload length), control frames must be
    /// empty, and unknown kinds are refused; TashTalk would jam the wire
    /// with anything else.
    pub fn frame(&mut self, pak: &LlapPacket) -> Result<Vec<u8>, TashError> {
        match pak.kind {
            LLAP_DDP => {
                if pak.payload.len() < 2 {
                    return Err(TashError::InvalidDdpLength(pak.payload.len()));
                }
                let declared =
                    u16::from_be_bytes(pak.payload[0..2].try_into().unwrap()) & DDP_LENGTH_MASK;
                if declared as usize != pak.payload.len() {
                    return Err(TashError::DdpLengthMismatch(pak.payload.len(), declared));
                }
            }
            LLAP_EXT_DDP => {}
            LLAP_ENQ | LLAP_ACK => {
                if !pak.payload.is_empty() {
                    return Err(TashError::ControlWithPayload);
                }
            }
            kind => return Err(TashError::InvalidKind(kind)),
        }

        let marshaled = pak.encode();
        let sum = fcs::sum(&marshaled);

        let mut out = self.preamble();
        out.push(COMMAND_FRAME);
        out.extend_from_slice(&marshaled);
        out.push(sum as u8);
        out.push((sum >> 8) as u8);
        Ok(out)
    }

    /// Encodes the command that sets the node IDs TashTalk answers ENQ and
    /// RTS frames for.
    pub fn node_ids(&mut self, ids: &NodeSet) -> Vec<u8> {
        let mut out = self.preamble();
        out.push(COMMAND_NODE_IDS);
        out.extend_from_slice(&ids.0);
        out
    }

    fn preamble(&mut self) -> Vec<u8> {
        if self.ready {
            Vec::new()
        } else {
            self.ready = true;
            vec![0u8; RESET_PREAMBLE_LEN]
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

/// A mask of the 256 node IDs on a LocalTalk network: bit `n` of byte
/// `n / 8`, least-significant bit first. IDs 0 and 255 are reserved and
/// should stay clear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeSet(pub [u8; 32]);

impl NodeSet {
    pub fn new() -> NodeSet {
        NodeSet([0; 32])
    }

    pub fn add(&mut self, node: Node) {
        self.0[(node >> 3) as usize] |= 1 << (node & 0x7);
    }

    pub fn remove(&mut self, node: Node) {
        self.0[(node >> 3) as usize] &= !(1 << (node & 0x7));
    }

    pub fn contains(&self, node: Node) -> bool {
        self.0[(node >> 3) as usize] & (1 << (node & 0x7)) != 0
    }
}

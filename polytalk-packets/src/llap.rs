use crate::{DdpPacket, ExtDdpPacket, Node};
use thiserror::Error;

/// Payload is a short-form DDP packet.
pub const LLAP_DDP: u8 = 0x01;
/// Payload is an extended DDP packet.
pub const LLAP_EXT_DDP: u8 = 0x02;
/// Node-ID probe ("is anyone using this ID?"). No payload.
pub const LLAP_ENQ: u8 = 0x81;
/// Node-ID defense ("yes, that ID is taken"). No payload.
pub const LLAP_ACK: u8 = 0x82;

const HEADER_SIZE: usize = 3;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlapError {
    #[error("read llap header: EOF")]
    Header,
}

/// A LocalTalk link frame, minus the transmission FCS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlapPacket {
    pub dst_node: Node,
    pub src_node: Node,
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl LlapPacket {
    pub fn enq(dst_node: Node, src_node: Node) -> LlapPacket {
        LlapPacket {
            dst_node,
            src_node,
            kind: LLAP_ENQ,
            payload: vec![],
        }
    }

    pub fn ack(dst_node: Node, src_node: Node) -> LlapPacket {
        LlapPacket {
            dst_node,
            src_node,
            kind: LLAP_ACK,
            payload: vec![],
        }
    }

    /// Frames a short DDP packet for the LocalTalk wire.
    pub fn appletalk(dst_node: Node, src_node: Node, payload: &DdpPacket) -> LlapPacket {
        LlapPacket {
            dst_node,
            src_node,
            kind: LLAP_DDP,
            payload: payload.encode(),
        }
    }

    /// Frames an extended DDP packet that must keep its network numbers.
    pub fn ext_appletalk(dst_node: Node, src_node: Node, payload: &ExtDdpPacket) -> LlapPacket {
        LlapPacket {
            dst_node,
            src_node,
            kind: LLAP_EXT_DDP,
            payload: payload.encode(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<LlapPacket, LlapError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LlapError::Header);
        }
        Ok(LlapPacket {
            dst_node: bytes[0],
            src_node: bytes[1],
            kind: bytes[2],
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.push(self.dst_node);
        out.push(self.src_node);
        out.push(self.kind);
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let pak = LlapPacket {
            dst_node: 0xff,
            src_node: 0x5f,
            kind: LLAP_DDP,
            payload: vec![0, 9, 2, 0xfd, 2, 1, 2, 3, 4],
        };
        assert_eq!(LlapPacket::decode(&pak.encode()).unwrap(), pak);
    }

    #[test]
    fn control_frames_have_no_payload() {
        assert!(LlapPacket::enq(2, 0).payload.is_empty());
        assert!(LlapPacket::ack(2, 7).payload.is_empty());
        let decoded = LlapPacket::decode(&LlapPacket::enq(2, 0).encode()).unwrap();
        assert_eq!(decoded.kind, LLAP_ENQ);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(LlapPacket::decode(&[1, 2]).unwrap_err(), LlapError::Header);
    }

    #[test]
    fn appletalk_embeds_short_ddp() {
        let ddp = DdpPacket {
            size: 7,
            dst_socket: 4,
            src_socket: 5,
            proto: 2,
            data: vec![0xab, 0xcd],
        };
        let pak = LlapPacket::appletalk(1, 2, &ddp);
        assert_eq!(pak.kind, LLAP_DDP);
        assert_eq!(DdpPacket::decode(&pak.payload).unwrap(), ddp);
    }
}

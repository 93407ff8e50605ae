use crate::{AtalkAddr, MacAddr};
use std::convert::TryInto;
use thiserror::Error;

/// AARP fixed header. Every packet the bridge handles must carry the
/// Ethernet/LLAP bridging template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AarpHeader {
    pub hardware: u16,
    pub proto: u16,
    pub hardware_size: u8,
    pub proto_size: u8,
}

/// Hardware type 1 (Ethernet), protocol 0x809B (AppleTalk), 6-byte MAC,
/// 4-byte protocol address.
pub const ETHERNET_LLAP_BRIDGING: AarpHeader = AarpHeader {
    hardware: 0x0001,
    proto: 0x809b,
    hardware_size: 6,
    proto_size: 4,
};

pub const AARP_REQUEST: u16 = 0x01;
pub const AARP_RESPONSE: u16 = 0x02;
pub const AARP_PROBE: u16 = 0x03;

const HEADER_SIZE: usize = 6;
// MAC, one pad byte, network, node.
const PAIR_SIZE: usize = 6 + 1 + 2 + 1;
// Opcode plus the two address pairs.
const BODY_SIZE: usize = 2 + 2 * PAIR_SIZE;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AarpError {
    #[error("read aarp header: EOF")]
    Header,
    #[error("read aarp header: not eth-llap bridging")]
    NotBridging,
    #[error("read aarp body: EOF")]
    Body,
    #[error("read aarp: excess data")]
    ExcessData,
}

/// One endpoint of an AARP exchange: a hardware address and the AppleTalk
/// address it maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddrPair {
    pub hardware: MacAddr,
    pub proto: AtalkAddr,
}

impl AddrPair {
    pub fn new(hardware: MacAddr, proto: AtalkAddr) -> Self {
        AddrPair { hardware, proto }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AarpPacket {
    pub header: AarpHeader,
    pub opcode: u16,
    pub src: AddrPair,
    pub dst: AddrPair,
}

impl AarpPacket {
    /// Request that `query` be resolved to a hardware address.
    pub fn request(src: AddrPair, query: AtalkAddr) -> AarpPacket {
        AarpPacket {
            header: ETHERNET_LLAP_BRIDGING,
            opcode: AARP_REQUEST,
            src,
            dst: AddrPair {
                hardware: MacAddr::zero(),
                proto: query,
            },
        }
    }

    /// Answer a request or probe from `dst`: `src` names the mapping.
    pub fn response(src: AddrPair, dst: AddrPair) -> AarpPacket {
        AarpPacket {
            header: ETHERNET_LLAP_BRIDGING,
            opcode: AARP_RESPONSE,
            src,
            dst,
        }
    }

    /// Ask whether `query` is already in use. The tentative address rides in
    /// both the source and (zero-hardware) destination pairs.
    pub fn probe(src: MacAddr, query: AtalkAddr) -> AarpPacket {
        AarpPacket {
            header: ETHERNET_LLAP_BRIDGING,
            opcode: AARP_PROBE,
            src: AddrPair {
                hardware: src,
                proto: query,
            },
            dst: AddrPair {
                hardware: MacAddr::zero(),
                proto: query,
            },
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<AarpPacket, AarpError> {
        if bytes.len() < HEADER_SIZE {
            return Err(AarpError::Header);
        }
        let header = AarpHeader {
            hardware: u16::from_be_bytes(bytes[0..2].try_into().unwrap()),
            proto: u16::from_be_bytes(bytes[2..4].try_into().unwrap()),
            hardware_size: bytes[4],
            proto_size: bytes[5],
        };
        if header != ETHERNET_LLAP_BRIDGING {
            return Err(AarpError::NotBridging);
        }

        let body = &bytes[HEADER_SIZE..];
        if body.len() < BODY_SIZE {
            return Err(AarpError::Body);
        } else if body.len() > BODY_SIZE {
            return Err(AarpError::ExcessData);
        }

        Ok(AarpPacket {
            header,
            opcode: u16::from_be_bytes(body[0..2].try_into().unwrap()),
            src: decode_pair(&body[2..2 + PAIR_SIZE]),
            dst: decode_pair(&body[2 + PAIR_SIZE..]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + BODY_SIZE);
        out.extend_from_slice(&self.header.hardware.to_be_bytes());
        out.extend_from_slice(&self.header.proto.to_be_bytes());
        out.push(self.header.hardware_size);
        out.push(self.header.proto_size);
        out.extend_from_slice(&self.opcode.to_be_bytes());
        encode_pair(&mut out, &self.src);
        encode_pair(&mut out, &self.dst);
        out
    }
}

fn decode_pair(bytes: &[u8]) -> AddrPair {
    AddrPair {
        hardware: MacAddr::new(bytes[0..6].try_into().unwrap()),
        // bytes[6] is padding
        proto: AtalkAddr {
            network: u16::from_be_bytes(bytes[7..9].try_into().unwrap()),
            node: bytes[9],
        },
    }
}

fn encode_pair(out: &mut Vec<u8>, pair: &AddrPair) {
    out.extend_from_slice(&pair.hardware.bytes);
    out.push(0);
    out.extend_from_slice(&pair.proto.network.to_be_bytes());
    out.push(pair.proto.node);
}

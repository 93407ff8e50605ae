use crate::{Network, Node};
use std::convert::TryInto;
use thiserror::Error;

/// Low 10 bits of the DDP size field; the upper bits carry hop counts on
/// real networks and are preserved verbatim.
pub const DDP_LENGTH_MASK: u16 = 0x03ff;

const SHORT_HEADER_SIZE: usize = 5;
const EXT_HEADER_SIZE: usize = 13;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DdpError {
    #[error("read ddp header: EOF")]
    Header,
    #[error("read ddp: bad length {0}")]
    BadLength(u16),
    #[error("read ddp: incomplete data ({0} < {1})")]
    IncompleteData(usize, usize),
    #[error("read ddp: excess data")]
    ExcessData,
}

/// Short-form DDP, used within a single network (LocalTalk). The size field
/// includes the 5 header bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DdpPacket {
    pub size: u16,
    pub dst_socket: u8,
    pub src_socket: u8,
    pub proto: u8,
    pub data: Vec<u8>,
}

/// Extended DDP, used across networks (EtherTalk). The size field includes
/// the 13 header bytes; checksum 0 means "no checksum".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtDdpPacket {
    pub size: u16,
    pub cksum: u16,
    pub dst_net: Network,
    pub src_net: Network,
    pub dst_node: Node,
    pub src_node: Node,
    pub dst_socket: u8,
    pub src_socket: u8,
    pub proto: u8,
    pub data: Vec<u8>,
}

impl DdpPacket {
    pub fn decode(bytes: &[u8]) -> Result<DdpPacket, DdpError> {
        if bytes.len() < SHORT_HEADER_SIZE {
            return Err(DdpError::Header);
        }
        let size = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let data_len = ((size & DDP_LENGTH_MASK) as usize)
            .checked_sub(SHORT_HEADER_SIZE)
            .ok_or(DdpError::BadLength(size))?;

        let rest = &bytes[SHORT_HEADER_SIZE..];
        if rest.len() < data_len {
            return Err(DdpError::IncompleteData(rest.len(), data_len));
        } else if rest.len() > data_len {
            return Err(DdpError::ExcessData);
        }

        Ok(DdpPacket {
            size,
            dst_socket: bytes[2],
            src_socket: bytes[3],
            proto: bytes[4],
            data: rest.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SHORT_HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.size.to_be_bytes());
        out.push(self.dst_socket);
        out.push(self.src_socket);
        out.push(self.proto);
        out.extend_from_slice(&self.data);
        out
    }

    /// Promotes to the extended form for transit across a link boundary.
    /// Both networks are stamped with `network` and the checksum is left
    /// empty; node numbers come from the enclosing LLAP header.
    pub fn to_ext(&self, network: Network, dst_node: Node, src_node: Node) -> ExtDdpPacket {
        ExtDdpPacket {
            size: self.size + (EXT_HEADER_SIZE - SHORT_HEADER_SIZE) as u16,
            cksum: 0,
            dst_net: network,
            src_net: network,
            dst_node,
            src_node,
            dst_socket: self.dst_socket,
            src_socket: self.src_socket,
            proto: self.proto,
            data: self.data.clone(),
        }
    }
}

impl ExtDdpPacket {
    pub fn decode(bytes: &[u8]) -> Result<ExtDdpPacket, DdpError> {
        if bytes.len() < EXT_HEADER_SIZE {
            return Err(DdpError::Header);
        }
        let size = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let data_len = ((size & DDP_LENGTH_MASK) as usize)
            .checked_sub(EXT_HEADER_SIZE)
            .ok_or(DdpError::BadLength(size))?;

        let rest = &bytes[EXT_HEADER_SIZE..];
        if rest.len() < data_len {
            return Err(DdpError::IncompleteData(rest.len(), data_len));
        } else if rest.len() > data_len {
            return Err(DdpError::ExcessData);
        }

        Ok(ExtDdpPacket {
            size,
            cksum: u16::from_be_bytes(bytes[2..4].try_into().unwrap()),
            dst_net: u16::from_be_bytes(bytes[4..6].try_into().unwrap()),
            src_net: u16::from_be_bytes(bytes[6..8].try_into().unwrap()),
            dst_node: bytes[8],
            src_node: bytes[9],
            dst_socket: bytes[10],
            src_socket: bytes[11],
            proto: bytes[12],
            data: rest.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EXT_HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.cksum.to_be_bytes());
        out.extend_from_slice(&self.dst_net.to_be_bytes());
        out.extend_from_slice(&self.src_net.to_be_bytes());
        out.push(self.dst_node);
        out.push(self.src_node);
        out.push(self.dst_socket);
        out.push(self.src_socket);
        out.push(self.proto);
        out.extend_from_slice(&self.data);
        out
    }

    /// Demotes to the short form. The node and network fields are carried by
    /// the enclosing LLAP header instead; the checksum is dropped.
    pub fn to_short(&self) -> DdpPacket {
        DdpPacket {
            size: self.size - (EXT_HEADER_SIZE - SHORT_HEADER_SIZE) as u16,
            dst_socket: self.dst_socket,
            src_socket: self.src_socket,
            proto: self.proto,
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_packet() -> DdpPacket {
        DdpPacket {
            size: 5 + 4,
            dst_socket: 0x02,
            src_socket: 0xfd,
            proto: 2,
            data: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn short_round_trip() {
        let pak = short_packet();
        assert_eq!(DdpPacket::decode(&pak.encode()).unwrap(), pak);
    }

    #[test]
    fn ext_round_trip() {
        let pak = short_packet().to_ext(0xff00, 0x0f, 0x5f);
        assert_eq!(ExtDdpPacket::decode(&pak.encode()).unwrap(), pak);
    }

    #[test]
    fn empty_input_reports_header_eof() {
        let err = ExtDdpPacket::decode(&[]).unwrap_err();
        assert_eq!(err.to_string(), "read ddp header: EOF");
        let err = DdpPacket::decode(&[]).unwrap_err();
        assert_eq!(err.to_string(), "read ddp header: EOF");
    }

    #[test]
    fn excess_data_is_rejected() {
        let mut bytes = short_packet().encode();
        bytes.push(0xee);
        assert_eq!(DdpPacket::decode(&bytes).unwrap_err(), DdpError::ExcessData);
    }

    #[test]
    fn truncated_data_is_rejected() {
        let mut bytes = short_packet().encode();
        bytes.pop();
        assert_eq!(
            DdpPacket::decode(&bytes).unwrap_err(),
            DdpError::IncompleteData(3, 4)
        );
    }

    #[test]
    fn size_field_smaller_than_header_is_rejected() {
        let bytes = [0x00, 0x02, 0x01, 0x02, 0x03];
        assert_eq!(
            DdpPacket::decode(&bytes).unwrap_err(),
            DdpError::BadLength(2)
        );
    }

    #[test]
    fn promote_demote_round_trip() {
        // For a packet whose networks both match the port network, demotion
        // followed by promotion reproduces the original.
        let ext = short_packet().to_ext(0xff00, 7, 9);
        let back = ext.to_short().to_ext(ext.src_net, ext.dst_node, ext.src_node);
        assert_eq!(back, ext);
    }

    #[test]
    fn promotion_adds_eight_to_size() {
        let short = short_packet();
        let ext = short.to_ext(0, 1, 2);
        assert_eq!(ext.size, short.size + 8);
        assert_eq!(ext.to_short().size, short.size);
    }

    #[test]
    fn length_mask_keeps_upper_bits() {
        // Hop-count bits above the 10-bit length survive a round trip.
        let mut pak = short_packet();
        pak.size |= 0x2000;
        let bytes = pak.encode();
        assert_eq!(DdpPacket::decode(&bytes).unwrap(), pak);
    }
}

use crate::{AarpPacket, ExtDdpPacket, MacAddr};
use std::convert::TryInto;
use thiserror::Error;

/// 802.2 LLC header. The only value polytalk accepts is [`SNAP`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkHeader {
    pub dsap: u8,
    pub ssap: u8,
    pub control: u8,
}

/// 5-byte SNAP protocol discriminator: OUI plus ethertype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapProto {
    pub oui: [u8; 3],
    pub ethertype: u16,
}

pub const SNAP: LinkHeader = LinkHeader {
    dsap: 0xaa,
    ssap: 0xaa,
    control: 0x03,
};

/// AppleTalk over Ethernet (extended DDP payload).
pub const APPLETALK_PROTO: SnapProto = SnapProto {
    oui: [0x08, 0x00, 0x07],
    ethertype: 0x809b,
};

/// AppleTalk Address Resolution Protocol.
pub const AARP_PROTO: SnapProto = SnapProto {
    oui: [0x00, 0x00, 0x00],
    ethertype: 0x80f3,
};

/// Destination for every frame the bridge fabricates.
pub const APPLETALK_BROADCAST: MacAddr = MacAddr {
    bytes: [0x09, 0x00, 0x07, 0xff, 0xff, 0xff],
};

const ETH_HEADER_SIZE: usize = 14;
const LINK_HEADER_SIZE: usize = 3;
const SNAP_PROTO_SIZE: usize = 5;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EthertalkError {
    #[error("read eth header: EOF")]
    EthHeader,
    #[error("read link header: EOF")]
    LinkHeader,
    #[error("read link header: not SNAP")]
    NotSnap,
    #[error("read snap proto: EOF")]
    SnapProto,
    #[error("read data: bad size field {0}")]
    BadSize(u16),
    #[error("read data: incomplete data ({0} < {1})")]
    IncompleteData(usize, usize),
}

/// An EtherTalk frame: Ethernet header, LLC + SNAP, payload, optional pad.
///
/// The 802.3 `size` field counts the LLC header, the SNAP protocol, and the
/// payload. Trailing bytes past the declared size are kept as `pad` but are
/// ignored by equality, matching how minimum-length Ethernet padding is
/// treated on capture.
#[derive(Clone, Debug)]
pub struct EthertalkPacket {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub size: u16,
    pub link: LinkHeader,
    pub snap: SnapProto,
    pub data: Vec<u8>,
    pub pad: Vec<u8>,
}

impl PartialEq for EthertalkPacket {
    fn eq(&self, other: &Self) -> bool {
        self.dst == other.dst
            && self.src == other.src
            && self.size == other.size
            && self.link == other.link
            && self.snap == other.snap
            && self.data == other.data
    }
}

impl Eq for EthertalkPacket {}

impl EthertalkPacket {
    /// Wraps an extended DDP packet in an EtherTalk frame addressed to the
    /// AppleTalk broadcast MAC.
    pub fn appletalk(src: MacAddr, inner: &ExtDdpPacket) -> EthertalkPacket {
        Self::wrap(src, APPLETALK_PROTO, inner.encode())
    }

    /// Wraps an AARP packet in an EtherTalk frame addressed to the AppleTalk
    /// broadcast MAC.
    pub fn aarp(src: MacAddr, inner: &AarpPacket) -> EthertalkPacket {
        Self::wrap(src, AARP_PROTO, inner.encode())
    }

    fn wrap(src: MacAddr, snap: SnapProto, data: Vec<u8>) -> EthertalkPacket {
        EthertalkPacket {
            dst: APPLETALK_BROADCAST,
            src,
            size: (LINK_HEADER_SIZE + SNAP_PROTO_SIZE + data.len()) as u16,
            link: SNAP,
            snap,
            data,
            pad: vec![],
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<EthertalkPacket, EthertalkError> {
        if bytes.len() < ETH_HEADER_SIZE {
            return Err(EthertalkError::EthHeader);
        }
        let dst = MacAddr::new(bytes[0..6].try_into().unwrap());
        let src = MacAddr::new(bytes[6..12].try_into().unwrap());
        let size = u16::from_be_bytes(bytes[12..14].try_into().unwrap());

        let rest = &bytes[ETH_HEADER_SIZE..];
        if rest.len() < LINK_HEADER_SIZE {
            return Err(EthertalkError::LinkHeader);
        }
        let link = LinkHeader {
            dsap: rest[0],
            ssap: rest[1],
            control: rest[2],
        };
        if link != SNAP {
            return Err(EthertalkError::NotSnap);
        }

        let rest = &rest[LINK_HEADER_SIZE..];
        if rest.len() < SNAP_PROTO_SIZE {
            return Err(EthertalkError::SnapProto);
        }
        let snap = SnapProto {
            oui: rest[0..3].try_into().unwrap(),
            ethertype: u16::from_be_bytes(rest[3..5].try_into().unwrap()),
        };

        let rest = &rest[SNAP_PROTO_SIZE..];
        let data_len = (size as usize)
            .checked_sub(LINK_HEADER_SIZE + SNAP_PROTO_SIZE)
            .ok_or(EthertalkError::BadSize(size))?;
        if rest.len() < data_len {
            return Err(EthertalkError::IncompleteData(rest.len(), data_len));
        }

        Ok(EthertalkPacket {
            dst,
            src,
            size,
            link,
            snap,
            data: rest[..data_len].to_vec(),
            pad: rest[data_len..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            ETH_HEADER_SIZE + LINK_HEADER_SIZE + SNAP_PROTO_SIZE + self.data.len() + self.pad.len(),
        );
        out.extend_from_slice(&self.dst.bytes);
        out.extend_from_slice(&self.src.bytes);
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&[self.link.dsap, self.link.ssap, self.link.control]);
        out.extend_from_slice(&self.snap.oui);
        out.extend_from_slice(&self.snap.ethertype.to_be_bytes());
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.pad);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DdpPacket;

    fn sample_frame() -> EthertalkPacket {
        let ddp = DdpPacket {
            size: 8,
            dst_socket: 2,
            src_socket: 3,
            proto: 2,
            data: vec![0xaa, 0xbb, 0xcc],
        };
        let ext = ddp.to_ext(0xff00, 1, 2);
        EthertalkPacket::appletalk(MacAddr::new([1, 2, 3, 4, 5, 6]), &ext)
    }

    #[test]
    fn round_trip() {
        let frame = sample_frame();
        let decoded = EthertalkPacket::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trip_ignores_pad() {
        let mut frame = sample_frame();
        let mut bytes = frame.encode();
        bytes.extend_from_slice(&[0u8; 18]);
        let decoded = EthertalkPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.pad.len(), 18);
        assert_eq!(decoded, frame);
        frame.pad = vec![1, 2, 3];
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_non_snap_llc() {
        let mut bytes = sample_frame().encode();
        bytes[14] = 0x42;
        let err = EthertalkPacket::decode(&bytes).unwrap_err();
        assert_eq!(err, EthertalkError::NotSnap);
        assert_eq!(err.to_string(), "read link header: not SNAP");
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(
            EthertalkPacket::decode(&[]).unwrap_err(),
            EthertalkError::EthHeader
        );
        assert_eq!(
            EthertalkPacket::decode(&[0u8; 13]).unwrap_err(),
            EthertalkError::EthHeader
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bytes = sample_frame().encode();
        bytes.truncate(bytes.len() - 1);
        match EthertalkPacket::decode(&bytes).unwrap_err() {
            EthertalkError::IncompleteData(have, want) => {
                assert_eq!(want, have + 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn size_field_counts_llc_snap_and_payload() {
        let frame = sample_frame();
        assert_eq!(frame.size as usize, 8 + frame.data.len());
        assert_eq!(frame.dst, APPLETALK_BROADCAST);
    }
}

use crate::{LlapError, LlapPacket};
use std::convert::TryInto;
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Multicast group every LToU speaker joins.
pub const LTOU_GROUP: Ipv4Addr = Ipv4Addr::new(239, 192, 76, 84);
pub const LTOU_PORT: u16 = 1954;

/// The full group socket address, 239.192.76.84:1954.
pub fn ltou_group_addr() -> SocketAddrV4 {
    SocketAddrV4::new(LTOU_GROUP, LTOU_PORT)
}

const PID_SIZE: usize = 4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LtouError {
    #[error("read ltou header: EOF")]
    Header,
    #[error("read ltou body: {0}")]
    Llap(#[from] LlapError),
}

/// LocalTalk-over-UDP datagram: the sending process id, then an LLAP frame
/// verbatim. The pid lets a sender recognize its own multicast echoes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LtouPacket {
    pub pid: u32,
    pub llap: LlapPacket,
}

impl LtouPacket {
    pub fn new(pid: u32, llap: LlapPacket) -> LtouPacket {
        LtouPacket { pid, llap }
    }

    pub fn decode(bytes: &[u8]) -> Result<LtouPacket, LtouError> {
        if bytes.len() < PID_SIZE {
            return Err(LtouError::Header);
        }
        let pid = u32::from_be_bytes(bytes[0..PID_SIZE].try_into().unwrap());
        let llap = LlapPacket::decode(&bytes[PID_SIZE..])?;
        Ok(LtouPacket { pid, llap })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PID_SIZE + 3 + self.llap.payload.len());
        out.extend_from_slice(&self.pid.to_be_bytes());
        out.extend_from_slice(&self.llap.encode());
        out
    }
}

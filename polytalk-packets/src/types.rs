use std::fmt;

/// AppleTalk network number. 0 means "this network".
pub type Network = u16;

/// AppleTalk node number. 0 is reserved, 255 is the local broadcast.
pub type Node = u8;

/// An AppleTalk (network, node) address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AtalkAddr {
    pub network: Network,
    pub node: Node,
}

impl AtalkAddr {
    pub fn new(network: Network, node: Node) -> Self {
        AtalkAddr { network, node }
    }
}

impl fmt::Display for AtalkAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.network, self.node)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MacAddr {
    pub bytes: [u8; 6],
}

impl MacAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddr { bytes }
    }

    pub fn zero() -> Self {
        MacAddr { bytes: [0; 6] }
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// DDP protocol numbers, used for packet summaries.
pub const DDP_PROTO_RTMP_RESP: u8 = 1;
pub const DDP_PROTO_NBP: u8 = 2;
pub const DDP_PROTO_ATP: u8 = 3;
pub const DDP_PROTO_AEP: u8 = 4;
pub const DDP_PROTO_RTMP_REQ: u8 = 5;
pub const DDP_PROTO_ZIP: u8 = 6;
pub const DDP_PROTO_ADSP: u8 = 7;

/// Human name for a DDP protocol number.
pub fn ddp_proto_name(proto: u8) -> Option<&'static str> {
    match proto {
        DDP_PROTO_RTMP_RESP => Some("rtmp/resp"),
        DDP_PROTO_NBP => Some("nbp"),
        DDP_PROTO_ATP => Some("atp"),
        DDP_PROTO_AEP => Some("aep"),
        DDP_PROTO_RTMP_REQ => Some("rtmp/req"),
        DDP_PROTO_ZIP => Some("zip"),
        DDP_PROTO_ADSP => Some("adsp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_addr_display() {
        let mac = MacAddr::new([0x08, 0x00, 0x07, 0xb4, 0xb1, 0xce]);
        assert_eq!(mac.to_string(), "08:00:07:b4:b1:ce");
    }

    #[test]
    fn atalk_addr_display() {
        assert_eq!(AtalkAddr::new(0xff00, 42).to_string(), "65280.42");
    }
}

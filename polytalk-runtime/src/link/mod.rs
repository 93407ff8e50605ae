use futures::future::BoxFuture;
use futures::Stream;
use polytalk_packets::{EthertalkPacket, LlapPacket};

mod task_park;
pub use self::task_park::TaskPark;

mod channel;
pub use self::channel::{packet_channel, PacketReceiver, PacketSender, Take};

/// Ports and links communicate through boxed streams of packets.
pub type PacketStream<T> = Box<dyn Stream<Item = T> + Send + Unpin>;

/// A worker future ready to be handed to the runtime. Builders return these
/// rather than spawning so the caller owns task lifetimes.
pub type TokioRunnable = BoxFuture<'static, ()>;

/// An active bridge endpoint as the hub sees it: a stream of decoded
/// EtherTalk frames coming off the wire, and a channel of frames to put on
/// the wire. The adapter keeps the other half of each.
pub struct Port {
    pub inbound: PacketStream<EthertalkPacket>,
    pub outbound: PacketSender<EthertalkPacket>,
}

/// A port whose native framing is LLAP (UDP multicast, TashTalk serial).
/// Wrap it with [`crate::translate::extend`] before attaching it to a hub.
pub struct LlapPort {
    pub inbound: PacketStream<LlapPacket>,
    pub outbound: PacketSender<LlapPacket>,
}

use crate::link::PacketStream;
use futures::stream;

/// Immediately yields a collection of packets, then ends. The stream
/// equivalent of a port that speaks its piece and hangs up.
pub fn immediate_stream<I>(collection: I) -> PacketStream<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
{
    Box::new(stream::iter(collection))
}

use crate::link::PacketStream;
use crossbeam::channel::Sender;
use futures::task::{Context, Poll};
use futures::{Future, Stream};
use std::fmt::Debug;
use std::pin::Pin;

/// Polls a packet stream to exhaustion, copying every packet into a
/// crossbeam channel so the test body can assert on what was delivered.
pub struct ExhaustiveCollector<T: Debug> {
    stream: PacketStream<T>,
    packet_dump: Sender<T>,
}

impl<T: Debug> ExhaustiveCollector<T> {
    pub fn new(stream: PacketStream<T>, packet_dump: Sender<T>) -> Self {
        ExhaustiveCollector {
            stream,
            packet_dump,
        }
    }
}

impl<T: Debug> Unpin for ExhaustiveCollector<T> {}

impl<T: Debug> Future for ExhaustiveCollector<T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        loop {
            match futures::ready!(Pin::new(&mut self.stream).poll_next(cx)) {
                Some(packet) => {
                    self.packet_dump
                        .send(packet)
                        .expect("collector dump channel closed early");
                }
                None => return Poll::Ready(()),
            }
        }
    }
}

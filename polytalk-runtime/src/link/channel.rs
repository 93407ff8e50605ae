//! Small bounded packet channels with task-park waking.
//!
//! A channel carries `Option<T>`: `Some` is a packet, `None` is the
//! producer's end-of-stream marker. The sender parks when the channel is
//! full and the receiver parks when it is empty, so capacity doubles as the
//! backpressure window. Capacity 1 keeps a slow consumer's pressure tight
//! against the producing wire.

use crate::link::TaskPark;
use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use futures::task::{Context, Poll};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;

pub fn packet_channel<T>(capacity: usize) -> (PacketSender<T>, PacketReceiver<T>) {
    assert!(capacity > 0, "packet channel capacity must be > 0");
    let (tx, rx) = bounded::<Option<T>>(capacity);
    let park = TaskPark::new();
    let receiver_gone = Arc::new(AtomicBool::new(false));
    (
        PacketSender {
            to_receiver: tx,
            park: park.clone(),
            receiver_gone: Arc::clone(&receiver_gone),
        },
        PacketReceiver {
            from_sender: rx,
            park,
            gone_flag: receiver_gone,
        },
    )
}

/// The producing half. Every polytalk channel has exactly one producer, so
/// `close` is unambiguous.
pub struct PacketSender<T> {
    to_receiver: Sender<Option<T>>,
    park: TaskPark,
    receiver_gone: Arc<AtomicBool>,
}

/// What a non-blocking take from the channel produced.
pub enum Take<T> {
    Item(T),
    Empty,
    Closed,
}

impl<T> PacketSender<T> {
    pub fn is_full(&self) -> bool {
        self.to_receiver.is_full()
    }

    /// True once the receiving half has been dropped. A full channel whose
    /// receiver is gone will never drain, so callers gating on
    /// [`is_full`](Self::is_full) must check this first.
    pub fn is_closed(&self) -> bool {
        self.receiver_gone.load(Ordering::Acquire)
    }

    /// Parks `waker` to be woken when the receiver next drains the channel.
    pub fn park(&self, waker: Waker) {
        self.park.park(waker);
    }

    /// Non-blocking send. Returns false if the receiver is gone. Panics if
    /// the channel is full: callers gate on [`is_full`](Self::is_full)
    /// first, and each channel has exactly one producer.
    pub fn try_send(&self, packet: T) -> bool {
        match self.to_receiver.try_send(Some(packet)) {
            Ok(()) => {
                self.park.notify();
                true
            }
            Err(TrySendError::Full(_)) => {
                panic!("try_send on a full packet channel; gate on is_full first")
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Sends, parking while the channel is full. Returns false once the
    /// receiver is gone.
    pub async fn send(&self, packet: T) -> bool {
        let mut slot = Some(packet);
        futures::future::poll_fn(move |cx| {
            match self.to_receiver.try_send(Some(slot.take().expect("send polled after ready"))) {
                Ok(()) => {
                    self.park.notify();
                    Poll::Ready(true)
                }
                Err(TrySendError::Full(returned)) => {
                    slot = returned;
                    self.park.park(cx.waker().clone());
                    Poll::Pending
                }
                Err(TrySendError::Disconnected(_)) => Poll::Ready(false),
            }
        })
        .await
    }

    /// Delivers the end-of-stream marker and retires the park. The receiver
    /// drains anything still queued, then observes the close.
    pub fn close(&self) {
        // A full channel has no room for the marker; disconnecting by drop
        // covers that case, since a drained empty channel reports Closed.
        let _ = self.to_receiver.try_send(None);
        self.park.die();
    }
}

/// The consuming half; a [`Stream`] of packets for adapter tasks, with
/// non-blocking accessors for the hub's control loop.
pub struct PacketReceiver<T> {
    from_sender: Receiver<Option<T>>,
    park: TaskPark,
    gone_flag: Arc<AtomicBool>,
}

impl<T> Drop for PacketReceiver<T> {
    fn drop(&mut self) {
        self.gone_flag.store(true, Ordering::Release);
        self.park.die();
    }
}

impl<T> PacketReceiver<T> {
    pub fn try_take(&self) -> Take<T> {
        match self.from_sender.try_recv() {
            Ok(Some(packet)) => {
                self.park.notify();
                Take::Item(packet)
            }
            Ok(None) => {
                self.park.die();
                Take::Closed
            }
            Err(TryRecvError::Empty) => Take::Empty,
            Err(TryRecvError::Disconnected) => Take::Closed,
        }
    }

    /// Parks a shared waker slot to be woken on the next enqueue.
    pub fn park_indirect(&self, slot: Arc<crossbeam::atomic::AtomicCell<Option<Waker>>>) -> bool {
        self.park.park_indirect(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.from_sender.is_empty()
    }
}

impl<T> Stream for PacketReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.from_sender.try_recv() {
            Ok(Some(packet)) => {
                self.park.notify();
                Poll::Ready(Some(packet))
            }
            Ok(None) => {
                self.park.die();
                Poll::Ready(None)
            }
            Err(TryRecvError::Empty) => {
                self.park.park(cx.waker().clone());
                Poll::Pending
            }
            Err(TryRecvError::Disconnected) => Poll::Ready(None),
        }
    }
}

impl<T> Unpin for PacketReceiver<T> {}

//! A parking spot for task wakers, shared by the two ends of a bounded
//! packet channel.
//!
//! A producer that finds its channel full, or a consumer that finds it
//! empty, leaves its waker here before sleeping; the peer wakes it on the
//! next enqueue or dequeue. Because a channel with capacity of at least one
//! cannot be full and empty at the same time, the two sides can share one
//! spot without deadlocking: whoever parks second wakes the first, and the
//! pair settles after a round of rechecks.

use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::task::Waker;

enum ParkState {
    /// One side has dropped; parking is pointless and the parker must keep
    /// itself scheduled.
    Dead,
    Empty,
    Parked(Waker),
    /// A waker shared across several parks; taken at most once, so a task
    /// waiting on many channels is not scheduled once per channel.
    Indirect(Arc<AtomicCell<Option<Waker>>>),
}

#[derive(Clone)]
pub struct TaskPark {
    cell: Arc<AtomicCell<ParkState>>,
}

impl TaskPark {
    pub fn new() -> TaskPark {
        TaskPark {
            cell: Arc::new(AtomicCell::new(ParkState::Empty)),
        }
    }

    /// Swaps in the next state, waking whichever task was parked here.
    /// Returns false if the park is dead.
    fn swap_and_notify(&self, next: ParkState) -> bool {
        match self.cell.swap(next) {
            ParkState::Dead => {
                self.cell.store(ParkState::Dead);
                false
            }
            ParkState::Empty => true,
            ParkState::Parked(waker) => {
                waker.wake();
                true
            }
            ParkState::Indirect(slot) => {
                if let Some(waker) = slot.swap(None) {
                    waker.wake();
                }
                true
            }
        }
    }

    /// Wakes any parked task without parking the caller.
    pub fn notify(&self) {
        self.swap_and_notify(ParkState::Empty);
    }

    /// Parks the calling task's waker, waking whoever was here before. If
    /// the park is dead the waker is invoked immediately so the caller can
    /// observe the closed channel.
    pub fn park(&self, waker: Waker) {
        if !self.swap_and_notify(ParkState::Parked(waker.clone())) {
            waker.wake();
        }
    }

    /// Parks a shared waker slot; used by a task sleeping on many channels
    /// at once. Returns false if the park is dead.
    pub fn park_indirect(&self, slot: Arc<AtomicCell<Option<Waker>>>) -> bool {
        self.swap_and_notify(ParkState::Indirect(slot))
    }

    /// Marks the park dead and wakes any occupant. Called by a side that is
    /// going away and will never notify again.
    pub fn die(&self) {
        self.swap_and_notify(ParkState::Dead);
    }
}

impl Default for TaskPark {
    fn default() -> Self {
        TaskPark::new()
    }
}

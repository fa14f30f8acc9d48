//! The subscription consumers use to read fan-out from the bus. No disk
//! durability, no history replay: a new subscriber only ever sees events
//! committed during its own lifetime.

use std::sync::mpsc;
use std::time::Duration;

use iam_core::EventRecord;

/// A lazy, restartable sequence of events handed out by [`crate::bus::EventBus`].
///
/// Buffers events produced while no consumer is waiting and hands them to
/// the next waiter in FIFO order (the channel itself provides this).
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<EventRecord>,
}

impl Subscription {
    pub(crate) fn new(receiver: mpsc::Receiver<EventRecord>) -> Self {
        Self { receiver }
    }

    /// Block until the next event is available, or return `None` once the
    /// bus side has dropped (equivalent to an end-of-stream signal after
    /// `unsubscribe()`).
    pub fn recv(&self) -> Option<EventRecord> {
        self.receiver.recv().ok()
    }

    /// Non-blocking poll.
    pub fn try_recv(&self) -> Option<EventRecord> {
        self.receiver.try_recv().ok()
    }

    /// Block up to `timeout`, returning `Err` on timeout vs. on a closed bus
    /// side so a worker loop can tell "nothing yet" from "stop". Used by
    /// background workers that also need to poll a shutdown channel.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<EventRecord, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Closes the sequence, waking any waiter with an end-of-stream signal
    /// and dropping the buffer. Dropping the `Subscription` has the same
    /// effect; this method exists for readability at call sites.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

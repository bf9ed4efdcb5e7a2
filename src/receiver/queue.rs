//! Bounded delivery queue between the ingress thread and the consumer.
//!
//! Overflow sheds the oldest element so the consumer always sees the
//! freshest frames; a stalled consumer costs latency, never memory.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::time::Duration;

pub(crate) struct QueueProducer<T> {
    tx: Sender<T>,
    reclaim: Receiver<T>,
}

pub(crate) struct QueueConsumer<T> {
    rx: Receiver<T>,
}

pub(crate) fn bounded_dropping<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = bounded(capacity);
    (QueueProducer { tx, reclaim: rx.clone() }, QueueConsumer { rx })
}

impl<T> QueueProducer<T> {
    /// Inserts `item`, dropping the oldest queued element first when the
    /// queue is full. Returns `true` when something was shed.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => false,
            Err(TrySendError::Full(item)) => {
                let _ = self.reclaim.try_recv();
                let _ = self.tx.try_send(item);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl<T> QueueConsumer<T> {
    /// Blocking read. `None` timeout blocks until an element arrives or the
    /// producer side is gone; queued elements drain before disconnect is
    /// reported.
    pub fn pop(&self, timeout: Option<Duration>) -> Option<T> {
        match timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).ok(),
            None => self.rx.recv().ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

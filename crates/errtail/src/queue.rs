//! Bounded event queue between source readers and the batch sender.
//!
//! Built on a bounded `tokio::sync::mpsc` channel, so the capacity invariant
//! holds by construction. The shed-load policy is reject-newest: a producer
//! never blocks, and an enqueue at capacity drops that single event with a
//! warning. Drops are counted so overload is observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::LogEvent;

/// One slot in the queue: an event, or the sentinel waking the sender for
/// shutdown.
#[derive(Debug)]
pub enum QueueItem {
    Event(LogEvent),
    Shutdown,
}

/// Create a queue of the given capacity.
///
/// The [`EventQueue`] half is cloneable (one per reader plus the lifecycle
/// controller); the [`EventReceiver`] half belongs to the single sender task.
pub fn bounded(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventQueue {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { rx, dropped },
    )
}

/// Producer half of the event queue.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<QueueItem>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    /// Enqueue without blocking; on a full queue the event is dropped and
    /// `false` is returned. Never an error for the caller.
    pub fn try_enqueue(&self, event: LogEvent) -> bool {
        match self.tx.try_send(QueueItem::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(size = self.len(), "dropping event; queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Sender task already gone; only happens during shutdown.
                debug!("dropping event; queue closed");
                false
            }
        }
    }

    /// Best-effort sentinel enqueue to wake a parked sender. Bounded: if the
    /// queue stays full past the timeout the sender will still observe the
    /// stop signal within one poll interval.
    pub async fn signal_shutdown(&self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.tx.send(QueueItem::Shutdown))
            .await
            .is_err()
        {
            debug!("queue full; sender will observe the stop signal instead");
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events shed because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half of the event queue, owned by the batch sender.
pub struct EventReceiver {
    rx: mpsc::Receiver<QueueItem>,
    dropped: Arc<AtomicU64>,
}

/// Outcome of a bounded receive.
#[derive(Debug)]
pub enum RecvOutcome {
    Item(QueueItem),
    /// The wait elapsed with nothing queued.
    TimedOut,
    /// Every producer is gone and the queue is drained; nothing will ever
    /// arrive again.
    Closed,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next item.
    pub async fn recv(&mut self, timeout: Duration) -> RecvOutcome {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => RecvOutcome::Item(item),
            Ok(None) => RecvOutcome::Closed,
            Err(_) => RecvOutcome::TimedOut,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

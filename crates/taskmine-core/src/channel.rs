//! Delivery channel between the observation and persistence contexts.
//!
//! `send` is non-blocking and at-most-once. A record that cannot be handed
//! to the transport right now (receiver gone, transport full) is dropped:
//! no retry, no sender-side buffer, no error to the caller. Drops are
//! counted and logged so loss is visible without changing delivery
//! semantics. The channel never inspects or rewrites records.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::record::EventRecord;

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_full: AtomicU64,
}

/// Delivery counters, shared by every clone of a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub dropped_closed: u64,
    pub dropped_full: u64,
}

impl ChannelStats {
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_closed + self.dropped_full
    }
}

/// Sending half, held by the observation context.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<EventRecord>,
    counters: Arc<Counters>,
}

/// Receiving half, held by the persistence context.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<EventRecord>,
}

/// Create a connected channel holding at most `capacity` in-flight records.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn channel(capacity: usize) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        RecordSender {
            tx,
            counters: Arc::new(Counters::default()),
        },
        RecordReceiver { rx },
    )
}

impl RecordSender {
    /// Hand `record` to the transport. Never blocks and never fails.
    pub fn send(&self, record: EventRecord) {
        let kind = record.event;
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event_kind = %kind, reason = "receiver_closed", "record dropped");
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event_kind = %kind, reason = "full", "record dropped");
            }
        }
    }

    /// Wait until the transport has room for one record.
    ///
    /// For bulk producers such as a stdin bridge. Capture handlers never
    /// wait; they call [`send`](Self::send) and accept the drop.
    pub async fn ready(&self) {
        if let Ok(permit) = self.tx.reserve().await {
            drop(permit);
        }
    }

    /// Whether the persistence context is still listening.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped_closed: self.counters.dropped_closed.load(Ordering::Relaxed),
            dropped_full: self.counters.dropped_full.load(Ordering::Relaxed),
        }
    }
}

impl RecordReceiver {
    /// Next record; `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.rx.recv().await
    }

    /// Next record if one is already queued.
    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new records; queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

//! Persistence context: drains the delivery channel into the store.
//!
//! Records are appended in arrival order, one transaction each. Write
//! failures do not stop the relay; they are logged and counted so loss
//! stays observable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::RecordReceiver;
use crate::store::SharedStore;

/// Outcome counters for one relay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub appended: u64,
    pub failed: u64,
    /// Highest id assigned during the run.
    pub last_id: Option<i64>,
}

/// Relay until every sender is gone and the queue is drained.
pub async fn run(mut receiver: RecordReceiver, store: Arc<SharedStore>) -> RelayStats {
    let mut stats = RelayStats::default();
    while let Some(record) = receiver.recv().await {
        let kind = record.event;
        match store.append(record).await {
            Ok(id) => {
                stats.appended += 1;
                stats.last_id = Some(id);
            }
            Err(err) => {
                stats.failed += 1;
                tracing::warn!(event_kind = %kind, error = %err, "append failed; record lost");
            }
        }
    }
    tracing::debug!(
        appended = stats.appended,
        failed = stats.failed,
        "delivery channel closed; relay stopped"
    );
    stats
}

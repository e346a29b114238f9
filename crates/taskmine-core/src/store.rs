//! Durable store: append-only, schema-versioned SQLite event log.
//!
//! One collection (`events`) keyed by an auto-incrementing integer. The
//! store alone assigns ids; they are strictly increasing in append order,
//! which is arrival order and not producer `timestamp` order.
//!
//! # Lifecycle
//!
//! ```text
//! Closed ──open──▶ Opening ──schema check──▶ Open
//!                     │
//!                     └──error──▶ Failed (terminal)
//! ```
//!
//! [`StoreHandle`] is an opened log. [`SharedStore`] is the process-wide
//! owner: it opens lazily on first use, hands every later caller the same
//! handle, and never reopens while `Open`. `shutdown` returns it to
//! `Closed`; a failed open is never retried.
//!
//! # Schema
//!
//! The version lives in `PRAGMA user_version`. The check runs inside a
//! `BEGIN IMMEDIATE` transaction with `CREATE TABLE IF NOT EXISTS`, so
//! concurrent openers serialize on the write lock, exactly one creates the
//! table, and rerunning it against an existing log changes nothing.
//!
//! # Change notification
//!
//! Every successful append broadcasts a [`ChangeNotice`]. Receivers that
//! are not listening miss it; nothing is queued or replayed. The store is
//! the only publisher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::record::{EventRecord, StoredEvent};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 2;

/// Action tag carried by every change notice.
pub const REFRESH_ACTION: &str = "refresh_dashboard";

/// Notices buffered per subscriber before the oldest are skipped.
const NOTICE_CAPACITY: usize = 64;

type StoreResult<T> = std::result::Result<T, StorageError>;

// =============================================================================
// Schema
// =============================================================================

/// Schema SQL for version 2.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    url TEXT NOT NULL,
    page_fingerprint TEXT NOT NULL,
    record TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_event ON events(event);
";

/// Run the versioned schema check. Returns the resulting version.
pub fn migrate(conn: &mut Connection) -> StoreResult<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let found: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    tx.execute_batch(SCHEMA_SQL)?;
    if found < SCHEMA_VERSION {
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::info!(
            from_version = found,
            schema_version = SCHEMA_VERSION,
            "event store schema upgraded"
        );
    }
    tx.commit()?;
    Ok(SCHEMA_VERSION)
}

// =============================================================================
// Change notification
// =============================================================================

/// Zero-payload "the log changed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeNotice {
    pub action: &'static str,
}

impl ChangeNotice {
    pub const REFRESH: Self = Self {
        action: REFRESH_ACTION,
    };
}

// =============================================================================
// StoreHandle
// =============================================================================

struct StoreInner {
    path: PathBuf,
    conn: Mutex<Connection>,
    notify: broadcast::Sender<ChangeNotice>,
}

/// An opened event log. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Open (creating if needed) the log at `config.db_path`.
    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        let (notify, _) = broadcast::channel(NOTICE_CAPACITY);
        Self::open_with_notifier(config.clone(), notify).await
    }

    /// Open, publishing change notices on `notify`.
    pub async fn open_with_notifier(
        config: StorageConfig,
        notify: broadcast::Sender<ChangeNotice>,
    ) -> StoreResult<Self> {
        tokio::task::spawn_blocking(move || Self::open_blocking(&config, notify))
            .await
            .map_err(|e| StorageError::Join(e.to_string()))?
    }

    /// Blocking open. Call from a blocking context.
    pub fn open_blocking(
        config: &StorageConfig,
        notify: broadcast::Sender<ChangeNotice>,
    ) -> StoreResult<Self> {
        let path = config.db_path.clone();
        let open_failed = |reason: String| StorageError::OpenFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(e.to_string()))?;
        }
        let mut conn = Connection::open(&path).map_err(|e| open_failed(e.to_string()))?;
        conn.busy_timeout(config.busy_timeout())
            .map_err(|e| open_failed(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| open_failed(e.to_string()))?;

        match migrate(&mut conn) {
            Ok(_) => {}
            Err(err @ StorageError::SchemaTooNew { .. }) => return Err(err),
            Err(err) => return Err(open_failed(err.to_string())),
        }

        tracing::debug!(path = %path.display(), schema_version = SCHEMA_VERSION, "event store open");
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                conn: Mutex::new(conn),
                notify,
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Subscribe to change notices published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.inner.notify.subscribe()
    }

    /// Append `record` in its own write transaction. Returns the assigned id.
    pub async fn append(&self, record: EventRecord) -> StoreResult<i64> {
        let kind = record.event;
        let id = self.with_conn(move |conn| append_record(conn, &record)).await?;
        tracing::debug!(record_id = id, event_kind = %kind, "record appended");
        // No subscribers is not an error.
        let _ = self.inner.notify.send(ChangeNotice::REFRESH);
        Ok(id)
    }

    /// Newest `limit` records, oldest first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<StoredEvent>> {
        let limit = to_sql_limit(limit)?;
        self.with_conn(move |conn| {
            let mut events = query_events(
                conn,
                "SELECT id, record FROM events ORDER BY id DESC LIMIT ?1",
                params![limit],
            )?;
            events.reverse();
            Ok(events)
        })
        .await
    }

    /// Up to `limit` records with `id > after_id`, in id order.
    pub async fn since(&self, after_id: i64, limit: usize) -> StoreResult<Vec<StoredEvent>> {
        let limit = to_sql_limit(limit)?;
        self.with_conn(move |conn| {
            query_events(
                conn,
                "SELECT id, record FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
                params![after_id, limit],
            )
        })
        .await
    }

    pub async fn get(&self, id: i64) -> StoreResult<Option<StoredEvent>> {
        self.with_conn(move |conn| {
            let row: Option<String> = conn
                .query_row("SELECT record FROM events WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            row.map(|json| decode_record(id, &json)).transpose()
        })
        .await
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            u64::try_from(n).map_err(|_| StorageError::IntegerOverflow("count"))
        })
        .await
    }

    /// Record count per event kind name.
    pub async fn count_by_kind(&self) -> StoreResult<BTreeMap<String, u64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT event, COUNT(*) FROM events GROUP BY event ORDER BY event")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut counts = BTreeMap::new();
            for row in rows {
                let (kind, n) = row?;
                let n = u64::try_from(n).map_err(|_| StorageError::IntegerOverflow("count"))?;
                counts.insert(kind, n);
            }
            Ok(counts)
        })
        .await
    }

    /// Schema version recorded in the database file.
    pub async fn schema_version(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA user_version", [], |row| row.get(0))
                .map_err(StorageError::from)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

fn append_record(conn: &mut Connection, record: &EventRecord) -> StoreResult<i64> {
    let json = serde_json::to_string(record).map_err(|e| StorageError::Encode(e.to_string()))?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO events (event, timestamp, url, page_fingerprint, record)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.event.as_str(),
            record.timestamp,
            record.url,
            record.page_fingerprint,
            json
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

fn query_events(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<StoredEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut events = Vec::new();
    for row in rows {
        let (id, json) = row?;
        events.push(decode_record(id, &json)?);
    }
    Ok(events)
}

fn decode_record(id: i64, json: &str) -> StoreResult<StoredEvent> {
    let record = serde_json::from_str(json).map_err(|e| StorageError::CorruptRecord {
        id,
        reason: e.to_string(),
    })?;
    Ok(StoredEvent { id, record })
}

fn to_sql_limit(limit: usize) -> StoreResult<i64> {
    i64::try_from(limit).map_err(|_| StorageError::IntegerOverflow("limit"))
}

// =============================================================================
// SharedStore
// =============================================================================

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Closed,
    Opening,
    Open,
    Failed,
}

enum Lifecycle {
    Closed,
    Open(StoreHandle),
    Failed(String),
}

/// Process-wide, lazily opened store.
///
/// Concurrent first callers wait on the same open. Subscriptions taken
/// here survive `shutdown` and a later reopen.
pub struct SharedStore {
    config: StorageConfig,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    state: Mutex<StoreState>,
    notify: broadcast::Sender<ChangeNotice>,
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("db_path", &self.config.db_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SharedStore {
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        let (notify, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            config,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Closed),
            state: Mutex::new(StoreState::Closed),
            notify,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> StoreState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: StoreState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notify.subscribe()
    }

    /// The open handle, opening on first use.
    pub async fn handle(&self) -> StoreResult<StoreHandle> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Open(handle) => return Ok(handle.clone()),
            Lifecycle::Failed(reason) => return Err(StorageError::Failed(reason.clone())),
            Lifecycle::Closed => {}
        }

        self.set_state(StoreState::Opening);
        match StoreHandle::open_with_notifier(self.config.clone(), self.notify.clone()).await {
            Ok(handle) => {
                *lifecycle = Lifecycle::Open(handle.clone());
                self.set_state(StoreState::Open);
                Ok(handle)
            }
            Err(err) => {
                tracing::error!(
                    path = %self.config.db_path.display(),
                    error = %err,
                    "event store failed to open"
                );
                *lifecycle = Lifecycle::Failed(err.to_string());
                self.set_state(StoreState::Failed);
                Err(err)
            }
        }
    }

    /// Append through the shared handle.
    pub async fn append(&self, record: EventRecord) -> StoreResult<i64> {
        self.handle().await?.append(record).await
    }

    /// Release the open handle. A failed store stays failed.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Open(_)) {
            *lifecycle = Lifecycle::Closed;
            self.set_state(StoreState::Closed);
            tracing::debug!(path = %self.config.db_path.display(), "event store closed");
        }
    }
}

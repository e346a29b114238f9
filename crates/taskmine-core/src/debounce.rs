//! Trailing-edge debounce for high-frequency capture sources.
//!
//! Each source key (one per input field, one for the page scroll stream)
//! owns independent timer state. A call stores its value and restarts that
//! key's quiet window; when a window elapses with no newer call, the sink
//! runs once with the last value. Activity on one key never delays another.
//!
//! Timers are Tokio tasks: each call spawns a sleeper tagged with a
//! generation number, and only the sleeper holding the key's latest
//! generation fires. Superseded sleepers wake and exit.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

/// Debounce source identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "key", rename_all = "snake_case")]
pub enum SourceKey {
    /// One form field, keyed by its locator (xpath, else selector)
    Field(String),
    /// The page scroll stream
    Scroll,
}

struct Slot<T> {
    generation: u64,
    value: T,
}

struct Shared<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
    next_generation: AtomicU64,
    calls: AtomicU64,
    fired: AtomicU64,
}

/// Counters for a debouncer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceStats {
    /// Calls accepted.
    pub calls: u64,
    /// Sink invocations.
    pub fired: u64,
    /// Keys with a window still open.
    pub pending: usize,
}

/// Keyed trailing-edge debouncer.
pub struct Debouncer<K, T> {
    window: Duration,
    shared: Arc<Shared<K, T>>,
    sink: Arc<dyn Fn(T) + Send + Sync>,
    runtime: Handle,
}

impl<K, T> Clone for Debouncer<K, T> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
            runtime: self.runtime.clone(),
        }
    }
}

impl<K, T> std::fmt::Debug for Debouncer<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl<K, T> Debouncer<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    /// Create a debouncer whose timers run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<F>(window: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_runtime(window, sink, Handle::current())
    }

    /// Create a debouncer whose timers run on `runtime`.
    pub fn with_runtime<F>(window: Duration, sink: F, runtime: Handle) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            window,
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                calls: AtomicU64::new(0),
                fired: AtomicU64::new(0),
            }),
            sink: Arc::new(sink),
            runtime,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `value` for `key` and restart that key's window.
    pub fn call(&self, key: K, value: T) {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        self.shared.calls.fetch_add(1, Ordering::Relaxed);
        self.shared
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Slot { generation, value });

        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.sink);
        let window = self.window;
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let value = {
                let mut slots = shared.slots.lock().unwrap_or_else(PoisonError::into_inner);
                match slots.get(&key) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&key).map(|slot| slot.value)
                    }
                    _ => None,
                }
            };
            if let Some(value) = value {
                shared.fired.fetch_add(1, Ordering::Relaxed);
                sink(value);
            }
        });
    }

    #[must_use]
    pub fn stats(&self) -> DebounceStats {
        DebounceStats {
            calls: self.shared.calls.load(Ordering::Relaxed),
            fired: self.shared.fired.load(Ordering::Relaxed),
            pending: self
                .shared
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

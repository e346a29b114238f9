//! Observation context: capture handlers wired to the delivery channel.
//!
//! Handlers are synchronous and return immediately. Each one snapshots the
//! element and page once, then either hands the snapshot to a debouncer
//! (`input`, `scroll`) or spawns the async finish-and-send step directly.
//! Nothing here can fail from the caller's point of view.
//!
//! The heartbeat runs on a fixed period for as long as the agent lives.
//! There is no way to stop it other than dropping the agent.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::channel::{ChannelStats, RecordSender};
use crate::config::Config;
use crate::debounce::{DebounceStats, Debouncer, SourceKey};
use crate::dom::{DomElement, Page};
use crate::locator;
use crate::normalize::{Capture, KeyStroke, Normalizer, PendingRecord, Pointer};

/// Per-page capture agent.
pub struct CaptureAgent<P> {
    page: Arc<P>,
    normalizer: Arc<Normalizer>,
    sender: RecordSender,
    inputs: Debouncer<SourceKey, PendingRecord>,
    scrolls: Debouncer<SourceKey, PendingRecord>,
    runtime: Handle,
    heartbeat: Option<JoinHandle<()>>,
}

impl<P> std::fmt::Debug for CaptureAgent<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAgent")
            .field("heartbeat", &self.heartbeat.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: Page + 'static> CaptureAgent<P> {
    /// Build an agent on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(page: Arc<P>, config: &Config, sender: RecordSender) -> Self {
        Self::with_runtime(page, config, sender, Handle::current())
    }

    pub fn with_runtime(
        page: Arc<P>,
        config: &Config,
        sender: RecordSender,
        runtime: Handle,
    ) -> Self {
        let normalizer = Arc::new(Normalizer::new(config.capture.clone()));
        let inputs = Debouncer::with_runtime(
            config.debounce.input_window(),
            deliver(sender.clone(), runtime.clone()),
            runtime.clone(),
        );
        let scrolls = Debouncer::with_runtime(
            config.debounce.scroll_window(),
            deliver(sender.clone(), runtime.clone()),
            runtime.clone(),
        );
        let mut agent = Self {
            page,
            normalizer,
            sender,
            inputs,
            scrolls,
            runtime,
            heartbeat: None,
        };
        if config.heartbeat.enabled {
            agent.heartbeat = Some(agent.spawn_heartbeat(config.heartbeat.interval()));
        }
        agent
    }

    pub fn on_click(&self, target: Option<&P::Element>, pointer: Pointer) {
        self.emit(Capture::Click { target, pointer });
    }

    /// Continuous typing; coalesced per field.
    pub fn on_input(&self, target: Option<&P::Element>) {
        let key = field_key(target);
        let pending = self.snapshot(Capture::Input { target });
        self.inputs.call(key, pending);
    }

    /// Committed field value; recorded as `input` without coalescing.
    pub fn on_change(&self, target: Option<&P::Element>) {
        self.emit(Capture::Input { target });
    }

    pub fn on_focus(&self, target: Option<&P::Element>) {
        self.emit(Capture::Focus { target });
    }

    pub fn on_blur(&self, target: Option<&P::Element>) {
        self.emit(Capture::Blur { target });
    }

    pub fn on_scroll(&self) {
        let pending = self.snapshot(Capture::<P::Element>::Scroll);
        self.scrolls.call(SourceKey::Scroll, pending);
    }

    pub fn on_key_press(&self, stroke: KeyStroke) {
        if self.normalizer.capture_config().record_key_presses {
            self.emit(Capture::<P::Element>::KeyPress(stroke));
        }
    }

    /// Document finished loading.
    pub fn on_page_load(&self) {
        self.emit(Capture::<P::Element>::PageVisit);
    }

    /// History state changed (push/replace/pop).
    pub fn on_history_change(&self) {
        self.emit(Capture::<P::Element>::Navigation);
    }

    #[must_use]
    pub fn delivery_stats(&self) -> ChannelStats {
        self.sender.stats()
    }

    #[must_use]
    pub fn input_stats(&self) -> DebounceStats {
        self.inputs.stats()
    }

    #[must_use]
    pub fn scroll_stats(&self) -> DebounceStats {
        self.scrolls.stats()
    }

    fn snapshot<E: DomElement>(&self, capture: Capture<'_, E>) -> PendingRecord {
        self.normalizer.snapshot(capture, &self.page.snapshot())
    }

    fn emit<E: DomElement>(&self, capture: Capture<'_, E>) {
        let pending = self.snapshot(capture);
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            sender.send(pending.finish().await);
        });
    }

    fn spawn_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let page = Arc::clone(&self.page);
        let normalizer = Arc::clone(&self.normalizer);
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let pending =
                    normalizer.snapshot(Capture::<P::Element>::Heartbeat, &page.snapshot());
                sender.send(pending.finish().await);
            }
        })
    }
}

impl<P> Drop for CaptureAgent<P> {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

/// Debounce sink: finish the surviving snapshot and send it.
fn deliver(
    sender: RecordSender,
    runtime: Handle,
) -> impl Fn(PendingRecord) + Send + Sync + 'static {
    move |pending: PendingRecord| {
        let sender = sender.clone();
        runtime.spawn(async move {
            sender.send(pending.finish().await);
        });
    }
}

/// Debounce identity of a form field: its xpath, else its selector.
fn field_key<E: DomElement>(target: Option<&E>) -> SourceKey {
    let location = locator::locate(target);
    SourceKey::Field(location.xpath.or(location.selector).unwrap_or_default())
}

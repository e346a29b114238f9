//! Event normalizer: turns a raw interaction into an [`EventRecord`].
//!
//! Normalization is split in two:
//!
//! 1. [`Normalizer::snapshot`] runs synchronously inside the capture
//!    handler. It reads the element and page state once and produces a
//!    [`PendingRecord`]; nothing in it can fail.
//! 2. [`PendingRecord::finish`] is async and performs the only suspending
//!    step, the optional value digest.
//!
//! Debounced sources carry `PendingRecord`s, so the record that is finally
//! delivered reflects the last snapshot of the burst.

use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::digest;
use crate::dom::{DomElement, PageSnapshot};
use crate::element::{self, ElementDescriptor};
use crate::record::{
    ClickData, EventData, EventKind, EventRecord, HeartbeatData, InputData, InputInfo,
    KeyPressData, NavigationData, PageVisitData, ScrollData, ScrollViewport, now_ms,
};

/// Pointer state of a click.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
    pub button: i16,
}

/// Keyboard event as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStroke {
    /// `KeyboardEvent.key`
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

/// One observed interaction, borrowed from the host for the duration of
/// the capture handler.
#[derive(Debug, Clone)]
pub enum Capture<'a, E> {
    Click { target: Option<&'a E>, pointer: Pointer },
    /// `input` and `change` on a form field
    Input { target: Option<&'a E> },
    Focus { target: Option<&'a E> },
    Blur { target: Option<&'a E> },
    Scroll,
    PageVisit,
    Navigation,
    Heartbeat,
    KeyPress(KeyStroke),
}

impl<E> Capture<'_, E> {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Click { .. } => EventKind::Click,
            Self::Input { .. } => EventKind::Input,
            Self::Focus { .. } => EventKind::Focus,
            Self::Blur { .. } => EventKind::Blur,
            Self::Scroll => EventKind::Scroll,
            Self::PageVisit => EventKind::PageVisit,
            Self::Navigation => EventKind::Navigation,
            Self::Heartbeat => EventKind::Heartbeat,
            Self::KeyPress(_) => EventKind::KeyPress,
        }
    }
}

/// Payload still waiting for its digest.
#[derive(Debug, Clone, PartialEq)]
enum PendingData {
    Ready(EventData),
    Input {
        element: ElementDescriptor,
        field_type: String,
        field_name: String,
        length: usize,
        /// Present only when value hashing is enabled.
        hash_source: Option<String>,
    },
}

/// Snapshot of an interaction, detached from the document.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    page: PageSnapshot,
    timestamp: i64,
    data: PendingData,
}

impl PendingRecord {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.data {
            PendingData::Ready(data) => data.kind(),
            PendingData::Input { .. } => EventKind::Input,
        }
    }

    /// Complete the record, hashing the field value if one was kept.
    pub async fn finish(self) -> EventRecord {
        let data = match self.data {
            PendingData::Ready(data) => data,
            PendingData::Input {
                element,
                field_type,
                field_name,
                length,
                hash_source,
            } => {
                let hash = match hash_source {
                    Some(value) => Some(digest::sha256_hex_async(value).await),
                    None => None,
                };
                EventData::Input(InputData {
                    element,
                    field_type,
                    field_name,
                    input: InputInfo { length, hash },
                })
            }
        };
        EventRecord::new(&self.page, self.timestamp, data)
    }
}

/// Builds records according to the capture capability flags.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    capture: CaptureConfig,
}

impl Normalizer {
    #[must_use]
    pub fn new(capture: CaptureConfig) -> Self {
        Self { capture }
    }

    #[must_use]
    pub fn capture_config(&self) -> &CaptureConfig {
        &self.capture
    }

    /// Normalize in one step.
    pub async fn normalize<E: DomElement>(
        &self,
        capture: Capture<'_, E>,
        page: &PageSnapshot,
    ) -> EventRecord {
        self.snapshot(capture, page).finish().await
    }

    /// Capture-time snapshot stamped with the current time.
    pub fn snapshot<E: DomElement>(
        &self,
        capture: Capture<'_, E>,
        page: &PageSnapshot,
    ) -> PendingRecord {
        self.snapshot_at(capture, page, now_ms())
    }

    /// Capture-time snapshot with an explicit timestamp.
    pub fn snapshot_at<E: DomElement>(
        &self,
        capture: Capture<'_, E>,
        page: &PageSnapshot,
        timestamp: i64,
    ) -> PendingRecord {
        let preview = self.capture.text_preview_chars;
        let data = match capture {
            Capture::Click { target, pointer } => PendingData::Ready(EventData::Click(ClickData {
                element: element::describe(target, preview),
                x: pointer.x,
                y: pointer.y,
                button: pointer.button,
            })),
            Capture::Input { target } => self.input_data(target, preview),
            Capture::Focus { target } => {
                PendingData::Ready(EventData::Focus(element::describe(target, preview)))
            }
            Capture::Blur { target } => {
                PendingData::Ready(EventData::Blur(element::describe(target, preview)))
            }
            Capture::Scroll => PendingData::Ready(EventData::Scroll(ScrollData {
                scroll_y: page.scroll_y,
                viewport: ScrollViewport {
                    w: page.viewport.width,
                    h: page.viewport.height,
                },
            })),
            Capture::PageVisit => PendingData::Ready(EventData::PageVisit(PageVisitData {
                url: page.url.clone(),
                title: page.title.clone(),
                referrer: page.referrer.clone(),
            })),
            Capture::Navigation => PendingData::Ready(EventData::Navigation(NavigationData {
                url: page.url.clone(),
                title: page.title.clone(),
            })),
            Capture::Heartbeat => PendingData::Ready(EventData::Heartbeat(HeartbeatData {
                url: page.url.clone(),
            })),
            Capture::KeyPress(stroke) => PendingData::Ready(EventData::KeyPress(KeyPressData {
                key: key_identity(&stroke.key),
                ctrl: stroke.ctrl,
                alt: stroke.alt,
                shift: stroke.shift,
                meta: stroke.meta,
            })),
        };
        PendingRecord {
            page: page.clone(),
            timestamp,
            data,
        }
    }

    fn input_data<E: DomElement>(&self, target: Option<&E>, preview: usize) -> PendingData {
        let Some(el) = target else {
            return PendingData::Input {
                element: ElementDescriptor::default(),
                field_type: String::new(),
                field_name: String::new(),
                length: 0,
                hash_source: None,
            };
        };
        let value = el.value().unwrap_or_default();
        PendingData::Input {
            element: element::describe(Some(el), preview),
            field_type: element::field_type(el),
            field_name: element::field_name(el),
            length: value.encode_utf16().count(),
            hash_source: self.capture.hashes_values().then_some(value),
        }
    }
}

/// Key identity without typed content.
///
/// Named keys (`Enter`, `ArrowUp`, `F5`) pass through; any single printable
/// character collapses to `Character`, and the space bar to `Space`.
pub fn key_identity(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (None, _) => "Unidentified".to_string(),
        (Some(' '), None) => "Space".to_string(),
        (Some(_), None) => "Character".to_string(),
        _ => key.to_string(),
    }
}

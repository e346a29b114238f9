//! Event records: the unit of the activity log.
//!
//! A record is built by the normalizer without an identifier; the store
//! assigns `id` at append time and hands back a [`StoredEvent`].
//!
//! Wire shape (one JSON object per record):
//!
//! ```json
//! {"event":"click","timestamp":1700000000000,"url":"https://example.com/",
//!  "title":"Example","viewport":{"width":1280,"height":720},"scrollY":0.0,
//!  "page_fingerprint":"example.com|Example",
//!  "data":{"tag":"BUTTON","id":"go","classes":"","selector":"#go",
//!          "xpath":"/html[1]/body[1]/button[1]","text":"Go","x":10,"y":20,"button":0}}
//! ```
//!
//! The shape of `data` is determined by `event`, so decoding goes through
//! [`RawEventRecord`] and dispatches on the kind.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::dom::{PageSnapshot, Viewport};
use crate::element::ElementDescriptor;

// =============================================================================
// Kinds
// =============================================================================

/// Closed set of record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Click,
    Input,
    Focus,
    Blur,
    Scroll,
    PageVisit,
    Navigation,
    Heartbeat,
    KeyPress,
}

impl EventKind {
    pub const ALL: [Self; 9] = [
        Self::Click,
        Self::Input,
        Self::Focus,
        Self::Blur,
        Self::Scroll,
        Self::PageVisit,
        Self::Navigation,
        Self::Heartbeat,
        Self::KeyPress,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Input => "input",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Scroll => "scroll",
            Self::PageVisit => "page_visit",
            Self::Navigation => "navigation",
            Self::Heartbeat => "heartbeat",
            Self::KeyPress => "key_press",
        }
    }

    /// High-frequency kinds that pass through the debouncer.
    #[must_use]
    pub fn is_debounced(self) -> bool {
        matches!(self, Self::Input | Self::Scroll)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// `click`: element, pointer position and button.
///
/// Coordinates are CSS pixels and may be fractional under zoom.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickData {
    #[serde(flatten)]
    pub element: ElementDescriptor,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub button: i16,
}

/// Field content summary. `length` counts UTF-16 code units, the way the
/// DOM reports `value.length`. `hash` is present only under the opt-in
/// capture capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// `input`: element, field identity and content summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    #[serde(flatten)]
    pub element: ElementDescriptor,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub input: InputInfo,
}

/// Viewport as carried by scroll payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollViewport {
    pub w: u32,
    pub h: u32,
}

/// `scroll`: offset and viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollData {
    #[serde(rename = "scrollY", default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub viewport: ScrollViewport,
}

/// `page_visit`: where the page came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisitData {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: String,
}

/// `navigation`: the new location after a history-state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationData {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// `heartbeat`: liveness of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatData {
    #[serde(default)]
    pub url: String,
}

/// `key_press`: key identity and modifiers, never typed content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPressData {
    #[serde(default)]
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

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Click(ClickData),
    Input(InputData),
    Focus(ElementDescriptor),
    Blur(ElementDescriptor),
    Scroll(ScrollData),
    PageVisit(PageVisitData),
    Navigation(NavigationData),
    Heartbeat(HeartbeatData),
    KeyPress(KeyPressData),
}

impl EventData {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Click(_) => EventKind::Click,
            Self::Input(_) => EventKind::Input,
            Self::Focus(_) => EventKind::Focus,
            Self::Blur(_) => EventKind::Blur,
            Self::Scroll(_) => EventKind::Scroll,
            Self::PageVisit(_) => EventKind::PageVisit,
            Self::Navigation(_) => EventKind::Navigation,
            Self::Heartbeat(_) => EventKind::Heartbeat,
            Self::KeyPress(_) => EventKind::KeyPress,
        }
    }

    /// Element descriptor for element-driven kinds.
    #[must_use]
    pub fn element(&self) -> Option<&ElementDescriptor> {
        match self {
            Self::Click(d) => Some(&d.element),
            Self::Input(d) => Some(&d.element),
            Self::Focus(d) | Self::Blur(d) => Some(d),
            _ => None,
        }
    }

    /// Decode a payload whose shape is selected by `kind`.
    ///
    /// A missing or `null` payload decodes to the kind's empty payload.
    pub fn from_value(kind: EventKind, value: serde_json::Value) -> serde_json::Result<Self> {
        let value = if value.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            value
        };
        Ok(match kind {
            EventKind::Click => Self::Click(serde_json::from_value(value)?),
            EventKind::Input => Self::Input(serde_json::from_value(value)?),
            EventKind::Focus => Self::Focus(serde_json::from_value(value)?),
            EventKind::Blur => Self::Blur(serde_json::from_value(value)?),
            EventKind::Scroll => Self::Scroll(serde_json::from_value(value)?),
            EventKind::PageVisit => Self::PageVisit(serde_json::from_value(value)?),
            EventKind::Navigation => Self::Navigation(serde_json::from_value(value)?),
            EventKind::Heartbeat => Self::Heartbeat(serde_json::from_value(value)?),
            EventKind::KeyPress => Self::KeyPress(serde_json::from_value(value)?),
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// A normalized record before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEventRecord")]
pub struct EventRecord {
    pub event: EventKind,
    /// Producer capture time, ms since epoch. Not an ordering key.
    pub timestamp: i64,
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
    #[serde(rename = "scrollY")]
    pub scroll_y: f64,
    pub page_fingerprint: String,
    pub data: EventData,
}

impl EventRecord {
    /// Build a record from the page state at capture time.
    #[must_use]
    pub fn new(page: &PageSnapshot, timestamp: i64, data: EventData) -> Self {
        Self {
            event: data.kind(),
            timestamp,
            url: page.url.clone(),
            title: page.title.clone(),
            viewport: page.viewport,
            scroll_y: page.scroll_y,
            page_fingerprint: page_fingerprint(&page.hostname, &page.title),
            data,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.event
    }
}

/// Undecoded wire form of [`EventRecord`]; `data` is resolved by `event`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEventRecord {
    pub event: EventKind,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(rename = "scrollY", default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub page_fingerprint: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl TryFrom<RawEventRecord> for EventRecord {
    type Error = serde_json::Error;

    fn try_from(raw: RawEventRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            data: EventData::from_value(raw.event, raw.data)?,
            event: raw.event,
            timestamp: raw.timestamp,
            url: raw.url,
            title: raw.title,
            viewport: raw.viewport,
            scroll_y: raw.scroll_y,
            page_fingerprint: raw.page_fingerprint,
        })
    }
}

/// A record accepted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub record: EventRecord,
}

/// Non-cryptographic identity of a page instance, for grouping.
#[must_use]
pub fn page_fingerprint(hostname: &str, title: &str) -> String {
    format!("{hostname}|{title}")
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

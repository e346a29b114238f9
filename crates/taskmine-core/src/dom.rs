//! Capability interface over the observed document.
//!
//! Capture logic never touches a live browser. It sees elements through
//! [`DomElement`] and page state through [`Page`], so the locator, the
//! normalizer and the agent run against any document model. The crate ships
//! an in-memory implementation ([`MemoryDocument`], [`MemoryPage`]) used by
//! host bridges that mirror a DOM snapshot and by the test suites.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

// =============================================================================
// Element capability
// =============================================================================

/// Read-only view of one element node.
///
/// Implementations must be side-effect free: the locator walks ancestors and
/// siblings through these calls and expects identical answers for an
/// unmutated tree.
pub trait DomElement: Clone {
    /// Tag name as `Element.tagName` reports it (upper case for HTML).
    fn tag_name(&self) -> String;

    /// Attribute value, `None` when absent.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Parent element; `None` for the document element or a detached node.
    fn parent_element(&self) -> Option<Self>;

    /// Element children in document order.
    fn element_children(&self) -> Vec<Self>;

    /// Rendered text of the element and its descendants.
    fn text(&self) -> String;

    /// Current value for form controls.
    fn value(&self) -> Option<String>;

    /// Node identity (not structural equality).
    fn same_node(&self, other: &Self) -> bool;

    /// The `id` attribute, empty when absent.
    fn id(&self) -> String {
        self.attribute("id").unwrap_or_default()
    }

    /// The raw `class` attribute, empty when absent.
    fn class_name(&self) -> String {
        self.attribute("class").unwrap_or_default()
    }
}

// =============================================================================
// Page capability
// =============================================================================

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Ambient page state captured alongside every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub hostname: String,
    pub referrer: String,
    pub viewport: Viewport,
    pub scroll_y: f64,
}

impl PageSnapshot {
    /// Build a snapshot for `url`, deriving the hostname from it.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        let hostname = hostname_of(&url);
        Self {
            url,
            title: title.into(),
            hostname,
            ..Self::default()
        }
    }
}

/// Source of the current page state.
pub trait Page: Send + Sync {
    /// Element type of this page's document.
    type Element: DomElement;

    fn snapshot(&self) -> PageSnapshot;
}

/// Hostname of `url`, empty when it does not parse or has no host.
#[must_use]
pub fn hostname_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Mutable in-memory page state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    state: Arc<RwLock<PageSnapshot>>,
}

impl MemoryPage {
    #[must_use]
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Replace url and title, as a history-state change does.
    pub fn navigate(&self, url: impl Into<String>, title: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.url = url.into();
        state.hostname = hostname_of(&state.url);
        state.title = title.into();
    }

    pub fn set_scroll_y(&self, scroll_y: f64) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scroll_y = scroll_y;
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .viewport = Viewport { width, height };
    }

    pub fn set_referrer(&self, referrer: impl Into<String>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .referrer = referrer.into();
    }
}

impl Page for MemoryPage {
    type Element = MemoryElement;

    fn snapshot(&self) -> PageSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// =============================================================================
// In-memory document
// =============================================================================

#[derive(Debug, Clone, Default)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<usize>,
    children: Vec<usize>,
    text: String,
    value: Option<String>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<NodeData>,
}

/// Element tree held in memory.
///
/// Starts as `<html><head></head><body></body></html>`. Nodes are never
/// freed; [`MemoryElement::detach`] only unlinks them, which is how a
/// detached event target is modelled.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    arena: Arc<RwLock<Arena>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    #[must_use]
    pub fn new() -> Self {
        let doc = Self {
            arena: Arc::new(RwLock::new(Arena::default())),
        };
        let html = doc.create_element("html");
        html.append_element("head");
        html.append_element("body");
        doc
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, index: usize) -> MemoryElement {
        MemoryElement {
            doc: self.clone(),
            index,
        }
    }

    /// The `<html>` element.
    #[must_use]
    pub fn document_element(&self) -> MemoryElement {
        self.handle(0)
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> MemoryElement {
        self.document_element()
            .element_children()
            .into_iter()
            .find(|child| child.tag_name() == "BODY")
            .unwrap_or_else(|| self.document_element())
    }

    /// Create a detached element.
    #[must_use]
    pub fn create_element(&self, tag: &str) -> MemoryElement {
        let mut arena = self.write();
        arena.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            ..NodeData::default()
        });
        let index = arena.nodes.len() - 1;
        drop(arena);
        self.handle(index)
    }

    /// First element (document order) whose `id` attribute equals `id`.
    #[must_use]
    pub fn get_element_by_id(&self, id: &str) -> Option<MemoryElement> {
        let mut stack = vec![0usize];
        let arena = self.read();
        while let Some(index) = stack.pop() {
            let node = &arena.nodes[index];
            if node.attributes.get("id").is_some_and(|v| v == id) {
                return Some(self.handle(index));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }
}

/// Handle to one element of a [`MemoryDocument`].
#[derive(Debug, Clone)]
pub struct MemoryElement {
    doc: MemoryDocument,
    index: usize,
}

impl MemoryElement {
    /// Create a child element with `tag` and append it.
    pub fn append_element(&self, tag: &str) -> MemoryElement {
        let child = self.doc.create_element(tag);
        self.append_child(&child);
        child
    }

    /// Append `child`, detaching it from any previous parent first.
    ///
    /// Returns `false` and leaves the tree unchanged when `child` is this
    /// element or one of its ancestors.
    pub fn append_child(&self, child: &MemoryElement) -> bool {
        let mut arena = self.doc.write();
        let mut cursor = Some(self.index);
        while let Some(index) = cursor {
            if index == child.index {
                return false;
            }
            cursor = arena.nodes[index].parent;
        }
        if let Some(parent) = arena.nodes[child.index].parent.take() {
            arena.nodes[parent].children.retain(|&c| c != child.index);
        }
        arena.nodes[self.index].children.push(child.index);
        arena.nodes[child.index].parent = Some(self.index);
        true
    }

    /// Unlink the element from its parent.
    pub fn detach(&self) {
        let mut arena = self.doc.write();
        if let Some(parent) = arena.nodes[self.index].parent.take() {
            let index = self.index;
            arena.nodes[parent].children.retain(|&c| c != index);
        }
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> &Self {
        self.doc.write().nodes[self.index]
            .attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn set_text(&self, text: &str) -> &Self {
        self.doc.write().nodes[self.index].text = text.to_string();
        self
    }

    pub fn set_value(&self, value: &str) -> &Self {
        self.doc.write().nodes[self.index].value = Some(value.to_string());
        self
    }

    fn collect_text(arena: &Arena, index: usize, out: &mut String) {
        let node = &arena.nodes[index];
        out.push_str(&node.text);
        for &child in &node.children {
            Self::collect_text(arena, child, out);
        }
    }
}

impl DomElement for MemoryElement {
    fn tag_name(&self) -> String {
        self.doc.read().nodes[self.index].tag.to_ascii_uppercase()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.doc.read().nodes[self.index]
            .attributes
            .get(name)
            .cloned()
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.doc.read().nodes[self.index].parent;
        parent.map(|index| self.doc.handle(index))
    }

    fn element_children(&self) -> Vec<Self> {
        let children = self.doc.read().nodes[self.index].children.clone();
        children
            .into_iter()
            .map(|index| self.doc.handle(index))
            .collect()
    }

    fn text(&self) -> String {
        let arena = self.doc.read();
        let mut out = String::new();
        Self::collect_text(&arena, self.index, &mut out);
        out
    }

    fn value(&self) -> Option<String> {
        self.doc.read().nodes[self.index].value.clone()
    }

    fn same_node(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc.arena, &other.doc.arena) && self.index == other.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_head_and_body() {
        let doc = MemoryDocument::new();
        let html = doc.document_element();
        assert_eq!(html.tag_name(), "HTML");
        assert!(html.parent_element().is_none());
        let tags: Vec<String> = html.element_children().iter().map(|c| c.tag_name()).collect();
        assert_eq!(tags, vec!["HEAD", "BODY"]);
        assert_eq!(doc.body().parent_element().unwrap().tag_name(), "HTML");
    }

    #[test]
    fn text_concatenates_descendants() {
        let doc = MemoryDocument::new();
        let p = doc.body().append_element("p");
        p.set_text("Hello ");
        p.append_element("b").set_text("world");
        assert_eq!(p.text(), "Hello world");
    }

    #[test]
    fn detach_unlinks_from_parent() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let div = body.append_element("div");
        div.detach();
        assert!(div.parent_element().is_none());
        assert!(body.element_children().is_empty());
    }

    #[test]
    fn append_child_moves_between_parents() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let left = body.append_element("div");
        let right = body.append_element("div");
        let item = left.append_element("span");
        assert!(right.append_child(&item));
        assert!(left.element_children().is_empty());
        assert!(item.parent_element().unwrap().same_node(&right));
    }

    #[test]
    fn append_child_rejects_cycles() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let outer = body.append_element("div");
        let inner = outer.append_element("div");
        assert!(!inner.append_child(&outer));
        assert!(!outer.append_child(&outer));
        assert!(!inner.append_child(&body));
        assert!(outer.parent_element().unwrap().same_node(&body));
        assert!(inner.parent_element().unwrap().same_node(&outer));
        assert_eq!(
            crate::locator::xpath(&inner).as_deref(),
            Some("/html[1]/body[1]/div[1]/div[1]")
        );
    }

    #[test]
    fn get_element_by_id_finds_nested() {
        let doc = MemoryDocument::new();
        let form = doc.body().append_element("form");
        let input = form.append_element("input");
        input.set_attribute("id", "email");
        let found = doc.get_element_by_id("email").unwrap();
        assert!(found.same_node(&input));
        assert!(doc.get_element_by_id("missing").is_none());
    }

    #[test]
    fn page_navigation_updates_hostname() {
        let page = MemoryPage::new(PageSnapshot::new("https://example.com/a", "A"));
        assert_eq!(page.snapshot().hostname, "example.com");
        page.navigate("https://docs.example.org/b?q=1", "B");
        let snap = page.snapshot();
        assert_eq!(snap.hostname, "docs.example.org");
        assert_eq!(snap.title, "B");
    }

    #[test]
    fn hostname_of_unparseable_url_is_empty() {
        assert_eq!(hostname_of("not a url"), "");
        assert_eq!(hostname_of("about:blank"), "");
    }
}

//! Element descriptors embedded in element-driven records.

use serde::{Deserialize, Serialize};

use crate::dom::DomElement;
use crate::locator::{self, Location};

/// Marker appended to truncated text previews.
pub const TRUNCATION_MARKER: char = '…';

/// Default preview bound, in characters.
pub const DEFAULT_PREVIEW_CHARS: usize = 120;

/// What a record says about the element behind an interaction.
///
/// Every field degrades to empty/`None` rather than failing, so an absent or
/// detached target still produces a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub xpath: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Describe `element` with a text preview of at most `preview_chars`
/// characters (plus the truncation marker).
pub fn describe<E: DomElement>(element: Option<&E>, preview_chars: usize) -> ElementDescriptor {
    let Some(el) = element else {
        return ElementDescriptor::default();
    };
    let Location { selector, xpath } = locator::locate(Some(el));
    ElementDescriptor {
        tag: el.tag_name(),
        id: el.id(),
        classes: el.class_name(),
        selector,
        xpath,
        text: short_text(&el.text(), preview_chars),
    }
}

/// Trim `text` and cut it to `max_chars` characters, marking the cut.
///
/// The bound is in Unicode scalar values, so a multi-byte character is never
/// split.
pub fn short_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len_utf8());
            out.push_str(&trimmed[..cut]);
            out.push(TRUNCATION_MARKER);
            out
        }
        None => trimmed.to_string(),
    }
}

/// Field identity: first non-empty of `name`, `id`, `aria-label`,
/// `placeholder`.
pub fn field_name<E: DomElement>(element: &E) -> String {
    ["name", "id", "aria-label", "placeholder"]
        .iter()
        .filter_map(|attr| element.attribute(attr))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Field type: the `type` attribute, falling back to the tag name.
pub fn field_type<E: DomElement>(element: &E) -> String {
    element
        .attribute("type")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| element.tag_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, MemoryElement};

    #[test]
    fn short_text_trims_and_keeps_short_input() {
        assert_eq!(short_text("  Save  ", 120), "Save");
        assert_eq!(short_text("", 120), "");
    }

    #[test]
    fn short_text_truncates_with_marker() {
        let long = "x".repeat(500);
        let out = short_text(&long, 120);
        assert_eq!(out.chars().count(), 121);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn short_text_exact_bound_is_not_marked() {
        let exact = "y".repeat(120);
        assert_eq!(short_text(&exact, 120), exact);
    }

    #[test]
    fn short_text_respects_char_boundaries() {
        let text = "é".repeat(10);
        let out = short_text(&text, 3);
        assert_eq!(out, "ééé…");
    }

    #[test]
    fn describe_fills_every_field() {
        let doc = MemoryDocument::new();
        let button = doc.body().append_element("button");
        button
            .set_attribute("id", "go")
            .set_attribute("class", "btn btn-primary")
            .set_text("  Go now ");
        let desc = describe(Some(&button), DEFAULT_PREVIEW_CHARS);
        assert_eq!(desc.tag, "BUTTON");
        assert_eq!(desc.id, "go");
        assert_eq!(desc.classes, "btn btn-primary");
        assert_eq!(desc.selector.as_deref(), Some("#go"));
        assert_eq!(desc.xpath.as_deref(), Some("/html[1]/body[1]/button[1]"));
        assert_eq!(desc.text, "Go now");
    }

    #[test]
    fn describe_absent_element_is_empty() {
        assert_eq!(
            describe::<MemoryElement>(None, DEFAULT_PREVIEW_CHARS),
            ElementDescriptor::default()
        );
    }

    #[test]
    fn field_name_prefers_first_non_empty() {
        let doc = MemoryDocument::new();
        let input = doc.body().append_element("input");
        input
            .set_attribute("name", "")
            .set_attribute("aria-label", "Email address")
            .set_attribute("placeholder", "you@example.com");
        assert_eq!(field_name(&input), "Email address");
        assert_eq!(field_type(&input), "INPUT");
        input.set_attribute("type", "email");
        assert_eq!(field_type(&input), "email");
    }
}

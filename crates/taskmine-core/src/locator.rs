//! Element locator: stable path descriptors for an interaction target.
//!
//! Two independent descriptors are derived from the current tree:
//!
//! - a CSS path, short when possible (`#id` if the element has one,
//!   otherwise `tag.firstClass` segments joined with ` > `, positional
//!   `:nth-child(k)` only where same-tag siblings exist);
//! - an absolute XPath that indexes every level by same-name preceding
//!   siblings, which stays unambiguous when the CSS path is not.
//!
//! Both are pure functions of the tree: no mutation, no retained handles.

use serde::{Deserialize, Serialize};

use crate::dom::DomElement;

/// Separator between CSS path segments (child combinator).
pub const CHILD_COMBINATOR: &str = " > ";

/// Path descriptors for one element; both `None` for an absent target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub selector: Option<String>,
    pub xpath: Option<String>,
}

/// Derive both descriptors for `element`.
pub fn locate<E: DomElement>(element: Option<&E>) -> Location {
    match element {
        Some(el) => Location {
            selector: css_selector(el),
            xpath: xpath(el),
        },
        None => Location::default(),
    }
}

/// CSS path for `element`.
///
/// Walks from the element up to, but excluding, `<html>`. Returns `None`
/// only when there is nothing to describe (the element is `<html>` itself).
pub fn css_selector<E: DomElement>(element: &E) -> Option<String> {
    let id = element.id();
    if !id.is_empty() {
        return Some(format!("#{id}"));
    }

    let mut parts = Vec::new();
    let mut current = Some(element.clone());
    while let Some(el) = current {
        let tag = el.tag_name().to_ascii_lowercase();
        if tag == "html" {
            break;
        }
        let parent = el.parent_element();
        parts.push(segment(&el, &tag, parent.as_ref()));
        current = parent;
    }

    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join(CHILD_COMBINATOR))
}

fn segment<E: DomElement>(el: &E, tag: &str, parent: Option<&E>) -> String {
    let mut part = tag.to_string();
    if let Some(class) = el.class_name().split_whitespace().next() {
        part.push('.');
        part.push_str(class);
    }

    if let Some(parent) = parent {
        let children = parent.element_children();
        let tag_name = el.tag_name();
        let same_tag = children
            .iter()
            .filter(|c| c.tag_name() == tag_name)
            .count();
        if same_tag > 1 {
            // nth-child counts every element child, not just same-tag ones
            if let Some(pos) = children.iter().position(|c| c.same_node(el)) {
                part.push_str(&format!(":nth-child({})", pos + 1));
            }
        }
    }
    part
}

/// Absolute XPath for `element`, e.g. `/html[1]/body[1]/div[2]`.
pub fn xpath<E: DomElement>(element: &E) -> Option<String> {
    let mut steps = Vec::new();
    let mut current = Some(element.clone());
    while let Some(el) = current {
        let parent = el.parent_element();
        let index = parent
            .as_ref()
            .map_or(1, |p| same_name_position(p, &el));
        steps.push(format!(
            "/{}[{index}]",
            el.tag_name().to_ascii_lowercase()
        ));
        current = parent;
    }

    if steps.is_empty() {
        return None;
    }
    steps.reverse();
    Some(steps.concat())
}

/// 1-based position of `el` among same-name siblings under `parent`.
fn same_name_position<E: DomElement>(parent: &E, el: &E) -> usize {
    let name = el.tag_name();
    let mut index = 1;
    for sibling in parent.element_children() {
        if sibling.same_node(el) {
            break;
        }
        if sibling.tag_name() == name {
            index += 1;
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, MemoryElement};

    fn list_doc() -> (MemoryDocument, MemoryElement, MemoryElement) {
        let doc = MemoryDocument::new();
        let ul = doc.body().append_element("ul");
        ul.set_attribute("class", "menu  primary");
        let first = ul.append_element("li");
        let second = ul.append_element("li");
        second.set_attribute("class", "active");
        (doc, first, second)
    }

    #[test]
    fn id_short_circuits_selector() {
        let doc = MemoryDocument::new();
        let button = doc.body().append_element("button");
        button.set_attribute("id", "go");
        assert_eq!(css_selector(&button).as_deref(), Some("#go"));
    }

    #[test]
    fn empty_id_falls_back_to_path() {
        let doc = MemoryDocument::new();
        let button = doc.body().append_element("button");
        button.set_attribute("id", "");
        assert_eq!(css_selector(&button).as_deref(), Some("body > button"));
    }

    #[test]
    fn same_tag_siblings_get_nth_child() {
        let (_doc, first, second) = list_doc();
        assert_eq!(
            css_selector(&first).as_deref(),
            Some("body > ul.menu > li:nth-child(1)")
        );
        assert_eq!(
            css_selector(&second).as_deref(),
            Some("body > ul.menu > li.active:nth-child(2)")
        );
    }

    #[test]
    fn nth_child_counts_all_element_children() {
        let doc = MemoryDocument::new();
        let div = doc.body().append_element("div");
        div.append_element("span");
        div.append_element("p");
        let target = div.append_element("p");
        assert_eq!(
            css_selector(&target).as_deref(),
            Some("body > div > p:nth-child(3)")
        );
        assert_eq!(
            xpath(&target).as_deref(),
            Some("/html[1]/body[1]/div[1]/p[2]")
        );
    }

    #[test]
    fn xpath_indexes_same_name_siblings() {
        let (_doc, first, second) = list_doc();
        assert_eq!(xpath(&first).as_deref(), Some("/html[1]/body[1]/ul[1]/li[1]"));
        assert_eq!(xpath(&second).as_deref(), Some("/html[1]/body[1]/ul[1]/li[2]"));
    }

    #[test]
    fn xpath_ignores_id() {
        let doc = MemoryDocument::new();
        let button = doc.body().append_element("button");
        button.set_attribute("id", "go");
        assert_eq!(xpath(&button).as_deref(), Some("/html[1]/body[1]/button[1]"));
    }

    #[test]
    fn html_element_has_no_css_path() {
        let doc = MemoryDocument::new();
        let html = doc.document_element();
        assert_eq!(css_selector(&html), None);
        assert_eq!(xpath(&html).as_deref(), Some("/html[1]"));
    }

    #[test]
    fn detached_element_describes_its_own_subtree() {
        let doc = MemoryDocument::new();
        let div = doc.create_element("div");
        let span = div.append_element("span");
        assert_eq!(css_selector(&span).as_deref(), Some("div > span"));
        assert_eq!(xpath(&span).as_deref(), Some("/div[1]/span[1]"));
    }

    #[test]
    fn absent_target_yields_empty_location() {
        let location = locate::<MemoryElement>(None);
        assert_eq!(location, Location::default());
    }

    #[test]
    fn repeated_locate_is_identical() {
        let (_doc, _first, second) = list_doc();
        assert_eq!(locate(Some(&second)), locate(Some(&second)));
    }
}

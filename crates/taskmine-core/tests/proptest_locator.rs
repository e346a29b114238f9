//! Property-based tests for the element locator.
//!
//! Trees are generated under `<body>` with a small tag alphabet so that
//! same-tag siblings are common.

use proptest::prelude::*;

use taskmine_core::dom::{DomElement, MemoryDocument, MemoryElement};
use taskmine_core::locator::{self, CHILD_COMBINATOR};

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
struct NodeSpec {
    parent_pick: usize,
    tag: &'static str,
    id: Option<String>,
    class: Option<String>,
}

fn arb_tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("div"), Just("span"), Just("li"), Just("a"), Just("input")]
}

fn arb_node() -> impl Strategy<Value = NodeSpec> {
    (
        any::<usize>(),
        arb_tag(),
        prop::option::weighted(0.2, "[a-z][a-z0-9_-]{0,7}"),
        prop::option::weighted(0.5, "[a-z]{1,6}( [a-z]{1,6})?"),
    )
        .prop_map(|(parent_pick, tag, id, class)| NodeSpec {
            parent_pick,
            tag,
            id,
            class,
        })
}

fn arb_tree() -> impl Strategy<Value = Vec<NodeSpec>> {
    prop::collection::vec(arb_node(), 1..24)
}

/// Build the tree; returns the created elements in creation order.
fn build(specs: &[NodeSpec]) -> (MemoryDocument, Vec<MemoryElement>) {
    let doc = MemoryDocument::new();
    let body = doc.body();
    let mut nodes: Vec<MemoryElement> = Vec::with_capacity(specs.len());
    for spec in specs {
        let pick = spec.parent_pick % (nodes.len() + 1);
        let parent = if pick == 0 { body.clone() } else { nodes[pick - 1].clone() };
        let el = parent.append_element(spec.tag);
        if let Some(id) = &spec.id {
            el.set_attribute("id", id);
        }
        if let Some(class) = &spec.class {
            el.set_attribute("class", class);
        }
        nodes.push(el);
    }
    (doc, nodes)
}

fn has_same_tag_sibling(el: &MemoryElement) -> bool {
    el.parent_element().is_some_and(|parent| {
        parent
            .element_children()
            .iter()
            .filter(|c| c.tag_name() == el.tag_name())
            .count()
            > 1
    })
}

/// Resolve an absolute xpath produced by the locator against `doc`.
fn resolve(doc: &MemoryDocument, xpath: &str) -> Option<MemoryElement> {
    let mut steps = xpath.trim_start_matches('/').split('/');
    let first = steps.next()?;
    if first != "html[1]" {
        return None;
    }
    let mut current = doc.document_element();
    for step in steps {
        let (tag, rest) = step.split_once('[')?;
        let index: usize = rest.trim_end_matches(']').parse().ok()?;
        let tag = tag.to_ascii_uppercase();
        current = current
            .element_children()
            .into_iter()
            .filter(|c| c.tag_name() == tag)
            .nth(index.checked_sub(1)?)?;
    }
    Some(current)
}

// =============================================================================
// Selector properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn id_selector_is_the_id_alone(specs in arb_tree()) {
        let (_doc, nodes) = build(&specs);
        for (spec, el) in specs.iter().zip(&nodes) {
            if let Some(id) = &spec.id {
                prop_assert_eq!(locator::css_selector(el), Some(format!("#{id}")));
            }
        }
    }

    #[test]
    fn positional_index_only_for_same_tag_siblings(specs in arb_tree()) {
        let (_doc, nodes) = build(&specs);
        for el in nodes.iter().filter(|el| el.id().is_empty()) {
            let selector = locator::css_selector(el).unwrap();
            let last = selector.rsplit(CHILD_COMBINATOR).next().unwrap();
            prop_assert_eq!(
                last.contains(":nth-child("),
                has_same_tag_sibling(el),
                "selector {}", selector
            );
        }
    }

    #[test]
    fn selector_has_one_segment_per_level_below_html(specs in arb_tree()) {
        let (_doc, nodes) = build(&specs);
        for el in nodes.iter().filter(|el| el.id().is_empty()) {
            let selector = locator::css_selector(el).unwrap();
            let xpath = locator::xpath(el).unwrap();
            let levels = xpath.matches('/').count();
            prop_assert_eq!(selector.split(CHILD_COMBINATOR).count(), levels - 1);
            prop_assert!(selector.starts_with("body"));
        }
    }
}

// =============================================================================
// XPath properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn xpath_is_deterministic(specs in arb_tree()) {
        let (_doc, nodes) = build(&specs);
        for el in &nodes {
            prop_assert_eq!(locator::xpath(el), locator::xpath(el));
            prop_assert_eq!(locator::locate(Some(el)), locator::locate(Some(el)));
        }
    }

    #[test]
    fn xpath_resolves_to_the_same_element(specs in arb_tree()) {
        let (doc, nodes) = build(&specs);
        for el in &nodes {
            let xpath = locator::xpath(el).unwrap();
            prop_assert!(xpath.starts_with("/html[1]/body[1]/"));
            let found = resolve(&doc, &xpath);
            prop_assert!(found.is_some_and(|f| f.same_node(el)), "xpath {}", xpath);
        }
    }

    #[test]
    fn absent_target_yields_no_descriptors(_dummy in 0..1i32) {
        let location = locator::locate::<MemoryElement>(None);
        prop_assert!(location.selector.is_none());
        prop_assert!(location.xpath.is_none());
    }
}

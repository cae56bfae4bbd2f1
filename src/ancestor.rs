//! Bounded common-ancestor search over the parent-pointer map
//!
//! Offender spans of a confirmed pattern usually hang off one structural
//! parent (the request handler or loop body issuing the queries). That span
//! anchors the fingerprint, so the search picks the *nearest* common
//! ancestor: it yields the most specific grouping.
//!
//! Cost is bounded by construction: each offender walks at most
//! `max_allowable_depth` parent-map hops, so the search is linear in the
//! number of offenders and independent of total event size. Only the final
//! id-to-span resolution scans the event's span list, once per emitted
//! problem.

use crate::span::{Event, Span};
use std::collections::{HashMap, HashSet};

/// Find the nearest common ancestor of all `spans`, or `None` when any span
/// lacks an id, the chains share no ancestor within the depth bound, or the
/// shared id does not resolve to a span in the event.
///
/// Each walk collects ancestors nearest-first and stops early once it
/// reaches an id already in the running intersection; the ancestors beyond
/// the first shared one cannot change the result, and the early stop keeps
/// the selection identical when several common ancestors exist at different
/// depths. The final choice is the first intersection member of the
/// last-processed chain, which is the nearest one.
pub fn find_common_parent_span<'e>(
    spans: &[Span],
    parent_map: &HashMap<String, String>,
    event: &'e Event,
    max_allowable_depth: usize,
) -> Option<&'e Span> {
    let mut common_ancestors: Option<HashSet<&str>> = None;
    let mut last_chain: Vec<&str> = Vec::new();

    for span in spans {
        let span_id = span.span_id.as_deref()?;

        let mut chain: Vec<&str> = Vec::new();
        let mut current = span_id;
        for _ in 0..max_allowable_depth {
            let Some(parent_id) = parent_map.get(current) else {
                break;
            };
            chain.push(parent_id);
            if let Some(ancestors) = &common_ancestors {
                if ancestors.contains(parent_id.as_str()) {
                    break;
                }
            }
            current = parent_id;
        }

        common_ancestors = match common_ancestors.take() {
            None => Some(chain.iter().copied().collect()),
            Some(mut ancestors) => {
                let chain_set: HashSet<&str> = chain.iter().copied().collect();
                ancestors.retain(|id| chain_set.contains(id));
                Some(ancestors)
            }
        };

        if common_ancestors
            .as_ref()
            .is_some_and(|ancestors| ancestors.is_empty())
        {
            return None;
        }

        last_chain = chain;
    }

    let common_ancestors = common_ancestors?;
    let parent_id = last_chain
        .iter()
        .find(|id| common_ancestors.contains(**id))?;

    event.span_by_id(parent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(span_id: &str, parent_span_id: Option<&str>) -> Span {
        Span {
            span_id: Some(span_id.to_string()),
            parent_span_id: parent_span_id.map(str::to_string),
            op: Some("db".to_string()),
            ..Default::default()
        }
    }

    fn parent_map(edges: &[(&str, &str)]) -> HashMap<String, String> {
        edges
            .iter()
            .map(|(child, parent)| (child.to_string(), parent.to_string()))
            .collect()
    }

    fn event_with_span_ids(ids: &[&str]) -> Event {
        Event::new(
            None,
            ids.iter().map(|id| span(id, None)).collect(),
        )
    }

    #[test]
    fn test_shared_direct_parent() {
        // root -> parent -> {a, b}
        let map = parent_map(&[("a", "parent"), ("b", "parent"), ("parent", "root")]);
        let event = event_with_span_ids(&["root", "parent", "a", "b"]);

        let found = find_common_parent_span(
            &[span("a", Some("parent")), span("b", Some("parent"))],
            &map,
            &event,
            10,
        );
        assert_eq!(found.unwrap().span_id.as_deref(), Some("parent"));
    }

    #[test]
    fn test_nearest_of_several_common_ancestors() {
        // root -> mid -> {a, b}: both root and mid are common, mid is nearer
        let map = parent_map(&[("a", "mid"), ("b", "mid"), ("mid", "root")]);
        let event = event_with_span_ids(&["root", "mid", "a", "b"]);

        let found =
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 10);
        assert_eq!(found.unwrap().span_id.as_deref(), Some("mid"));
    }

    #[test]
    fn test_uneven_depths() {
        // a sits two levels below the ancestor that b hangs off directly
        let map = parent_map(&[("a", "inner"), ("inner", "mid"), ("b", "mid"), ("mid", "root")]);
        let event = event_with_span_ids(&["root", "mid", "inner", "a", "b"]);

        let found =
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 10);
        assert_eq!(found.unwrap().span_id.as_deref(), Some("mid"));
    }

    #[test]
    fn test_depth_bound_cuts_off_search() {
        let map = parent_map(&[("a", "inner"), ("inner", "mid"), ("b", "mid"), ("mid", "root")]);
        let event = event_with_span_ids(&["root", "mid", "inner", "a", "b"]);

        // a's walk reaches only "inner" with depth 1, which b never sees
        let found =
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 1);
        assert!(found.is_none());
    }

    #[test]
    fn test_missing_span_id_aborts() {
        let map = parent_map(&[("a", "parent")]);
        let event = event_with_span_ids(&["parent", "a"]);

        let anonymous = Span {
            op: Some("db".to_string()),
            ..Default::default()
        };
        assert!(find_common_parent_span(&[span("a", None), anonymous], &map, &event, 10).is_none());
    }

    #[test]
    fn test_disjoint_trees() {
        let map = parent_map(&[("a", "left"), ("b", "right")]);
        let event = event_with_span_ids(&["left", "right", "a", "b"]);

        assert!(
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 10)
                .is_none()
        );
    }

    #[test]
    fn test_unresolvable_ancestor_id() {
        // parent exists in the map but not among the event's spans
        let map = parent_map(&[("a", "ghost"), ("b", "ghost")]);
        let event = event_with_span_ids(&["a", "b"]);

        assert!(
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 10)
                .is_none()
        );
    }

    #[test]
    fn test_no_offenders() {
        let map = parent_map(&[]);
        let event = event_with_span_ids(&[]);
        assert!(find_common_parent_span(&[], &map, &event, 10).is_none());
    }

    #[test]
    fn test_early_exit_preserves_nearest_selection() {
        // Chain a: a -> p1 -> p2 -> root, chain b: b -> p2 -> root.
        // Processing a first seeds {p1, p2, root}; b's walk stops at p2 (already
        // in the running set), so the final chain is [p2] and p2 wins even
        // though root is also common.
        let map = parent_map(&[("a", "p1"), ("p1", "p2"), ("p2", "root"), ("b", "p2")]);
        let event = event_with_span_ids(&["root", "p2", "p1", "a", "b"]);

        let found =
            find_common_parent_span(&[span("a", None), span("b", None)], &map, &event, 10);
        assert_eq!(found.unwrap().span_id.as_deref(), Some("p2"));
    }
}

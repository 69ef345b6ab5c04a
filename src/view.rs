// Expand/collapse state for rendered thread trees

use crate::threads::ThreadNode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

static SOURCE_URL: OnceLock<Regex> = OnceLock::new();

fn source_url_regex() -> &'static Regex {
    SOURCE_URL.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

/// First link in a message, shown as its "view source" target
pub fn extract_source_url(content: &str) -> Option<String> {
    source_url_regex()
        .find(content)
        .map(|m| m.as_str().to_string())
}

/// A node as it appears in the rendered (visible) traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleNode {
    pub id: String,
    pub content: String,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
    pub source_url: Option<String>,
}

/// Tracks which thread nodes are expanded, independent of tree structure.
///
/// Flags of nodes hidden under a collapsed ancestor are kept, so re-expanding
/// the ancestor restores the subtree exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    expanded: HashSet<String>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a node's expanded flag. No effect on ancestors or descendants.
    pub fn toggle(&mut self, node_id: &str) {
        if !self.expanded.remove(node_id) {
            self.expanded.insert(node_id.to_string());
        }
    }

    pub fn is_expanded(&self, node_id: &str) -> bool {
        self.expanded.contains(node_id)
    }

    /// Collapse everything; used when a new analysis starts
    pub fn reset_all(&mut self) {
        self.expanded.clear();
    }

    /// Expand every node of a tree that has children
    pub fn expand_all(&mut self, root: &ThreadNode) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.has_children() {
                self.expanded.insert(node.id.clone());
            }
            stack.extend(node.children.iter());
        }
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    /// Depth-first, pre-order list of the nodes currently displayed.
    ///
    /// Roots are always shown; a node's children are shown only while the
    /// node itself is expanded.
    pub fn visible(&self, roots: &[ThreadNode]) -> Vec<VisibleNode> {
        let mut out = Vec::new();
        let mut stack: Vec<(&ThreadNode, usize)> =
            roots.iter().rev().map(|root| (root, 0)).collect();

        while let Some((node, depth)) = stack.pop() {
            let expanded = self.is_expanded(&node.id);
            out.push(VisibleNode {
                id: node.id.clone(),
                content: node.content.clone(),
                depth,
                has_children: node.has_children(),
                expanded,
                source_url: extract_source_url(&node.content),
            });

            if expanded {
                stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::{build, RawReplyChain};

    fn abc_tree() -> ThreadNode {
        let raw = RawReplyChain::leaf("A", "a")
            .with_child(RawReplyChain::leaf("B", "b").with_child(RawReplyChain::leaf("C", "c")));
        build(Some(&raw)).unwrap().unwrap()
    }

    fn visible_ids(view: &ViewState, roots: &[ThreadNode]) -> Vec<String> {
        view.visible(roots).into_iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut view = ViewState::new();
        assert!(!view.is_expanded("A"));

        view.toggle("A");
        assert!(view.is_expanded("A"));

        view.toggle("A");
        assert!(!view.is_expanded("A"));
        assert_eq!(view.expanded_count(), 0);
    }

    #[test]
    fn test_toggle_does_not_cascade() {
        let mut view = ViewState::new();
        view.toggle("A");
        assert!(!view.is_expanded("B"));
        assert!(!view.is_expanded("C"));
    }

    #[test]
    fn test_reset_all_clears() {
        let mut view = ViewState::new();
        view.toggle("A");
        view.toggle("B");
        view.reset_all();
        assert!(!view.is_expanded("A"));
        assert!(!view.is_expanded("B"));
    }

    #[test]
    fn test_collapsed_root_shows_only_root() {
        let view = ViewState::new();
        let roots = vec![abc_tree()];
        assert_eq!(visible_ids(&view, &roots), vec!["A"]);
    }

    #[test]
    fn test_expanding_reveals_one_level_at_a_time() {
        let mut view = ViewState::new();
        let roots = vec![abc_tree()];

        view.toggle("A");
        assert_eq!(visible_ids(&view, &roots), vec!["A", "B"]);

        view.toggle("B");
        assert_eq!(visible_ids(&view, &roots), vec!["A", "B", "C"]);

        let depths: Vec<usize> = view.visible(&roots).iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[test]
    fn test_collapse_is_sticky_for_descendants() {
        let mut view = ViewState::new();
        let roots = vec![abc_tree()];
        view.toggle("A");
        view.toggle("B");
        let before = visible_ids(&view, &roots);

        // Collapse the ancestor: descendants hidden, their flags untouched
        view.toggle("A");
        assert_eq!(visible_ids(&view, &roots), vec!["A"]);
        assert!(view.is_expanded("B"));

        // Re-expand: previous visible set comes back
        view.toggle("A");
        assert_eq!(visible_ids(&view, &roots), before);
    }

    #[test]
    fn test_multiple_roots_keep_order() {
        let mut view = ViewState::new();
        let second = build(Some(&RawReplyChain::leaf("Z", "z"))).unwrap().unwrap();
        let roots = vec![abc_tree(), second];
        view.toggle("A");
        assert_eq!(visible_ids(&view, &roots), vec!["A", "B", "Z"]);
    }

    #[test]
    fn test_expand_all() {
        let mut view = ViewState::new();
        let tree = abc_tree();
        view.expand_all(&tree);
        // Leaf C has nothing to expand
        assert_eq!(view.expanded_count(), 2);
        assert_eq!(visible_ids(&view, &[tree]), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_visible_node_flags_and_source_url() {
        let raw = RawReplyChain::leaf("A", "read https://example.com/post now")
            .with_child(RawReplyChain::leaf("B", "no link"));
        let tree = build(Some(&raw)).unwrap().unwrap();
        let view = ViewState::new();

        let nodes = view.visible(&[tree]);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].has_children);
        assert!(!nodes[0].expanded);
        assert_eq!(
            nodes[0].source_url.as_deref(),
            Some("https://example.com/post")
        );
    }

    #[test]
    fn test_extract_source_url_none() {
        assert_eq!(extract_source_url("plain text"), None);
    }
}

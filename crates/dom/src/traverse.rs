//! Depth-first traversal that survives tree mutation.
//!
//! The cursor does not borrow the tree; every step takes `&Tree`, which
//! is what lets hook code remove nodes while a walk is in flight. Two
//! controls are observable:
//! - [`Cursor::skip_children`] keeps the next step from descending into
//!   the node just yielded;
//! - removing the yielded node (or one of its ancestors) makes the walk
//!   resume at what would have been that node's next sibling, never
//!   visiting descendants of removed nodes.
//!
//! Recovery uses the last known index-in-parent: detached arena slots
//! stay readable, so when the current node no longer hangs off its
//! recorded parent the remembered index points at the old next sibling.

use crate::types::{NodeId, Tree};

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: NodeId,
    node: NodeId,
    /// Index of `node` in `parent.children` when the frame was entered.
    index: usize,
}

#[derive(Debug)]
pub struct Cursor {
    stack: Vec<Frame>,
    skip: bool,
    started: bool,
}

impl Cursor {
    pub fn new(_tree: &Tree) -> Self {
        Self {
            stack: Vec::new(),
            skip: false,
            started: false,
        }
    }

    /// Do not descend into the most recently yielded node.
    pub fn skip_children(&mut self) {
        self.skip = true;
    }

    /// Advance and yield the next node in depth-first order, or `None`
    /// when the walk is complete. The root itself is not yielded.
    pub fn next(&mut self, tree: &Tree) -> Option<NodeId> {
        if !self.started {
            self.started = true;
            let root = tree.root();
            let first = *tree.children(root).first()?;
            self.stack.push(Frame {
                parent: root,
                node: first,
                index: 0,
            });
            return Some(first);
        }

        let descend = !self.skip;
        self.skip = false;

        if descend
            && let Some(top) = self.stack.last()
            && tree.parent(top.node) == Some(top.parent)
            && let Some(&first) = tree.children(top.node).first()
        {
            let parent = top.node;
            self.stack.push(Frame {
                parent,
                node: first,
                index: 0,
            });
            return Some(first);
        }

        while let Some(frame) = self.stack.pop() {
            let siblings = tree.children(frame.parent);
            let next_index = if tree.parent(frame.node) == Some(frame.parent) {
                // Still attached: position may have shifted if earlier
                // siblings were removed.
                siblings
                    .iter()
                    .position(|&c| c == frame.node)
                    .map(|i| i + 1)
                    .unwrap_or(frame.index)
            } else {
                // Detached: the remembered slot now holds the old next
                // sibling.
                frame.index
            };
            if let Some(&next) = siblings.get(next_index) {
                self.stack.push(Frame {
                    parent: frame.parent,
                    node: next,
                    index: next_index,
                });
                return Some(next);
            }
            // Fall through: move to the parent's successor.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::parse;
    use crate::types::NodeKind;

    fn label(tree: &Tree, id: NodeId) -> String {
        match tree.kind(id) {
            NodeKind::Root => "root".into(),
            NodeKind::Text { text } => format!("t:{text}"),
            NodeKind::Comment { .. } => "c".into(),
            NodeKind::TagOpen { name, .. } => format!("<{name}>"),
            NodeKind::TagClose { name } => format!("</{name}>"),
        }
    }

    fn walk_all(tree: &Tree) -> Vec<String> {
        let mut cursor = Cursor::new(tree);
        let mut out = Vec::new();
        while let Some(id) = cursor.next(tree) {
            out.push(label(tree, id));
        }
        out
    }

    #[test]
    fn depth_first_order() {
        let tree = parse("<a><b>x</b></a>y", &[]);
        assert_eq!(
            walk_all(&tree),
            ["<a>", "<b>", "t:x", "</b>", "</a>", "t:y"]
        );
    }

    #[test]
    fn skip_children_jumps_to_sibling() {
        let tree = parse("<a><b>x</b></a>y", &[]);
        let mut cursor = Cursor::new(&tree);
        let mut out = Vec::new();
        while let Some(id) = cursor.next(&tree) {
            let l = label(&tree, id);
            if l == "<a>" {
                cursor.skip_children();
            }
            out.push(l);
        }
        assert_eq!(out, ["<a>", "</a>", "t:y"]);
    }

    #[test]
    fn removal_of_current_resumes_at_next_sibling() {
        let mut tree = parse("<a>1</a><b>2</b><c>3</c>", &[]);
        let mut cursor = Cursor::new(&tree);
        let mut out = Vec::new();
        while let Some(id) = cursor.next(&tree) {
            let l = label(&tree, id);
            if l == "<b>" {
                // Paired removal: takes `</b>` along; descendants of the
                // removed node must not be visited.
                tree.remove(id);
            }
            out.push(l);
        }
        assert_eq!(out, ["<a>", "t:1", "</a>", "<b>", "<c>", "t:3", "</c>"]);
    }

    #[test]
    fn removal_of_last_child_climbs_to_parent_successor() {
        let mut tree = parse("<a><b>x</b></a><c>y</c>", &[]);
        let mut cursor = Cursor::new(&tree);
        let mut out = Vec::new();
        while let Some(id) = cursor.next(&tree) {
            let l = label(&tree, id);
            if l == "<b>" {
                tree.remove(id);
            }
            out.push(l);
        }
        assert_eq!(out, ["<a>", "<b>", "</a>", "<c>", "t:y", "</c>"]);
    }
}

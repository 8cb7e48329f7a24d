use std::fmt;

pub type NodeIndex = u32;

/// Handle into a [`Tree`] arena. Slots are never reused, so a stale id
/// stays readable after the node is detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub NodeIndex);

/// Flavour of a comment node. Script flavours only occur inside the body
/// of a script-block element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentFlavor {
    /// `<!-- … -->`
    Html,
    /// `// …` up to (not including) the end of the line
    ScriptLine,
    /// `/* … */`
    ScriptBlock,
}

/// Attribute list of an opening tag.
///
/// Kept as a Vec to preserve source order; `None` is the bare-attribute
/// sentinel (`<input disabled>`), distinct from `Some("")` (`a=""`).
pub type AttrList = Vec<(String, Option<String>)>;

#[derive(Debug)]
pub enum NodeKind {
    Root,
    Text {
        text: String,
    },
    Comment {
        text: String,
        flavor: CommentFlavor,
    },
    TagOpen {
        name: String,
        attrs: AttrList,
        /// Source text between the tag name and `>`, kept verbatim so a
        /// parsed tag serializes byte-for-byte (quote style, spacing,
        /// and `<`-looking text such as error envelopes survive).
        /// `None` for programmatically built or mutated tags, which
        /// serialize canonically from `attrs`.
        raw_attrs: Option<String>,
        /// Set when the tag name matches a configured script tag; the
        /// children of such a node are only text and script comments.
        script_block: bool,
    },
    TagClose {
        name: String,
    },
}

#[derive(Debug)]
pub struct NodeData {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// Arena-backed node tree.
///
/// Child links are ordered `NodeId` lists; parent links are back-references
/// into the same arena, so there are no ownership cycles. Detaching a node
/// clears its parent link but leaves the slot in place, which is what lets
/// an in-flight [`crate::Cursor`] recover its position after a removal.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub fn new() -> Self {
        let root = NodeData {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Root,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0 as usize].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0 as usize].children
    }

    /// Number of arena slots, detached nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(
            NodeIndex::try_from(self.nodes.len()).expect("node arena exceeds u32 index space"),
        );
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text { text: text.into() })
    }

    pub fn create_comment(&mut self, text: impl Into<String>, flavor: CommentFlavor) -> NodeId {
        self.alloc(NodeKind::Comment {
            text: text.into(),
            flavor,
        })
    }

    pub fn create_tag_open(
        &mut self,
        name: impl Into<String>,
        attrs: AttrList,
        script_block: bool,
    ) -> NodeId {
        self.alloc(NodeKind::TagOpen {
            name: name.into(),
            attrs,
            raw_attrs: None,
            script_block,
        })
    }

    /// Tokenizer entry point: a tag open carrying its verbatim attribute
    /// text alongside the parsed form.
    pub(crate) fn create_parsed_tag_open(
        &mut self,
        name: impl Into<String>,
        attrs: AttrList,
        raw_attrs: String,
        script_block: bool,
    ) -> NodeId {
        self.alloc(NodeKind::TagOpen {
            name: name.into(),
            attrs,
            raw_attrs: Some(raw_attrs),
            script_block,
        })
    }

    pub fn create_tag_close(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::TagClose { name: name.into() })
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// The child must be detached (freshly created or previously removed).
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(
            self.nodes[child.0 as usize].parent.is_none(),
            "append_child expects a detached node"
        );
        self.nodes[child.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.push(child);
    }

    /// Insert `child` under `parent` at `index` (clamped to the child count).
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(
            self.nodes[child.0 as usize].parent.is_none(),
            "insert_child expects a detached node"
        );
        self.nodes[child.0 as usize].parent = Some(parent);
        let children = &mut self.nodes[parent.0 as usize].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Position of `id` within its parent's child list, if attached.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id.0 as usize].parent?;
        self.nodes[parent.0 as usize]
            .children
            .iter()
            .position(|c| *c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id.0 as usize].parent?;
        let index = self.index_in_parent(id)?;
        self.nodes[parent.0 as usize].children.get(index + 1).copied()
    }

    /// Detach a single node from its parent. The node keeps its own
    /// children and stays readable through its id.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.0 as usize].parent else {
            return;
        };
        let children = &mut self.nodes[parent.0 as usize].children;
        if let Some(index) = children.iter().position(|c| *c == id) {
            children.remove(index);
        }
        self.nodes[id.0 as usize].parent = None;
    }

    /// Remove a node; a `TagOpen` whose adjacent next sibling is a
    /// same-name `TagClose` takes the close node with it, so callers
    /// never have to track the pair.
    pub fn remove(&mut self, id: NodeId) {
        if let NodeKind::TagOpen { name, .. } = &self.nodes[id.0 as usize].kind {
            let name = name.clone();
            if let Some(sibling) = self.next_sibling(id)
                && let NodeKind::TagClose { name: close } = &self.nodes[sibling.0 as usize].kind
                && close.eq_ignore_ascii_case(&name)
            {
                self.detach(sibling);
            }
        }
        self.detach(id);
    }

    /// Tag name of an opening or closing tag node.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0 as usize].kind {
            NodeKind::TagOpen { name, .. } | NodeKind::TagClose { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_script_block(&self, id: NodeId) -> bool {
        matches!(
            &self.nodes[id.0 as usize].kind,
            NodeKind::TagOpen {
                script_block: true,
                ..
            }
        )
    }

    /// Attribute value lookup on a `TagOpen`. Returns `Some(None)` for a
    /// bare attribute.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<Option<&str>> {
        match &self.nodes[id.0 as usize].kind {
            NodeKind::TagOpen { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_deref()),
            _ => None,
        }
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Set (or add) an attribute on a `TagOpen`, preserving its position
    /// when it already exists. The tag serializes canonically afterwards
    /// (its verbatim source text no longer matches).
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: Option<String>) {
        if let NodeKind::TagOpen {
            attrs, raw_attrs, ..
        } = &mut self.nodes[id.0 as usize].kind
        {
            *raw_attrs = None;
            if let Some(slot) = attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                slot.1 = value;
            } else {
                attrs.push((name.to_string(), value));
            }
        }
    }

    /// Whitespace-token membership test on an attribute value
    /// (`class="a b"` has token `a`).
    pub fn attr_has_token(&self, id: NodeId, name: &str, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        matches!(self.attr(id, name), Some(Some(v))
            if v.split_whitespace().any(|t| t == token))
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

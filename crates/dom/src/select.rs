//! Tree queries: breadth-first tag/attribute enumeration and a minimal
//! CSS-flavoured selector language.
//!
//! Recognised selector syntax: tag name, `#id`, `.class` (repeatable),
//! `[attr]`, `[attr=value]` (quotes optional), the descendant combinator
//! (whitespace), union (`,`) and `:not(inner)` where `inner` is a basic
//! selector. `query_all` yields document order with duplicates removed.

use crate::types::{NodeId, NodeKind, Tree};
use std::collections::{HashSet, VecDeque};

/// Breadth-first enumeration of all opening tags with a matching name.
pub fn find_by_tag(tree: &Tree, name: &str) -> Vec<NodeId> {
    find_open_tags(tree, |tree, id| {
        tree.tag_name(id).is_some_and(|n| n.eq_ignore_ascii_case(name))
    })
}

/// Breadth-first enumeration of all opening tags carrying an attribute.
pub fn find_by_attribute(tree: &Tree, attr: &str) -> Vec<NodeId> {
    find_open_tags(tree, |tree, id| tree.has_attr(id, attr))
}

fn find_open_tags(tree: &Tree, accept: impl Fn(&Tree, NodeId) -> bool) -> Vec<NodeId> {
    let mut queue = VecDeque::from([tree.root()]);
    let mut out = Vec::new();
    while let Some(id) = queue.pop_front() {
        if matches!(tree.kind(id), NodeKind::TagOpen { .. }) && accept(tree, id) {
            out.push(id);
        }
        queue.extend(tree.children(id).iter().copied());
    }
    out
}

/// A parsed selector: union of descendant chains of simple selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    branches: Vec<Vec<Simple>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Simple {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
    not: Option<Box<Simple>>,
}

impl Selector {
    /// Parse a selector string. Unparseable input yields a selector that
    /// matches nothing rather than an error.
    pub fn parse(input: &str) -> Self {
        let branches = split_top_level(input, ',')
            .into_iter()
            .filter_map(|branch| {
                let chain: Vec<Simple> = branch
                    .split_whitespace()
                    .filter_map(parse_simple)
                    .collect();
                (!chain.is_empty()).then_some(chain)
            })
            .collect();
        Self { branches }
    }

    fn matches(&self, tree: &Tree, id: NodeId) -> bool {
        self.branches
            .iter()
            .any(|chain| chain_matches(tree, id, chain))
    }
}

/// `query_all`: document-order enumeration of matching opening tags,
/// duplicates eliminated.
pub fn query_all(tree: &Tree, selector: &str) -> Vec<NodeId> {
    let selector = Selector::parse(selector);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    document_order(tree, tree.root(), &mut |id| {
        if matches!(tree.kind(id), NodeKind::TagOpen { .. })
            && selector.matches(tree, id)
            && seen.insert(id)
        {
            out.push(id);
        }
    });
    out
}

/// First `query_all` result, if any.
pub fn query_first(tree: &Tree, selector: &str) -> Option<NodeId> {
    let selector_parsed = Selector::parse(selector);
    let mut found = None;
    document_order(tree, tree.root(), &mut |id| {
        if found.is_none()
            && matches!(tree.kind(id), NodeKind::TagOpen { .. })
            && selector_parsed.matches(tree, id)
        {
            found = Some(id);
        }
    });
    found
}

fn document_order(tree: &Tree, id: NodeId, visit: &mut impl FnMut(NodeId)) {
    visit(id);
    for &child in tree.children(id) {
        document_order(tree, child, visit);
    }
}

fn chain_matches(tree: &Tree, id: NodeId, chain: &[Simple]) -> bool {
    let (last, rest) = match chain.split_last() {
        Some(split) => split,
        None => return false,
    };
    if !simple_matches(tree, id, last) {
        return false;
    }
    // Each remaining compound must match some strictly higher ancestor,
    // in order.
    let mut needed = rest.iter().rev();
    let mut want = match needed.next() {
        Some(s) => s,
        None => return true,
    };
    let mut cursor = tree.parent(id);
    while let Some(node) = cursor {
        if matches!(tree.kind(node), NodeKind::TagOpen { .. }) && simple_matches(tree, node, want) {
            match needed.next() {
                Some(next) => want = next,
                None => return true,
            }
        }
        cursor = tree.parent(node);
    }
    false
}

fn simple_matches(tree: &Tree, id: NodeId, simple: &Simple) -> bool {
    if let Some(tag) = &simple.tag
        && tag != "*"
        && !tree.tag_name(id).is_some_and(|n| n.eq_ignore_ascii_case(tag))
    {
        return false;
    }
    if let Some(want) = &simple.id
        && tree.attr(id, "id") != Some(Some(want.as_str()))
    {
        return false;
    }
    for class in &simple.classes {
        if !tree.attr_has_token(id, "class", class) {
            return false;
        }
    }
    for (name, value) in &simple.attrs {
        match value {
            None => {
                if !tree.has_attr(id, name) {
                    return false;
                }
            }
            Some(want) => {
                if tree.attr(id, name) != Some(Some(want.as_str())) {
                    return false;
                }
            }
        }
    }
    if let Some(inner) = &simple.not
        && simple_matches(tree, id, inner)
    {
        return false;
    }
    true
}

/// Split on `sep` outside brackets, parens and quotes.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_simple(input: &str) -> Option<Simple> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut simple = Simple::default();
    let bytes = input.as_bytes();
    let mut i = 0usize;

    let ident_end = |from: usize| {
        let mut j = from;
        while j < bytes.len()
            && (bytes[j].is_ascii_alphanumeric() || matches!(bytes[j], b'-' | b'_'))
        {
            j += 1;
        }
        j
    };

    // Leading tag name (or `*`).
    if bytes[0] == b'*' {
        simple.tag = Some("*".to_string());
        i = 1;
    } else if bytes[0].is_ascii_alphanumeric() || bytes[0] == b'_' {
        let end = ident_end(0);
        simple.tag = Some(input[..end].to_string());
        i = end;
    }

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                let end = ident_end(i + 1);
                if end == i + 1 {
                    return None;
                }
                simple.id = Some(input[i + 1..end].to_string());
                i = end;
            }
            b'.' => {
                let end = ident_end(i + 1);
                if end == i + 1 {
                    return None;
                }
                simple.classes.push(input[i + 1..end].to_string());
                i = end;
            }
            b'[' => {
                let close = input[i..].find(']').map(|rel| i + rel)?;
                let body = &input[i + 1..close];
                match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(['"', '\'']);
                        simple
                            .attrs
                            .push((name.trim().to_string(), Some(value.to_string())));
                    }
                    None => simple.attrs.push((body.trim().to_string(), None)),
                }
                i = close + 1;
            }
            b':' => {
                let rest = &input[i..];
                let inner = rest.strip_prefix(":not(")?;
                let close = inner.find(')')?;
                simple.not = Some(Box::new(parse_simple(&inner[..close])?));
                i += ":not(".len() + close + 1;
            }
            _ => return None,
        }
    }
    Some(simple)
}

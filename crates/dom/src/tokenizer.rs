//! Forward-scan markup tokenizer.
//!
//! This is not an HTML5 state machine: tag and attribute grammar is the
//! constrained practical subset the preprocessor needs, and anomalies
//! (unterminated comment, missing `>`) recover by skipping a single byte
//! with no error surfaced.
//!
//! Two behaviours matter to the rest of the pipeline:
//! - closing tags become *siblings* of their opening tag, matched by an
//!   ancestor search, so a serialize of the tree reproduces the source
//!   shape byte-for-byte for canonical input;
//! - elements whose name is a configured script tag switch the scanner
//!   into script-body mode, where the body is a flat run of text and
//!   `//…` / `/*…*/` comments with no nested elements.

use crate::types::{AttrList, CommentFlavor, NodeId, Tree};
use memchr::{memchr, memmem};

const HTML_COMMENT_START: &[u8] = b"<!--";
const HTML_COMMENT_END: &[u8] = b"-->";

/// Markup tokenizer configured with the set of script-block tag names.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    script_tags: Vec<String>,
}

impl Tokenizer {
    pub fn new(script_tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            script_tags: script_tags.into_iter().map(Into::into).collect(),
        }
    }

    fn is_script_tag(&self, name: &str) -> bool {
        self.script_tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Parse `input` into a node tree rooted at a synthetic root node.
    pub fn parse(&self, input: &str) -> Tree {
        let bytes = input.as_bytes();
        let mut tree = Tree::new();
        let mut insert = tree.root();
        let mut p = 0usize;

        while p < bytes.len() {
            if bytes[p] != b'<' {
                // Text run up to (not including) the next `<`.
                let end = memchr(b'<', &bytes[p..]).map_or(bytes.len(), |rel| p + rel);
                let text = tree.create_text(&input[p..end]);
                tree.append_child(insert, text);
                p = end;
                continue;
            }

            if bytes[p..].starts_with(HTML_COMMENT_START) {
                let body_start = p + HTML_COMMENT_START.len();
                match memmem::find(&bytes[body_start..], HTML_COMMENT_END) {
                    Some(rel) => {
                        let comment = tree.create_comment(
                            &input[body_start..body_start + rel],
                            CommentFlavor::Html,
                        );
                        tree.append_child(insert, comment);
                        p = body_start + rel + HTML_COMMENT_END.len();
                    }
                    None => p += 1,
                }
                continue;
            }

            if p + 1 < bytes.len() && bytes[p + 1] == b'/' {
                // Closing tag: match against the ancestor chain.
                let Some(rel) = memchr(b'>', &bytes[p..]) else {
                    p += 1;
                    continue;
                };
                let gt = p + rel;
                let name = input[p + 2..gt].trim();
                insert = self.attach_close(&mut tree, insert, name);
                p = gt + 1;
                continue;
            }

            // Opening tag.
            let Some(rel) = memchr(b'>', &bytes[p..]) else {
                p += 1;
                continue;
            };
            let gt = p + rel;
            let inside = &input[p + 1..gt];
            let trimmed = inside.trim_start();
            if trimmed.is_empty() {
                p += 1;
                continue;
            }
            let (name, attr_text) = match trimmed.find(|c: char| c.is_ascii_whitespace()) {
                Some(split) => (&trimmed[..split], &trimmed[split..]),
                None => (trimmed, ""),
            };
            // Verbatim tail after the name, so the tag round-trips even
            // when the "attributes" are arbitrary text.
            let raw = &inside[inside.len() - trimmed.len() + name.len()..];
            let attrs = parse_attrs(attr_text);
            let script = self.is_script_tag(name);
            let open = tree.create_parsed_tag_open(name, attrs, raw.to_string(), script);
            tree.append_child(insert, open);

            if script {
                p = self.scan_script_body(&mut tree, insert, open, name, input, gt + 1);
            } else {
                insert = open;
                p = gt + 1;
            }
        }

        tree
    }

    /// Consume the body of a script-block element starting at `from`,
    /// attach its text/comment children under `open`, and attach the
    /// close tag as a sibling (child of `insert`). Returns the next
    /// scan position.
    fn scan_script_body(
        &self,
        tree: &mut Tree,
        insert: NodeId,
        open: NodeId,
        name: &str,
        input: &str,
        from: usize,
    ) -> usize {
        match find_close_tag(input.as_bytes(), from, name) {
            Some((body_end, resume)) => {
                parse_script_body(tree, open, &input[from..body_end]);
                let close = tree.create_tag_close(name);
                tree.append_child(insert, close);
                resume
            }
            None => {
                // No close tag: the remainder of the input is the body and
                // no close node is emitted.
                parse_script_body(tree, open, &input[from..]);
                input.len()
            }
        }
    }

    fn attach_close(&self, tree: &mut Tree, insert: NodeId, name: &str) -> NodeId {
        let mut cursor = Some(insert);
        while let Some(node) = cursor {
            if let Some(open_name) = tree.tag_name(node)
                && !matches!(tree.kind(node), crate::types::NodeKind::TagClose { .. })
                && open_name.eq_ignore_ascii_case(name)
            {
                let parent = tree.parent(node).unwrap_or(tree.root());
                let close = tree.create_tag_close(name);
                tree.append_child(parent, close);
                return parent;
            }
            cursor = tree.parent(node);
        }
        // No matching opener anywhere above: keep the stray close where
        // the scan currently is.
        let close = tree.create_tag_close(name);
        tree.append_child(insert, close);
        insert
    }
}

/// Find `</name>` (ASCII case-insensitive, optional whitespace before `>`)
/// at or after `from`. Returns (body_end, resume_after_close).
fn find_close_tag(bytes: &[u8], from: usize, name: &str) -> Option<(usize, usize)> {
    let mut i = from;
    let name = name.as_bytes();
    while i < bytes.len() {
        let rel = memchr(b'<', &bytes[i..])?;
        i += rel;
        let tag_start = i + 2;
        if tag_start + name.len() <= bytes.len()
            && bytes[i + 1] == b'/'
            && bytes[tag_start..tag_start + name.len()].eq_ignore_ascii_case(name)
        {
            let mut k = tag_start + name.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && bytes[k] == b'>' {
                return Some((i, k + 1));
            }
        }
        i += 1;
    }
    None
}

/// Attribute micro-parser: `name`, `name=value`, `name="value"`,
/// `name='value'`. A value-less attribute binds to the bare sentinel.
fn parse_attrs(text: &str) -> AttrList {
    let mut attrs = AttrList::new();
    let bytes = text.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let name = &text[name_start..i];
        if name.is_empty() {
            // Stray `=`; skip it rather than loop forever.
            i += 1;
            continue;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                let value_end = memchr(quote, &bytes[i..]).map_or(bytes.len(), |rel| i + rel);
                i = (value_end + 1).min(bytes.len());
                &text[value_start..value_end]
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &text[value_start..i]
            };
            attrs.push((name.to_string(), Some(value.to_string())));
        } else {
            attrs.push((name.to_string(), None));
        }
    }
    attrs
}

/// Parse a script-block body into text runs and script comments.
///
/// Comment detection is quote-aware so `'https://x'` stays text; that is
/// the one place this scanner is smarter than a plain substring search.
fn parse_script_body(tree: &mut Tree, parent: NodeId, body: &str) {
    let bytes = body.as_bytes();
    let mut text_start = 0usize;
    let mut i = 0usize;
    let mut quote: Option<u8> = None;

    let mut flush = |tree: &mut Tree, from: usize, to: usize| {
        if from < to {
            let text = tree.create_text(&body[from..to]);
            tree.append_child(parent, text);
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => {
                quote = Some(b);
                i += 1;
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                flush(tree, text_start, i);
                let content_start = i + 2;
                let eol = memchr(b'\n', &bytes[content_start..])
                    .map_or(bytes.len(), |rel| content_start + rel);
                // Exclude a trailing CR so CRLF sources round-trip.
                let content_end = if eol > content_start && bytes[eol - 1] == b'\r' {
                    eol - 1
                } else {
                    eol
                };
                let comment =
                    tree.create_comment(&body[content_start..content_end], CommentFlavor::ScriptLine);
                tree.append_child(parent, comment);
                text_start = content_end;
                i = content_end;
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                flush(tree, text_start, i);
                let content_start = i + 2;
                let (content_end, resume) = match memmem::find(&bytes[content_start..], b"*/") {
                    Some(rel) => (content_start + rel, content_start + rel + 2),
                    None => (bytes.len(), bytes.len()),
                };
                let comment = tree
                    .create_comment(&body[content_start..content_end], CommentFlavor::ScriptBlock);
                tree.append_child(parent, comment);
                text_start = resume;
                i = resume;
            }
            _ => i += 1,
        }
    }
    flush(tree, text_start, bytes.len());
}

/// One-shot convenience over [`Tokenizer`].
pub fn parse(input: &str, script_tags: &[String]) -> Tree {
    Tokenizer::new(script_tags.iter().cloned()).parse(input)
}

//! Tree → text rendering.
//!
//! Depth-first concatenation: text verbatim, comments in their flavour's
//! delimiters (when visible), `<name attrs>` for opening tags, `</name>`
//! for closing tags. Parsed tags keep their verbatim attribute text, so
//! parse → serialize is byte-stable; tags built or mutated through the
//! tree API render canonically (`name="value"`, bare `name`,
//! single-space separation).

use crate::types::{CommentFlavor, NodeId, NodeKind, Tree};

#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions {
    /// Render comment nodes. Off strips HTML and script comments from
    /// the output.
    pub comments_visible: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            comments_visible: true,
        }
    }
}

pub fn serialize(tree: &Tree) -> String {
    serialize_with(tree, SerializeOptions::default())
}

pub fn serialize_with(tree: &Tree, options: SerializeOptions) -> String {
    let mut out = String::new();
    render(tree, tree.root(), options, &mut out);
    out
}

/// Render a single node (and its subtree) into `out`.
pub fn serialize_node(tree: &Tree, id: NodeId, options: SerializeOptions) -> String {
    let mut out = String::new();
    render(tree, id, options, &mut out);
    out
}

fn render(tree: &Tree, id: NodeId, options: SerializeOptions, out: &mut String) {
    match tree.kind(id) {
        NodeKind::Root => {}
        NodeKind::Text { text } => out.push_str(text),
        NodeKind::Comment { text, flavor } => {
            if options.comments_visible {
                match flavor {
                    CommentFlavor::Html => {
                        out.push_str("<!--");
                        out.push_str(text);
                        out.push_str("-->");
                    }
                    CommentFlavor::ScriptLine => {
                        out.push_str("//");
                        out.push_str(text);
                    }
                    CommentFlavor::ScriptBlock => {
                        out.push_str("/*");
                        out.push_str(text);
                        out.push_str("*/");
                    }
                }
            }
        }
        NodeKind::TagOpen {
            name,
            attrs,
            raw_attrs,
            ..
        } => {
            out.push('<');
            out.push_str(name);
            match raw_attrs {
                Some(raw) => out.push_str(raw),
                None => {
                    for (attr, value) in attrs {
                        out.push(' ');
                        out.push_str(attr);
                        if let Some(value) = value {
                            out.push_str("=\"");
                            out.push_str(value);
                            out.push('"');
                        }
                    }
                }
            }
            out.push('>');
        }
        NodeKind::TagClose { name } => {
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
    for &child in tree.children(id) {
        render(tree, child, options, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::parse;

    #[test]
    fn round_trip_canonical_document() {
        let input = "<ul class=\"nav\"><li>one</li><li>two</li></ul>";
        let tree = parse(input, &[]);
        assert_eq!(serialize(&tree), input);
    }

    #[test]
    fn comments_can_be_stripped() {
        let tags = vec!["hxp".to_string()];
        let tree = parse("a<!--x-->b<hxp>1 // y\n2</hxp>", &tags);
        assert_eq!(
            serialize_with(
                &tree,
                SerializeOptions {
                    comments_visible: false
                }
            ),
            "ab<hxp>1 \n2</hxp>"
        );
        assert_eq!(serialize(&tree), "a<!--x-->b<hxp>1 // y\n2</hxp>");
    }

    #[test]
    fn bare_attribute_renders_without_value() {
        let tree = parse("<input disabled value=\"\">", &[]);
        assert_eq!(serialize(&tree), "<input disabled value=\"\">");
    }

    #[test]
    fn quote_style_and_spacing_survive_round_trips() {
        let input = "<a  href='x'   rel=plain>t</a>";
        let tree = parse(input, &[]);
        assert_eq!(serialize(&tree), input);
    }

    #[test]
    fn error_envelopes_survive_round_trips() {
        let input = "a<< Error: Failed to resolve include 'x'. >>b";
        let tree = parse(input, &[]);
        assert_eq!(serialize(&tree), input);
    }

    #[test]
    fn mutated_tags_render_canonically() {
        let mut tree = parse("<a href='x'>t</a>", &[]);
        let a = tree.children(tree.root())[0];
        tree.set_attr(a, "href", Some("y".to_string()));
        assert_eq!(serialize(&tree), "<a href=\"y\">t</a>");
    }
}

//! Markup side of the HXP preprocessor: a forgiving tokenizer, an
//! arena-backed node tree with parent links, a mutation-tolerant
//! depth-first cursor, selector queries and a serializer.
//!
//! The tree deliberately models closing tags as sibling nodes of their
//! opening tag rather than nesting them, which keeps serialization an
//! exact concatenation of the parsed pieces.

mod select;
mod serialize;
mod tokenizer;
mod traverse;
mod types;

pub use select::{Selector, find_by_attribute, find_by_tag, query_all, query_first};
pub use serialize::{SerializeOptions, serialize, serialize_node, serialize_with};
pub use tokenizer::{Tokenizer, parse};
pub use traverse::Cursor;
pub use types::{AttrList, CommentFlavor, NodeData, NodeId, NodeIndex, NodeKind, Tree};

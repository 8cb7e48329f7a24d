//! Tree-transformer hooks.
//!
//! A hook is a pure side effect on the tree it is handed: pre-hooks see
//! every freshly parsed source tree (the outer document and each
//! include), post-hooks see the re-parsed output tree once, right
//! before final serialization.

use hxp_dom::{Cursor, Tree};
use std::path::{Component, Path};

pub struct HookContext<'a> {
    pub cwd: &'a Path,
    pub tree: &'a mut Tree,
    /// Output-relative path of the document, as passed to `process`.
    pub rel_path: &'a str,
}

pub type Hook = Box<dyn Fn(&mut HookContext<'_>)>;

/// Built-in post-hook: rewrite root-relative `href`/`src` values into
/// paths relative to the document's own location (one `../` per
/// directory in `rel_path`). Protocol-relative `//…` URLs are left
/// alone.
pub fn relative_url_hook() -> Hook {
    Box::new(|cx: &mut HookContext<'_>| {
        let depth = Path::new(cx.rel_path)
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .count()
            })
            .unwrap_or(0);
        let prefix = "../".repeat(depth);

        let mut cursor = Cursor::new(cx.tree);
        while let Some(id) = cursor.next(cx.tree) {
            for attr in ["href", "src"] {
                let rewritten = match cx.tree.attr(id, attr) {
                    Some(Some(value)) if value.starts_with('/') && !value.starts_with("//") => {
                        Some(format!("{prefix}{}", &value[1..]))
                    }
                    _ => None,
                };
                if let Some(value) = rewritten {
                    cx.tree.set_attr(id, attr, Some(value));
                }
            }
        }
    })
}

//! AST-level rewrite pass over the assembled script fragment, driven by
//! the error-tolerant tree-sitter JavaScript grammar (offsets survive
//! even around syntax errors, and comments are ordinary nodes).
//!
//! The pass:
//! - deletes every comment range;
//! - rewrites `let`/`const` keywords to `var` in place, so prelude
//!   bindings can be rebound by later blocks;
//! - adds a trailing `true` argument to `$.include(...)` (or its bare
//!   `include(...)` alias) when the call is a declarator initializer or
//!   an assignment right-hand side, turning the include into capture
//!   mode;
//! - binds every used-but-undeclared identifier to the
//!   `<< Undefined: name >>` sentinel, unless it is a standard global,
//!   a runtime alias, or otherwise in scope.
//!
//! Edits carry byte offsets and are applied in descending start order,
//! which keeps every recorded position valid while splicing.

use std::collections::HashSet;
use tree_sitter::{Node, Parser, Tree};

/// Standard globals the undefined-identifier pass leaves alone.
const BUILTIN_GLOBALS: &[&str] = &[
    "$",
    "Array",
    "ArrayBuffer",
    "BigInt",
    "Boolean",
    "DataView",
    "Date",
    "Error",
    "EvalError",
    "Function",
    "Infinity",
    "JSON",
    "Map",
    "Math",
    "NaN",
    "Number",
    "Object",
    "Promise",
    "Proxy",
    "RangeError",
    "ReferenceError",
    "Reflect",
    "RegExp",
    "Set",
    "String",
    "Symbol",
    "SyntaxError",
    "TextDecoder",
    "TextEncoder",
    "TypeError",
    "URIError",
    "WeakMap",
    "WeakSet",
    "arguments",
    "console",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "eval",
    "globalThis",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "structuredClone",
    "undefined",
];

pub fn parse_js(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Default)]
struct WalkOutput {
    edits: Vec<Edit>,
    /// Used identifiers in first-appearance order.
    used: Vec<String>,
    used_set: HashSet<String>,
    declared: HashSet<String>,
}

impl WalkOutput {
    fn mark_used(&mut self, name: &str) {
        if self.used_set.insert(name.to_string()) {
            self.used.push(name.to_string());
        }
    }
}

/// Run the AST pass. Returns the rewritten fragment and the number of
/// stub lines prepended (the caller tracks the prelude boundary with
/// it). When no parse tree is available the fragment passes through
/// unchanged.
pub fn phase_d(fragment: &str, allowed: &HashSet<String>) -> (String, usize) {
    let Some(tree) = parse_js(fragment) else {
        return (fragment.to_string(), 0);
    };
    let root = tree.root_node();
    let mut out = WalkOutput::default();
    walk(root, fragment, &mut out);

    let mut text = fragment.to_string();
    out.edits.sort_by(|a, b| b.start.cmp(&a.start));
    for edit in &out.edits {
        text.replace_range(edit.start..edit.end, &edit.text);
    }

    // Identifier classification inside ERROR subtrees is unreliable;
    // keep the safe edits and skip stub generation there.
    if root.has_error() {
        return (text, 0);
    }

    let mut stubs = String::new();
    let mut stub_count = 0usize;
    for name in &out.used {
        if out.declared.contains(name)
            || allowed.contains(name)
            || BUILTIN_GLOBALS.contains(&name.as_str())
        {
            continue;
        }
        stubs.push_str(&format!("var {name} = \"<< Undefined: {name} >>\";\n"));
        stub_count += 1;
    }
    (format!("{stubs}{text}"), stub_count)
}

fn walk(node: Node, src: &str, out: &mut WalkOutput) {
    match node.kind() {
        "comment" => out.edits.push(Edit {
            start: node.start_byte(),
            end: node.end_byte(),
            text: String::new(),
        }),
        "lexical_declaration" => {
            if let Some(keyword) = node.child(0)
                && matches!(keyword.kind(), "let" | "const")
            {
                out.edits.push(Edit {
                    start: keyword.start_byte(),
                    end: keyword.end_byte(),
                    text: "var".to_string(),
                });
            }
        }
        "call_expression" => {
            if let Some(edit) = capture_include_edit(node, src) {
                out.edits.push(edit);
            }
        }
        "identifier" => {
            let name = &src[node.byte_range()];
            if is_binding_position(node) {
                out.declared.insert(name.to_string());
            } else {
                out.mark_used(name);
            }
        }
        // `{a}` reads `a`; `let {a} = o` binds it.
        "shorthand_property_identifier" => out.mark_used(&src[node.byte_range()]),
        "shorthand_property_identifier_pattern" => {
            out.declared.insert(src[node.byte_range()].to_string());
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, src, out);
    }
}

/// `$.include(...)` / `include(...)` as a declarator initializer or an
/// assignment RHS gets a trailing `true`: capture mode.
fn capture_include_edit(call: Node, src: &str) -> Option<Edit> {
    let callee = call.child_by_field_name("function")?;
    let is_include = match callee.kind() {
        "member_expression" => {
            let object = callee.child_by_field_name("object")?;
            let property = callee.child_by_field_name("property")?;
            object.kind() == "identifier"
                && &src[object.byte_range()] == "$"
                && &src[property.byte_range()] == "include"
        }
        "identifier" => &src[callee.byte_range()] == "include",
        _ => false,
    };
    if !is_include {
        return None;
    }

    let parent = call.parent()?;
    let is_value_position = match parent.kind() {
        "variable_declarator" => parent.child_by_field_name("value") == Some(call),
        "assignment_expression" => parent.child_by_field_name("right") == Some(call),
        _ => false,
    };
    if !is_value_position {
        return None;
    }

    let arguments = call.child_by_field_name("arguments")?;
    let insert_at = arguments.end_byte().checked_sub(1)?;
    let text = if arguments.named_child_count() == 0 {
        "true".to_string()
    } else {
        ", true".to_string()
    };
    Some(Edit {
        start: insert_at,
        end: insert_at,
        text,
    })
}

fn is_binding_position(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "variable_declarator" => parent.child_by_field_name("name") == Some(node),
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "function"
        | "class_declaration"
        | "class" => parent.child_by_field_name("name") == Some(node),
        "formal_parameters" | "catch_clause" => true,
        "arrow_function" => parent.child_by_field_name("parameter") == Some(node),
        "for_in_statement" => parent.child_by_field_name("left") == Some(node),
        "assignment_pattern" => parent.child_by_field_name("left") == Some(node),
        "pair_pattern" => parent.child_by_field_name("value") == Some(node),
        "rest_pattern" | "array_pattern" | "object_pattern" => true,
        "import_specifier" | "namespace_import" | "import_clause" => true,
        _ => false,
    }
}

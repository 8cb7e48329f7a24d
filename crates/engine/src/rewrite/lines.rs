//! Line-level rewrite (the phase between sugar expansion and the AST
//! pass). Three small machines run over the block's lines:
//!
//! 1. a function tracker that appends a `$.context` call after a named
//!    arrow/function declaration (at the line where its braces close);
//! 2. conditional sugar: `$.else`/`$.end` calls gain `$.conditionalScope`
//!    as their sole argument, and `$.if`/`$.elseif`/`$.echo`/`$.include`
//!    calls gain it as a trailing argument;
//! 3. declaration and reassignment trapping: declared names persist into
//!    the document context, and names that collide with a defined
//!    constant are replaced by an error emit plus a forced rebinding.
//!
//! Statements whose delimiters stay open accumulate continuation lines
//! into one unit before trapping, so a multi-line object literal is
//! still persisted; inside a tracked function body no rewriting occurs.

use crate::rewrite::ast::parse_js;
use crate::rewrite::scan::{self, Depth, ScanState};
use crate::runtime::err_redeclare_constant;
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::Node;

static ARROW_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:const|let|var)\s+)?([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s*)?\([^()]*\)\s*=>",
    )
    .expect("arrow declaration pattern")
});

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?function\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*\(")
        .expect("function declaration pattern")
});

static DECLARATION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:const|let|var)\b").expect("declaration pattern"));

static REASSIGNMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*=(?:[^=>]|$)").expect("reassignment pattern")
});

/// Methods that receive the conditional scope as a trailing argument.
const SCOPE_THREADED: &[&str] = &["$.if", "$.elseif", "$.echo", "$.include"];

pub fn phase_b(source: &str, constants: &[(String, String)]) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut out: Vec<String> = Vec::new();
    let mut tracker: Option<(String, i32)> = None;
    let mut i = 0usize;

    while i < lines.len() {
        // Inside a tracked function body: count braces only.
        if let Some((name, depth)) = tracker.as_mut() {
            *depth += scan::brace_delta(lines[i]);
            out.push(lines[i].to_string());
            let closed = *depth <= 0;
            if closed {
                out.push(format!("$.context('{name}', {name});"));
            }
            if closed {
                tracker = None;
            }
            i += 1;
            continue;
        }

        let line = apply_conditional_sugar(lines[i]);
        let trimmed = line.trim_start();

        if trimmed.starts_with('$') {
            out.push(line);
            i += 1;
            continue;
        }

        if let Some(name) = function_decl_name(&line) {
            let depth = scan::brace_delta(&line);
            out.push(line);
            if depth <= 0 {
                out.push(format!("$.context('{name}', {name});"));
            } else {
                tracker = Some((name, depth));
            }
            i += 1;
            continue;
        }

        if DECLARATION_START.is_match(trimmed) || REASSIGNMENT_START.is_match(trimmed) {
            // Accumulate continuation lines until the unit balances.
            let mut unit_lines = vec![line];
            let mut state = ScanState::default();
            let mut depth = Depth::default();
            scan::feed_line(&mut state, &unit_lines[0], &mut depth);
            let mut j = i + 1;
            while depth.total() > 0 && j < lines.len() {
                let continuation = apply_conditional_sugar(lines[j]);
                scan::feed_line(&mut state, &continuation, &mut depth);
                unit_lines.push(continuation);
                j += 1;
            }
            let unit = unit_lines.join("\n");
            match trap_statements(&unit, constants) {
                Some(rewritten) => out.push(rewritten),
                None => out.push(unit),
            }
            i = j;
            continue;
        }

        out.push(line);
        i += 1;
    }

    out.join("\n")
}

fn function_decl_name(line: &str) -> Option<String> {
    ARROW_DECL
        .captures(line)
        .or_else(|| FUNCTION_DECL.captures(line))
        .map(|caps| caps[1].to_string())
}

/// Rewrite `$.else(…)`/`$.end(…)` to take the conditional scope as sole
/// argument, and thread the scope into the `SCOPE_THREADED` calls.
fn apply_conditional_sugar(line: &str) -> String {
    let trimmed = line.trim_start();
    for method in ["$.else", "$.end"] {
        if let Some(rest) = trimmed.strip_prefix(method) {
            let after = rest.trim_start();
            if after.starts_with('(') {
                let open = line.len() - after.len();
                if let Some(close) = scan::find_matching_paren(line, open) {
                    let mut rewritten = String::with_capacity(line.len() + 20);
                    rewritten.push_str(&line[..open + 1]);
                    rewritten.push_str("$.conditionalScope");
                    rewritten.push_str(&line[close..]);
                    return rewritten;
                }
            }
        }
    }

    let mut line = line.to_string();
    // Collect insertion points first, then splice right-to-left so the
    // recorded offsets stay valid.
    let mut insertions: Vec<(usize, bool)> = Vec::new();
    for method in SCOPE_THREADED {
        let mut from = 0usize;
        while let Some(rel) = line[from..].find(method) {
            let at = from + rel;
            from = at + method.len();
            let after = &line[at + method.len()..];
            // Reject longer method names (`$.endgame`, `$.echoes`).
            if after
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            {
                continue;
            }
            let Some(paren_rel) = after.find(|c: char| !c.is_whitespace()) else {
                continue;
            };
            if after.as_bytes()[paren_rel] != b'(' {
                continue;
            }
            let open = at + method.len() + paren_rel;
            if let Some(close) = scan::find_matching_paren(&line, open) {
                let empty = line[open + 1..close].trim().is_empty();
                insertions.push((close, empty));
            }
        }
    }
    insertions.sort_by(|a, b| b.0.cmp(&a.0));
    for (close, empty) in insertions {
        let text = if empty {
            "$.conditionalScope"
        } else {
            ", $.conditionalScope"
        };
        line.insert_str(close, text);
    }
    line
}

/// Names a constant resolves to its rendered literal.
fn constant_literal<'a>(constants: &'a [(String, String)], name: &str) -> Option<&'a str> {
    constants
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, lit)| lit.as_str())
}

#[derive(Debug)]
struct UnitEdit {
    start: usize,
    end: usize,
    text: String,
}

/// Statement-level trapping over one balanced unit. Returns `None` when
/// the unit does not parse cleanly (it then passes through unchanged).
fn trap_statements(unit: &str, constants: &[(String, String)]) -> Option<String> {
    let tree = parse_js(unit)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let unit_has_dollar = unit.contains('$');
    let mut edits: Vec<UnitEdit> = Vec::new();
    let mut cursor = root.walk();
    for statement in root.children(&mut cursor) {
        match statement.kind() {
            "lexical_declaration" | "variable_declaration" => {
                trap_declaration(statement, unit, constants, &mut edits);
            }
            "expression_statement" if !unit_has_dollar => {
                trap_reassignment(statement, unit, constants, &mut edits);
            }
            _ => {}
        }
    }
    if edits.is_empty() {
        return Some(unit.to_string());
    }
    let mut text = unit.to_string();
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    for edit in edits {
        text.replace_range(edit.start..edit.end, &edit.text);
    }
    Some(text)
}

/// Identifiers bound by a declarator's name pattern (plain or
/// destructuring).
fn declarator_names(declarator: Node, unit: &str) -> Vec<String> {
    let Some(pattern) = declarator.child_by_field_name("name") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    collect_pattern_names(pattern, unit, &mut names);
    names
}

fn collect_pattern_names(node: Node, unit: &str, names: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            names.push(unit[node.byte_range()].to_string());
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                // Object-pattern keys are not bindings.
                if node.kind() == "pair_pattern"
                    && node.child_by_field_name("key") == Some(child)
                {
                    continue;
                }
                collect_pattern_names(child, unit, names);
            }
        }
    }
}

fn trap_declaration(
    statement: Node,
    unit: &str,
    constants: &[(String, String)],
    edits: &mut Vec<UnitEdit>,
) {
    let keyword = statement
        .child(0)
        .map(|kw| unit[kw.byte_range()].to_string())
        .unwrap_or_else(|| "let".to_string());

    let mut declarators: Vec<(Node, Vec<String>)> = Vec::new();
    let mut cursor = statement.walk();
    for child in statement.named_children(&mut cursor) {
        if child.kind() == "variable_declarator" {
            let names = declarator_names(child, unit);
            declarators.push((child, names));
        }
    }

    let any_constant = declarators
        .iter()
        .any(|(_, names)| names.iter().any(|n| constant_literal(constants, n).is_some()));

    if !any_constant {
        if keyword == "var" {
            return;
        }
        let mut appended = String::new();
        for (_, names) in &declarators {
            for name in names {
                appended.push_str(&format!("\n$.context('{name}', {name});"));
            }
        }
        if !appended.is_empty() {
            let at = statement.end_byte();
            edits.push(UnitEdit {
                start: at,
                end: at,
                text: appended,
            });
        }
        return;
    }

    // At least one declared name collides with a constant: rebuild the
    // whole declaration statement.
    let mut parts: Vec<String> = Vec::new();
    let mut appended: Vec<String> = Vec::new();
    for (declarator, names) in &declarators {
        let collides = names
            .iter()
            .any(|n| constant_literal(constants, n).is_some());
        if collides {
            for name in names {
                match constant_literal(constants, name) {
                    Some(literal) => {
                        parts.push(format!(
                            "$.echo(\"{}\", $.conditionalScope);",
                            err_redeclare_constant(name)
                        ));
                        parts.push(format!("{name} = {literal};"));
                    }
                    None => log::warn!(
                        "declarator mixes constant and non-constant bindings; '{name}' is dropped"
                    ),
                }
            }
        } else {
            parts.push(format!("{keyword} {};", &unit[declarator.byte_range()]));
            if keyword != "var" {
                for name in names {
                    appended.push(format!("$.context('{name}', {name});"));
                }
            }
        }
    }
    parts.extend(appended);
    edits.push(UnitEdit {
        start: statement.start_byte(),
        end: statement.end_byte(),
        text: parts.join("\n"),
    });
}

fn trap_reassignment(
    statement: Node,
    unit: &str,
    constants: &[(String, String)],
    edits: &mut Vec<UnitEdit>,
) {
    let Some(expression) = statement.named_child(0) else {
        return;
    };
    if expression.kind() != "assignment_expression" {
        return;
    }
    let Some(left) = expression.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = &unit[left.byte_range()];

    match constant_literal(constants, name) {
        Some(literal) => {
            let text = format!(
                "$.echo(\"{}\", $.conditionalScope);\n{name} = {literal};",
                err_redeclare_constant(name)
            );
            edits.push(UnitEdit {
                start: statement.start_byte(),
                end: statement.end_byte(),
                text,
            });
        }
        None => {
            let at = statement.end_byte();
            edits.push(UnitEdit {
                start: at,
                end: at,
                text: format!("\n$.context('{name}', {name});"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> Vec<(String, String)> {
        vec![("K".to_string(), "1".to_string())]
    }

    #[test]
    fn scope_is_threaded_into_calls() {
        assert_eq!(
            phase_b("$.if(ready);", &[]),
            "$.if(ready, $.conditionalScope);"
        );
        assert_eq!(
            phase_b("$.echo('a');", &[]),
            "$.echo('a', $.conditionalScope);"
        );
        assert_eq!(
            phase_b("$.else();\n$.end();", &[]),
            "$.else($.conditionalScope);\n$.end($.conditionalScope);"
        );
        // `$.elseif` is not mistaken for `$.else`.
        assert_eq!(
            phase_b("$.elseif(x);", &[]),
            "$.elseif(x, $.conditionalScope);"
        );
        // Nested parens resolve to the outer close.
        assert_eq!(
            phase_b("$.echo(f(1, 2));", &[]),
            "$.echo(f(1, 2), $.conditionalScope);"
        );
    }

    #[test]
    fn longer_names_are_not_threaded() {
        assert_eq!(phase_b("$.echoes('a');", &[]), "$.echoes('a');");
    }

    #[test]
    fn declarations_persist_to_context() {
        assert_eq!(
            phase_b("let t = 'T';", &[]),
            "let t = 'T';\n$.context('t', t);"
        );
        assert_eq!(
            phase_b("const a = 1, b = 2;", &[]),
            "const a = 1, b = 2;\n$.context('a', a);\n$.context('b', b);"
        );
        // `var` declarations do not persist.
        assert_eq!(phase_b("var v = 9;", &[]), "var v = 9;");
    }

    #[test]
    fn context_call_lands_before_trailing_statements() {
        let out = phase_b("let t = 'T'; $.include('b');", &[]);
        assert_eq!(
            out,
            "let t = 'T';\n$.context('t', t); $.include('b', $.conditionalScope);"
        );
    }

    #[test]
    fn multiline_declarations_accumulate() {
        let out = phase_b("let o = {\n  a: 1,\n};", &[]);
        assert_eq!(out, "let o = {\n  a: 1,\n};\n$.context('o', o);");
    }

    #[test]
    fn constant_declaration_is_replaced() {
        let out = phase_b("let K = 2;", &constants());
        assert_eq!(
            out,
            format!(
                "$.echo(\"{}\", $.conditionalScope);\nK = 1;",
                err_redeclare_constant("K")
            )
        );
    }

    #[test]
    fn constant_reassignment_is_replaced() {
        let out = phase_b("K = 2;", &constants());
        assert_eq!(
            out,
            format!(
                "$.echo(\"{}\", $.conditionalScope);\nK = 1;",
                err_redeclare_constant("K")
            )
        );
    }

    #[test]
    fn plain_reassignment_persists() {
        assert_eq!(phase_b("x = 5;", &[]), "x = 5;\n$.context('x', x);");
        // A reassignment on a line with `$` is left alone.
        assert_eq!(
            phase_b("x = $.obClose();", &[]),
            "x = $.obClose();"
        );
    }

    #[test]
    fn one_line_function_gets_context_call() {
        assert_eq!(
            phase_b("const f = (a) => a + 1;", &[]),
            "const f = (a) => a + 1;\n$.context('f', f);"
        );
        assert_eq!(
            phase_b("function g() { return 1; }", &[]),
            "function g() { return 1; }\n$.context('g', g);"
        );
    }

    #[test]
    fn multiline_function_tracks_brace_depth() {
        let out = phase_b("const f = (a) => {\n  let inner = a;\n  return inner;\n};", &[]);
        assert_eq!(
            out,
            "const f = (a) => {\n  let inner = a;\n  return inner;\n};\n$.context('f', f);"
        );
    }

    #[test]
    fn destructuring_declaration_binds_all_names() {
        let out = phase_b("let { a, b } = pair;", &[]);
        assert!(out.contains("$.context('a', a);"));
        assert!(out.contains("$.context('b', b);"));
    }
}

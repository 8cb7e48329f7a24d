//! Source-to-source rewriter for one script block.
//!
//! The block text goes through five phases:
//! - **A** `$`-sugar expansion: `$echo(…)` → `$.echo(…)` for every known
//!   runtime method;
//! - **B** line scan: conditional-scope threading, the function tracker
//!   and declaration/reassignment trapping ([`lines`]);
//! - **C** prelude injection: one `const` per defined constant, one
//!   `let` per context variable, prepended so every block sees the
//!   document scope;
//! - **D** AST pass: comment removal, `let`/`const` → `var`,
//!   capture-mode includes and undefined-identifier stubs ([`ast`]);
//! - **E** rebinding conflict resolution: a body line that redeclares a
//!   context variable loses its declaration keyword.
//!
//! The result is a self-contained fragment evaluated with a single
//! parameter named `$`.

pub mod ast;
pub mod lines;
pub mod scan;

use regex::Regex;
use std::collections::HashSet;

/// The `$`-method names phase A recognizes.
pub const DOLLAR_METHODS: &[&str] = &[
    "echo", "context", "define", "include", "obOpen", "obClose", "obStatus", "if", "elseif",
    "else", "end", "version",
];

/// Bare aliases the evaluator shim provides; the undefined-identifier
/// pass must not stub them.
pub const BARE_ALIASES: &[&str] = &[
    "echo", "include", "define", "context", "obOpen", "obClose", "obStatus", "version",
];

/// Everything the rewriter needs to know about the document scope.
#[derive(Debug, Default)]
pub struct RewriteScope<'a> {
    /// Constant name → rendered literal.
    pub constants: &'a [(String, String)],
    /// Context variable name → rendered literal.
    pub context: &'a [(String, String)],
    /// Registered `$` extension names (phase A sugar, allow-list).
    pub extensions: &'a [String],
}

/// Rewrite one script block into an executable fragment.
pub fn rewrite_block(source: &str, scope: &RewriteScope<'_>) -> String {
    let sugared = phase_a(source, scope.extensions);
    let scanned = lines::phase_b(&sugared, scope.constants);
    let (fragment, prelude_lines) = phase_c(&scanned, scope);

    let mut allowed: HashSet<String> = BARE_ALIASES.iter().map(|s| s.to_string()).collect();
    allowed.extend(scope.extensions.iter().cloned());
    let (rewritten, stub_lines) = ast::phase_d(&fragment, &allowed);

    phase_e(&rewritten, stub_lines + prelude_lines, scope.context)
}

/// Phase A: `$ident` becomes `$.ident` when `ident` is a known method.
fn phase_a(source: &str, extensions: &[String]) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut copied = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'$' {
            let prev_is_ident = i > 0
                && (bytes[i - 1].is_ascii_alphanumeric()
                    || bytes[i - 1] == b'_'
                    || bytes[i - 1] == b'$');
            let mut j = i + 1;
            if !prev_is_ident
                && j < bytes.len()
                && (bytes[j].is_ascii_alphabetic() || bytes[j] == b'_')
            {
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                    j += 1;
                }
                let ident = &source[i + 1..j];
                if DOLLAR_METHODS.contains(&ident) || extensions.iter().any(|e| e == ident) {
                    out.push_str(&source[copied..i]);
                    out.push_str("$.");
                    out.push_str(ident);
                    copied = j;
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }
    out.push_str(&source[copied..]);
    out
}

/// Phase C: prepend constant and context bindings. Returns the fragment
/// and the number of prelude lines.
fn phase_c(body: &str, scope: &RewriteScope<'_>) -> (String, usize) {
    let mut prelude = String::new();
    let mut count = 0usize;
    for (name, literal) in scope.constants {
        prelude.push_str(&format!("const {name} = {literal};\n"));
        count += 1;
    }
    for (name, literal) in scope.context {
        prelude.push_str(&format!("let {name} = {literal};\n"));
        count += 1;
    }
    (format!("{prelude}{body}"), count)
}

/// Phase E: a body-line declaration of a name that is already a context
/// variable loses its keyword and becomes a plain assignment to the
/// pre-bound variable. Prelude and stub lines are exempt.
fn phase_e(fragment: &str, protected_lines: usize, context: &[(String, String)]) -> String {
    if context.is_empty() {
        return fragment.to_string();
    }
    // Longest first, so one name being a prefix of another cannot make
    // the alternation stop short.
    let mut names: Vec<&str> = context.iter().map(|(name, _)| name.as_str()).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    let names = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(
        r"^(\s*)(?:let|const|var)\s+((?:{names})\s*=)"
    ))
    .expect("context redeclaration pattern");

    fragment
        .split('\n')
        .enumerate()
        .map(|(index, line)| {
            if index < protected_lines {
                line.to_string()
            } else {
                pattern.replace(line, "$1$2").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

//! Render a host [`Value`] as a source fragment the embedded evaluator
//! parses back to an equal value.
//!
//! Strings become backtick literals with backslash, backtick and `${`
//! escaped; object keys are JSON-encoded so a key can never be mistaken
//! for an identifier; dates become `new Date(ms)`; regexes keep their
//! literal text; function sources are parenthesised so method-shorthand
//! sources still parse in expression position.

use crate::value::Value;

pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => render_float(*f),
        Value::BigInt(digits) => format!("{digits}n"),
        Value::Str(s) => render_string(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(pairs) => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}: {}",
                        serde_json::to_string(key).unwrap_or_else(|_| "\"\"".to_string()),
                        render(value)
                    )
                })
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        Value::Function { source } => format!("({source})"),
        Value::Date { epoch_ms } => format!("new Date({epoch_ms})"),
        Value::Regex { literal } => literal.clone(),
        Value::Symbol { description } => format!(
            "Symbol({})",
            serde_json::to_string(description).unwrap_or_else(|_| "\"\"".to_string())
        ),
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

fn render_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('`');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('`');
    out
}

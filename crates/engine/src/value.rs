//! Host value model.
//!
//! Scalars are inline; aggregates own their storage. Objects keep
//! insertion order (a `Vec` of pairs rather than a map), because the
//! order of keys is observable when a value is re-rendered into a script
//! prelude.
//!
//! Values cross the evaluator boundary as a tagged JSON encoding
//! produced by the script-side shim; [`Value::decode_tagged`] is the
//! host half of that bridge.

use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(String),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    /// A function, carried as its source text.
    Function { source: String },
    /// A date, carried as epoch milliseconds.
    Date { epoch_ms: i64 },
    /// A regular expression, carried as its full literal (`/ab+/gi`).
    Regex { literal: String },
    Symbol { description: String },
}

impl Value {
    /// Decode the shim's tagged JSON encoding. Anything malformed decodes
    /// to `Undefined` rather than failing; the bridge is best-effort by
    /// contract.
    pub fn decode_tagged(encoded: &str) -> Value {
        match serde_json::from_str::<Json>(encoded) {
            Ok(json) => decode(&json),
            Err(err) => {
                log::warn!("undecodable value from evaluator: {err}");
                Value::Undefined
            }
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::BigInt(s) => s != "0",
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// Plain JSON maps onto the value model directly (numbers become `Int`
/// when they are integral). This is the conversion embedders use to
/// seed context and constants.
impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

fn decode(json: &Json) -> Value {
    let Some(tag) = json.get("t").and_then(Json::as_str) else {
        return Value::Undefined;
    };
    let payload = json.get("v");
    match (tag, payload) {
        ("null", _) => Value::Null,
        ("undef", _) => Value::Undefined,
        ("bool", Some(Json::Bool(b))) => Value::Bool(*b),
        ("num", Some(Json::String(s))) => decode_number(s),
        ("bigint", Some(Json::String(s))) => Value::BigInt(s.clone()),
        ("str", Some(Json::String(s))) => Value::Str(s.clone()),
        ("fn", Some(Json::String(s))) => Value::Function { source: s.clone() },
        ("date", Some(Json::String(s))) => Value::Date {
            epoch_ms: s.parse().unwrap_or(0),
        },
        ("re", Some(Json::String(s))) => Value::Regex { literal: s.clone() },
        ("sym", Some(Json::String(s))) => Value::Symbol {
            description: s.clone(),
        },
        ("arr", Some(Json::Array(items))) => Value::Array(items.iter().map(decode).collect()),
        ("obj", Some(Json::Array(pairs))) => Value::Object(
            pairs
                .iter()
                .filter_map(|pair| {
                    let key = pair.get(0)?.as_str()?;
                    Some((key.to_string(), decode(pair.get(1)?)))
                })
                .collect(),
        ),
        _ => Value::Undefined,
    }
}

/// Numbers travel as strings so integers outside the f64-exact range and
/// the non-finite floats survive the JSON hop.
fn decode_number(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    match text.parse::<f64>() {
        Ok(f) => Value::Float(f),
        Err(_) => Value::Undefined,
    }
}

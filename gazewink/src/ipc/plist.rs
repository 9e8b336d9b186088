//! Property-list helpers — keyword lookup in parsed s-expressions, response
//! builders, and decoding of frame and element messages.
//!
//! Shared by the socket dispatcher and the offline replay reader.

use lexpr::Value;

use crate::tracking::frame::{Frame, Point};
use crate::tracking::surface::SceneElement;

// ── Responses ───────────────────────────────────────────────

pub fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── Lookup ──────────────────────────────────────────────────

/// Find the value following `:key` in a plist, rendered as a string.
/// Accepts both `Value::Keyword("key")` and `Value::Symbol(":key")` forms
/// of the key.
pub fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return Some(match val {
                Value::Keyword(v) => v.to_string(),
                Value::Symbol(v) => {
                    let s: &str = v;
                    s.strip_prefix(':').unwrap_or(s).to_string()
                }
                Value::String(v) => v.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "t".to_string(),
                Value::Bool(false) | Value::Null | Value::Nil => "nil".to_string(),
                _ => val.to_string(),
            });
        }
        current = pair.cdr();
    }
    None
}

pub fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

pub fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

pub fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// `nil` is false; anything else present is true.
pub fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

// ── Decoding ────────────────────────────────────────────────

/// Read a coordinate pair.  Missing or non-numeric fields are no data.
fn get_point(value: &Value, x_key: &str, y_key: &str) -> Point {
    match (get_float(value, x_key), get_float(value, y_key)) {
        (Some(x), Some(y)) => Point::sanitized(x, y),
        _ => Point::ZERO,
    }
}

/// Decode `:x :y :left-x :left-y :right-x :right-y` into a frame.
pub fn parse_frame(value: &Value) -> Frame {
    Frame::new(
        get_point(value, "x", "y"),
        get_point(value, "left-x", "left-y"),
        get_point(value, "right-x", "right-y"),
    )
}

/// Decode `:id :x :y :width :height [:pinned t]` into a scene element.
pub fn parse_element(value: &Value) -> Result<SceneElement, String> {
    let id = match get_int(value, "id") {
        Some(id) if id >= 0 => id as u64,
        Some(_) => return Err("invalid :id (must be non-negative)".to_string()),
        None => return Err("missing :id".to_string()),
    };
    let field = |key: &str| {
        get_float(value, key)
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("missing or invalid :{}", key))
    };
    let x = field("x")?;
    let y = field("y")?;
    let width = field("width")?;
    let height = field("height")?;
    if width <= 0.0 || height <= 0.0 {
        return Err("element must have positive :width and :height".to_string());
    }
    Ok(SceneElement {
        id,
        x,
        y,
        width,
        height,
        pinned: get_bool(value, "pinned").unwrap_or(false),
    })
}

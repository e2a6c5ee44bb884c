//! Lenient counter value parsing
//!
//! The store has been seen returning plain numbers, numeric strings, arrays
//! wrapping the number and objects wrapping it. Anything else is `None` so the
//! caller keeps its last good value instead of showing garbage.

use serde_json::Value;

/// Object fields that may carry the counter, in lookup order
const WRAPPER_FIELDS: [&str; 3] = ["value", "data", "result"];

/// Extract a counter value from whatever the store returned
pub fn parse_counter(value: &Value) -> Option<i64> {
    match value {
        Value::Null | Value::Bool(_) => None,
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64)
        }),
        Value::String(s) => parse_leading_int(s),
        Value::Array(items) => {
            let first = items.first()?;
            log::warn!("Store returned an array, using its first element");
            parse_counter(first)
        }
        Value::Object(map) => {
            log::warn!("Store returned an object: {value}");
            WRAPPER_FIELDS
                .iter()
                .find_map(|field| map.get(*field))
                .and_then(parse_counter)
        }
    }
}

/// Parse a leading base-10 integer, ignoring leading whitespace and any
/// trailing garbage ("42abc" -> 42, "3.9" -> 3)
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = match s.as_bytes().first()? {
        b'-' | b'+' => 1,
        _ => 0,
    };
    let digits = s[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

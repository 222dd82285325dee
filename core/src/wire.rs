//! Wire format shared by captured values, call arguments and replies.
//!
//! Values travel as JSON. Inside the assembled program they are written as
//! `<json module>.loads("<json text>")` so that JSON's `true`, `false` and
//! `null` are never spliced into Python source as bare tokens.

use serde::Serialize;
use serde_json::Value;

use crate::error::{LandingError, Result};


/// Encode call arguments into positional values.
///
/// A tuple, array or `Vec` supplies one argument per element. `()` and
/// `None` mean no arguments. Any other value is a single argument. To pass a
/// single sequence or `None` as one argument, wrap it in a 1-tuple
/// (`(vec![1, 2],)`) or use `Handle::call1`.
pub fn encode_args<A: Serialize>(args: A) -> Result<Vec<Value>> {
    match serde_json::to_value(args).map_err(LandingError::Encode)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

/// Encode to text and decode again. Values that do not survive unchanged
/// are rejected.
pub fn round_trip(value: &Value) -> std::result::Result<Value, String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    let back: Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    if back == *value {
        Ok(back)
    } else {
        Err(format!("value changed in transit: {} became {}", value, back))
    }
}

/// Name the assembled program binds the `json` module to, out of the way of
/// anything the shipped code defines.
pub const JSON_MODULE: &str = "__landing_json";

/// A Python expression evaluating to `value`. Requires
/// `import json as __landing_json`.
pub fn python_literal(value: &Value) -> String {
    // A JSON string literal is also a valid Python string literal.
    let text = value.to_string();
    format!("{}.loads({})", JSON_MODULE, Value::String(text))
}

/// Prefix of every helper name the assembled program defines.
pub const RESERVED_PREFIX: &str = "__landing_";

/// Whether `name` would collide with the assembled program's own helpers.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Whether `name` can be used as a Python identifier (ASCII subset).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) && !is_keyword(name)
}

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
    "return", "try", "while", "with", "yield",
];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}


#[cfg(test)]
/// Deterministic xorshift sequence of finite floats across magnitudes.
pub(crate) fn sample_floats(count: usize) -> Vec<f64> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
        out.push(unit);
        out.push(unit * 1e6 - 5e5);
        let raw = f64::from_bits(state);
        if raw.is_finite() {
            out.push(raw);
        }
    }
    out.truncate(count);
    out
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn tuple_args_are_positional() {
        let args = encode_args((1, "two", [3.5])).unwrap();
        assert_eq!(args, vec![json!(1), json!("two"), json!([3.5])]);
    }

    #[test]
    fn unit_means_no_args() {
        assert!(encode_args(()).unwrap().is_empty());
        assert!(encode_args(None::<i32>).unwrap().is_empty());
    }

    #[test]
    fn scalar_is_single_arg() {
        assert_eq!(encode_args(42).unwrap(), vec![json!(42)]);
        assert_eq!(encode_args("x").unwrap(), vec![json!("x")]);
    }

    #[test]
    fn unencodable_args_fail() {
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = encode_args((bad,)).unwrap_err();
        assert!(matches!(err, LandingError::Encode(_)));
    }

    #[test]
    fn round_trip_preserves_nested_values() {
        let v = json!({"a": [1, 2.5, null, true], "b": {"c": "d\n\"e\""}});
        assert_eq!(round_trip(&v).unwrap(), v);
    }

    #[test]
    fn round_trip_preserves_floats_exactly() {
        for x in sample_floats(3000).into_iter().chain([0.1, 1.0 / 3.0, 5e-324, f64::MAX, -0.0]) {
            let v = json!(x);
            assert_eq!(round_trip(&v).unwrap(), v, "float {:e} changed", x);
        }
        let v = json!(0.9107373369893147);
        assert_eq!(round_trip(&v).unwrap().as_f64(), Some(0.9107373369893147));
    }

    #[test]
    fn single_sequence_needs_a_tuple() {
        assert_eq!(encode_args(vec![1, 2]).unwrap().len(), 2);
        assert_eq!(encode_args((vec![1, 2],)).unwrap(), vec![json!([1, 2])]);
        assert_eq!(encode_args((None::<i32>,)).unwrap(), vec![json!(null)]);
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved("__landing_buffer"));
        assert!(!is_reserved("__init__"));
        assert!(!is_reserved("landing"));
    }

    #[test]
    fn literal_wraps_json_in_python_string() {
        assert_eq!(python_literal(&json!(true)), r#"__landing_json.loads("true")"#);
        assert_eq!(python_literal(&json!(null)), r#"__landing_json.loads("null")"#);
        assert_eq!(
            python_literal(&json!({"k": "v"})),
            r#"__landing_json.loads("{\"k\":\"v\"}")"#
        );
    }

    #[test]
    fn literal_escapes_newlines() {
        let lit = python_literal(&json!("line1\nline2"));
        assert!(!lit.contains('\n'));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("data"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("@data"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("class"));
    }
}

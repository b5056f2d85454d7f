use crate::constants::TOKEN_PREFIX;

/// Format a token number into its wire form (`7` -> `"$7"`).
pub fn format_token(index: u64) -> String {
    format!("{TOKEN_PREFIX}{index}")
}

/// Parse the wire form of a token.
///
/// Only the canonical form is accepted: prefix, then a strictly positive
/// decimal integer without sign or leading zeros.
pub fn parse_token(s: &str) -> Option<u64> {
    let digits = s.strip_prefix(TOKEN_PREFIX)?;
    if digits.is_empty() || digits.starts_with('0') {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()
}

/// Does this string look like a placeholder token?
#[inline]
pub fn is_token(s: &str) -> bool {
    parse_token(s).is_some()
}

/// Short human label for a JSON value kind, used in diagnostics.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

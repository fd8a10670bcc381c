//! Identifier and value sanitizing.
//!
//! Every identifier that reaches rendered SQL passes through
//! [`sanitize_identifier`] first, and every bound parameter through
//! [`sanitize_value`]. User values are never interpolated into SQL text;
//! LIKE values are additionally run through [`escape_like_pattern`].
//!
//! Accepted identifiers are dotted sequences of segments matching
//! `[A-Za-z_][A-Za-z0-9_$]*`; the final segment may be `*`.

use crate::{Error, Result, Value};

/// Escape character used for LIKE patterns on every dialect
pub const LIKE_ESCAPE: char = '\\';

/// Validate an identifier, returning it unchanged when it is safe to quote
///
/// # Examples
/// ```
/// use quarry_core::sanitize::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("public.users").unwrap(), "public.users");
/// assert!(sanitize_identifier("users; DROP TABLE users").is_err());
/// ```
pub fn sanitize_identifier(name: &str) -> Result<&str> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(Error::invalid_identifier(name))
    }
}

/// True when `name` is `*` or a dotted identifier whose last segment may be `*`
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let segments: Vec<&str> = name.split('.').collect();
    let last = segments.len() - 1;
    segments.iter().enumerate().all(|(i, segment)| {
        if i == last && *segment == "*" {
            return true;
        }
        is_valid_segment(segment)
    })
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Split `column AS alias` on the case-insensitive ` as ` token
///
/// Returns `None` when the entry carries no alias.
pub fn split_alias(entry: &str) -> Option<(&str, &str)> {
    let lower = entry.to_ascii_lowercase();
    let idx = lower.find(" as ")?;
    Some((entry[..idx].trim(), entry[idx + 4..].trim()))
}

/// Split a dotted JSON path into segments of `[A-Za-z0-9_]`
///
/// Paths are embedded in SQL as literals, so anything outside that set is
/// rejected rather than escaped.
pub fn sanitize_json_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    let valid = segments.iter().all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if valid {
        Ok(segments)
    } else {
        Err(Error::invalid_identifier(path))
    }
}

/// True for a path segment addressing an array element
pub fn is_index_segment(segment: &str) -> bool {
    segment.chars().all(|c| c.is_ascii_digit())
}

/// Coerce a value into a form safe to bind as a parameter
///
/// NUL bytes are stripped from strings (Postgres rejects them in text) and
/// non-finite floats become NULL.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', "")),
        Value::F32(f) if !f.is_finite() => Value::Null,
        Value::F64(f) if !f.is_finite() => Value::Null,
        Value::Array(values) => Value::Array(values.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

/// Backslash-escape the LIKE metacharacters `%` and `_` (and the escape itself)
///
/// # Examples
/// ```
/// use quarry_core::sanitize::escape_like_pattern;
///
/// assert_eq!(escape_like_pattern("50%_off"), "50\\%\\_off");
/// ```
pub fn escape_like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Apply [`escape_like_pattern`] to string values; other values pass through
pub fn escape_like_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_like_pattern(&s)),
        other => other,
    }
}

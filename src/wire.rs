//! Shared shapes and field coercions for the v.sjtu.edu.cn JSON API.
//!
//! The service is loose about scalar types: `code` and id fields arrive as
//! either numbers or numeric strings depending on the endpoint. Helpers here
//! accept both so the rest of the crate can work with concrete types.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Standard response envelope: `{code, message?, data?}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Returns the numeric `code`, whichever scalar type the server chose.
    pub fn code(&self) -> Result<i64> {
        as_int(&self.code)
            .ok_or_else(|| Error::Shape(format!("non-numeric response code: {}", self.code)))
    }
}

/// Reads a JSON value as an integer, accepting numbers and numeric strings.
#[must_use]
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a JSON value as a string, accepting strings and numbers.
#[must_use]
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts an integer field from a JSON object.
pub fn int_field(obj: &Value, key: &str) -> Result<i64> {
    obj.get(key)
        .and_then(as_int)
        .ok_or_else(|| Error::Shape(format!("missing integer field `{key}`")))
}

/// Extracts a string field from a JSON object.
pub fn string_field(obj: &Value, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(as_string)
        .ok_or_else(|| Error::Shape(format!("missing string field `{key}`")))
}

/// Characters escaped by URL path quoting: everything except alphanumerics,
/// `_.-~`, and `/`. Matches what the live service expects for the
/// `canvasCourseId` parameter.
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Percent-encodes a string with path-style quoting.
#[must_use]
pub fn quote(s: &str) -> String {
    utf8_percent_encode(s, QUOTE_SET).to_string()
}

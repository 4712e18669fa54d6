//! Transport-safe output.
//!
//! Results leave the process as JSON text read by another program. Every
//! string is stripped of ANSI escape sequences and of control characters
//! other than newline and tab before serialization.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::domain::Result;

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
            .expect("static ANSI pattern is valid")
    })
}

/// Remove ANSI color and cursor sequences.
pub fn strip_ansi(text: &str) -> String {
    ansi_re().replace_all(text, "").into_owned()
}

/// Strip ANSI escapes, then every control character except `\n` and `\t`.
pub fn sanitize_text(text: &str) -> String {
    strip_ansi(text)
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Sanitize every string (keys included) in a JSON value.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_text(&k), sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Pretty JSON for the calling channel.
pub fn to_transport_json<T: Serialize>(value: &T) -> Result<String> {
    let sanitized = sanitize_value(serde_json::to_value(value)?);
    Ok(serde_json::to_string_pretty(&sanitized)?)
}

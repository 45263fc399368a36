//! Sensitive-field masking for structured values.
//!
//! Not part of the processor chain: callers logging user-supplied or
//! credential-bearing structures apply this transform explicitly before
//! handing the value to a log macro.

use serde_json::Value;

/// Replacement string for masked values.
pub const MASK: &str = "***masked***";

/// Any key containing one of these (case-insensitive) is masked.
const SENSITIVE_KEYWORDS: [&str; 9] = [
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "credential",
    "pass",
    "pwd",
    "api_key",
];

/// Returns a copy of `value` with every sensitive field replaced by
/// [`MASK`].
///
/// A field is sensitive when its key contains any keyword from the fixed
/// set, case-insensitively. The transform recurses into nested mappings;
/// non-sensitive scalars are left untouched.
#[must_use]
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String(MASK.to_string()))
                    } else {
                        (key.clone(), mask_sensitive(val))
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

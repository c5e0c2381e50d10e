//! Recovering JSON from model output.
//!
//! Models wrap JSON in prose, markdown fences, or both. Every parse of
//! collaborator output goes through [`parse_object`] so the unwrapping rules
//! live in one place.

use serde_json::{Map, Value};

/// Remove a surrounding markdown code fence, including its language tag.
///
/// Text without a fence is returned trimmed.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[open + 3..];
    // Skip the language tag (```json, ```JSON, ```text ...).
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or_else(|| {
        after_open
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after_open.len())
    });
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Slice from the first `{` to the last `}`.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Locate and parse a JSON object in model output.
///
/// Returns `None` when no object can be recovered.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let candidates = [strip_fences(text), text.trim()];

    for candidate in candidates {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return Some(map);
        }
        if let Some(span) = object_span(candidate) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
                return Some(map);
            }
        }
    }

    None
}

/// Read a string field, treating blanks and JSON null as absent.
pub fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(String::from)
}

/// Read a number that models sometimes send as a string. `NaN` and
/// infinities are treated as absent.
pub fn f64_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Read a boolean that models sometimes send as a string.
pub fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read a list of strings, dropping non-string entries.
pub fn str_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_and_bare_parse_identically() {
        let bare = r#"{"mode": "analysis", "needs_clarification": false}"#;
        let fenced = format!("```json\n{}\n```", bare);
        assert_eq!(parse_object(bare), parse_object(&fenced));
        assert!(parse_object(&fenced).is_some());
    }

    #[test]
    fn test_fence_on_one_line() {
        let text = r#"```json {"mode": "chat"} ```"#;
        let map = parse_object(text).unwrap();
        assert_eq!(map["mode"], "chat");
    }

    #[test]
    fn test_object_inside_prose() {
        let text = "Sure! Here is the plan:\n{\"mode\": \"full\"}\nLet me know.";
        let map = parse_object(text).unwrap();
        assert_eq!(map["mode"], "full");
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_object("I cannot help with that").is_none());
        assert!(parse_object("[1, 2, 3]").is_none());
        assert!(parse_object("{not json}").is_none());
    }

    #[test]
    fn test_strip_fences_without_fence() {
        assert_eq!(strip_fences("  plain text "), "plain text");
    }

    #[test]
    fn test_field_helpers_coerce() {
        let map = parse_object(
            r#"{"a": " x ", "b": "null", "c": "0.8", "d": "true", "e": ["p", 3, " q "]}"#,
        )
        .unwrap();
        assert_eq!(str_field(&map, "a").as_deref(), Some("x"));
        assert_eq!(str_field(&map, "b"), None);
        assert_eq!(f64_field(&map, "c"), Some(0.8));
        assert_eq!(bool_field(&map, "d"), Some(true));
        assert_eq!(str_list(&map, "e"), vec!["p", "q"]);
    }
}

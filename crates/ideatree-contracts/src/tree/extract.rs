use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

pub const EMPTY_TITLE: &str = "Empty";
pub const RAW_OUTPUT_TITLE: &str = "Raw Output";
pub const RAW_PREVIEW_CHARS: usize = 200;

/// Removes every markdown fence marker, tagged (```json) or bare (```).
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Recovers a JSON value from free model text.
///
/// Tries the fence-stripped text as a whole, then the first greedy
/// `{...}` / `[...]` span inside it. When neither parses the result is a
/// one-node `nodes` payload carrying a preview of the text, so the caller
/// always has something the normalizer can consume.
pub fn extract_loose_json(text: Option<&str>) -> Value {
    let Some(text) = text.filter(|value| !value.trim().is_empty()) else {
        return fallback_payload(EMPTY_TITLE, "");
    };

    let cleaned = strip_code_fences(text);
    if let Ok(parsed) = serde_json::from_str::<Value>(&cleaned) {
        return parsed;
    }

    if let Some(found) = embedded_json_pattern().find(&cleaned) {
        if let Ok(parsed) = serde_json::from_str::<Value>(found.as_str()) {
            return parsed;
        }
    }

    let preview = cleaned.chars().take(RAW_PREVIEW_CHARS).collect::<String>();
    fallback_payload(RAW_OUTPUT_TITLE, &preview)
}

fn fallback_payload(title: &str, desc: &str) -> Value {
    json!({
        "nodes": [{
            "title": title,
            "desc": desc,
            "children": [],
        }]
    })
}

fn embedded_json_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("embedded json pattern is valid")
    })
}

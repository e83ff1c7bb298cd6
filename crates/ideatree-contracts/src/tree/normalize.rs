use serde_json::{Map, Value};

use super::node::{IdeaNode, UNTITLED_NODE};

// Checked in order; the first present key wins and the rest of the object is dropped.
const WRAPPER_KEYS: [&str; 4] = ["root", "nodes", "levels", "ideas"];
const TITLE_KEYS: [&str; 3] = ["title", "name", "idea"];
const CHILD_KEYS: [&str; 5] = ["children", "ideas", "sub_ideas", "levels", "nodes"];

/// Coerces any model-produced JSON shape into canonical idea nodes.
///
/// Total over `Value`: every input yields a (possibly empty) node list.
/// `fallback_label` titles a lone `{children: [...]}` object that carries no
/// title key of its own; list items fall back to the placeholder instead.
pub fn normalize_nodes(value: &Value, fallback_label: &str) -> Vec<IdeaNode> {
    if is_empty(value) {
        return Vec::new();
    }
    match value {
        Value::Object(map) => normalize_object(map, fallback_label),
        Value::Array(items) => normalize_sequence(items, fallback_label),
        scalar => vec![IdeaNode::leaf(scalar_text(scalar))],
    }
}

fn normalize_object(map: &Map<String, Value>, fallback_label: &str) -> Vec<IdeaNode> {
    if let Some(inner) = WRAPPER_KEYS.iter().find_map(|key| map.get(*key)) {
        return normalize_nodes(inner, fallback_label);
    }

    if let Some(Value::Array(children)) = map.get("children") {
        let title = title_from(map).unwrap_or_else(|| {
            let label = fallback_label.trim();
            if label.is_empty() {
                UNTITLED_NODE.to_string()
            } else {
                label.to_string()
            }
        });
        return vec![IdeaNode::new(
            title,
            desc_from(map),
            normalize_sequence(children, fallback_label),
        )];
    }

    map.iter()
        .map(|(key, value)| match value {
            Value::Object(_) | Value::Array(_) => IdeaNode::new(
                key.clone(),
                String::new(),
                normalize_nodes(value, fallback_label),
            ),
            scalar => IdeaNode::new(key.clone(), desc_text(scalar), Vec::new()),
        })
        .collect()
}

fn normalize_sequence(items: &[Value], fallback_label: &str) -> Vec<IdeaNode> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => {
                let children = CHILD_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_array))
                    .map(|rows| normalize_sequence(rows, fallback_label))
                    .unwrap_or_default();
                IdeaNode::new(
                    title_from(map).unwrap_or_else(|| UNTITLED_NODE.to_string()),
                    desc_from(map),
                    children,
                )
            }
            Value::String(text) => IdeaNode::leaf(text.clone()),
            other => IdeaNode::leaf(scalar_text(other)),
        })
        .collect()
}

fn title_from(map: &Map<String, Value>) -> Option<String> {
    TITLE_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !is_empty(value))
        .map(scalar_text)
        .filter(|title| !title.trim().is_empty())
}

fn desc_from(map: &Map<String, Value>) -> String {
    map.get("desc").map(desc_text).unwrap_or_default()
}

fn desc_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

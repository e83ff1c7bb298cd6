use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, COUNTRY_FLAGS, EXPORT_COMMAND, NODE_REF_COMMANDS, NO_ARG_COMMANDS,
    RAW_ARG_COMMANDS, RECIPE_COMMAND,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn split_country_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// `/recipe matcha pudding --countries "Japan, Taiwan"` → concept + countries.
/// A country flag takes the next token; bare tokens after it keep
/// accumulating into the concept.
fn parse_recipe_args(arg: &str) -> (String, Vec<String>) {
    let mut concept_parts: Vec<String> = Vec::new();
    let mut countries: Vec<String> = Vec::new();
    let mut tokens = split_args(arg).into_iter();
    while let Some(token) = tokens.next() {
        if let Some(inline) = COUNTRY_FLAGS
            .iter()
            .find_map(|flag| token.strip_prefix(&format!("{flag}=")))
        {
            countries.extend(split_country_list(inline));
            continue;
        }
        if COUNTRY_FLAGS.contains(&token.as_str()) {
            if let Some(value) = tokens.next() {
                countries.extend(split_country_list(&value));
            }
            continue;
        }
        concept_parts.push(token);
    }

    let mut deduped: Vec<String> = Vec::new();
    for country in countries {
        if !deduped
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&country))
        {
            deduped.push(country);
        }
    }
    (concept_parts.join(" "), deduped)
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = if action == "set_model" { "model" } else { "keyword" };
                return Intent::new(action, text).with_arg(key, Value::String(arg.to_string()));
            }

            if let Some(action) = find_action(&command, NODE_REF_COMMANDS) {
                let node_ref = split_args(arg).into_iter().next().unwrap_or_default();
                return Intent::new(action, text).with_arg("ref", Value::String(node_ref));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == EXPORT_COMMAND.command {
                let path = split_args(arg).join(" ");
                return Intent::new(EXPORT_COMMAND.action, text).with_arg(
                    "path",
                    if path.is_empty() {
                        Value::Null
                    } else {
                        Value::String(path)
                    },
                );
            }

            if command == RECIPE_COMMAND.command {
                let (concept, countries) = parse_recipe_args(arg);
                return Intent::new(RECIPE_COMMAND.action, text)
                    .with_arg("concept", Value::String(concept))
                    .with_arg(
                        "countries",
                        Value::Array(countries.into_iter().map(Value::String).collect()),
                    );
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    Intent::new("generate", text).with_arg("keyword", Value::String(raw_trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_a_generate_request() {
        let intent = parse_intent("  matcha  ");
        assert_eq!(intent.action, "generate");
        assert_eq!(intent.arg_str("keyword"), Some("matcha"));
    }

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn generate_keeps_the_whole_keyword() {
        let intent = parse_intent("/generate purple sweet potato");
        assert_eq!(intent.action, "generate");
        assert_eq!(intent.command_args["keyword"], json!("purple sweet potato"));

        let empty = parse_intent("/generate");
        assert_eq!(empty.arg_str("keyword"), None);
    }

    #[test]
    fn node_commands_take_paths_and_ids() {
        let expand = parse_intent("/expand 0.1");
        assert_eq!(expand.action, "expand");
        assert_eq!(expand.arg_str("ref"), Some("0.1"));

        let remove = parse_intent("/rm @3f2a");
        assert_eq!(remove.action, "remove");
        assert_eq!(remove.arg_str("ref"), Some("@3f2a"));

        let fav = parse_intent("/FAV 2");
        assert_eq!(fav.action, "favorite");
        assert_eq!(fav.arg_str("ref"), Some("2"));
    }

    #[test]
    fn export_path_is_optional_and_may_be_quoted() {
        assert_eq!(parse_intent("/export").command_args["path"], json!(null));
        assert_eq!(
            parse_intent("/export \"/tmp/my tree.json\"").command_args["path"],
            json!("/tmp/my tree.json")
        );
    }

    #[test]
    fn recipe_splits_concept_and_countries() {
        let intent = parse_intent(
            "/recipe matcha mochi roll --countries \"Japan, Taiwan\" -c japan --country=Hong\\ Kong",
        );
        assert_eq!(intent.action, "recipe");
        assert_eq!(intent.arg_str("concept"), Some("matcha mochi roll"));
        assert_eq!(
            intent.arg_list("countries"),
            vec!["Japan", "Taiwan", "Hong Kong"]
        );
    }

    #[test]
    fn no_arg_commands_map_to_actions() {
        assert_eq!(parse_intent("/tree").action, "show_tree");
        assert_eq!(parse_intent("/report").action, "report");
        assert_eq!(parse_intent("/analysis").action, "analysis");
        assert_eq!(parse_intent("/countries").action, "show_countries");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn model_command_carries_raw_argument() {
        let intent = parse_intent("/model gemini-2.5-pro");
        assert_eq!(intent.action, "set_model");
        assert_eq!(intent.arg_str("model"), Some("gemini-2.5-pro"));
    }

    #[test]
    fn unknown_command_is_reported() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}

pub mod config;
pub mod gateway;
pub mod prompts;
pub mod providers;
pub mod session;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Utc;
use ideatree_contracts::events::{EventPayload, EventWriter};
use ideatree_contracts::models::{ModelSelection, ModelSpec};
use ideatree_contracts::regulation::{
    jurisdiction, Jurisdiction, Recipe, RecipeAnalysis, RegulationRow, RegulationTable,
};
use ideatree_contracts::tree::{
    extract_loose_json, normalize_nodes, NodeRef, TreeError, TreeExport,
};
use serde_json::{json, Value};

pub use config::EngineConfig;
pub use gateway::GenerationGateway;
pub use prompts::{prompt_params, PromptBook, PromptKind, PromptParams, PromptTemplate, TemplateError};
pub use providers::{
    default_provider_registry, response_text, DryrunProvider, GeminiProvider, OpenAiProvider,
    TextProvider, TextProviderRegistry, TextRequest,
};
pub use session::Session;

use gateway::map_object;
use providers::push_unique_warning;

/// What one user action did: whether session state changed, plus anything
/// worth telling the user (failures included) and an optional text reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub changed: bool,
    pub warnings: Vec<String>,
    pub message: Option<String>,
}

impl ActionOutcome {
    fn changed(warnings: Vec<String>) -> Self {
        Self {
            changed: true,
            warnings,
            message: None,
        }
    }

    fn unchanged(warnings: Vec<String>) -> Self {
        Self {
            changed: false,
            warnings,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Interaction controller: turns user actions into gateway calls and tree
/// edits on the session it owns.
pub struct IdeaEngine {
    session: Session,
    gateway: GenerationGateway,
    prompts: PromptBook,
    events: EventWriter,
}

impl IdeaEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let session_id = format!("session-{}", Utc::now().format("%Y%m%dT%H%M%S"));
        let events = match config.events_path.as_ref() {
            Some(path) => EventWriter::new(path.clone(), session_id),
            None => EventWriter::disabled(session_id),
        };
        let prompts = PromptBook::load(config.prompts_dir.as_deref())?;
        Self::with_parts(
            default_provider_registry(config),
            prompts,
            events,
            config.model.as_deref(),
        )
    }

    pub fn with_parts(
        providers: TextProviderRegistry,
        prompts: PromptBook,
        events: EventWriter,
        requested_model: Option<&str>,
    ) -> Result<Self> {
        let gateway = GenerationGateway::new(providers, events.clone(), requested_model)?;
        events.emit(
            "session_started",
            map_object(json!({
                "model": gateway.model().name,
                "provider": gateway.model().provider,
                "fallback_reason": gateway.last_fallback_reason(),
            })),
        )?;
        Ok(Self {
            session: Session::default(),
            gateway,
            prompts,
            events,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model(&self) -> &ModelSpec {
        self.gateway.model()
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.gateway.last_fallback_reason()
    }

    pub fn set_model(&mut self, requested: &str) -> Result<ModelSelection> {
        self.gateway.set_model(requested)
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn generate_base_tree(&mut self, keyword: &str) -> Result<ActionOutcome> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return self.reject("generate", "Enter a keyword before generating an idea tree.");
        }

        let mut warnings = Vec::new();
        let text = self.call(
            PromptKind::BaseTree,
            prompt_params([("keyword", keyword)]),
            &mut warnings,
        )?;
        if text.trim().is_empty() {
            return Ok(ActionOutcome::unchanged(warnings));
        }

        let nodes = normalize_nodes(&extract_loose_json(Some(&text)), keyword);
        self.session.keyword = keyword.to_string();
        self.session.forest.replace_all(nodes);
        self.session.favorites.clear();
        self.session.report.clear();
        self.session.analysis.clear();

        self.record(
            "tree_generated",
            json!({
                "keyword": keyword,
                "top_level": self.session.forest.len(),
                "total_nodes": self.session.forest.count(),
            }),
            &mut warnings,
        );
        Ok(ActionOutcome::changed(warnings))
    }

    pub fn expand_node(&mut self, node_ref: &NodeRef) -> Result<ActionOutcome> {
        let path = self.session.forest.resolve(node_ref)?;
        let node = self.session.forest.node(&path)?;
        let (id, title, desc) = (node.id, node.title.clone(), node.desc.clone());

        let mut warnings = Vec::new();
        let text = self.call(
            PromptKind::ExpandNode,
            prompt_params([
                ("keyword", self.session.keyword.clone()),
                ("title", title.clone()),
                ("desc", desc),
            ]),
            &mut warnings,
        )?;
        if text.trim().is_empty() {
            return Ok(ActionOutcome::unchanged(warnings));
        }

        let additional = normalize_nodes(&extract_loose_json(Some(&text)), "");
        if additional.is_empty() {
            push_unique_warning(&mut warnings, format!("No sub-ideas came back for '{title}'."));
            return Ok(ActionOutcome::unchanged(warnings));
        }
        let added = additional.len();
        let path = self
            .session
            .forest
            .path_of(id)
            .ok_or_else(|| TreeError::UnknownId(id.to_string()))?;
        let child_count = self.session.forest.expand_node(&path, additional)?;

        self.record(
            "node_expanded",
            json!({
                "path": path.to_string(),
                "node_id": id.to_string(),
                "title": title,
                "added": added,
                "children": child_count,
            }),
            &mut warnings,
        );
        Ok(ActionOutcome::changed(warnings))
    }

    pub fn remove_node(&mut self, node_ref: &NodeRef) -> Result<ActionOutcome> {
        let path = self.session.forest.resolve(node_ref)?;
        let removed = self.session.forest.remove_at(&path)?;
        self.session.forget_favorites_under(&removed);

        let mut warnings = Vec::new();
        self.record(
            "node_removed",
            json!({
                "path": path.to_string(),
                "node_id": removed.id.to_string(),
                "title": removed.title,
                "total_nodes": self.session.forest.count(),
            }),
            &mut warnings,
        );
        Ok(ActionOutcome::changed(warnings)
            .with_message(format!("Removed '{}' ({path}).", removed.title)))
    }

    /// Toggles the favorite mark; the outcome message says which way.
    pub fn favorite_node(&mut self, node_ref: &NodeRef) -> Result<ActionOutcome> {
        let path = self.session.forest.resolve(node_ref)?;
        let node = self.session.forest.node(&path)?;
        let (id, title) = (node.id, node.title.clone());

        let favorited = if self.session.is_favorite(id) {
            self.session.favorites.retain(|existing| *existing != id);
            false
        } else {
            self.session.favorites.push(id);
            true
        };

        let mut warnings = Vec::new();
        self.record(
            "node_favorited",
            json!({
                "path": path.to_string(),
                "node_id": id.to_string(),
                "title": title,
                "favorited": favorited,
            }),
            &mut warnings,
        );
        let message = if favorited {
            format!("Added to favorites: {title}")
        } else {
            format!("Removed from favorites: {title}")
        };
        Ok(ActionOutcome::changed(warnings).with_message(message))
    }

    pub fn generate_report(&mut self) -> Result<ActionOutcome> {
        if self.session.forest.is_empty() {
            return self.reject("report", "Generate an idea tree before asking for a report.");
        }
        let mut warnings = Vec::new();
        let text = self.call(PromptKind::Report, self.tree_params()?, &mut warnings)?;
        if text.trim().is_empty() {
            return Ok(ActionOutcome::unchanged(warnings));
        }
        self.session.report = text;
        self.record(
            "report_generated",
            json!({
                "keyword": self.session.keyword,
                "chars": self.session.report.chars().count(),
            }),
            &mut warnings,
        );
        Ok(ActionOutcome::changed(warnings))
    }

    pub fn generate_analysis(&mut self) -> Result<ActionOutcome> {
        if self.session.forest.is_empty() {
            return self.reject("analysis", "Generate an idea tree before asking for an R&D analysis.");
        }
        let mut warnings = Vec::new();
        let text = self.call(PromptKind::RdAnalysis, self.tree_params()?, &mut warnings)?;
        if text.trim().is_empty() {
            return Ok(ActionOutcome::unchanged(warnings));
        }
        self.session.analysis = text;
        self.record(
            "analysis_generated",
            json!({
                "keyword": self.session.keyword,
                "chars": self.session.analysis.chars().count(),
            }),
            &mut warnings,
        );
        Ok(ActionOutcome::changed(warnings))
    }

    /// Recipe first, then one regulation lookup per (country, additive).
    pub fn analyze_recipe(&mut self, concept: &str, countries: &[String]) -> Result<ActionOutcome> {
        let concept = concept.trim();
        if concept.is_empty() {
            return self.reject("recipe", "Describe a food concept before checking regulations.");
        }

        let mut warnings = Vec::new();
        let mut selected: Vec<&'static Jurisdiction> = Vec::new();
        for name in countries {
            match jurisdiction(name) {
                Some(found) if !selected.contains(&found) => selected.push(found),
                Some(_) => {}
                None => push_unique_warning(
                    &mut warnings,
                    format!("Unknown country '{}' skipped; see /countries.", name.trim()),
                ),
            }
        }
        if selected.is_empty() {
            let mut outcome = self.reject("recipe", "Select at least one country to check.")?;
            warnings.append(&mut outcome.warnings);
            outcome.warnings = warnings;
            return Ok(outcome);
        }

        let text = self.call(
            PromptKind::Recipe,
            prompt_params([("concept", concept)]),
            &mut warnings,
        )?;
        if text.trim().is_empty() {
            return Ok(ActionOutcome::unchanged(warnings));
        }
        let recipe = Recipe::from_value(&extract_loose_json(Some(&text)), concept);
        if recipe.additives.is_empty() {
            push_unique_warning(
                &mut warnings,
                "The recipe lists no additives; no regulation lookups were made.".to_string(),
            );
        }

        let mut rows = Vec::new();
        for place in &selected {
            for additive in &recipe.additives {
                let text = self.call(
                    PromptKind::Regulation,
                    prompt_params([
                        ("dish", recipe.dish.as_str()),
                        ("additive", additive.as_str()),
                        ("country", place.name),
                        ("reference_url", place.reference_url),
                    ]),
                    &mut warnings,
                )?;
                let row =
                    RegulationRow::from_response(place.name, additive, &extract_loose_json(Some(&text)));
                self.record(
                    "regulation_checked",
                    json!({
                        "country": place.name,
                        "additive": additive,
                        "allowed": row.get("allowed"),
                    }),
                    &mut warnings,
                );
                rows.push(row);
            }
        }

        let table = RegulationTable::from_rows(rows);
        self.record(
            "recipe_analyzed",
            json!({
                "concept": concept,
                "dish": recipe.dish,
                "additives": recipe.additives,
                "countries": selected.iter().map(|place| place.name).collect::<Vec<&str>>(),
                "rows": table.rows.len(),
            }),
            &mut warnings,
        );
        self.session.recipe = Some(RecipeAnalysis {
            concept: concept.to_string(),
            recipe,
            countries: selected.iter().map(|place| place.name.to_string()).collect(),
            table,
        });
        Ok(ActionOutcome::changed(warnings))
    }

    /// Connection check: one short generation, reply in the outcome message.
    pub fn ping(&mut self) -> Result<ActionOutcome> {
        let mut warnings = Vec::new();
        let text = self.call(PromptKind::ConnectionProbe, PromptParams::new(), &mut warnings)?;
        let outcome = ActionOutcome::unchanged(warnings);
        if text.trim().is_empty() {
            return Ok(outcome);
        }
        Ok(outcome.with_message(text))
    }

    pub fn export_payload(&self) -> TreeExport {
        self.session.export()
    }

    pub fn default_export_file_name(&self) -> String {
        let keyword: String = self
            .session
            .keyword
            .trim()
            .chars()
            .map(|ch| match ch {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                ch if ch.is_whitespace() => '_',
                ch => ch,
            })
            .collect();
        format!("idea_tree_{keyword}.json")
    }

    /// Writes the pretty-printed `{keyword, nodes}` document. Relative paths
    /// and `None` land in the current directory.
    pub fn export_to(&self, path: Option<&Path>) -> Result<PathBuf> {
        if self.session.forest.is_empty() {
            bail!("nothing to export yet; generate an idea tree first");
        }
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(self.default_export_file_name()),
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.export_payload().to_pretty_json()?)?;
        self.emit(
            "tree_exported",
            json!({
                "path": path.to_string_lossy(),
                "keyword": self.session.keyword,
                "total_nodes": self.session.forest.count(),
            }),
        )?;
        Ok(path)
    }

    pub fn clear(&mut self) -> Result<ActionOutcome> {
        self.session.reset();
        let mut warnings = Vec::new();
        self.record("session_cleared", json!({}), &mut warnings);
        Ok(ActionOutcome::changed(warnings))
    }

    fn tree_params(&self) -> Result<PromptParams> {
        Ok(prompt_params([
            ("keyword", self.session.keyword.clone()),
            ("json_payload", self.session.export().to_compact_json()?),
        ]))
    }

    fn call(
        &self,
        kind: PromptKind,
        params: PromptParams,
        warnings: &mut Vec<String>,
    ) -> Result<String> {
        let prompt = self.prompts.render(kind, &params)?;
        Ok(self
            .gateway
            .generate(&TextRequest::new(kind, prompt, params), warnings))
    }

    fn reject(&self, action: &str, reason: &str) -> Result<ActionOutcome> {
        let mut warnings = vec![reason.to_string()];
        self.record(
            "input_rejected",
            json!({ "action": action, "reason": reason }),
            &mut warnings,
        );
        Ok(ActionOutcome::unchanged(warnings))
    }

    fn emit(&self, event_type: &str, payload: Value) -> Result<Value> {
        let payload: EventPayload = map_object(payload);
        self.events.emit(event_type, payload)
    }

    /// Logs an event for a change that already happened. A log failure
    /// cannot undo the change, so it becomes a warning.
    fn record(&self, event_type: &str, payload: Value, warnings: &mut Vec<String>) {
        if let Err(err) = self.emit(event_type, payload) {
            push_unique_warning(warnings, format!("event log write failed: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use ideatree_contracts::tree::{NodePath, NodeRef, TreeError, EMPTY_TITLE};
    use serde_json::{json, Value};

    use super::*;

    /// Replays canned envelopes in order and records every request.
    #[derive(Clone, Default)]
    struct ScriptedProvider {
        replies: Arc<Mutex<VecDeque<Result<Value, String>>>>,
        seen: Arc<Mutex<Vec<TextRequest>>>,
    }

    impl ScriptedProvider {
        fn reply_text(&self, text: &str) -> &Self {
            self.push(Ok(json!({ "text": text })))
        }

        fn fail(&self, message: &str) -> &Self {
            self.push(Err(message.to_string()))
        }

        fn push(&self, reply: Result<Value, String>) -> &Self {
            if let Ok(mut replies) = self.replies.lock() {
                replies.push_back(reply);
            }
            self
        }

        fn requests(&self) -> Vec<TextRequest> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl TextProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "dryrun"
        }

        fn generate(&self, _model: &str, request: &TextRequest) -> Result<Value> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            let next = self
                .replies
                .lock()
                .map_err(|_| anyhow!("script lock poisoned"))?
                .pop_front();
            match next {
                Some(Ok(value)) => Ok(value),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn scripted_engine(script: &ScriptedProvider) -> Result<IdeaEngine> {
        let mut providers = TextProviderRegistry::new();
        providers.register(script.clone());
        IdeaEngine::with_parts(
            providers,
            PromptBook::embedded(),
            EventWriter::disabled("session-test"),
            Some("dryrun-text-1"),
        )
    }

    fn dryrun_engine(events: EventWriter) -> Result<IdeaEngine> {
        let mut providers = TextProviderRegistry::new();
        providers.register(DryrunProvider);
        IdeaEngine::with_parts(providers, PromptBook::embedded(), events, Some("dryrun-text-1"))
    }

    fn node_ref(raw: &str) -> NodeRef {
        raw.parse().unwrap()
    }

    const SMALL_TREE: &str =
        r#"{"root": [{"title": "A", "desc": "", "children": [{"title": "A0"}, {"title": "A1"}]}, {"title": "B"}, {"title": "C"}]}"#;

    #[test]
    fn matcha_end_to_end_with_dryrun() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let mut engine = dryrun_engine(EventWriter::new(&events_path, "session-test"))?;

        let outcome = engine.generate_base_tree("matcha")?;
        assert!(outcome.changed);
        assert!(outcome.warnings.is_empty());
        assert_eq!(engine.session().forest.len(), 6);

        let out = temp.path().join(engine.default_export_file_name());
        assert!(out.ends_with("idea_tree_matcha.json"));
        engine.export_to(Some(out.as_path()))?;
        let exported: Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
        assert_eq!(exported["keyword"], json!("matcha"));
        assert_eq!(exported["nodes"].as_array().map(Vec::len), Some(6));
        assert_eq!(exported["nodes"][0]["title"], json!("1) Theme Exploration"));

        let types: Vec<String> = fs::read_to_string(&events_path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "generation_started",
                "generation_completed",
                "tree_generated",
                "tree_exported"
            ]
        );
        Ok(())
    }

    #[test]
    fn blank_keyword_is_rejected_without_a_model_call() -> Result<()> {
        let script = ScriptedProvider::default();
        let mut engine = scripted_engine(&script)?;

        let outcome = engine.generate_base_tree("   ")?;
        assert!(!outcome.changed);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(script.requests().is_empty());
        assert!(engine.session().forest.is_empty());
        Ok(())
    }

    #[test]
    fn base_prompt_carries_the_trimmed_keyword() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE);
        let mut engine = scripted_engine(&script)?;

        engine.generate_base_tree("  purple yam ")?;
        let requests = script.requests();
        assert_eq!(requests[0].kind, PromptKind::BaseTree);
        assert!(requests[0].prompt.contains("\"purple yam\""));
        assert_eq!(engine.session().keyword, "purple yam");
        Ok(())
    }

    #[test]
    fn failed_generation_keeps_the_previous_tree() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE).fail("HTTP 503");
        let mut engine = scripted_engine(&script)?;

        engine.generate_base_tree("matcha")?;
        let before = engine.session().forest.clone();

        let outcome = engine.generate_base_tree("hojicha")?;
        assert!(!outcome.changed);
        assert!(outcome.warnings[0].contains("HTTP 503"));
        assert_eq!(engine.session().forest, before);
        assert_eq!(engine.session().keyword, "matcha");
        Ok(())
    }

    #[test]
    fn unparseable_output_becomes_a_raw_output_node() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text("Sorry, I cannot help with that.");
        let mut engine = scripted_engine(&script)?;

        engine.generate_base_tree("matcha")?;
        let nodes = engine.session().forest.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].title, "Raw Output");
        assert_eq!(nodes[0].desc, "Sorry, I cannot help with that.");
        Ok(())
    }

    #[test]
    fn expand_appends_children_and_sends_node_context() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE).reply_text(
            "Ideas:\n```json\n[{\"title\": \"x1\"}, {\"title\": \"x2\"}, {\"title\": \"x3\"}, {\"title\": \"x4\"}]\n```",
        );
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        let outcome = engine.expand_node(&node_ref("0.1"))?;
        assert!(outcome.changed);
        let expanded = engine.session().forest.node(&"0.1".parse::<NodePath>()?)?;
        let titles: Vec<&str> = expanded.children.iter().map(|node| node.title.as_str()).collect();
        assert_eq!(titles, vec!["x1", "x2", "x3", "x4"]);
        assert_eq!(engine.session().forest.count(), 9);

        let request = &script.requests()[1];
        assert_eq!(request.kind, PromptKind::ExpandNode);
        assert_eq!(request.params["title"], "A1");
        assert_eq!(request.params["keyword"], "matcha");
        Ok(())
    }

    #[test]
    fn expand_by_id_and_stale_path_error() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE).reply_text("[\"c1\", \"c2\", \"c3\"]");
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        let id = engine.session().forest.nodes()[2].id;
        engine.expand_node(&NodeRef::from(id))?;
        assert_eq!(engine.session().forest.nodes()[2].children.len(), 3);

        let err = engine.expand_node(&node_ref("7")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::OutOfRange { index: 7, .. })
        ));
        assert_eq!(script.requests().len(), 2);
        Ok(())
    }

    #[test]
    fn failed_expansion_adds_nothing() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE).fail("quota exceeded");
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        let outcome = engine.expand_node(&node_ref("1"))?;
        assert!(!outcome.changed);
        assert_eq!(engine.session().forest.count(), 5);
        assert!(!engine
            .session()
            .forest
            .walk()
            .iter()
            .any(|(_, node)| node.title == EMPTY_TITLE));
        Ok(())
    }

    #[test]
    fn remove_shifts_siblings_and_prunes_favorites() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE);
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        engine.favorite_node(&node_ref("0.1"))?;
        engine.favorite_node(&node_ref("2"))?;
        assert_eq!(engine.session().favorites.len(), 2);

        engine.remove_node(&node_ref("0"))?;
        let titles: Vec<&str> = engine
            .session()
            .forest
            .iter()
            .map(|node| node.title.as_str())
            .collect();
        assert_eq!(titles, vec!["B", "C"]);

        let favorites = engine.session().favorite_nodes();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].0.to_string(), "1");
        assert_eq!(favorites[0].1.title, "C");
        Ok(())
    }

    #[test]
    fn favorite_toggles() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE);
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        let first = engine.favorite_node(&node_ref("1"))?;
        assert_eq!(first.message.as_deref(), Some("Added to favorites: B"));
        let second = engine.favorite_node(&node_ref("1"))?;
        assert_eq!(second.message.as_deref(), Some("Removed from favorites: B"));
        assert!(engine.session().favorites.is_empty());
        Ok(())
    }

    #[test]
    fn report_and_analysis_need_a_tree() -> Result<()> {
        let script = ScriptedProvider::default();
        let mut engine = scripted_engine(&script)?;

        assert!(!engine.generate_report()?.changed);
        assert!(!engine.generate_analysis()?.changed);
        assert!(script.requests().is_empty());
        Ok(())
    }

    #[test]
    fn report_receives_the_tree_json() -> Result<()> {
        let script = ScriptedProvider::default();
        script
            .reply_text(SMALL_TREE)
            .reply_text("```\n# Product R&D Report: matcha\n```")
            .reply_text("- 1. positioning");
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("matcha")?;

        engine.generate_report()?;
        engine.generate_analysis()?;
        assert_eq!(engine.session().report, "# Product R&D Report: matcha");
        assert_eq!(engine.session().analysis, "- 1. positioning");

        let requests = script.requests();
        let payload: Value = serde_json::from_str(&requests[1].params["json_payload"])?;
        assert_eq!(payload["keyword"], json!("matcha"));
        assert_eq!(payload["nodes"][0]["children"][1]["title"], json!("A1"));
        assert!(requests[2].prompt.contains("\"A1\""));
        Ok(())
    }

    #[test]
    fn recipe_lookup_builds_projected_table() -> Result<()> {
        let script = ScriptedProvider::default();
        script
            .reply_text(r#"{"dish": "Matcha mochi", "ingredients": ["rice flour"], "additives": ["sorbitol", "E330"], "steps": []}"#)
            .reply_text(r#"{"allowed": "yes", "max_quantity": "GMP"}"#)
            .reply_text(r#"[{"status": "restricted", "limit": "5 g/kg", "notes": "ignored"}]"#)
            .fail("timeout")
            .reply_text(r#"{"results": [{"allowed": "yes"}]}"#);
        let mut engine = scripted_engine(&script)?;

        let countries = vec!["japan".to_string(), "Atlantis".to_string(), "Taiwan".to_string()];
        let outcome = engine.analyze_recipe("matcha mochi", &countries)?;
        assert!(outcome.changed);
        assert!(outcome.warnings.iter().any(|w| w.contains("Atlantis")));
        assert!(outcome.warnings.iter().any(|w| w.contains("timeout")));

        let analysis = engine.session().recipe.as_ref().ok_or_else(|| anyhow!("no analysis"))?;
        assert_eq!(analysis.recipe.dish, "Matcha mochi");
        assert_eq!(analysis.countries, vec!["Japan", "Taiwan"]);
        let table = &analysis.table;
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.columns, vec!["country", "additive", "allowed", "max_quantity"]);
        assert_eq!(table.cell(1, "allowed"), "restricted");
        assert_eq!(table.cell(1, "max_quantity"), "5 g/kg");
        assert_eq!(table.cell(2, "country"), "Taiwan");
        assert_eq!(table.cell(2, "allowed"), "");
        assert_eq!(table.cell(3, "allowed"), "yes");

        let regulation = &script.requests()[1];
        assert_eq!(regulation.params["country"], "Japan");
        assert!(regulation.prompt.contains("https://www.mhlw.go.jp/"));
        Ok(())
    }

    #[test]
    fn recipe_without_additives_makes_no_lookups() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(r#"{"dish": "Plain rice ball", "ingredients": ["rice"], "additives": []}"#);
        let mut engine = scripted_engine(&script)?;

        let outcome = engine.analyze_recipe("rice ball", &["Japan".to_string()])?;
        assert!(outcome.warnings.iter().any(|w| w.contains("no additives")));
        assert_eq!(script.requests().len(), 1);
        let analysis = engine.session().recipe.as_ref().ok_or_else(|| anyhow!("no analysis"))?;
        assert!(analysis.table.is_empty());
        Ok(())
    }

    #[test]
    fn recipe_input_is_validated_before_any_call() -> Result<()> {
        let script = ScriptedProvider::default();
        let mut engine = scripted_engine(&script)?;

        assert!(!engine.analyze_recipe(" ", &["Japan".to_string()])?.changed);
        let unknown = engine.analyze_recipe("mochi", &["Narnia".to_string()])?;
        assert!(!unknown.changed);
        assert_eq!(unknown.warnings.len(), 2);
        assert!(!engine.analyze_recipe("mochi", &[])?.changed);
        assert!(script.requests().is_empty());
        Ok(())
    }

    #[test]
    fn ping_returns_reply_or_warning() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text("Cold brew tea is trending.").fail("bad key");
        let mut engine = scripted_engine(&script)?;

        let ok = engine.ping()?;
        assert_eq!(ok.message.as_deref(), Some("Cold brew tea is trending."));
        let failed = engine.ping()?;
        assert!(failed.message.is_none());
        assert!(failed.warnings[0].contains("bad key"));
        Ok(())
    }

    #[test]
    fn clear_resets_the_session() -> Result<()> {
        let mut engine = dryrun_engine(EventWriter::disabled("session-test"))?;
        engine.generate_base_tree("matcha")?;
        engine.generate_report()?;
        engine.clear()?;

        assert!(engine.session().forest.is_empty());
        assert!(engine.session().keyword.is_empty());
        assert!(engine.session().report.is_empty());
        assert!(engine.export_to(None).is_err());
        Ok(())
    }

    #[test]
    fn event_log_failure_after_an_edit_is_a_warning() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let log_dir = temp.path().join("log");
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE);
        let mut providers = TextProviderRegistry::new();
        providers.register(script.clone());
        let mut engine = IdeaEngine::with_parts(
            providers,
            PromptBook::embedded(),
            EventWriter::new(log_dir.join("events.jsonl"), "session-test"),
            Some("dryrun-text-1"),
        )?;
        engine.generate_base_tree("matcha")?;
        let before = engine.session().forest.len();

        fs::remove_dir_all(&log_dir)?;
        fs::write(&log_dir, "not a directory")?;

        let outcome = engine.remove_node(&node_ref("0"))?;
        assert!(outcome.changed);
        assert!(outcome.warnings[0].starts_with("event log write failed"));
        assert_eq!(engine.session().forest.len(), before - 1);

        let outcome = engine.favorite_node(&node_ref("0"))?;
        assert!(outcome.changed);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(engine.session().favorites.len(), 1);
        Ok(())
    }

    #[test]
    fn export_file_name_is_filesystem_safe() -> Result<()> {
        let script = ScriptedProvider::default();
        script.reply_text(SMALL_TREE);
        let mut engine = scripted_engine(&script)?;
        engine.generate_base_tree("tea/milk foam")?;
        assert_eq!(engine.default_export_file_name(), "idea_tree_tea_milk_foam.json");
        Ok(())
    }
}

use std::time::Instant;

use anyhow::{Context, Result};
use ideatree_contracts::events::EventWriter;
use ideatree_contracts::models::{ModelSelection, ModelSelector, ModelSpec};
use ideatree_contracts::tree::strip_code_fences;
use serde_json::{json, Map, Value};

use crate::providers::{
    error_chain_text, push_unique_warning, response_text, truncate_text, TextProviderRegistry,
    TextRequest,
};

pub const PREVIEW_CHARS: usize = 500;

/// Single entry point for model calls.
///
/// `generate` never fails: transport, credential and provider errors are
/// turned into a warning plus an empty string, and logged as
/// `generation_failed`.
pub struct GenerationGateway {
    providers: TextProviderRegistry,
    selector: ModelSelector,
    model: ModelSpec,
    events: EventWriter,
    last_fallback_reason: Option<String>,
}

impl GenerationGateway {
    pub fn new(
        providers: TextProviderRegistry,
        events: EventWriter,
        requested_model: Option<&str>,
    ) -> Result<Self> {
        let selector = ModelSelector::new(None);
        let selection = selector
            .select_text(requested_model)
            .map_err(anyhow::Error::msg)?;
        Ok(Self {
            providers,
            selector,
            model: selection.model,
            events,
            last_fallback_reason: selection.fallback_reason,
        })
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn set_model(&mut self, requested: &str) -> Result<ModelSelection> {
        let selection = self
            .selector
            .select_text(Some(requested))
            .map_err(anyhow::Error::msg)?;
        self.model = selection.model.clone();
        self.last_fallback_reason = selection.fallback_reason.clone();
        Ok(selection)
    }

    pub fn generate(&self, request: &TextRequest, warnings: &mut Vec<String>) -> String {
        match self.try_generate(request) {
            Ok(text) => text,
            Err(err) => {
                let message = error_chain_text(&err, 400);
                if let Err(log_err) = self.events.emit(
                    "generation_failed",
                    map_object(json!({
                        "kind": request.kind.name(),
                        "model": self.model.name,
                        "provider": self.model.provider,
                        "error": message,
                    })),
                ) {
                    push_unique_warning(warnings, format!("event log write failed: {log_err}"));
                }
                push_unique_warning(
                    warnings,
                    format!("Generation failed ({}): {message}", self.model.name),
                );
                String::new()
            }
        }
    }

    fn try_generate(&self, request: &TextRequest) -> Result<String> {
        let provider = self
            .providers
            .get(&self.model.provider)
            .with_context(|| format!("no provider registered for '{}'", self.model.provider))?;

        self.events.emit(
            "generation_started",
            map_object(json!({
                "kind": request.kind.name(),
                "model": self.model.name,
                "provider": self.model.provider,
                "prompt_chars": request.prompt.chars().count(),
            })),
        )?;

        let started = Instant::now();
        let response = provider.generate(&self.model.name, request)?;
        let text = strip_code_fences(&response_text(&response));

        self.events.emit(
            "generation_completed",
            map_object(json!({
                "kind": request.kind.name(),
                "model": self.model.name,
                "elapsed_ms": started.elapsed().as_millis() as u64,
                "chars": text.chars().count(),
                "preview": truncate_text(&text, PREVIEW_CHARS),
            })),
        )?;
        Ok(text)
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

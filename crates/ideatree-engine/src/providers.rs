use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::prompts::{PromptKind, PromptParams};

/// A rendered prompt plus the parameters it was rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub kind: PromptKind,
    pub prompt: String,
    pub params: PromptParams,
}

impl TextRequest {
    pub fn new(kind: PromptKind, prompt: impl Into<String>, params: PromptParams) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            params,
        }
    }

    fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// Returns the provider's raw response envelope; text extraction happens in
/// `response_text` so every provider goes through the same precedence.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, model: &str, request: &TextRequest) -> Result<Value>;
}

#[derive(Default)]
pub struct TextProviderRegistry {
    providers: BTreeMap<String, Box<dyn TextProvider>>,
}

impl TextProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: TextProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn TextProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &EngineConfig) -> TextProviderRegistry {
    let mut providers = TextProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(GeminiProvider::new(config));
    providers.register(OpenAiProvider::new(config));
    providers
}

/// Best-effort text out of any provider envelope, first match wins:
/// `text`, then the first candidate's first part (or the whole candidate
/// serialized), then `output_text` or the flattened Responses `output`, and
/// finally the serialized envelope itself.
pub fn response_text(response: &Value) -> String {
    if let Some(text) = response.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.to_string();
        }
    }

    if let Some(first) = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    {
        return first
            .pointer("/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| first.to_string());
    }

    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }
    let flattened = flattened_output_text(response);
    if !flattened.is_empty() {
        return flattened;
    }

    match response {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn flattened_output_text(response: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    let rows = response
        .get("output")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            if matches!(kind, "output_text" | "text") {
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        parts.push(text.trim().to_string());
                    }
                }
                continue;
            }
            if kind != "message" {
                continue;
            }
        }
        let content = obj
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for chunk in content {
            let kind = chunk
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !matches!(kind, "output_text" | "text") {
                continue;
            }
            if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    parts.push(text.trim().to_string());
                }
            }
        }
    }
    parts.join("\n")
}

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_credential(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, model: &str, request: &TextRequest) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
        });
        let response = self
            .http
            .post(self.endpoint_for_model(model))
            .query(&[("key", api_key)])
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .context("Gemini request failed")?;
        response_json_or_error("Gemini", response)
    }
}

pub struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.openai_api_base.clone(),
            api_key: config.openai_credential(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }
}

impl TextProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, model: &str, request: &TextRequest) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY not set");
        };
        let payload = json!({
            "model": model,
            "input": [{
                "role": "user",
                "content": [{ "type": "input_text", "text": request.prompt }],
            }],
        });
        let response = self
            .http
            .post(format!("{}/responses", self.api_base))
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .context("OpenAI request failed")?;
        response_json_or_error("OpenAI", response)
    }
}

/// Offline provider: deterministic, well-shaped answers per prompt kind,
/// wrapped in a Gemini-style envelope.
pub struct DryrunProvider;

impl TextProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, _model: &str, request: &TextRequest) -> Result<Value> {
        let text = match request.kind {
            PromptKind::BaseTree => dryrun_tree(request.param("keyword")),
            PromptKind::ExpandNode => dryrun_expansion(request.param("title")),
            PromptKind::Report => dryrun_report(request.param("keyword")),
            PromptKind::RdAnalysis => dryrun_analysis(request.param("keyword")),
            PromptKind::Recipe => dryrun_recipe(request.param("concept")),
            PromptKind::Regulation => dryrun_regulation(request),
            PromptKind::ConnectionProbe => {
                "Dryrun: convenience-store drinks are trending toward low-sugar functional teas."
                    .to_string()
            }
        };
        Ok(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP",
            }],
        }))
    }
}

const DRYRUN_BRANCHES: [(&str, &str); 6] = [
    ("1) Theme Exploration", "Direction of the theme and concept development."),
    ("2) Ingredient Inspiration", "Raw materials, flavours and combinations."),
    ("3) Shape Design", "Product form, portability and creative shapes."),
    ("4) Packaging Creativity", "Packaging that balances design and convenience."),
    ("5) Eating Method", "Eating occasions and experiences."),
    ("6) Popularization Analysis", "Market acceptance, consumer groups and trends."),
];

fn dryrun_tree(keyword: &str) -> String {
    let branches: Vec<Value> = DRYRUN_BRANCHES
        .iter()
        .enumerate()
        .map(|(idx, (title, desc))| {
            let children: Vec<Value> = (1..=2)
                .map(|n| {
                    json!({
                        "title": format!("{keyword} idea {}.{n}", idx + 1),
                        "desc": format!("Dryrun idea for {keyword}."),
                        "children": [],
                    })
                })
                .collect();
            json!({ "title": title, "desc": desc, "children": children })
        })
        .collect();
    let body = serde_json::to_string_pretty(&json!({ "root": branches }))
        .unwrap_or_else(|_| "{}".to_string());
    format!("```json\n{body}\n```")
}

fn dryrun_expansion(title: &str) -> String {
    let children: Vec<Value> = ["A", "B", "C"]
        .iter()
        .map(|label| {
            json!({
                "title": format!("{title} variation {label}"),
                "desc": "Dryrun sub-idea.",
                "children": [],
            })
        })
        .collect();
    format!(
        "Here are some sub-ideas:\n{}",
        Value::Array(children)
    )
}

fn dryrun_report(keyword: &str) -> String {
    format!(
        "# Product R&D Report: {keyword}\n\
         ## 1. Theme overview\nDryrun overview.\n\
         ## 2. Inspiration level summary\nDryrun summary.\n\
         ## 3. Market and regulatory insights\nDryrun insights.\n\
         ## 4. Next R&D directions\nDryrun directions."
    )
}

fn dryrun_analysis(keyword: &str) -> String {
    (1..=8)
        .map(|n| format!("- {n}. Dryrun answer {n} for {keyword}."))
        .collect::<Vec<String>>()
        .join("\n")
}

fn dryrun_recipe(concept: &str) -> String {
    json!({
        "dish": concept,
        "ingredients": ["glutinous rice flour", "milk", "sugar"],
        "additives": ["sorbitol", "citric acid"],
        "steps": ["Mix the batter.", "Steam for 20 minutes.", "Chill and pack."],
    })
    .to_string()
}

fn dryrun_regulation(request: &TextRequest) -> String {
    json!({
        "allowed": "permitted",
        "max_quantity": "GMP",
        "food_category": "general foods",
        "source": request.param("reference_url"),
    })
    .to_string()
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

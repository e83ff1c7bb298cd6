use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const MIN_REQUEST_TIMEOUT_SECS: u64 = 5;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Everything the engine reads from the process environment, resolved once.
///
/// CLI flags are layered on top with the `with_*` builders; an explicit
/// `--api-key` wins over both provider environment keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub api_key_override: Option<String>,
    pub gemini_api_base: String,
    pub openai_api_base: String,
    pub prompts_dir: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            gemini_api_key: None,
            openai_api_key: None,
            api_key_override: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            prompts_dir: None,
            events_path: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| first_non_empty(&lookup, keys);
        Self {
            model: first(&["IDEATREE_MODEL"]),
            gemini_api_key: first(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            openai_api_key: first(&["OPENAI_API_KEY"]),
            api_key_override: None,
            gemini_api_base: first(&["GEMINI_API_BASE"])
                .map(|value| normalize_api_base(&value))
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            openai_api_base: openai_api_base(first(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])),
            prompts_dir: first(&["IDEATREE_PROMPTS_DIR"]).map(PathBuf::from),
            events_path: None,
            request_timeout: parse_timeout(first(&["IDEATREE_REQUEST_TIMEOUT"]).as_deref()),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.model = Some(model.trim().to_string());
        }
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|value| !value.trim().is_empty()) {
            self.api_key_override = Some(key.trim().to_string());
        }
        self
    }

    pub fn with_prompts_dir(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.prompts_dir = dir;
        }
        self
    }

    pub fn with_events_path(mut self, path: Option<PathBuf>) -> Self {
        self.events_path = path;
        self
    }

    pub fn gemini_credential(&self) -> Option<String> {
        self.api_key_override
            .clone()
            .or_else(|| self.gemini_api_key.clone())
    }

    pub fn openai_credential(&self) -> Option<String> {
        self.api_key_override
            .clone()
            .or_else(|| self.openai_api_key.clone())
    }
}

fn first_non_empty<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn openai_api_base(raw: Option<String>) -> String {
    let mut base = normalize_api_base(raw.as_deref().unwrap_or(DEFAULT_OPENAI_API_BASE));
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base
}

fn parse_timeout(raw: Option<&str>) -> Duration {
    let secs = raw
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
        .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

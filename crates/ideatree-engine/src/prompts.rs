use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use thiserror::Error;

pub type PromptParams = IndexMap<String, String>;

pub fn prompt_params<I, K, V>(pairs: I) -> PromptParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    BaseTree,
    ExpandNode,
    Report,
    RdAnalysis,
    Recipe,
    Regulation,
    ConnectionProbe,
}

impl PromptKind {
    pub const ALL: [PromptKind; 7] = [
        PromptKind::BaseTree,
        PromptKind::ExpandNode,
        PromptKind::Report,
        PromptKind::RdAnalysis,
        PromptKind::Recipe,
        PromptKind::Regulation,
        PromptKind::ConnectionProbe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PromptKind::BaseTree => "base_tree",
            PromptKind::ExpandNode => "expand_node",
            PromptKind::Report => "report",
            PromptKind::RdAnalysis => "rd_analysis",
            PromptKind::Recipe => "recipe",
            PromptKind::Regulation => "regulation",
            PromptKind::ConnectionProbe => "connection_probe",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.txt", self.name())
    }

    fn embedded(self) -> &'static str {
        match self {
            PromptKind::BaseTree => include_str!("../resources/prompts/base_tree.txt"),
            PromptKind::ExpandNode => include_str!("../resources/prompts/expand_node.txt"),
            PromptKind::Report => include_str!("../resources/prompts/report.txt"),
            PromptKind::RdAnalysis => include_str!("../resources/prompts/rd_analysis.txt"),
            PromptKind::Recipe => include_str!("../resources/prompts/recipe.txt"),
            PromptKind::Regulation => include_str!("../resources/prompts/regulation.txt"),
            PromptKind::ConnectionProbe => {
                include_str!("../resources/prompts/connection_probe.txt")
            }
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{kind} template needs parameter '{name}'")]
    MissingParameter { kind: PromptKind, name: String },
    #[error("{kind} template has an unterminated placeholder at byte {offset}")]
    Unterminated { kind: PromptKind, offset: usize },
    #[error("{kind} template has an empty placeholder at byte {offset}")]
    EmptyPlaceholder { kind: PromptKind, offset: usize },
}

/// Prompt text with `{{name}}` placeholders.
///
/// Substituted values are inserted verbatim and never rescanned, so a JSON
/// payload that itself contains braces renders unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    kind: PromptKind,
    text: String,
}

impl PromptTemplate {
    pub fn new(kind: PromptKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let name = after[..end].trim().to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
            rest = &after[end + 2..];
        }
        names
    }

    pub fn render(&self, params: &PromptParams) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        while let Some(found) = self.text[cursor..].find("{{") {
            let start = cursor + found;
            out.push_str(&self.text[cursor..start]);
            let body_start = start + 2;
            let Some(close) = self.text[body_start..].find("}}") else {
                return Err(TemplateError::Unterminated {
                    kind: self.kind,
                    offset: start,
                });
            };
            let name = self.text[body_start..body_start + close].trim();
            if name.is_empty() {
                return Err(TemplateError::EmptyPlaceholder {
                    kind: self.kind,
                    offset: start,
                });
            }
            let value = params
                .get(name)
                .ok_or_else(|| TemplateError::MissingParameter {
                    kind: self.kind,
                    name: name.to_string(),
                })?;
            out.push_str(value);
            cursor = body_start + close + 2;
        }
        out.push_str(&self.text[cursor..]);
        Ok(out)
    }
}

/// One template per `PromptKind`: the built-in text, or `<kind>.txt` from an
/// override directory when that file exists.
#[derive(Debug, Clone)]
pub struct PromptBook {
    templates: HashMap<PromptKind, PromptTemplate>,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self::embedded()
    }
}

impl PromptBook {
    pub fn embedded() -> Self {
        let templates = PromptKind::ALL
            .iter()
            .map(|kind| (*kind, PromptTemplate::new(*kind, kind.embedded())))
            .collect();
        Self { templates }
    }

    pub fn load(override_dir: Option<&Path>) -> Result<Self> {
        let mut book = Self::embedded();
        let Some(dir) = override_dir else {
            return Ok(book);
        };
        for kind in PromptKind::ALL {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read prompt template {}", path.display()))?;
            book.set(PromptTemplate::new(kind, text));
        }
        Ok(book)
    }

    pub fn set(&mut self, template: PromptTemplate) {
        self.templates.insert(template.kind(), template);
    }

    pub fn get(&self, kind: PromptKind) -> &PromptTemplate {
        &self.templates[&kind]
    }

    pub fn render(&self, kind: PromptKind, params: &PromptParams) -> Result<String, TemplateError> {
        self.get(kind).render(params)
    }
}

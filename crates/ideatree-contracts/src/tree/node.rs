use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const UNTITLED_NODE: &str = "untitled node";

/// Opaque node identity, stable across structural edits of the forest.
///
/// Ids live only in memory; the persisted node schema is exactly
/// `{title, desc, children}` and loaded nodes receive fresh ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.to_string().chars().take(8).collect()
    }

    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_ascii_lowercase();
        !prefix.is_empty() && self.to_string().starts_with(&prefix)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaNode {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub children: Vec<IdeaNode>,
}

impl IdeaNode {
    pub fn new(title: impl Into<String>, desc: impl Into<String>, children: Vec<IdeaNode>) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNTITLED_NODE.to_string()
        } else {
            title
        };
        Self {
            id: NodeId::fresh(),
            title,
            desc: desc.into(),
            children,
        }
    }

    pub fn leaf(title: impl Into<String>) -> Self {
        Self::new(title, String::new(), Vec::new())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.children.iter().any(|child| child.contains(id))
    }
}

// Identity is positional bookkeeping; equality is over the persisted fields.
impl PartialEq for IdeaNode {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.desc == other.desc && self.children == other.children
    }
}

impl Eq for IdeaNode {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    #[error("node path is empty")]
    Empty,
    #[error("node path '{path}' has invalid component '{component}'")]
    InvalidComponent { path: String, component: String },
}

/// Dotted zero-based index path (`"0.1"` is `forest[0].children[1]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn split_last(&self) -> Option<(NodePath, usize)> {
        let (last, parent) = self.0.split_last()?;
        Some((NodePath(parent.to_vec()), *last))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(usize::to_string)
            .collect::<Vec<String>>();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for NodePath {
    type Err = PathParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathParseError::Empty);
        }
        let mut indices = Vec::new();
        for component in trimmed.split('.') {
            let index = component
                .trim()
                .parse::<usize>()
                .map_err(|_| PathParseError::InvalidComponent {
                    path: trimmed.to_string(),
                    component: component.to_string(),
                })?;
            indices.push(index);
        }
        Ok(Self(indices))
    }
}

/// How a caller addresses a node: by current position or by id prefix (`@3f2a`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Path(NodePath),
    Id(String),
}

impl FromStr for NodeRef {
    type Err = PathParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Some(prefix) = trimmed.strip_prefix('@') {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(PathParseError::Empty);
            }
            if !prefix.chars().all(|ch| ch.is_ascii_hexdigit()) {
                return Err(PathParseError::InvalidComponent {
                    path: trimmed.to_string(),
                    component: prefix.to_string(),
                });
            }
            return Ok(Self::Id(prefix.to_ascii_lowercase()));
        }
        trimmed.parse::<NodePath>().map(Self::Path)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Id(prefix) => write!(f, "@{prefix}"),
        }
    }
}

impl From<NodePath> for NodeRef {
    fn from(path: NodePath) -> Self {
        Self::Path(path)
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id.to_string())
    }
}

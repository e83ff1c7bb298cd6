use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{IdeaNode, NodeId, NodePath, NodeRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node path is empty")]
    EmptyPath,
    #[error("node path {path} is stale: index {index} at depth {depth} is out of range (len {len})")]
    OutOfRange {
        path: String,
        depth: usize,
        index: usize,
        len: usize,
    },
    #[error("no node matches id @{0}")]
    UnknownId(String),
    #[error("id prefix @{prefix} is ambiguous ({matches} nodes match)")]
    AmbiguousId { prefix: String, matches: usize },
}

impl TreeError {
    fn out_of_range(path: &NodePath, depth: usize, index: usize, len: usize) -> Self {
        Self::OutOfRange {
            path: path.to_string(),
            depth,
            index,
            len,
        }
    }
}

/// The session's ordered top-level idea list plus path-addressed edits.
///
/// Paths are positional and only valid until the next structural edit;
/// callers that hold on to a node across edits should keep its `NodeId`
/// and re-resolve it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeaForest {
    nodes: Vec<IdeaNode>,
}

impl IdeaForest {
    pub fn new(nodes: Vec<IdeaNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[IdeaNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdeaNode> {
        self.nodes.iter()
    }

    pub fn count(&self) -> usize {
        fn count_all(nodes: &[IdeaNode]) -> usize {
            nodes
                .iter()
                .map(|node| 1 + count_all(&node.children))
                .sum()
        }
        count_all(&self.nodes)
    }

    pub fn replace_all(&mut self, nodes: Vec<IdeaNode>) {
        self.nodes = nodes;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn node(&self, path: &NodePath) -> Result<&IdeaNode, TreeError> {
        let Some((&first, rest)) = path.indices().split_first() else {
            return Err(TreeError::EmptyPath);
        };
        let mut current = self
            .nodes
            .get(first)
            .ok_or_else(|| TreeError::out_of_range(path, 0, first, self.nodes.len()))?;
        for (offset, &index) in rest.iter().enumerate() {
            let len = current.children.len();
            current = current
                .children
                .get(index)
                .ok_or_else(|| TreeError::out_of_range(path, offset + 1, index, len))?;
        }
        Ok(current)
    }

    fn node_mut(&mut self, path: &NodePath) -> Result<&mut IdeaNode, TreeError> {
        let Some((&first, rest)) = path.indices().split_first() else {
            return Err(TreeError::EmptyPath);
        };
        let len = self.nodes.len();
        let mut current = self
            .nodes
            .get_mut(first)
            .ok_or_else(|| TreeError::out_of_range(path, 0, first, len))?;
        for (offset, &index) in rest.iter().enumerate() {
            let len = current.children.len();
            current = current
                .children
                .get_mut(index)
                .ok_or_else(|| TreeError::out_of_range(path, offset + 1, index, len))?;
        }
        Ok(current)
    }

    /// Appends `additional` after the existing children of the node at `path`.
    /// Returns the node's new child count.
    pub fn expand_node(
        &mut self,
        path: &NodePath,
        additional: Vec<IdeaNode>,
    ) -> Result<usize, TreeError> {
        let node = self.node_mut(path)?;
        node.children.extend(additional);
        Ok(node.children.len())
    }

    pub fn remove_at(&mut self, path: &NodePath) -> Result<IdeaNode, TreeError> {
        let Some((parent, index)) = path.split_last() else {
            return Err(TreeError::EmptyPath);
        };
        let siblings = if parent.is_empty() {
            &mut self.nodes
        } else {
            &mut self.node_mut(&parent)?.children
        };
        if index >= siblings.len() {
            return Err(TreeError::out_of_range(
                path,
                parent.indices().len(),
                index,
                siblings.len(),
            ));
        }
        Ok(siblings.remove(index))
    }

    /// Depth-first `(path, node)` pairs in display order.
    pub fn walk(&self) -> Vec<(NodePath, &IdeaNode)> {
        fn visit<'a>(
            nodes: &'a [IdeaNode],
            prefix: Option<&NodePath>,
            out: &mut Vec<(NodePath, &'a IdeaNode)>,
        ) {
            for (index, node) in nodes.iter().enumerate() {
                let path = match prefix {
                    Some(parent) => parent.child(index),
                    None => NodePath::root(index),
                };
                out.push((path.clone(), node));
                visit(&node.children, Some(&path), out);
            }
        }
        let mut out = Vec::new();
        visit(&self.nodes, None, &mut out);
        out
    }

    pub fn path_of(&self, id: NodeId) -> Option<NodePath> {
        self.walk()
            .into_iter()
            .find(|(_, node)| node.id == id)
            .map(|(path, _)| path)
    }

    pub fn resolve(&self, node_ref: &NodeRef) -> Result<NodePath, TreeError> {
        match node_ref {
            NodeRef::Path(path) => {
                self.node(path)?;
                Ok(path.clone())
            }
            NodeRef::Id(prefix) => {
                let mut matches = self
                    .walk()
                    .into_iter()
                    .filter(|(_, node)| node.id.matches_prefix(prefix))
                    .map(|(path, _)| path)
                    .collect::<Vec<NodePath>>();
                match matches.len() {
                    0 => Err(TreeError::UnknownId(prefix.clone())),
                    1 => Ok(matches.remove(0)),
                    count => Err(TreeError::AmbiguousId {
                        prefix: prefix.clone(),
                        matches: count,
                    }),
                }
            }
        }
    }
}

/// The persisted artifact: `{keyword, nodes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeExport {
    pub keyword: String,
    pub nodes: Vec<IdeaNode>,
}

impl TreeExport {
    pub fn new(keyword: impl Into<String>, forest: &IdeaForest) -> Self {
        Self {
            keyword: keyword.into(),
            nodes: forest.nodes().to_vec(),
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_compact_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

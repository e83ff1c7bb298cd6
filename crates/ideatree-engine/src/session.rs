use ideatree_contracts::regulation::RecipeAnalysis;
use ideatree_contracts::tree::{IdeaForest, IdeaNode, NodeId, NodePath, TreeExport};

/// Per-user state. Nothing here survives the process.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub keyword: String,
    pub forest: IdeaForest,
    pub report: String,
    pub analysis: String,
    pub favorites: Vec<NodeId>,
    pub recipe: Option<RecipeAnalysis>,
}

impl Session {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn export(&self) -> TreeExport {
        TreeExport::new(self.keyword.clone(), &self.forest)
    }

    pub fn is_favorite(&self, id: NodeId) -> bool {
        self.favorites.contains(&id)
    }

    /// Favorites that still exist, with their current paths.
    pub fn favorite_nodes(&self) -> Vec<(NodePath, &IdeaNode)> {
        self.forest
            .walk()
            .into_iter()
            .filter(|(_, node)| self.is_favorite(node.id))
            .collect()
    }

    pub(crate) fn forget_favorites_under(&mut self, removed: &IdeaNode) {
        self.favorites.retain(|id| !removed.contains(*id));
    }
}

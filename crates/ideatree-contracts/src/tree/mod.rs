mod extract;
mod forest;
mod node;
mod normalize;

pub use extract::{
    extract_loose_json, strip_code_fences, EMPTY_TITLE, RAW_OUTPUT_TITLE, RAW_PREVIEW_CHARS,
};
pub use forest::{IdeaForest, TreeError, TreeExport};
pub use node::{IdeaNode, NodeId, NodePath, NodeRef, PathParseError, UNTITLED_NODE};
pub use normalize::normalize_nodes;

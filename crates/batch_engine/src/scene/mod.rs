//! Scene management system
//!
//! A [`SceneGraph`] of transform and mesh [`Node`]s, traversed each frame to
//! feed the batch renderer:
//!
//! ```text
//! SceneGraph::update            world transforms, animation frames
//!      ↓
//! SceneGraph::build_node_lists  frustum cull, bucket, sort
//!      ↓
//! Node::skin                    compute dispatch per lit node
//!      ↓
//! Node::write_instance          model matrix + texture handles
//!      ↓
//! Node::write_draws             indirect commands per sub-mesh
//! ```

mod graph;
mod node;

pub use graph::{NodeEntry, NodeId, NodeLists, SceneGraph};
pub use node::{Node, NodeFlags, NodeKind, RenderClass};

use crate::render::RenderError;

/// Scene errors
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Id does not refer to a live node
    #[error("scene node {0:?} not found")]
    NodeNotFound(NodeId),

    /// Writing GPU data for a node failed
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

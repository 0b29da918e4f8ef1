//! # Rendering System
//!
//! The GPU-resident half of the pipeline: geometry arenas, cameras, culling
//! and the batch renderer that turns a culled scene into a handful of
//! multi-draw-indirect calls.
//!
//! ## Architecture
//!
//! - **GeometryArena**: shared vertex/index/joint buffers carved up by bump
//!   allocators
//! - **Mesh**: one asset's offsets inside the arena and its draw emission
//! - **Camera / SplitCamera**: matrices in a persistently mapped buffer
//! - **Frustum**: sphere culling from the view-projection matrix
//! - **BatchRenderer**: per-frame skinning, buffer writes and indirect draws
//!
//! All of it talks to hardware through [`crate::gpu::GpuDevice`].

pub mod basic_mesh;
pub mod batch;
pub mod camera;
pub mod frustum;
pub mod geometry_arena;
pub mod layout;
pub mod mesh;
pub mod split_camera;

pub use basic_mesh::BasicMesh;
pub use batch::{bindings, BatchPrograms, BatchRenderer, FrameStats};
pub use camera::{Camera, CameraMatrices, Perspective, Projection};
pub use frustum::{Frustum, Plane};
pub use geometry_arena::GeometryArena;
pub use layout::{GpuVertex, InstanceData, SkinningParams, JOINT_MATRIX_SIZE, VERTEX_STRIDE};
pub use mesh::{DrawParams, Mesh, MAX_JOINTS};
pub use split_camera::{ActiveSide, Rect, SplitCamera};

use crate::assets::AssetError;
use crate::foundation::memory::ArenaError;
use crate::gpu::GpuError;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while uploading or drawing
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Buffer or texture misuse
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// A shared arena ran out of space
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    /// Asset data could not be used
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Offsets relative to the vertex data were requested before it was written
    #[error("{0} called before write_vertex_data")]
    VerticesNotWritten(&'static str),

    /// A per-frame buffer is too small for the visible scene
    #[error("{what} capacity exceeded: {requested} > {capacity}")]
    CapacityExceeded {
        /// Buffer that overflowed
        what: &'static str,
        /// Elements the frame needs
        requested: usize,
        /// Elements the buffer holds
        capacity: usize,
    },
}

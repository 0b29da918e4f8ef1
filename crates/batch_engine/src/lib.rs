//! # Batch Engine
//!
//! A GPU-resident batched mesh and scene pipeline. Meshes live in shared
//! arena buffers, a scene graph is culled and sorted each frame, animated
//! meshes are skinned by compute dispatch, and every render bucket is drawn
//! with a single multi-draw-indirect call.
//!
//! ## Features
//!
//! - **Asset formats**: `.msh` geometry, `.anim` animation and `.mat`
//!   material files
//! - **Geometry arena**: vertex, index and joint buffers shared by all meshes
//! - **Scene graph**: slot-map arena of nodes with bounding-sphere culling
//! - **Batch rendering**: instances, bindless texture sets and indirect
//!   commands written through persistent coherent mappings
//! - **Cameras**: free-fly camera and split-screen pair
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_engine::prelude::*;
//!
//! struct Viewer {
//!     frames: u32,
//! }
//!
//! impl Application for Viewer {
//!     fn render(&mut self, _frame: &FrameInfo) -> Result<(), AppError> {
//!         self.frames += 1;
//!         Ok(())
//!     }
//!
//!     fn should_close(&self) -> bool {
//!         self.frames >= 3
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!     engine.run(&mut Viewer { frames: 0 })?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod config;
pub mod core;
pub mod foundation;
pub mod gpu;

// Pipeline
pub mod assets;
pub mod input;
pub mod render;
pub mod scene;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError, RunStats};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{Animation, MeshData, MeshMaterial},
        core::{ApplicationConfig, ArenaConfig, CameraConfig, Config, EngineConfig},
        foundation::{
            math::{Mat4, Quat, Transform, Vec3},
            time::{FrameInfo, Timer},
        },
        gpu::{GpuDevice, HeadlessDevice, ProgramId},
        input::{InputState, KeyCode, MouseButton},
        render::{BatchPrograms, BatchRenderer, Camera, FrameStats, GeometryArena, Mesh, SplitCamera},
        scene::{Node, NodeFlags, NodeId, SceneGraph},
        AppError, Application, Engine, EngineError,
    };
}

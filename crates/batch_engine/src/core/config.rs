//! # Unified Configuration System
//!
//! All settings structures live here so applications find them in one place.
//! Each subsystem gets its own struct with defaults, `with_*` builders and a
//! `validate` check; [`ApplicationConfig`] aggregates them and is the type
//! loaded from disk.
//!
//! ## Configuration Categories
//!
//! - **Engine Config**: logging and run loop pacing
//! - **Arena Config**: capacities of the shared geometry arena and the
//!   per-frame batch buffers
//! - **Camera Config**: projection parameters and navigation speeds

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// # Engine Configuration
///
/// Core engine behavior: logging and how frames are paced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Stop the run loop after this many frames
    pub frame_limit: Option<u32>,
    /// Report this delta every frame instead of wall-clock time
    pub fixed_delta: Option<f32>,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            frame_limit: None,
            fixed_delta: None,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Stop after `frames` frames
    pub fn with_frame_limit(mut self, frames: u32) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Use a fixed frame delta in seconds
    pub fn with_fixed_delta(mut self, delta: f32) -> Self {
        self.fixed_delta = Some(delta);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        if let Some(delta) = self.fixed_delta {
            if !(delta.is_finite() && delta > 0.0) {
                return Err(format!("Fixed delta must be positive, got {delta}"));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Arena Configuration
///
/// Capacities of the long-lived geometry arena and of the buffers the batch
/// renderer streams into every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Vertices the shared vertex arena can hold
    pub vertex_capacity: usize,
    /// Size of the shared index arena in bytes
    pub index_capacity_bytes: usize,
    /// Joint matrices the shared joint arena can hold, before alignment padding
    pub joint_capacity_matrices: usize,
    /// Vertices the skinning output buffer can hold
    pub max_skinned_vertices: usize,
    /// Instance records per frame
    pub max_instances: usize,
    /// Indirect draw commands per frame
    pub max_draw_commands: usize,
    /// Texture handle sets per frame
    pub max_texture_sets: usize,
}

impl ArenaConfig {
    /// Create a new arena configuration
    pub const fn new() -> Self {
        Self {
            vertex_capacity: 1 << 20,
            index_capacity_bytes: 16 << 20,
            joint_capacity_matrices: 1 << 18,
            max_skinned_vertices: 1 << 18,
            max_instances: 4096,
            max_draw_commands: 16384,
            max_texture_sets: 16384,
        }
    }

    /// Set the vertex arena capacity
    pub const fn with_vertex_capacity(mut self, vertices: usize) -> Self {
        self.vertex_capacity = vertices;
        self
    }

    /// Set the index arena size in bytes
    pub const fn with_index_capacity_bytes(mut self, bytes: usize) -> Self {
        self.index_capacity_bytes = bytes;
        self
    }

    /// Set the joint arena capacity in matrices
    pub const fn with_joint_capacity(mut self, matrices: usize) -> Self {
        self.joint_capacity_matrices = matrices;
        self
    }

    /// Set the per-frame limits of the batch renderer
    pub const fn with_frame_limits(mut self, instances: usize, draw_commands: usize, skinned_vertices: usize) -> Self {
        self.max_instances = instances;
        self.max_draw_commands = draw_commands;
        self.max_texture_sets = draw_commands;
        self.max_skinned_vertices = skinned_vertices;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.vertex_capacity == 0 || self.index_capacity_bytes == 0 {
            return Err("Geometry arena capacities must be non-zero".to_string());
        }
        if self.index_capacity_bytes % std::mem::size_of::<u32>() != 0 {
            return Err(format!(
                "Index arena size {} is not a multiple of 4",
                self.index_capacity_bytes
            ));
        }
        if self.max_instances == 0 || self.max_draw_commands == 0 {
            return Err("Per-frame batch limits must be non-zero".to_string());
        }
        if self.max_texture_sets < self.max_draw_commands {
            return Err("Texture set capacity must cover every draw command".to_string());
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Camera Configuration
///
/// Projection parameters and free-fly navigation speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Initial framebuffer width
    pub width: u32,
    /// Initial framebuffer height
    pub height: u32,
    /// Translation speed in units per second
    pub move_speed: f32,
    /// Translation speed while shift is held
    pub fast_move_speed: f32,
    /// Arrow-key rotation speed in degrees per second
    pub rotate_speed_degrees: f32,
    /// Mouse delta multiplier
    pub mouse_sensitivity: f32,
}

impl CameraConfig {
    /// Create a new camera configuration
    pub const fn new() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            width: 1920,
            height: 1080,
            move_speed: 30.0,
            fast_move_speed: 100.0,
            rotate_speed_degrees: 100.0,
            mouse_sensitivity: 1.0,
        }
    }

    /// Set the projection parameters
    pub const fn with_projection(mut self, fov_degrees: f32, near: f32, far: f32) -> Self {
        self.fov_degrees = fov_degrees;
        self.near = near;
        self.far = far;
        self
    }

    /// Set the initial framebuffer size
    pub const fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set navigation speeds
    pub const fn with_speeds(mut self, move_speed: f32, fast_move_speed: f32, rotate_speed_degrees: f32) -> Self {
        self.move_speed = move_speed;
        self.fast_move_speed = fast_move_speed;
        self.rotate_speed_degrees = rotate_speed_degrees;
        self
    }

    /// Aspect ratio of the configured resolution
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(format!("Field of view must be in (0, 180), got {}", self.fov_degrees));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(format!("Invalid clip range near={} far={}", self.near, self.far));
        }
        if self.width == 0 || self.height == 0 {
            return Err("Resolution must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
/// This is the main configuration structure applications should use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Geometry arena and batch buffer sizes
    pub arena: ArenaConfig,
    /// Camera configuration
    pub camera: CameraConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        self.arena.validate()?;
        self.camera.validate()?;
        Ok(())
    }

    /// Load from `path` and validate
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for ApplicationConfig {}

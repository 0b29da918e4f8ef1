//! Application trait and lifecycle management

use crate::assets::AssetError;
use crate::core::ConfigError;
use crate::foundation::time::FrameInfo;
use crate::render::RenderError;
use crate::scene::SceneError;
use thiserror::Error;

/// Application lifecycle trait
///
/// Implement this trait and hand the application to
/// [`crate::Engine::run`]. Each frame runs `update`, `render` and
/// `post_render` in that order until the application asks to close or bail.
pub trait Application {
    /// Update the application
    ///
    /// Called every frame before rendering. Advance the scene graph and
    /// cameras here.
    fn update(&mut self, frame: &FrameInfo) -> Result<(), AppError> {
        let _ = frame;
        Ok(())
    }

    /// Render the application
    fn render(&mut self, frame: &FrameInfo) -> Result<(), AppError>;

    /// Called after rendering each frame
    ///
    /// Clear per-frame input state and present here.
    fn post_render(&mut self, frame: &FrameInfo) {
        let _ = frame;
    }

    /// Whether a graceful shutdown was requested
    fn should_close(&self) -> bool;

    /// Whether the application must exit as soon as possible due to an error
    fn should_bail(&self) -> bool {
        false
    }
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Rendering failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Scene graph misuse
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Asset loading error
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

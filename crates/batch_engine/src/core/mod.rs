//! # Core Engine Module
//!
//! Shared abstractions the other subsystems depend on. Currently this is the
//! unified configuration system.

pub mod config;

pub use config::{ApplicationConfig, ArenaConfig, CameraConfig, Config, ConfigError, EngineConfig};

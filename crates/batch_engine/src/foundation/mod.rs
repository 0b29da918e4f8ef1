//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and GPU matrix layout helpers
//! - Arena allocation for shared GPU buffers
//! - Frame timing
//! - Logging setup

pub mod logging;
pub mod math;
pub mod memory;
pub mod time;

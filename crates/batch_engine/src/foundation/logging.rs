//! Logging utilities
//!
//! The engine logs through the `log` facade; binaries pick the backend.
//! These helpers install `env_logger`.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a default level used when `RUST_LOG` is unset
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

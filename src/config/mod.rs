//! Engine Configuration Module
//!
//! Plant reference data (line speed envelopes, product catalogue) and every
//! model/decision threshold, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `OEE_ENGINE_CONFIG` environment variable (path to TOML file)
//! 2. `oee_engine.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Components take an explicit `&EngineConfig`. Binaries may additionally
//! install a process-wide copy:
//!
//! ```ignore
//! config::init(EngineConfig::load());
//! let step = config::get().speed_optimizer.default_step;
//! ```

mod engine_config;
pub mod defaults;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Falls back to built-in defaults when `init()` has not been called.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(EngineConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}

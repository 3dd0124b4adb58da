//! Configuration module for the execution engine
//!
//! Supports YAML configuration files with per-field defaults and a small set
//! of `FNEXEC_*` environment overrides.

pub mod types;
pub mod loader;

pub use types::*;
pub use loader::*;


use crate::errors::ConfigError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    ConfigLoader::from_file(path).await
}

//! Configuration loader for YAML files and environment overrides

use crate::config::types::EngineConfig;
use crate::errors::ConfigError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const POOL_SIZE_ENV: &str = "FNEXEC_POOL_SIZE";
pub const SANDBOX_RUNTIME_ENV: &str = "FNEXEC_SANDBOX_RUNTIME";
pub const MEMORY_LIMIT_ENV: &str = "FNEXEC_MEMORY_LIMIT_MB";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_str(&content)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub async fn from_optional_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            let mut config = EngineConfig::default();
            Self::resolve_environment(&mut config)?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<EngineConfig, ConfigError> {
        let mut config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FNEXEC_*` environment overrides
    fn resolve_environment(config: &mut EngineConfig) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(POOL_SIZE_ENV) {
            config.pool.size = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a number, got '{}'", POOL_SIZE_ENV, value))
            })?;
        }
        if let Ok(value) = env::var(MEMORY_LIMIT_ENV) {
            config.runtime.memory_limit_mb = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{} must be a number, got '{}'",
                    MEMORY_LIMIT_ENV, value
                ))
            })?;
        }
        if let Ok(value) = env::var(SANDBOX_RUNTIME_ENV) {
            config.runtime.sandbox_runtime = value;
        }
        Ok(())
    }
}

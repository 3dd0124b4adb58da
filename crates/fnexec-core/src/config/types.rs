//! Configuration type definitions for the execution engine
//!
//! Every field has a default, so an empty document (or no file at all) yields a
//! working configuration: a pool of two units per language, 128 MB containers
//! working in `/app`, and gVisor (`runsc`) for sandboxed runs.

use crate::errors::ConfigError;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound on `runtime.memory_limit_mb` (1 TiB).
pub const MAX_MEMORY_LIMIT_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<Language, LanguageConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            runtime: RuntimeConfig::default(),
            languages: default_languages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub network_disabled: bool,
    /// OCI runtime used by the sandboxed strategy.
    #[serde(default = "default_sandbox_runtime")]
    pub sandbox_runtime: String,
    /// Status poll interval for sandboxed runs. Lower values notice exits sooner
    /// at the cost of more inspect calls per invocation.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Long-lived inert process that keeps pooled units running.
    #[serde(default = "default_placeholder_command")]
    pub placeholder_command: Vec<String>,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

impl RuntimeConfig {
    pub fn memory_limit_bytes(&self) -> i64 {
        i64::try_from(self.memory_limit_mb.saturating_mul(1024 * 1024)).unwrap_or(i64::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            memory_limit_mb: default_memory_limit_mb(),
            network_disabled: false,
            sandbox_runtime: default_sandbox_runtime(),
            poll_interval_ms: default_poll_interval_ms(),
            placeholder_command: default_placeholder_command(),
            name_prefix: default_name_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageConfig {
    pub image: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EngineConfig {
    /// Image for an enabled language, `None` if the language is switched off.
    pub fn image_for(&self, language: Language) -> Option<&str> {
        self.languages
            .get(&language)
            .filter(|l| l.enabled)
            .map(|l| l.image.as_str())
    }

    pub fn enabled_languages(&self) -> Vec<Language> {
        self.languages
            .iter()
            .filter(|(_, l)| l.enabled)
            .map(|(lang, _)| *lang)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.size == 0 {
            return Err(ConfigError::Invalid("pool.size must be at least 1".to_string()));
        }
        // Docker refuses memory limits below 6 MB.
        if self.runtime.memory_limit_mb < 6 {
            return Err(ConfigError::Invalid(
                "runtime.memory_limit_mb must be at least 6".to_string(),
            ));
        }
        if self.runtime.memory_limit_mb > MAX_MEMORY_LIMIT_MB {
            return Err(ConfigError::Invalid(format!(
                "runtime.memory_limit_mb must be at most {}",
                MAX_MEMORY_LIMIT_MB
            )));
        }
        if self.runtime.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "runtime.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if !self.runtime.working_dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "runtime.working_dir must be absolute, got '{}'",
                self.runtime.working_dir
            )));
        }
        if self.runtime.placeholder_command.is_empty() {
            return Err(ConfigError::Invalid(
                "runtime.placeholder_command cannot be empty".to_string(),
            ));
        }
        if self.runtime.sandbox_runtime.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "runtime.sandbox_runtime cannot be empty".to_string(),
            ));
        }
        for (language, lang_config) in &self.languages {
            if lang_config.enabled && lang_config.image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "languages.{}.image cannot be empty",
                    language
                )));
            }
        }
        if self.enabled_languages().is_empty() {
            return Err(ConfigError::Invalid(
                "at least one language must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_languages() -> BTreeMap<Language, LanguageConfig> {
    Language::ALL
        .iter()
        .map(|lang| {
            (
                *lang,
                LanguageConfig {
                    image: lang.default_image().to_string(),
                    enabled: true,
                },
            )
        })
        .collect()
}

fn default_pool_size() -> usize {
    2
}

fn default_working_dir() -> String {
    "/app".to_string()
}

fn default_memory_limit_mb() -> u64 {
    128
}

fn default_sandbox_runtime() -> String {
    "runsc".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_placeholder_command() -> Vec<String> {
    vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()]
}

fn default_name_prefix() -> String {
    "fnexec".to_string()
}

fn default_true() -> bool {
    true
}

//! Function definitions as handed over by a registry.

use crate::errors::ExecutionError;
use crate::executors::ExecutionRequest;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub route: Option<String>,
    pub language: String,
    pub code: String,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    5
}

impl FunctionDefinition {
    pub fn language(&self) -> Result<Language, ExecutionError> {
        self.language.parse()
    }

    pub fn to_request(&self) -> Result<ExecutionRequest, ExecutionError> {
        let request = ExecutionRequest::new(
            self.code.clone(),
            self.language()?,
            Duration::from_secs(self.timeout),
        );
        request.validate()?;
        Ok(request)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ExecutionError> {
        serde_yaml::from_str(content)
            .map_err(|e| ExecutionError::InvalidRequest(format!("invalid function definition: {}", e)))
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExecutionError::InvalidRequest(format!(
                "failed to read function definition {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }
}

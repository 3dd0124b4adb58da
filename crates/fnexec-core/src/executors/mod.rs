//! Execution strategies for running function code in containers.
//!
//! Two strategies share the packager and the error taxonomy and differ only in
//! how a unit is obtained and how completion is detected:
//!
//! - `PooledExecutor` leases a warm unit, uploads the code and execs the
//!   interpreter, then recycles the unit when it is still trustworthy.
//! - `SandboxedExecutor` creates a single-use unit under the strict runtime
//!   with the code bound read-only, and polls it until it exits.

use crate::errors::ExecutionError;
use crate::language::Language;
use async_trait::async_trait;
use std::time::Duration;

pub mod pooled;
pub mod sandboxed;

pub use pooled::PooledExecutor;
pub use sandboxed::SandboxedExecutor;

/// One invocation of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    code: String,
    language: Language,
    timeout: Duration,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            language,
            timeout,
        }
    }

    /// Build a request from loosely typed registry values.
    pub fn parse(code: impl Into<String>, language: &str, timeout_secs: u64) -> Result<Self, ExecutionError> {
        let request = Self::new(code, language.parse()?, Duration::from_secs(timeout_secs));
        request.validate()?;
        Ok(request)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.timeout.is_zero() {
            return Err(ExecutionError::InvalidRequest(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.code.trim().is_empty() {
            return Err(ExecutionError::InvalidRequest("code cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Successful run of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub unit_id: String,
    pub cold_start: bool,
    pub duration: Duration,
}

pub type ExecutionResult = Result<ExecutionOutput, ExecutionError>;

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult;
}

/// What a non-timeout exit code means for the result and for the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Success,
    /// The user's program failed. `recycle` is false when the process died
    /// from a signal, since the unit's state after that is unverifiable.
    UserFailure { recycle: bool },
    /// The interpreter itself could not be run.
    InfraFailure,
}

pub fn classify_exit(code: i64) -> ExitDisposition {
    match code {
        0 => ExitDisposition::Success,
        126 | 127 => ExitDisposition::InfraFailure,
        c if c >= 128 => ExitDisposition::UserFailure { recycle: false },
        _ => ExitDisposition::UserFailure { recycle: true },
    }
}

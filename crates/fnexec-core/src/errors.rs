//! Error types for the execution engine
//!
//! Failures are split by where they originate. `RuntimeError` describes what the
//! container API reported, without judging it. `ExecutionError` is the classified
//! outcome handed back to callers, one variant per entry of the failure taxonomy,
//! so the API layer can map each to a distinct status without string matching.

use std::fmt;
use thiserror::Error;

/// Coarse classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedLanguage,
    ImageUnavailable,
    RuntimeUnavailable,
    PackagingFailed,
    ExecutionFailed,
    Timeout,
    InfraError,
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::ImageUnavailable => "image_unavailable",
            ErrorKind::RuntimeUnavailable => "runtime_unavailable",
            ErrorKind::PackagingFailed => "packaging_failed",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InfraError => "infra_error",
            ErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Base image not found: {0}")]
    ImageUnavailable(String),
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Failed to package function code: {0}")]
    PackagingFailed(String),
    #[error("Function execution failed with exit code {exit_code}: {output}")]
    ExecutionFailed { exit_code: i64, output: String },
    #[error("Function execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u128 },
    #[error("Container runtime error: {0}")]
    InfraError(String),
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            ExecutionError::ImageUnavailable(_) => ErrorKind::ImageUnavailable,
            ExecutionError::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
            ExecutionError::PackagingFailed(_) => ErrorKind::PackagingFailed,
            ExecutionError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            ExecutionError::Timeout { .. } => ErrorKind::Timeout,
            ExecutionError::InfraError(_) => ErrorKind::InfraError,
            ExecutionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP-style status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::UnsupportedLanguage | ErrorKind::InvalidRequest => 400,
            ErrorKind::Timeout => 408,
            ErrorKind::ExecutionFailed => 422,
            ErrorKind::ImageUnavailable | ErrorKind::RuntimeUnavailable => 503,
            ErrorKind::PackagingFailed | ErrorKind::InfraError => 500,
        }
    }

    /// Whether the failure came from the user's program rather than the platform.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ExecutionFailed | ErrorKind::Timeout | ErrorKind::InvalidRequest
        )
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::PackagingFailed(err.to_string())
    }
}

/// Failures reported by the container runtime layer.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Container API error: {0}")]
    Api(String),
    #[error("UTF-8 decoding error from slice: {0}")]
    StrUtf8Error(#[from] std::str::Utf8Error),
}

impl RuntimeError {
    /// True when the container is already gone, which cleanup paths ignore.
    pub fn is_not_found(&self) -> bool {
        match self {
            RuntimeError::ContainerNotFound(_) => true,
            RuntimeError::BollardError(bollard::errors::Error::DockerResponseServerError {
                status_code,
                ..
            }) => *status_code == 404,
            _ => false,
        }
    }
}

impl From<RuntimeError> for ExecutionError {
    fn from(err: RuntimeError) -> Self {
        ExecutionError::InfraError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

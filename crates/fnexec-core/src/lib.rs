//! Container-backed execution engine for function-as-a-service workloads.
//!
//! Given source code, a language and a timeout, the engine runs the code in an
//! isolated container and returns its output or a classified failure.
//!
//! # Architecture Overview
//!
//! - **Packaging**: code is written to a single entry-point file and shipped as
//!   a tar archive or a read-only bind mount
//! - **Runtime seam**: every container operation goes through `ContainerRuntime`,
//!   implemented for Docker with `bollard`
//! - **Lifecycle**: units are created from per-language base images with a fixed
//!   memory ceiling and torn down idempotently
//! - **Warm pool**: bounded per-language FIFO of started idle units, each queue
//!   behind its own lock
//! - **Strategies**: a pooled path that reuses warm units, and a sandboxed path
//!   that runs each request in a fresh unit under a stricter OCI runtime
//! - **Configuration**: YAML with per-field defaults and environment overrides

pub mod config;
pub mod engine;
pub mod errors;
pub mod executors;
pub mod function;
pub mod language;
pub mod lifecycle;
pub mod packager;
pub mod pool;
pub mod runtime;
pub mod stats;
pub mod unit;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::ExecutionEngine;
pub use errors::{ErrorKind, ExecutionError, RuntimeError};
pub use executors::{ExecutionOutput, ExecutionRequest, ExecutionResult, ExecutionStrategy};
pub use function::FunctionDefinition;
pub use language::Language;
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use unit::{ExecutionUnit, UnitState};

#[cfg(test)]
pub mod test_utils;

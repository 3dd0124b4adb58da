//! Container runtime abstraction.
//!
//! The lifecycle manager and both execution strategies only talk to containers
//! through `ContainerRuntime`. `DockerRuntime` implements it against the Docker
//! Engine API; tests plug in an in-memory fake.

use crate::errors::RuntimeError;
use async_trait::async_trait;
use std::collections::HashMap;

pub mod docker;

pub use docker::DockerRuntime;

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub memory_limit_bytes: i64,
    pub network_disabled: bool,
    /// OCI runtime override, e.g. `runsc`. `None` uses the daemon default.
    pub runtime: Option<String>,
    /// Bind mounts in `host:container[:mode]` form.
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// Captured process output, kept per stream and interleaved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
}

impl ProcessOutput {
    pub fn push_stdout(&mut self, chunk: &str) {
        self.stdout.push_str(chunk);
        self.combined.push_str(chunk);
    }

    pub fn push_stderr(&mut self, chunk: &str) {
        self.stderr.push_str(chunk);
        self.combined.push_str(chunk);
    }
}

/// Result of running a command inside a started container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the runtime could not report an exit code.
    pub exit_code: Option<i64>,
    pub output: ProcessOutput,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    pub exit_code: Option<i64>,
    pub oom_killed: bool,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    /// Create a container and return its id. A missing image must surface as
    /// `RuntimeError::ImageNotFound`.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Extract a tar archive into `path` inside the container.
    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<(), RuntimeError>;

    /// Run `command` in the container and wait for it to finish.
    async fn exec(
        &self,
        id: &str,
        command: Vec<String>,
        working_dir: &str,
    ) -> Result<ExecOutcome, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerStatus, RuntimeError>;

    async fn logs(&self, id: &str) -> Result<ProcessOutput, RuntimeError>;

    /// SIGKILL every process in the container.
    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Force-remove the container.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}

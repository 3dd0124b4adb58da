// src/executors/sandboxed.rs
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{classify_exit, ExecutionOutput, ExecutionRequest, ExecutionResult, ExecutionStrategy, ExitDisposition};
use crate::errors::{ExecutionError, RuntimeError};
use crate::lifecycle::{LifecycleManager, OrphanGuard};
use crate::packager::CodePackager;
use crate::runtime::ContainerStatus;
use crate::stats::EngineStats;
use crate::unit::ExecutionUnit;

/// Runs each invocation in a fresh single-use unit under the strict runtime.
///
/// The runtime may not offer a usable wait-for-exit call, so completion is
/// detected by polling the container state every `poll_interval` until it has
/// exited or the request's deadline passes.
pub struct SandboxedExecutor {
    lifecycle: Arc<LifecycleManager>,
    packager: CodePackager,
    stats: Arc<EngineStats>,
    poll_interval: Duration,
}

impl SandboxedExecutor {
    pub fn new(lifecycle: Arc<LifecycleManager>, packager: CodePackager, stats: Arc<EngineStats>) -> Self {
        let poll_interval = lifecycle.config().runtime.poll_interval();
        Self {
            lifecycle,
            packager,
            stats,
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until the container has exited. Callers bound this with the
    /// request timeout.
    async fn wait_for_exit(&self, unit: &ExecutionUnit) -> Result<ContainerStatus, RuntimeError> {
        let runtime = self.lifecycle.runtime();
        loop {
            let status = runtime.inspect(unit.id()).await?;
            if !status.running {
                return Ok(status);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn collect(
        &self,
        unit: &ExecutionUnit,
        status: ContainerStatus,
        duration: Duration,
    ) -> ExecutionResult {
        let output = self.lifecycle.runtime().logs(unit.id()).await?;
        let exit_code = status.exit_code.ok_or_else(|| {
            ExecutionError::InfraError(format!("no exit code reported by container {}", unit.id()))
        })?;

        match classify_exit(exit_code) {
            ExitDisposition::Success => Ok(ExecutionOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                unit_id: unit.id().to_string(),
                cold_start: true,
                duration,
            }),
            ExitDisposition::UserFailure { .. } => {
                let mut combined = output.combined;
                if status.oom_killed {
                    combined.push_str("\n[killed: memory limit exceeded]");
                }
                Err(ExecutionError::ExecutionFailed {
                    exit_code,
                    output: combined,
                })
            }
            ExitDisposition::InfraFailure => Err(ExecutionError::InfraError(format!(
                "interpreter exited with code {}: {}",
                exit_code,
                output.combined.trim()
            ))),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for SandboxedExecutor {
    fn name(&self) -> &'static str {
        "sandboxed"
    }

    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        request.validate()?;
        let language = request.language();

        let code_file = self.packager.package_bind(request.code(), language)?;
        let mut unit = self
            .lifecycle
            .create_sandboxed(language, code_file.host_path())
            .await?;
        // The container reads the bind source, so the guard keeps it on disk
        // until the container is gone.
        let mut guard = OrphanGuard::new(self.lifecycle.clone(), &unit).holding(code_file);
        self.stats.record_sandboxed_run();

        let started = Instant::now();
        let waited = tokio::time::timeout(request.timeout(), self.wait_for_exit(&unit)).await;
        let result = match waited {
            Ok(Ok(status)) => self.collect(&unit, status, started.elapsed()).await,
            Err(_) => {
                log::warn!(
                    "Sandboxed execution timed out after {:?} in container {}",
                    request.timeout(),
                    unit.id()
                );
                if let Err(e) = self.lifecycle.kill(&unit).await {
                    log::debug!("Kill of timed out container {} failed: {}", unit.id(), e);
                }
                Err(ExecutionError::Timeout {
                    timeout_ms: request.timeout().as_millis(),
                })
            }
            Ok(Err(e)) => {
                log::error!("Error polling sandboxed container {}: {}", unit.id(), e);
                Err(e.into())
            }
        };

        self.lifecycle.destroy(&mut unit).await;
        guard.disarm();
        self.stats.record_destroyed();
        drop(guard);

        match &result {
            Ok(_) => self.stats.record_success(),
            Err(ExecutionError::Timeout { .. }) => self.stats.record_timeout(),
            Err(ExecutionError::ExecutionFailed { .. }) => self.stats.record_execution_failure(),
            Err(_) => self.stats.record_infra_failure(),
        }
        result
    }
}

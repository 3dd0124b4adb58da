// src/executors/pooled.rs
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use super::{classify_exit, ExecutionOutput, ExecutionRequest, ExecutionResult, ExecutionStrategy, ExitDisposition};
use crate::errors::ExecutionError;
use crate::lifecycle::OrphanGuard;
use crate::packager::CodePackager;
use crate::pool::WarmPool;
use crate::stats::EngineStats;

/// Runs code inside warm units leased from the pool.
pub struct PooledExecutor {
    pool: Arc<WarmPool>,
    packager: CodePackager,
    stats: Arc<EngineStats>,
}

impl PooledExecutor {
    pub fn new(pool: Arc<WarmPool>, packager: CodePackager, stats: Arc<EngineStats>) -> Self {
        Self {
            pool,
            packager,
            stats,
        }
    }

    pub fn pool(&self) -> &Arc<WarmPool> {
        &self.pool
    }
}

#[async_trait]
impl ExecutionStrategy for PooledExecutor {
    fn name(&self) -> &'static str {
        "pooled"
    }

    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        request.validate()?;
        let language = request.language();

        // Packaging happens before leasing so a local I/O failure never
        // touches a unit. The archive's temp files go away when it drops.
        let archive = self.packager.package_archive(request.code(), language)?;
        let unit = self.pool.acquire(language).await?;

        let lifecycle = self.pool.lifecycle().clone();
        let mut guard = OrphanGuard::new(lifecycle.clone(), &unit);
        let runtime = lifecycle.runtime().clone();
        let working_dir = lifecycle.config().runtime.working_dir.clone();
        let command = language.command(&working_dir);
        let unit_id = unit.id().to_string();
        let bytes = archive.bytes().to_vec();
        drop(archive);

        let started = Instant::now();
        let invocation = {
            let unit_id = unit_id.clone();
            async move {
                runtime.upload_archive(&unit_id, &working_dir, bytes).await?;
                runtime.exec(&unit_id, command, &working_dir).await
            }
        };
        let outcome = tokio::time::timeout(request.timeout(), invocation).await;
        let duration = started.elapsed();

        let outcome = match outcome {
            Err(_) => {
                log::warn!(
                    "Execution timed out after {:?} in container {}",
                    request.timeout(),
                    unit_id
                );
                if let Err(e) = lifecycle.kill(&unit).await {
                    log::debug!("Kill of timed out container {} failed: {}", unit_id, e);
                }
                self.pool.discard(unit).await;
                guard.disarm();
                self.stats.record_timeout();
                return Err(ExecutionError::Timeout {
                    timeout_ms: request.timeout().as_millis(),
                });
            }
            Ok(Err(e)) => {
                log::error!("Error executing in container {}: {}", unit_id, e);
                self.pool.discard(unit).await;
                guard.disarm();
                self.stats.record_infra_failure();
                return Err(e.into());
            }
            Ok(Ok(outcome)) => outcome,
        };

        let Some(exit_code) = outcome.exit_code else {
            log::error!("Container {} reported no exit code for exec", unit_id);
            self.pool.discard(unit).await;
            guard.disarm();
            self.stats.record_infra_failure();
            return Err(ExecutionError::InfraError(format!(
                "no exit code reported by container {}",
                unit_id
            )));
        };

        match classify_exit(exit_code) {
            ExitDisposition::Success => {
                let cold_start = unit.is_cold_start();
                self.pool.release(unit).await;
                guard.disarm();
                self.stats.record_success();
                Ok(ExecutionOutput {
                    stdout: outcome.output.stdout,
                    stderr: outcome.output.stderr,
                    unit_id,
                    cold_start,
                    duration,
                })
            }
            ExitDisposition::UserFailure { recycle } => {
                log::debug!("Function exited with code {} in container {}", exit_code, unit_id);
                if recycle {
                    self.pool.release(unit).await;
                } else {
                    self.pool.discard(unit).await;
                }
                guard.disarm();
                self.stats.record_execution_failure();
                Err(ExecutionError::ExecutionFailed {
                    exit_code,
                    output: outcome.output.combined,
                })
            }
            ExitDisposition::InfraFailure => {
                log::error!(
                    "Interpreter could not run in container {} (exit code {}): {}",
                    unit_id,
                    exit_code,
                    outcome.output.combined.trim()
                );
                self.pool.discard(unit).await;
                guard.disarm();
                self.stats.record_infra_failure();
                Err(ExecutionError::InfraError(format!(
                    "interpreter exited with code {}: {}",
                    exit_code,
                    outcome.output.combined.trim()
                )))
            }
        }
    }
}

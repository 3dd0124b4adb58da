//! Process-lifetime execution engine.
//!
//! Owns the warm pool and both execution strategies. Construct it once at
//! startup, call `startup()` to pre-warm (a failure there is fatal), share it
//! behind an `Arc`, and call `shutdown()` to destroy the idle units on exit.

use crate::config::EngineConfig;
use crate::errors::{ExecutionError, RuntimeError};
use crate::executors::{
    ExecutionRequest, ExecutionResult, ExecutionStrategy, PooledExecutor, SandboxedExecutor,
};
use crate::language::Language;
use crate::lifecycle::LifecycleManager;
use crate::packager::CodePackager;
use crate::pool::WarmPool;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::stats::{EngineStats, StatsSnapshot};
use std::sync::Arc;

pub struct ExecutionEngine {
    pool: Arc<WarmPool>,
    pooled: PooledExecutor,
    sandboxed: SandboxedExecutor,
    stats: Arc<EngineStats>,
}

impl ExecutionEngine {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: EngineConfig) -> Self {
        Self::with_packager(runtime, config, CodePackager::new())
    }

    pub fn with_packager(
        runtime: Arc<dyn ContainerRuntime>,
        config: EngineConfig,
        packager: CodePackager,
    ) -> Self {
        let stats = Arc::new(EngineStats::new());
        let lifecycle = Arc::new(LifecycleManager::new(runtime, Arc::new(config)));
        let pool = Arc::new(WarmPool::new(lifecycle.clone(), stats.clone()));
        let pooled = PooledExecutor::new(pool.clone(), packager.clone(), stats.clone());
        let sandboxed = SandboxedExecutor::new(lifecycle, packager, stats.clone());
        Self {
            pool,
            pooled,
            sandboxed,
            stats,
        }
    }

    /// Connect to the local Docker daemon.
    pub fn with_docker(config: EngineConfig) -> Result<Self, RuntimeError> {
        let runtime = DockerRuntime::connect()?;
        Ok(Self::new(Arc::new(runtime), config))
    }

    /// Pre-warm every language's pool to capacity.
    pub async fn startup(&self) -> Result<(), ExecutionError> {
        log::info!(
            "Pre-warming {} container(s) per language for {:?}",
            self.pool.capacity(),
            self.pool.languages()
        );
        self.pool.prewarm().await
    }

    /// Destroy all idle units.
    pub async fn shutdown(&self) {
        let drained = self.pool.drain().await;
        log::info!("Execution engine shut down, {} idle container(s) removed", drained);
    }

    /// Run a request on a pooled unit.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.pooled.execute(request).await
    }

    /// Run a request in a fresh unit under the strict isolation runtime.
    pub async fn execute_sandboxed(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.sandboxed.execute(request).await
    }

    pub fn strategy(&self, sandboxed: bool) -> &dyn ExecutionStrategy {
        if sandboxed {
            &self.sandboxed
        } else {
            &self.pooled
        }
    }

    pub fn pool(&self) -> &Arc<WarmPool> {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        self.pool.lifecycle().config()
    }

    pub async fn idle_count(&self, language: Language) -> usize {
        self.pool.idle_count(language).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ping the runtime and report which images are present.
    pub async fn check(&self) -> Result<Vec<(Language, String, bool)>, RuntimeError> {
        let lifecycle = self.pool.lifecycle();
        lifecycle.runtime().ping().await?;
        lifecycle.check_images().await
    }
}

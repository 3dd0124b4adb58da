//! Container lifecycle management.
//!
//! Creates execution units from each language's base image and tears them down
//! again. Pooled units run an inert placeholder so code can be exec'd into them
//! repeatedly; sandboxed units run the interpreter as their entry command under
//! the strict runtime and exit when the program does.

use crate::config::EngineConfig;
use crate::errors::{ExecutionError, RuntimeError};
use crate::language::Language;
use crate::packager::PackagedFile;
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::unit::{ExecutionUnit, UnitState};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub const LANGUAGE_LABEL: &str = "fnexec.language";
pub const MODE_LABEL: &str = "fnexec.mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMode {
    Pooled,
    Sandboxed,
}

impl UnitMode {
    fn as_str(&self) -> &'static str {
        match self {
            UnitMode::Pooled => "pooled",
            UnitMode::Sandboxed => "sandboxed",
        }
    }
}

pub struct LifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<EngineConfig>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: Arc<EngineConfig>) -> Self {
        Self { runtime, config }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn image_for(&self, language: Language) -> Result<&str, ExecutionError> {
        self.config
            .image_for(language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))
    }

    fn spec(&self, language: Language, image: &str, command: Vec<String>, mode: UnitMode) -> ContainerSpec {
        let runtime = &self.config.runtime;
        let mut labels = HashMap::new();
        labels.insert(LANGUAGE_LABEL.to_string(), language.to_string());
        labels.insert(MODE_LABEL.to_string(), mode.as_str().to_string());

        ContainerSpec {
            name: format!(
                "{}-{}-{}",
                runtime.name_prefix,
                language,
                Uuid::new_v4().simple()
            ),
            image: image.to_string(),
            command,
            working_dir: runtime.working_dir.clone(),
            memory_limit_bytes: runtime.memory_limit_bytes(),
            network_disabled: runtime.network_disabled,
            runtime: None,
            binds: Vec::new(),
            labels,
        }
    }

    /// Create and start a long-lived unit for the pooled path.
    pub async fn create(&self, language: Language) -> Result<ExecutionUnit, ExecutionError> {
        let image = self.image_for(language)?;
        let spec = self.spec(
            language,
            image,
            self.config.runtime.placeholder_command.clone(),
            UnitMode::Pooled,
        );
        self.provision(language, spec).await
    }

    /// Create and start a single-use unit under the strict runtime, with
    /// `code_path` bound read-only as the entry file. The program starts
    /// running as soon as this returns.
    pub async fn create_sandboxed(
        &self,
        language: Language,
        code_path: &Path,
    ) -> Result<ExecutionUnit, ExecutionError> {
        let image = self.image_for(language)?;
        let working_dir = self.config.runtime.working_dir.trim_end_matches('/');
        let mut spec = self.spec(
            language,
            image,
            language.command(working_dir),
            UnitMode::Sandboxed,
        );
        spec.runtime = Some(self.config.runtime.sandbox_runtime.clone());
        spec.binds.push(format!(
            "{}:{}/{}:ro",
            code_path.display(),
            working_dir,
            language.entry_file_name()
        ));
        self.provision(language, spec).await
    }

    async fn provision(
        &self,
        language: Language,
        spec: ContainerSpec,
    ) -> Result<ExecutionUnit, ExecutionError> {
        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| match e {
                RuntimeError::ImageNotFound(image) => ExecutionError::ImageUnavailable(image),
                other => ExecutionError::RuntimeUnavailable(other.to_string()),
            })?;

        let mut unit = ExecutionUnit::new(id, spec.name, language);

        if let Err(e) = self.runtime.start_container(unit.id()).await {
            log::error!("Failed to start container {}: {}", unit.name(), e);
            self.destroy(&mut unit).await;
            return Err(ExecutionError::RuntimeUnavailable(e.to_string()));
        }

        unit.mark_running();
        log::debug!("Started {} container {} ({})", language, unit.name(), unit.id());
        Ok(unit)
    }

    /// SIGKILL whatever is running inside the unit.
    pub async fn kill(&self, unit: &ExecutionUnit) -> Result<(), RuntimeError> {
        self.runtime.kill_container(unit.id()).await
    }

    /// Stop and remove a unit. Safe to call on a unit whose container is
    /// already gone; cleanup failures are logged, never returned.
    pub async fn destroy(&self, unit: &mut ExecutionUnit) {
        if unit.state() == UnitState::Terminated {
            return;
        }
        let was_running = unit.state() != UnitState::Created;
        unit.mark_terminating();

        if was_running {
            if let Err(e) = self.runtime.stop_container(unit.id()).await {
                if !e.is_not_found() {
                    log::debug!("Stop of container {} failed: {}", unit.id(), e);
                }
            }
        }

        match self.runtime.remove_container(unit.id()).await {
            Ok(()) => log::debug!("Removed container {}", unit.name()),
            Err(e) if e.is_not_found() => {
                log::debug!("Container {} already removed", unit.id())
            }
            Err(e) => log::warn!("Failed to remove container {}: {}", unit.id(), e),
        }

        unit.mark_terminated();
    }

    /// Report whether each enabled language's image is present.
    pub async fn check_images(&self) -> Result<Vec<(Language, String, bool)>, RuntimeError> {
        let mut report = Vec::new();
        for language in self.config.enabled_languages() {
            if let Some(image) = self.config.image_for(language) {
                let present = self.runtime.image_exists(image).await?;
                report.push((language, image.to_string(), present));
            }
        }
        Ok(report)
    }
}

/// Removes a unit's container in the background when the invocation holding
/// the unit is dropped before handing it back. Call `disarm` once the unit has
/// been released, discarded or destroyed.
pub(crate) struct OrphanGuard {
    lifecycle: Arc<LifecycleManager>,
    unit_id: Option<String>,
    bind_source: Option<PackagedFile>,
}

impl OrphanGuard {
    pub(crate) fn new(lifecycle: Arc<LifecycleManager>, unit: &ExecutionUnit) -> Self {
        Self {
            lifecycle,
            unit_id: Some(unit.id().to_string()),
            bind_source: None,
        }
    }

    /// Keep a bind-mount source on disk until the container is gone.
    pub(crate) fn holding(mut self, file: PackagedFile) -> Self {
        self.bind_source = Some(file);
        self
    }

    pub(crate) fn disarm(&mut self) {
        self.unit_id = None;
    }
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        let Some(id) = self.unit_id.take() else {
            return;
        };
        let bind_source = self.bind_source.take();
        let runtime = self.lifecycle.runtime().clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Invocation dropped while holding container {}, removing it", id);
                handle.spawn(async move {
                    match runtime.remove_container(&id).await {
                        Ok(()) => log::debug!("Removed abandoned container {}", id),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => log::warn!("Failed to remove abandoned container {}: {}", id, e),
                    }
                    drop(bind_source);
                });
            }
            Err(_) => log::error!("Container {} abandoned outside a runtime, it must be removed by hand", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageConfig;
    use crate::errors::ErrorKind;
    use crate::test_utils::fake_runtime::FakeRuntime;

    fn manager(runtime: Arc<FakeRuntime>, config: EngineConfig) -> LifecycleManager {
        LifecycleManager::new(runtime, Arc::new(config))
    }

    #[tokio::test]
    async fn test_create_runs_placeholder_with_limits() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(runtime.clone(), EngineConfig::default());

        let unit = lifecycle.create(Language::Python).await.unwrap();
        assert_eq!(unit.state(), UnitState::Running);
        assert_eq!(unit.language(), Language::Python);
        assert!(unit.name().starts_with("fnexec-python-"));

        let spec = runtime.spec_of(unit.id()).unwrap();
        assert_eq!(spec.image, "python-base");
        assert_eq!(spec.command, vec!["tail", "-f", "/dev/null"]);
        assert_eq!(spec.working_dir, "/app");
        assert_eq!(spec.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(spec.runtime, None);
        assert_eq!(spec.labels.get(MODE_LABEL).map(String::as_str), Some("pooled"));
        assert!(runtime.is_running(unit.id()));
    }

    #[tokio::test]
    async fn test_create_sandboxed_binds_code_read_only() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(runtime.clone(), EngineConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_function.js");
        std::fs::write(&path, "console.log('hi')").unwrap();

        let unit = lifecycle
            .create_sandboxed(Language::Javascript, &path)
            .await
            .unwrap();

        let spec = runtime.spec_of(unit.id()).unwrap();
        assert_eq!(spec.runtime.as_deref(), Some("runsc"));
        assert_eq!(spec.command, vec!["node", "/app/user_function.js"]);
        assert_eq!(
            spec.binds,
            vec![format!("{}:/app/user_function.js:ro", path.display())]
        );
    }

    #[tokio::test]
    async fn test_disabled_language_is_unsupported() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut config = EngineConfig::default();
        config.languages.insert(
            Language::Javascript,
            LanguageConfig {
                image: "nodejs-base".into(),
                enabled: false,
            },
        );
        let lifecycle = manager(runtime.clone(), config);

        let err = lifecycle.create(Language::Javascript).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
        assert_eq!(runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_image_is_image_unavailable() {
        let runtime = Arc::new(FakeRuntime::new().with_missing_image("python-base"));
        let lifecycle = manager(runtime.clone(), EngineConfig::default());

        let err = lifecycle.create(Language::Python).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageUnavailable);
    }

    #[tokio::test]
    async fn test_failed_start_removes_container() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_next_start();
        let lifecycle = manager(runtime.clone(), EngineConfig::default());

        let err = lifecycle.create(Language::Python).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeUnavailable);
        assert_eq!(runtime.created_count(), 1);
        assert_eq!(runtime.live_count(), 0);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(runtime.clone(), EngineConfig::default());

        let mut unit = lifecycle.create(Language::Python).await.unwrap();
        lifecycle.destroy(&mut unit).await;
        assert_eq!(unit.state(), UnitState::Terminated);
        assert!(!runtime.exists(unit.id()));

        lifecycle.destroy(&mut unit).await;
        assert_eq!(unit.state(), UnitState::Terminated);
    }

    #[tokio::test]
    async fn test_destroy_tolerates_vanished_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(runtime.clone(), EngineConfig::default());

        let mut unit = lifecycle.create(Language::Python).await.unwrap();
        runtime.vanish(unit.id());
        lifecycle.destroy(&mut unit).await;
        assert_eq!(unit.state(), UnitState::Terminated);
    }

    #[tokio::test]
    async fn test_check_images_reports_presence() {
        let runtime = Arc::new(FakeRuntime::new().with_missing_image("nodejs-base"));
        let lifecycle = manager(runtime, EngineConfig::default());

        let report = lifecycle.check_images().await.unwrap();
        assert_eq!(
            report,
            vec![
                (Language::Python, "python-base".to_string(), true),
                (Language::Javascript, "nodejs-base".to_string(), false),
            ]
        );
    }
}

// src/runtime/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
#[allow(deprecated)]
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    InspectContainerOptions as BollardInspectContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
    UploadToContainerOptions as BollardUploadToContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use std::default::Default;

use super::{ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutcome, ProcessOutput};
use crate::errors::RuntimeError;

/// Seconds `docker stop` waits before escalating to SIGKILL.
const STOP_GRACE_SECONDS: i32 = 2;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn container_error(id: &str, err: bollard::errors::Error) -> RuntimeError {
    if status_code(&err) == Some(404) {
        RuntimeError::ContainerNotFound(id.to_string())
    } else {
        RuntimeError::BollardError(err)
    }
}

async fn collect_output<S>(mut stream: S) -> Result<ProcessOutput, RuntimeError>
where
    S: Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
{
    let mut output = ProcessOutput::default();
    while let Some(log_result) = stream.next().await {
        match log_result? {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                output.push_stdout(&String::from_utf8_lossy(&message))
            }
            LogOutput::StdErr { message } => output.push_stderr(&String::from_utf8_lossy(&message)),
            _ => {}
        }
    }
    Ok(output)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(RuntimeError::BollardError(e)),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            network_disabled: Some(spec.network_disabled),
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            host_config: Some(HostConfig {
                memory: Some(spec.memory_limit_bytes),
                binds: if spec.binds.is_empty() {
                    None
                } else {
                    Some(spec.binds.clone())
                },
                runtime: spec.runtime.clone(),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        match self.docker.create_container(options, config).await {
            Ok(response) => Ok(response.id),
            Err(e) if status_code(&e) == Some(404) => {
                Err(RuntimeError::ImageNotFound(spec.image.clone()))
            }
            Err(e) => Err(RuntimeError::BollardError(e)),
        }
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| container_error(id, e))
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let options = Some(BollardUploadToContainerOptionsQuery {
            path: path.to_string(),
            ..Default::default()
        });
        self.docker
            .upload_to_container(id, options, bollard::body_full(archive.into()))
            .await
            .map_err(|e| container_error(id, e))
    }

    #[allow(deprecated)]
    async fn exec(
        &self,
        id: &str,
        command: Vec<String>,
        working_dir: &str,
    ) -> Result<ExecOutcome, RuntimeError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(command),
                    working_dir: Some(working_dir.to_string()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| container_error(id, e))?;

        let output = match self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| container_error(id, e))?
        {
            StartExecResults::Attached { output, .. } => collect_output(output).await?,
            StartExecResults::Detached => {
                return Err(RuntimeError::Api(format!(
                    "exec {} in container {} started detached",
                    exec.id, id
                )))
            }
        };

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| container_error(id, e))?;

        Ok(ExecOutcome {
            exit_code: inspect.exit_code,
            output,
        })
    }

    async fn inspect(&self, id: &str) -> Result<ContainerStatus, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<BollardInspectContainerOptionsQuery>)
            .await
            .map_err(|e| container_error(id, e))?;

        let state = response
            .state
            .ok_or_else(|| RuntimeError::Api(format!("container {} reported no state", id)))?;

        Ok(ContainerStatus {
            running: state.running.unwrap_or(false),
            exit_code: state.exit_code,
            oom_killed: state.oom_killed.unwrap_or(false),
        })
    }

    async fn logs(&self, id: &str) -> Result<ProcessOutput, RuntimeError> {
        let stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        collect_output(Box::pin(stream)).await.map_err(|e| match e {
            RuntimeError::BollardError(inner) => container_error(id, inner),
            other => other,
        })
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .kill_container(
                id,
                Some(BollardKillContainerOptionsQuery {
                    signal: "SIGKILL".to_string(),
                }),
            )
            .await
            .map_err(|e| container_error(id, e))
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(
                id,
                Some(BollardStopContainerOptionsQuery {
                    t: Some(STOP_GRACE_SECONDS),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| container_error(id, e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| container_error(id, e))
    }
}

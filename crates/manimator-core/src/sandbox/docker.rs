// src/sandbox/docker.rs
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::default::Default;
use uuid::Uuid;

use super::{ContainerRuntime, RunReport, SandboxJob, CONTAINER_MOUNT, TIMEOUT_EXIT_CODE};
use crate::config::SandboxConfig;
use crate::errors::SandboxError;

/// Extra time granted beyond the in-sandbox `timeout` wrapper before the
/// runtime gives up waiting and stops the container itself.
const WAIT_GRACE: Duration = Duration::from_secs(15);

/// Docker-backed container runtime. The `Docker` handle is created once
/// at startup and injected here; there is no process-wide client.
pub struct DockerRuntime {
    docker: Docker,
    image: String,
    user: String,
}

impl DockerRuntime {
    pub fn new(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_docker(docker, config))
    }

    pub fn with_docker(docker: Docker, config: &SandboxConfig) -> Self {
        Self {
            docker,
            image: config.image.clone(),
            user: config.user.clone(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, job: &SandboxJob, host_dir: &Path) -> Result<RunReport, SandboxError> {
        let host_dir_path = host_dir
            .to_str()
            .ok_or_else(|| SandboxError::WorkDir("non-UTF-8 work directory path".to_string()))?
            .to_string();

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("manimate-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(job.command.clone()),
            user: Some(self.user.clone()),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![format!("{}:{}", host_dir_path, CONTAINER_MOUNT)]),
                auto_remove: Some(true),
                ..Default::default()
            }),
            attach_stdout: Some(false),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            let _ = self
                .docker
                .remove_container(
                    &container.id,
                    Some(BollardRemoveContainerOptionsQuery {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(SandboxError::Docker(e));
        }

        // Open the log stream before waiting so auto-removal cannot race
        // the diagnostic capture.
        let mut log_stream = self.docker.logs(
            &container.id,
            Some(BollardLogsOptionsQuery {
                follow: true,
                stdout: false,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<BollardWaitContainerOptionsQuery>);
        let backstop = tokio::time::sleep(job.timeout + WAIT_GRACE);

        let wait_outcome = tokio::select! {
            res = wait_stream.next() => res,
            _ = backstop => {
                log::warn!(
                    "sandbox backstop expired after {:?} for container {}",
                    job.timeout + WAIT_GRACE,
                    container.id
                );
                let _ = self
                    .docker
                    .stop_container(&container.id, None::<BollardStopContainerOptionsQuery>)
                    .await;
                return Ok(RunReport {
                    exit_code: TIMEOUT_EXIT_CODE,
                    diagnostics: Vec::new(),
                });
            }
        };

        // A non-zero exit is not an orchestration failure: bollard may
        // report it either through the wait body or as a dedicated wait
        // error, and both carry the exit status we need.
        let exit_code = match wait_outcome {
            Some(Ok(response)) => response.status_code,
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(SandboxError::Docker(e)),
            None => return Err(SandboxError::WaitInterrupted),
        };

        let mut diagnostics = Vec::new();
        while let Some(entry) = log_stream.next().await {
            match entry {
                Ok(LogOutput::StdErr { message }) => diagnostics.extend_from_slice(&message),
                Ok(_) => {}
                // The stream can end with an error once auto-removal
                // kicks in; the container is already gone at that point.
                Err(e) => {
                    log::debug!("log stream for {} ended: {e}", container.id);
                    break;
                }
            }
        }

        log::info!(
            "container {} exited with status {exit_code}",
            container.id
        );

        Ok(RunReport {
            exit_code,
            diagnostics,
        })
    }
}

//! Launching and terminating TensorBoard processes.

use super::{JobIdSet, TensorboardConfig};
use crate::error::TensorboardError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Ownership of one running visualization process.
#[async_trait]
pub trait ProcessHandle: Send + Sync + std::fmt::Debug {
    /// OS process id, when the process has one.
    fn pid(&self) -> Option<u32>;

    /// Whether the process is still alive. Reaps it if it has exited.
    fn is_running(&mut self) -> bool;

    /// Stop the process and reap it. Stopping an exited process succeeds.
    async fn terminate(&mut self) -> Result<(), String>;
}

/// A freshly launched process and the endpoint it serves on.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub endpoint: String,
    pub process: Box<dyn ProcessHandle>,
}

/// Starts visualization processes for a set of trial jobs.
#[async_trait]
pub trait VisualizationLauncher: Send + Sync {
    /// Launch a process watching `job_ids`, using `command` instead of the
    /// configured one when given.
    async fn spawn(
        &self,
        job_ids: &JobIdSet,
        command: Option<&str>,
    ) -> Result<LaunchedProcess, TensorboardError>;
}

/// A `tokio` child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self) -> Result<(), String> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(%status, "TensorBoard process already exited");
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| format!("kill failed: {e}"))
    }
}

/// Launches the TensorBoard executable as a local child process.
///
/// Each trial job's event files are expected under
/// `<trials_dir>/<job id>/tensorboard`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: String,
    host: String,
    trials_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(config: &TensorboardConfig) -> Self {
        Self {
            command: config.command.clone(),
            host: config.host.clone(),
            trials_dir: config.trials_dir.clone(),
        }
    }

    /// The `--logdir_spec` argument naming each job's log directory.
    pub fn logdir_spec(&self, job_ids: &JobIdSet) -> String {
        job_ids
            .iter()
            .map(|id| {
                let dir = self.trials_dir.join(id).join("tensorboard");
                format!("{id}:{}", dir.display())
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn free_port(&self) -> Result<u16, TensorboardError> {
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), 0))
            .await
            .map_err(|e| TensorboardError::SpawnFailed {
                message: format!("no free port on {}: {e}", self.host),
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| TensorboardError::SpawnFailed {
                message: e.to_string(),
            })?
            .port();
        Ok(port)
    }
}

#[async_trait]
impl VisualizationLauncher for ProcessLauncher {
    async fn spawn(
        &self,
        job_ids: &JobIdSet,
        command: Option<&str>,
    ) -> Result<LaunchedProcess, TensorboardError> {
        let command = command.unwrap_or(&self.command);
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| TensorboardError::SpawnFailed {
            message: "empty TensorBoard command".to_string(),
        })?;

        let port = self.free_port().await?;
        let child = Command::new(program)
            .args(parts)
            .arg("--logdir_spec")
            .arg(self.logdir_spec(job_ids))
            .arg("--port")
            .arg(port.to_string())
            .arg("--host")
            .arg(&self.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TensorboardError::SpawnFailed {
                message: format!("{program}: {e}"),
            })?;

        let endpoint = format!("http://{}:{port}", self.host);
        debug!(
            pid = ?child.id(),
            endpoint = %endpoint,
            job_ids = %job_ids,
            "TensorBoard process spawned"
        );
        Ok(LaunchedProcess {
            endpoint,
            process: Box::new(ChildProcess::new(child)),
        })
    }
}

//! TensorBoard session registry.

use super::launcher::{LaunchedProcess, ProcessHandle, VisualizationLauncher};
use super::{JobIdSet, TensorboardConfig};
use crate::error::TensorboardError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A live TensorBoard process watching a fixed set of trial jobs.
#[derive(Debug)]
struct TensorboardSession {
    job_ids: JobIdSet,
    started_at: DateTime<Utc>,
    process: Box<dyn ProcessHandle>,
}

/// Public view of a live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(rename = "endPoint")]
    pub endpoint: String,
    pub job_ids: JobIdSet,
    pub started_at: DateTime<Utc>,
}

/// Owns every TensorBoard process the gateway launched, keyed by endpoint.
///
/// Mutations (start, stop, stop-all) take the write lock for their whole
/// duration so two requests for the same job set never launch two
/// processes. Lookups share the read lock.
pub struct TensorboardManager {
    launcher: Arc<dyn VisualizationLauncher>,
    sessions: RwLock<HashMap<String, TensorboardSession>>,
    spawn_timeout: Duration,
    terminate_timeout: Duration,
}

impl std::fmt::Debug for TensorboardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorboardManager")
            .field("spawn_timeout", &self.spawn_timeout)
            .field("terminate_timeout", &self.terminate_timeout)
            .finish_non_exhaustive()
    }
}

impl TensorboardManager {
    pub fn new(launcher: Arc<dyn VisualizationLauncher>, config: &TensorboardConfig) -> Self {
        Self::with_timeouts(
            launcher,
            Duration::from_secs(config.spawn_timeout_secs),
            Duration::from_secs(config.terminate_timeout_secs),
        )
    }

    pub fn with_timeouts(
        launcher: Arc<dyn VisualizationLauncher>,
        spawn_timeout: Duration,
        terminate_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            sessions: RwLock::new(HashMap::new()),
            spawn_timeout,
            terminate_timeout,
        }
    }

    /// Return the endpoint of a live session watching exactly `job_ids`,
    /// launching one if none exists.
    ///
    /// A matching session whose process has exited is dropped and replaced.
    pub async fn start(
        &self,
        job_ids: JobIdSet,
        command: Option<&str>,
    ) -> Result<String, TensorboardError> {
        let mut sessions = self.sessions.write().await;
        if let Some(endpoint) = endpoint_for(&sessions, &job_ids) {
            let live = sessions
                .get_mut(&endpoint)
                .is_some_and(|session| session.process.is_running());
            if live {
                return Ok(endpoint);
            }
            if let Some(mut stale) = sessions.remove(&endpoint) {
                warn!(
                    endpoint = %endpoint,
                    job_ids = %job_ids,
                    "TensorBoard process exited; relaunching"
                );
                if let Err(e) = self.terminate(&endpoint, stale.process.as_mut()).await {
                    warn!(error = %e, "Failed to reap exited TensorBoard process");
                }
            }
        }

        let LaunchedProcess {
            endpoint,
            mut process,
        } = tokio::time::timeout(self.spawn_timeout, self.launcher.spawn(&job_ids, command))
            .await
            .map_err(|_| TensorboardError::Timeout {
                operation: "launch",
                timeout_secs: self.spawn_timeout.as_secs(),
            })??;

        if sessions.contains_key(&endpoint) {
            if let Err(e) = self.terminate(&endpoint, process.as_mut()).await {
                warn!(error = %e, "Failed to stop TensorBoard with duplicate endpoint");
            }
            return Err(TensorboardError::EndpointInUse { endpoint });
        }

        info!(
            endpoint = %endpoint,
            job_ids = %job_ids,
            pid = ?process.pid(),
            "TensorBoard session started"
        );
        sessions.insert(
            endpoint.clone(),
            TensorboardSession {
                job_ids,
                started_at: Utc::now(),
                process,
            },
        );
        Ok(endpoint)
    }

    /// Stop the session serving `endpoint`.
    ///
    /// The session is removed even when its process fails to terminate; the
    /// failure is still reported.
    pub async fn stop(&self, endpoint: &str) -> Result<(), TensorboardError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(endpoint)
            .ok_or_else(|| TensorboardError::NotFound {
                endpoint: endpoint.to_string(),
            })?;
        let result = self.terminate(endpoint, session.process.as_mut()).await;
        sessions.remove(endpoint);
        match &result {
            Ok(()) => info!(endpoint = %endpoint, "TensorBoard session stopped"),
            Err(e) => warn!(
                endpoint = %endpoint,
                error = %e,
                "TensorBoard session removed after failed stop"
            ),
        }
        result
    }

    /// Stop every session and empty the registry.
    ///
    /// Returns the number of sessions stopped. Individual failures do not
    /// interrupt the sweep; they are collected into `TerminateAll`.
    pub async fn stop_all(&self) -> Result<usize, TensorboardError> {
        let mut sessions = self.sessions.write().await;
        let total = sessions.len();
        let mut failures = Vec::new();
        for (endpoint, mut session) in sessions.drain() {
            if let Err(e) = self.terminate(&endpoint, session.process.as_mut()).await {
                warn!(endpoint = %endpoint, error = %e, "Failed to stop TensorBoard session");
                failures.push(e.to_string());
            }
        }
        info!(total, failed = failures.len(), "All TensorBoard sessions stopped");
        if failures.is_empty() {
            Ok(total)
        } else {
            Err(TensorboardError::TerminateAll { failures })
        }
    }

    /// Endpoint of the session watching exactly `job_ids`, if any.
    pub async fn find_by_job_ids(&self, job_ids: &JobIdSet) -> Option<String> {
        endpoint_for(&*self.sessions.read().await, job_ids)
    }

    pub async fn get(&self, endpoint: &str) -> Option<SessionInfo> {
        self.sessions
            .read()
            .await
            .get(endpoint)
            .map(|session| session_info(endpoint, session))
    }

    /// All live sessions, ordered by endpoint.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(endpoint, session)| session_info(endpoint, session))
            .collect();
        infos.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn terminate(
        &self,
        endpoint: &str,
        process: &mut dyn ProcessHandle,
    ) -> Result<(), TensorboardError> {
        match tokio::time::timeout(self.terminate_timeout, process.terminate()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(TensorboardError::TerminateFailed {
                endpoint: endpoint.to_string(),
                message,
            }),
            Err(_) => Err(TensorboardError::TerminateFailed {
                endpoint: endpoint.to_string(),
                message: format!("timed out after {:?}", self.terminate_timeout),
            }),
        }
    }
}

fn endpoint_for(
    sessions: &HashMap<String, TensorboardSession>,
    job_ids: &JobIdSet,
) -> Option<String> {
    sessions
        .iter()
        .find(|(_, session)| &session.job_ids == job_ids)
        .map(|(endpoint, _)| endpoint.clone())
}

fn session_info(endpoint: &str, session: &TensorboardSession) -> SessionInfo {
    SessionInfo {
        endpoint: endpoint.to_string(),
        job_ids: session.job_ids.clone(),
        started_at: session.started_at,
    }
}

//! # TensorBoard sessions
//!
//! Launches TensorBoard processes scoped to a set of trial jobs, hands out
//! one endpoint per process, reuses a live process when the same job set is
//! requested again, and tears processes down on request or when the
//! experiment stops.

mod launcher;
mod session;

pub use launcher::{
    ChildProcess, LaunchedProcess, ProcessHandle, ProcessLauncher, VisualizationLauncher,
};
pub use session::{SessionInfo, TensorboardManager};

use crate::error::TensorboardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Configuration for launching TensorBoard sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorboardConfig {
    /// Command used to launch TensorBoard when a request gives none.
    pub command: String,
    /// Host the TensorBoard processes bind to.
    pub host: String,
    /// Directory holding one sub-directory per trial job.
    pub trials_dir: PathBuf,
    /// Upper bound for launching a process.
    pub spawn_timeout_secs: u64,
    /// Upper bound for terminating a process.
    pub terminate_timeout_secs: u64,
}

impl Default for TensorboardConfig {
    fn default() -> Self {
        Self {
            command: "tensorboard".to_string(),
            host: "127.0.0.1".to_string(),
            trials_dir: PathBuf::from("trials"),
            spawn_timeout_secs: 30,
            terminate_timeout_secs: 10,
        }
    }
}

/// The non-empty set of trial job ids a session watches.
///
/// Ordering and duplicates in the request do not matter: `a,b` and `b,a,a`
/// are the same set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobIdSet(BTreeSet<String>);

impl JobIdSet {
    pub fn new<I, S>(ids: I) -> Result<Self, TensorboardError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for id in ids {
            let id = id.into();
            let id = id.trim();
            if id.is_empty() {
                continue;
            }
            if !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(TensorboardError::InvalidJobIds {
                    message: format!("'{id}' contains unsupported characters"),
                });
            }
            set.insert(id.to_string());
        }
        if set.is_empty() {
            return Err(TensorboardError::InvalidJobIds {
                message: "at least one trial job id is required".to_string(),
            });
        }
        Ok(Self(set))
    }

    /// Parse a comma-separated id list such as `j1,j2`.
    pub fn parse(list: &str) -> Result<Self, TensorboardError> {
        Self::new(list.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no ids. False for any constructed set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }
}

impl std::fmt::Display for JobIdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensorboard_config_default() {
        let config = TensorboardConfig::default();
        assert_eq!(config.command, "tensorboard");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.spawn_timeout_secs, 30);
        assert_eq!(config.terminate_timeout_secs, 10);
    }

    #[test]
    fn test_job_id_set_is_order_and_duplicate_insensitive() {
        let a = JobIdSet::parse("j2,j1").unwrap();
        let b = JobIdSet::parse(" j1 , j2,j1,").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "j1,j2");
        assert!(a.contains("j1"));
    }

    #[test]
    fn test_job_id_set_rejects_empty() {
        assert!(matches!(
            JobIdSet::parse(""),
            Err(TensorboardError::InvalidJobIds { .. })
        ));
        assert!(JobIdSet::parse(", ,").is_err());
        assert!(JobIdSet::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_job_id_set_rejects_separators() {
        assert!(JobIdSet::parse("a:b").is_err());
        assert!(JobIdSet::parse("../etc").is_err());
        assert!(JobIdSet::parse("Ab_1-x").is_ok());
    }

    #[test]
    fn test_job_id_set_serializes_as_list() {
        let set = JobIdSet::parse("b,a").unwrap();
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!(["a", "b"])
        );
    }
}

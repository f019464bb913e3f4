//! Core type definitions for expgate.
//!
//! Defines the records the gateway proxies between HTTP clients and the
//! orchestration engine: experiment profiles, trial jobs, metric records,
//! and job statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Hidden directory inside a trial's log path that holds runtime artifacts.
pub const TRIAL_ARTIFACT_DIR: &str = ".nni";

/// File name of a trial's captured standard error stream.
pub const STDERR_FILE_NAME: &str = "stderr";

/// Opaque experiment configuration/state blob owned by the orchestration engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentProfile(pub serde_json::Value);

/// Whether this gateway process drives a freshly created experiment or
/// resumes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentMode {
    #[default]
    New,
    Resume,
}

/// Discriminator for partial experiment profile updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileUpdateType {
    TrialConcurrency,
    MaxExecDuration,
    SearchSpace,
    MaxTrialNum,
}

impl ProfileUpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileUpdateType::TrialConcurrency => "TRIAL_CONCURRENCY",
            ProfileUpdateType::MaxExecDuration => "MAX_EXEC_DURATION",
            ProfileUpdateType::SearchSpace => "SEARCH_SPACE",
            ProfileUpdateType::MaxTrialNum => "MAX_TRIAL_NUM",
        }
    }
}

impl std::fmt::Display for ProfileUpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileUpdateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIAL_CONCURRENCY" => Ok(ProfileUpdateType::TrialConcurrency),
            "MAX_EXEC_DURATION" => Ok(ProfileUpdateType::MaxExecDuration),
            "SEARCH_SPACE" => Ok(ProfileUpdateType::SearchSpace),
            "MAX_TRIAL_NUM" => Ok(ProfileUpdateType::MaxTrialNum),
            other => Err(format!("unknown update type: {other}")),
        }
    }
}

/// Lifecycle status of a trial job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialJobStatus {
    Unknown,
    Waiting,
    Running,
    Succeeded,
    Failed,
    UserCanceled,
    SysCanceled,
    EarlyStopped,
}

impl TrialJobStatus {
    pub const ALL: [TrialJobStatus; 8] = [
        TrialJobStatus::Unknown,
        TrialJobStatus::Waiting,
        TrialJobStatus::Running,
        TrialJobStatus::Succeeded,
        TrialJobStatus::Failed,
        TrialJobStatus::UserCanceled,
        TrialJobStatus::SysCanceled,
        TrialJobStatus::EarlyStopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialJobStatus::Unknown => "UNKNOWN",
            TrialJobStatus::Waiting => "WAITING",
            TrialJobStatus::Running => "RUNNING",
            TrialJobStatus::Succeeded => "SUCCEEDED",
            TrialJobStatus::Failed => "FAILED",
            TrialJobStatus::UserCanceled => "USER_CANCELED",
            TrialJobStatus::SysCanceled => "SYS_CANCELED",
            TrialJobStatus::EarlyStopped => "EARLY_STOPPED",
        }
    }

    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TrialJobStatus::Unknown | TrialJobStatus::Waiting | TrialJobStatus::Running
        )
    }
}

impl std::fmt::Display for TrialJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrialJobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown trial job status: {s}"))
    }
}

/// A trial job record as reported by the orchestration engine.
///
/// Attributes the gateway does not interpret are carried through in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialJobInfo {
    pub id: String,
    pub status: TrialJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hyper_parameters: Vec<String>,
    /// Derived at response time, never stored.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrialJobInfo {
    pub fn new(id: impl Into<String>, status: TrialJobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            log_path: None,
            start_time: None,
            end_time: None,
            hyper_parameters: Vec::new(),
            stderr_path: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<String>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }

    /// Recompute `stderr_path` from the current status and log path.
    ///
    /// Set only for failed jobs that have a log path; cleared otherwise.
    pub fn with_stderr_path(mut self) -> Self {
        self.extra.remove("stderrPath");
        self.stderr_path = match (&self.status, &self.log_path) {
            (TrialJobStatus::Failed, Some(log_path)) => Some(stderr_path_for(log_path)),
            _ => None,
        };
        self
    }
}

/// Location of the captured stderr file below a trial's log path.
pub fn stderr_path_for(log_path: &str) -> String {
    format!(
        "{}/{}/{}",
        log_path.trim_end_matches('/'),
        TRIAL_ARTIFACT_DIR,
        STDERR_FILE_NAME
    )
}

/// Number of trial jobs currently in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialJobStatistics {
    pub trial_job_status: TrialJobStatus,
    pub trial_job_number: u64,
}

/// Kind of a reported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Periodical,
    Final,
    RequestParameter,
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERIODICAL" => Ok(MetricType::Periodical),
            "FINAL" => Ok(MetricType::Final),
            "REQUEST_PARAMETER" => Ok(MetricType::RequestParameter),
            other => Err(format!("unknown metric type: {other}")),
        }
    }
}

/// One immutable metric report of a trial job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDataRecord {
    pub timestamp: i64,
    pub trial_job_id: String,
    pub parameter_id: String,
    #[serde(rename = "type")]
    pub kind: MetricType,
    pub sequence: u64,
    /// Serialized metric payload, forwarded as-is.
    pub data: String,
}

/// Cluster configuration key → value, applied entry by entry in order.
pub type ClusterMetadata = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stderr_path_only_for_failed_with_log_path() {
        let failed = TrialJobInfo::new("a", TrialJobStatus::Failed)
            .with_log_path("file://localhost:/tmp/trials/a")
            .with_stderr_path();
        assert_eq!(
            failed.stderr_path.as_deref(),
            Some("file://localhost:/tmp/trials/a/.nni/stderr")
        );

        let failed_no_log = TrialJobInfo::new("b", TrialJobStatus::Failed).with_stderr_path();
        assert!(failed_no_log.stderr_path.is_none());

        for status in TrialJobStatus::ALL {
            if status == TrialJobStatus::Failed {
                continue;
            }
            let job = TrialJobInfo::new("c", status)
                .with_log_path("/tmp/c")
                .with_stderr_path();
            assert!(job.stderr_path.is_none(), "{status} must not carry stderrPath");
        }
    }

    #[test]
    fn test_stderr_path_is_idempotent() {
        let job = TrialJobInfo::new("a", TrialJobStatus::Failed)
            .with_log_path("/tmp/a/")
            .with_stderr_path();
        let again = job.clone().with_stderr_path();
        assert_eq!(job.stderr_path, again.stderr_path);
        assert_eq!(again.stderr_path.as_deref(), Some("/tmp/a/.nni/stderr"));
    }

    #[test]
    fn test_stderr_path_cleared_when_status_changes() {
        let mut job = TrialJobInfo::new("a", TrialJobStatus::Failed)
            .with_log_path("/tmp/a")
            .with_stderr_path();
        job.status = TrialJobStatus::Running;
        assert!(job.with_stderr_path().stderr_path.is_none());
    }

    #[test]
    fn test_trial_job_serialization_shape() {
        let mut job = TrialJobInfo::new("abc", TrialJobStatus::Failed).with_log_path("/logs/abc");
        job.extra.insert("sequenceId".into(), serde_json::json!(3));
        let json = serde_json::to_value(job.with_stderr_path()).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["logPath"], "/logs/abc");
        assert_eq!(json["stderrPath"], "/logs/abc/.nni/stderr");
        assert_eq!(json["sequenceId"], 3);
    }

    #[test]
    fn test_stored_stderr_path_is_ignored() {
        let job: TrialJobInfo = serde_json::from_value(serde_json::json!({
            "id": "x",
            "status": "RUNNING",
            "stderrPath": "/stale"
        }))
        .unwrap();
        assert!(job.stderr_path.is_none());
        let json = serde_json::to_value(job.with_stderr_path()).unwrap();
        assert!(json.get("stderrPath").is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "USER_CANCELED".parse::<TrialJobStatus>().unwrap(),
            TrialJobStatus::UserCanceled
        );
        assert!("running".parse::<TrialJobStatus>().is_err());
        assert!(TrialJobStatus::EarlyStopped.is_terminal());
        assert!(!TrialJobStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_update_type_parsing() {
        assert_eq!(
            "SEARCH_SPACE".parse::<ProfileUpdateType>().unwrap(),
            ProfileUpdateType::SearchSpace
        );
        assert!("NOPE".parse::<ProfileUpdateType>().is_err());
    }

    #[test]
    fn test_metric_record_type_field() {
        let record = MetricDataRecord {
            timestamp: 1,
            trial_job_id: "t".into(),
            parameter_id: "0".into(),
            kind: MetricType::Final,
            sequence: 0,
            data: "0.93".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "FINAL");
        assert_eq!(json["trialJobId"], "t");
    }
}

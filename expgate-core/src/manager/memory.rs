//! In-memory experiment engine and datastore.
//!
//! Keeps experiment state in process memory without scheduling anything.
//! Used by standalone deployments and tests.

use super::{DataStore, ExperimentManager};
use crate::error::{DataStoreError, ManagerError};
use crate::types::{
    ExperimentProfile, MetricDataRecord, MetricType, ProfileUpdateType, TrialJobInfo,
    TrialJobStatistics, TrialJobStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct ExperimentState {
    experiment_id: Option<String>,
    profile: Option<Value>,
    running: bool,
    trial_jobs: Vec<TrialJobInfo>,
    metrics: Vec<MetricDataRecord>,
    cluster_metadata: BTreeMap<String, String>,
}

/// An experiment engine that stores everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryManager {
    state: Mutex<ExperimentState>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that already knows an experiment, so it can be resumed.
    pub fn with_experiment(experiment_id: impl Into<String>, params: Value) -> Self {
        let experiment_id = experiment_id.into();
        let state = ExperimentState {
            profile: Some(new_profile(&experiment_id, params)),
            experiment_id: Some(experiment_id),
            ..ExperimentState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Record a trial job, replacing any job with the same id.
    pub async fn upsert_trial_job(&self, job: TrialJobInfo) {
        let mut state = self.state.lock().await;
        match state.trial_jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => state.trial_jobs.push(job),
        }
    }

    pub async fn push_metric(&self, record: MetricDataRecord) {
        self.state.lock().await.metrics.push(record);
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }
}

fn new_profile(experiment_id: &str, params: Value) -> Value {
    json!({
        "id": experiment_id,
        "params": params,
        "execDuration": 0,
        "startTime": Utc::now().timestamp_millis(),
        "revision": 0,
    })
}

fn generate_id(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

/// Profile field under `params` that an update type replaces.
fn update_field(update_type: ProfileUpdateType) -> &'static str {
    match update_type {
        ProfileUpdateType::TrialConcurrency => "trialConcurrency",
        ProfileUpdateType::MaxExecDuration => "maxExecDuration",
        ProfileUpdateType::SearchSpace => "searchSpace",
        ProfileUpdateType::MaxTrialNum => "maxTrialNum",
    }
}

#[async_trait]
impl ExperimentManager for InMemoryManager {
    async fn experiment_profile(&self) -> Result<ExperimentProfile, ManagerError> {
        let state = self.state.lock().await;
        state
            .profile
            .clone()
            .map(ExperimentProfile)
            .ok_or_else(|| ManagerError::not_found("Experiment"))
    }

    async fn update_experiment_profile(
        &self,
        profile: ExperimentProfile,
        update_type: ProfileUpdateType,
    ) -> Result<(), ManagerError> {
        let field = update_field(update_type);
        let value = profile
            .0
            .get("params")
            .and_then(|params| params.get(field))
            .cloned()
            .ok_or_else(|| {
                ManagerError::invalid(format!("profile has no params.{field} for {update_type}"))
            })?;

        let mut state = self.state.lock().await;
        let current = state
            .profile
            .as_mut()
            .ok_or_else(|| ManagerError::not_found("Experiment"))?;
        if !current.get("params").is_some_and(Value::is_object) {
            current["params"] = json!({});
        }
        current["params"][field] = value;
        let revision = current["revision"].as_u64().unwrap_or(0) + 1;
        current["revision"] = json!(revision);
        debug!(update_type = %update_type, revision, "Experiment profile updated");
        Ok(())
    }

    async fn start_experiment(&self, params: Value) -> Result<String, ManagerError> {
        let mut state = self.state.lock().await;
        if state.running {
            return Err(ManagerError::invalid("an experiment is already running"));
        }
        let experiment_id = generate_id(8);
        state.profile = Some(new_profile(&experiment_id, params));
        state.experiment_id = Some(experiment_id.clone());
        state.running = true;
        info!(experiment_id = %experiment_id, "Experiment started");
        Ok(experiment_id)
    }

    async fn resume_experiment(&self) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        let Some(experiment_id) = state.experiment_id.clone() else {
            return Err(ManagerError::not_found("Experiment"));
        };
        state.running = true;
        info!(experiment_id = %experiment_id, "Experiment resumed");
        Ok(())
    }

    async fn stop_experiment(&self) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        state.running = false;
        if let Some(profile) = state.profile.as_mut() {
            profile["endTime"] = json!(Utc::now().timestamp_millis());
        }
        info!(experiment_id = ?state.experiment_id, "Experiment stopped");
        Ok(())
    }

    async fn trial_job_statistics(&self) -> Result<Vec<TrialJobStatistics>, ManagerError> {
        let state = self.state.lock().await;
        let mut counts: HashMap<TrialJobStatus, u64> = HashMap::new();
        for job in &state.trial_jobs {
            *counts.entry(job.status).or_default() += 1;
        }
        Ok(TrialJobStatus::ALL
            .into_iter()
            .filter_map(|status| {
                counts.get(&status).map(|&n| TrialJobStatistics {
                    trial_job_status: status,
                    trial_job_number: n,
                })
            })
            .collect())
    }

    async fn set_cluster_metadata(&self, key: &str, value: &str) -> Result<(), ManagerError> {
        if key.is_empty() {
            return Err(ManagerError::invalid("cluster metadata key is empty"));
        }
        self.state
            .lock()
            .await
            .cluster_metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn cluster_metadata(&self, key: &str) -> Result<String, ManagerError> {
        self.state
            .lock()
            .await
            .cluster_metadata
            .get(key)
            .cloned()
            .ok_or_else(|| ManagerError::not_found(format!("Cluster metadata {key}")))
    }

    async fn list_trial_jobs(
        &self,
        status: Option<TrialJobStatus>,
    ) -> Result<Vec<TrialJobInfo>, ManagerError> {
        let state = self.state.lock().await;
        Ok(state
            .trial_jobs
            .iter()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect())
    }

    async fn trial_job(&self, trial_job_id: &str) -> Result<TrialJobInfo, ManagerError> {
        let state = self.state.lock().await;
        state
            .trial_jobs
            .iter()
            .find(|job| job.id == trial_job_id)
            .cloned()
            .ok_or_else(|| ManagerError::not_found(format!("Trial job {trial_job_id}")))
    }

    async fn add_custom_trial_job(&self, form: &str) -> Result<(), ManagerError> {
        let mut job = TrialJobInfo::new(generate_id(5), TrialJobStatus::Waiting);
        job.hyper_parameters.push(form.to_string());
        job.start_time = Some(Utc::now());
        debug!(trial_job_id = %job.id, "Custom trial job queued");
        self.state.lock().await.trial_jobs.push(job);
        Ok(())
    }

    async fn cancel_trial_job(&self, trial_job_id: &str) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        let job = state
            .trial_jobs
            .iter_mut()
            .find(|job| job.id == trial_job_id)
            .ok_or_else(|| ManagerError::not_found(format!("Trial job {trial_job_id}")))?;
        if !job.status.is_terminal() {
            job.status = TrialJobStatus::UserCanceled;
            job.end_time = Some(Utc::now());
        }
        Ok(())
    }

    async fn metric_data(
        &self,
        trial_job_id: Option<&str>,
        kind: Option<MetricType>,
    ) -> Result<Vec<MetricDataRecord>, ManagerError> {
        let state = self.state.lock().await;
        Ok(state
            .metrics
            .iter()
            .filter(|m| trial_job_id.is_none_or(|id| m.trial_job_id == id))
            .filter(|m| kind.is_none_or(|k| m.kind == k))
            .cloned()
            .collect())
    }

    async fn latest_metric_data(&self) -> Result<Vec<MetricDataRecord>, ManagerError> {
        let state = self.state.lock().await;
        let mut latest: BTreeMap<&str, &MetricDataRecord> = BTreeMap::new();
        for record in &state.metrics {
            let newer = latest.get(record.trial_job_id.as_str()).is_none_or(|seen| {
                (record.timestamp, record.sequence) >= (seen.timestamp, seen.sequence)
            });
            if newer {
                latest.insert(record.trial_job_id.as_str(), record);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }
}

/// A datastore with nothing to persist; initialization always succeeds.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    initialized: AtomicBool,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn init(&self) -> Result<(), DataStoreError> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            debug!("In-memory datastore initialized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metric(job: &str, kind: MetricType, timestamp: i64, sequence: u64) -> MetricDataRecord {
        MetricDataRecord {
            timestamp,
            trial_job_id: job.into(),
            parameter_id: "0".into(),
            kind,
            sequence,
            data: format!("{timestamp}"),
        }
    }

    #[tokio::test]
    async fn test_start_then_profile() {
        let mgr = InMemoryManager::new();
        assert!(matches!(
            mgr.experiment_profile().await,
            Err(ManagerError::NotFound { .. })
        ));

        let id = mgr
            .start_experiment(json!({"trialConcurrency": 2}))
            .await
            .unwrap();
        assert_eq!(id.len(), 8);
        assert!(mgr.is_running().await);

        let profile = mgr.experiment_profile().await.unwrap();
        assert_eq!(profile.0["id"], id.as_str());
        assert_eq!(profile.0["params"]["trialConcurrency"], 2);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let mgr = InMemoryManager::new();
        mgr.start_experiment(json!({})).await.unwrap();
        assert!(matches!(
            mgr.start_experiment(json!({})).await,
            Err(ManagerError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_known_experiment() {
        let mgr = InMemoryManager::new();
        assert!(mgr.resume_experiment().await.is_err());

        let mgr = InMemoryManager::with_experiment("exp1", json!({}));
        mgr.resume_experiment().await.unwrap();
        assert!(mgr.is_running().await);
    }

    #[tokio::test]
    async fn test_update_profile_replaces_selected_field() {
        let mgr = InMemoryManager::with_experiment(
            "exp1",
            json!({"trialConcurrency": 1, "maxTrialNum": 10}),
        );
        let update = ExperimentProfile(json!({"params": {"trialConcurrency": 4, "maxTrialNum": 99}}));
        mgr.update_experiment_profile(update, ProfileUpdateType::TrialConcurrency)
            .await
            .unwrap();

        let profile = mgr.experiment_profile().await.unwrap().0;
        assert_eq!(profile["params"]["trialConcurrency"], 4);
        assert_eq!(profile["params"]["maxTrialNum"], 10);
        assert_eq!(profile["revision"], 1);
    }

    #[tokio::test]
    async fn test_update_profile_missing_field() {
        let mgr = InMemoryManager::with_experiment("exp1", json!({}));
        let err = mgr
            .update_experiment_profile(
                ExperimentProfile(json!({"params": {}})),
                ProfileUpdateType::SearchSpace,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("searchSpace"));
    }

    #[tokio::test]
    async fn test_statistics_follow_status_order() {
        let mgr = InMemoryManager::new();
        mgr.upsert_trial_job(TrialJobInfo::new("a", TrialJobStatus::Failed))
            .await;
        mgr.upsert_trial_job(TrialJobInfo::new("b", TrialJobStatus::Running))
            .await;
        mgr.upsert_trial_job(TrialJobInfo::new("c", TrialJobStatus::Running))
            .await;

        let stats = mgr.trial_job_statistics().await.unwrap();
        assert_eq!(
            stats,
            vec![
                TrialJobStatistics {
                    trial_job_status: TrialJobStatus::Running,
                    trial_job_number: 2,
                },
                TrialJobStatistics {
                    trial_job_status: TrialJobStatus::Failed,
                    trial_job_number: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_trial_job() {
        let mgr = InMemoryManager::new();
        mgr.upsert_trial_job(TrialJobInfo::new("a", TrialJobStatus::Running))
            .await;
        mgr.upsert_trial_job(TrialJobInfo::new("b", TrialJobStatus::Succeeded))
            .await;

        mgr.cancel_trial_job("a").await.unwrap();
        mgr.cancel_trial_job("b").await.unwrap();
        assert_eq!(
            mgr.trial_job("a").await.unwrap().status,
            TrialJobStatus::UserCanceled
        );
        assert_eq!(
            mgr.trial_job("b").await.unwrap().status,
            TrialJobStatus::Succeeded
        );
        assert!(matches!(
            mgr.cancel_trial_job("zzz").await,
            Err(ManagerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_trial_job_keeps_form_verbatim() {
        let mgr = InMemoryManager::new();
        mgr.add_custom_trial_job(r#"{"lr":0.1}"#).await.unwrap();

        let jobs = mgr.list_trial_jobs(Some(TrialJobStatus::Waiting)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].hyper_parameters, vec![r#"{"lr":0.1}"#.to_string()]);
        assert!(mgr.list_trial_jobs(Some(TrialJobStatus::Running)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metric_filters_and_latest() {
        let mgr = InMemoryManager::new();
        mgr.push_metric(metric("a", MetricType::Periodical, 1, 0)).await;
        mgr.push_metric(metric("a", MetricType::Final, 5, 1)).await;
        mgr.push_metric(metric("b", MetricType::Periodical, 3, 0)).await;

        assert_eq!(mgr.metric_data(Some("a"), None).await.unwrap().len(), 2);
        assert_eq!(
            mgr.metric_data(Some("a"), Some(MetricType::Final))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(mgr.metric_data(None, None).await.unwrap().len(), 3);

        let latest = mgr.latest_metric_data().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].trial_job_id, "a");
        assert_eq!(latest[0].timestamp, 5);
        assert_eq!(latest[1].trial_job_id, "b");
    }

    #[tokio::test]
    async fn test_cluster_metadata_roundtrip() {
        let mgr = InMemoryManager::new();
        mgr.set_cluster_metadata("codeDir", "\"/tmp/code\"")
            .await
            .unwrap();
        assert_eq!(
            mgr.cluster_metadata("codeDir").await.unwrap(),
            "\"/tmp/code\""
        );
        assert!(mgr.cluster_metadata("missing").await.is_err());
        assert!(mgr.set_cluster_metadata("", "1").await.is_err());
    }

    #[tokio::test]
    async fn test_datastore_init_idempotent() {
        let store = InMemoryDataStore::new();
        assert!(!store.is_initialized());
        tokio_test::assert_ok!(store.init().await);
        tokio_test::assert_ok!(store.init().await);
        assert!(store.is_initialized());
    }
}

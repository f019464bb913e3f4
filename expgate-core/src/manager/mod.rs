//! Collaborator interfaces the gateway delegates to.
//!
//! The orchestration engine owns experiment and trial-job state; the
//! datastore owns persisted metrics and must be initialized before traffic
//! is served. Both are consumed as trait objects so the gateway never
//! depends on a concrete engine.

mod memory;

pub use memory::{InMemoryDataStore, InMemoryManager};

use crate::error::{DataStoreError, ManagerError};
use crate::types::{
    ExperimentProfile, MetricDataRecord, MetricType, ProfileUpdateType, TrialJobInfo,
    TrialJobStatistics, TrialJobStatus,
};
use async_trait::async_trait;

/// The experiment orchestration engine.
#[async_trait]
pub trait ExperimentManager: Send + Sync {
    /// Current experiment profile.
    async fn experiment_profile(&self) -> Result<ExperimentProfile, ManagerError>;

    /// Apply the part of `profile` selected by `update_type`.
    async fn update_experiment_profile(
        &self,
        profile: ExperimentProfile,
        update_type: ProfileUpdateType,
    ) -> Result<(), ManagerError>;

    /// Create and start a new experiment, returning its id.
    async fn start_experiment(&self, params: serde_json::Value) -> Result<String, ManagerError>;

    /// Resume the experiment this engine was configured with.
    async fn resume_experiment(&self) -> Result<(), ManagerError>;

    async fn stop_experiment(&self) -> Result<(), ManagerError>;

    /// Number of trial jobs per status.
    async fn trial_job_statistics(&self) -> Result<Vec<TrialJobStatistics>, ManagerError>;

    /// Set one cluster configuration entry. `value` is serialized JSON.
    async fn set_cluster_metadata(&self, key: &str, value: &str) -> Result<(), ManagerError>;

    /// Read one cluster configuration entry as serialized JSON.
    async fn cluster_metadata(&self, key: &str) -> Result<String, ManagerError>;

    async fn list_trial_jobs(
        &self,
        status: Option<TrialJobStatus>,
    ) -> Result<Vec<TrialJobInfo>, ManagerError>;

    async fn trial_job(&self, trial_job_id: &str) -> Result<TrialJobInfo, ManagerError>;

    /// Submit a user-defined trial job.
    ///
    /// `form` is an arbitrary, schema-less job specification serialized as
    /// JSON; the gateway does not inspect it.
    async fn add_custom_trial_job(&self, form: &str) -> Result<(), ManagerError>;

    async fn cancel_trial_job(&self, trial_job_id: &str) -> Result<(), ManagerError>;

    /// Metric records, optionally narrowed to one trial job and one type.
    async fn metric_data(
        &self,
        trial_job_id: Option<&str>,
        kind: Option<MetricType>,
    ) -> Result<Vec<MetricDataRecord>, ManagerError>;

    /// The most recent metric record of every trial job.
    async fn latest_metric_data(&self) -> Result<Vec<MetricDataRecord>, ManagerError>;
}

/// The experiment datastore.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Prepare the datastore for use. Calling it again is a no-op.
    async fn init(&self) -> Result<(), DataStoreError>;
}

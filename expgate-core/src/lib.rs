//! # Expgate Core
//!
//! Core library for the expgate experiment gateway.
//! Provides the HTTP control plane, the TensorBoard session manager, the
//! collaborator interfaces for the orchestration engine and datastore,
//! configuration, and fundamental types.

pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod tensorboard;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{ExpgateConfig, load_config, load_config_with_file};
pub use error::{DataStoreError, GatewayError, ManagerError, Result, TensorboardError};
pub use gateway::{GatewayConfig, GatewayServer, SharedGateway};
pub use manager::{DataStore, ExperimentManager, InMemoryDataStore, InMemoryManager};
pub use tensorboard::{JobIdSet, ProcessLauncher, TensorboardConfig, TensorboardManager};
pub use types::{
    ExperimentMode, ExperimentProfile, MetricDataRecord, MetricType, ProfileUpdateType,
    TrialJobInfo, TrialJobStatistics, TrialJobStatus,
};

//! Error types for expgate.
//!
//! Uses `thiserror` for the errors each collaborator boundary produces and
//! for the single `GatewayError` every HTTP handler returns.

/// Errors returned by the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("{message}")]
    Failed { message: String },
}

impl ManagerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ManagerError::NotFound { what: what.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ManagerError::Invalid {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ManagerError::Failed {
            message: message.into(),
        }
    }
}

/// Errors from the experiment datastore.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataStoreError {
    #[error("Datastore initialization failed: {message}")]
    InitFailed { message: String },
}

/// Errors from TensorBoard session management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TensorboardError {
    #[error("No TensorBoard session at endpoint {endpoint}")]
    NotFound { endpoint: String },

    #[error("Invalid trial job ids: {message}")]
    InvalidJobIds { message: String },

    #[error("Failed to launch TensorBoard: {message}")]
    SpawnFailed { message: String },

    #[error("Failed to stop TensorBoard at {endpoint}: {message}")]
    TerminateFailed { endpoint: String, message: String },

    #[error("TensorBoard {operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },

    #[error("Endpoint {endpoint} is already held by another session")]
    EndpointInUse { endpoint: String },

    #[error("{} TensorBoard session(s) failed to stop: {}", .failures.len(), .failures.join("; "))]
    TerminateAll { failures: Vec<String> },
}

/// The error type of every gateway operation.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),

    #[error(transparent)]
    Tensorboard(#[from] TensorboardError),

    #[error("Gateway is shut down")]
    ShuttingDown,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest(message.into())
    }

    /// Whether the error names an entity that could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound(_)
                | GatewayError::Manager(ManagerError::NotFound { .. })
                | GatewayError::Tensorboard(TensorboardError::NotFound { .. })
        )
    }

    /// Whether the service cannot keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::DataStore(_))
    }
}

/// A type alias for results of gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

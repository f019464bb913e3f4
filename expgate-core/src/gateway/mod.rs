//! # Experiment Gateway
//!
//! HTTP control plane for a running experiment. Every endpoint delegates to
//! exactly one call on the orchestration engine, the datastore, or the
//! TensorBoard session manager, and reports failures through one shared
//! error-to-status mapping.

mod error;
mod handlers;
mod server;

pub use error::{ErrorBody, error_response};
pub use server::{
    API_PREFIX, GatewayServer, SharedGateway, router as gateway_router, run as run_gateway, serve,
};

use crate::types::ExperimentMode;
use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether `POST /experiment` creates a new experiment or resumes one.
    pub mode: ExperimentMode,
    /// Id of the experiment to resume.
    pub experiment_id: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            mode: ExperimentMode::New,
            experiment_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.mode, ExperimentMode::New);
        assert!(config.experiment_id.is_none());
    }

    #[test]
    fn test_gateway_config_serialization() {
        let config = GatewayConfig {
            host: "127.0.0.1".into(),
            port: 9090,
            mode: ExperimentMode::Resume,
            experiment_id: Some("GcTm9oQ2".into()),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"resume\""));
        let restored: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.port, 9090);
        assert_eq!(restored.mode, ExperimentMode::Resume);
        assert_eq!(restored.experiment_id.as_deref(), Some("GcTm9oQ2"));
    }

    #[test]
    fn test_gateway_config_partial() {
        let restored: GatewayConfig = serde_json::from_str(r#"{"port": 51188}"#).unwrap();
        assert_eq!(restored.port, 51188);
        assert_eq!(restored.host, "0.0.0.0");
    }
}

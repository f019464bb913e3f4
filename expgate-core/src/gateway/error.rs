//! Mapping of gateway errors onto HTTP responses.

use crate::error::GatewayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Body of every failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status and body for a failed operation.
///
/// Unresolvable entities map to 404; every other failure maps to 500.
pub fn error_response(err: &GatewayError) -> (StatusCode, ErrorBody) {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let mut message = err.to_string();
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string();
    }
    (status, ErrorBody { error: message })
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = error_response(&self);
        warn!(status = status.as_u16(), error = %body.error, "Request failed");
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataStoreError, ManagerError, TensorboardError};

    #[test]
    fn test_not_found_maps_to_404() {
        let (status, body) = error_response(&ManagerError::not_found("Trial job abc").into());
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Trial job abc not found");

        let (status, _) = error_response(
            &TensorboardError::NotFound {
                endpoint: "http://h:1".into(),
            }
            .into(),
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_everything_else_maps_to_500() {
        let errors: Vec<GatewayError> = vec![
            ManagerError::invalid("bad").into(),
            ManagerError::failed("engine down").into(),
            DataStoreError::InitFailed {
                message: "locked".into(),
            }
            .into(),
            TensorboardError::SpawnFailed {
                message: "no binary".into(),
            }
            .into(),
            GatewayError::bad_request("missing job id"),
            GatewayError::ShuttingDown,
        ];
        for err in &errors {
            let (status, body) = error_response(err);
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{err:?}");
            assert!(!body.error.is_empty());
        }
    }

    #[test]
    fn test_empty_message_falls_back_to_reason() {
        let (_, body) = error_response(&ManagerError::failed("").into());
        assert_eq!(body.error, "Internal Server Error");
    }

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_value(ErrorBody {
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }

    #[tokio::test]
    async fn test_into_response_status_and_body() {
        let resp = GatewayError::from(ManagerError::not_found("Trial job x")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Trial job x not found");
    }
}

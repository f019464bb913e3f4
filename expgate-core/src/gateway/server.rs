//! HTTP gateway server built on axum.

use super::GatewayConfig;
use super::handlers;
use crate::error::{GatewayError, Result};
use crate::manager::{DataStore, ExperimentManager};
use crate::tensorboard::TensorboardManager;
use crate::types::ExperimentMode;
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

/// Prefix under which every route is mounted a second time.
pub const API_PREFIX: &str = "/api/v1/nni";

/// Largest request body the gateway reads.
const REQUEST_BODY_LIMIT: usize = 1024 * 1024;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayServer>;

/// Collaborators and lifecycle state behind the HTTP routes.
///
/// Holds no mutable state of its own besides the shutdown token; experiment
/// state lives in the engine and datastore, TensorBoard state in the
/// session manager.
pub struct GatewayServer {
    mode: ExperimentMode,
    manager: Arc<dyn ExperimentManager>,
    datastore: Arc<dyn DataStore>,
    tensorboards: Arc<TensorboardManager>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("mode", &self.mode)
            .field("tensorboards", &self.tensorboards)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl GatewayServer {
    pub fn new(
        mode: ExperimentMode,
        manager: Arc<dyn ExperimentManager>,
        datastore: Arc<dyn DataStore>,
        tensorboards: Arc<TensorboardManager>,
    ) -> Self {
        Self {
            mode,
            manager,
            datastore,
            tensorboards,
            shutdown: CancellationToken::new(),
        }
    }

    /// Whether `POST /experiment` creates or resumes.
    pub fn mode(&self) -> ExperimentMode {
        self.mode
    }

    pub fn manager(&self) -> &dyn ExperimentManager {
        self.manager.as_ref()
    }

    pub fn datastore(&self) -> &dyn DataStore {
        self.datastore.as_ref()
    }

    pub fn tensorboards(&self) -> &TensorboardManager {
        &self.tensorboards
    }

    /// Token cancelled when the gateway stops serving.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting requests. The listener closes once in-flight
    /// responses are written.
    pub fn shut_down(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Gateway shutting down");
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Initialize the datastore. Failure is fatal: the gateway shuts down.
    pub async fn check_status(&self) -> Result<()> {
        if let Err(e) = self.datastore.init().await {
            let err = GatewayError::from(e);
            error!(error = %err, "Datastore initialization failed");
            if err.is_fatal() {
                self.shut_down();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Tear the experiment down in order.
    ///
    /// Phase one stops every TensorBoard session; phase two stops the
    /// orchestration engine. A phase-one failure aborts before the engine is
    /// touched.
    pub async fn stop_experiment(&self) -> Result<()> {
        info!("Stopping experiment: draining TensorBoard sessions");
        let stopped = self.tensorboards.stop_all().await?;
        info!(stopped, "Stopping experiment: stopping orchestration engine");
        self.manager.stop_experiment().await?;
        Ok(())
    }
}

/// Build the axum Router with every gateway route.
pub fn router(gw: SharedGateway) -> Router {
    let api = handlers::routes();
    Router::new()
        .merge(api.clone())
        .nest(API_PREFIX, api)
        .fallback(handlers::no_route)
        .layer(middleware::from_fn_with_state(
            gw.clone(),
            reject_after_shutdown,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(cors_layer())
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .with_state(gw)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
}

/// Log method, URI, and body of every request before dispatch.
async fn log_request(request: Request, next: Next) -> std::result::Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, REQUEST_BODY_LIMIT)
        .await
        .map_err(|e| GatewayError::bad_request(format!("Failed to read request body: {e}")))?;
    info!(
        method = %parts.method,
        uri = %parts.uri,
        body = %String::from_utf8_lossy(&bytes),
        "Request"
    );
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn reject_after_shutdown(
    State(gw): State<SharedGateway>,
    request: Request,
    next: Next,
) -> Response {
    if gw.is_shut_down() {
        return GatewayError::ShuttingDown.into_response();
    }
    next.run(request).await
}

/// Serve the gateway on `listener` until it shuts down.
pub async fn serve(listener: TcpListener, gw: SharedGateway) -> std::io::Result<()> {
    let shutdown = gw.shutdown_token();
    info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, router(gw))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("Gateway stopped");
    Ok(())
}

/// Bind the configured address and serve until shutdown.
pub async fn run(gw: SharedGateway, config: &GatewayConfig) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, gw).await
}

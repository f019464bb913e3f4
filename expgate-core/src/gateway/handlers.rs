//! Route handlers. Each one validates its input, makes one collaborator
//! call, and shapes the JSON response.

use super::server::SharedGateway;
use crate::error::{GatewayError, Result};
use crate::tensorboard::{JobIdSet, SessionInfo};
use crate::types::{
    ClusterMetadata, ExperimentMode, ExperimentProfile, MetricDataRecord, MetricType,
    ProfileUpdateType, TrialJobInfo, TrialJobStatistics, TrialJobStatus,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::str::FromStr;
use tracing::info;

pub(super) fn routes() -> Router<SharedGateway> {
    Router::new()
        .route("/check-status", get(check_status))
        .route(
            "/experiment",
            get(experiment_profile)
                .put(update_experiment_profile)
                .post(start_experiment)
                .delete(stop_experiment),
        )
        .route("/job-statistics", get(job_statistics))
        .route("/experiment/cluster-metadata", put(set_cluster_metadata))
        .route(
            "/experiment/cluster-metadata/{key}",
            get(cluster_metadata),
        )
        .route("/trial-jobs", get(list_trial_jobs).post(add_trial_job))
        .route(
            "/trial-jobs/{id}",
            get(trial_job).delete(cancel_trial_job),
        )
        .route("/metric-data", get(all_metric_data))
        .route("/metric-data/{job_id}", get(metric_data))
        .route("/metric-data-latest", get(latest_metric_data))
        .route(
            "/tensorboard",
            get(list_tensorboards)
                .post(start_tensorboard)
                .delete(stop_tensorboard),
        )
}

pub(super) async fn no_route(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("No route for {uri}"))
}

#[derive(Debug, Default, Deserialize)]
struct UpdateQuery {
    update_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TensorboardQuery {
    job_ids: Option<String>,
    tensorboard_cmd: Option<String>,
    endpoint: Option<String>,
}

fn query<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(value)| value)
        .map_err(|e| GatewayError::bad_request(e.body_text()))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Parse an optional query value, treating an empty string as absent.
fn parse_param<T>(name: &str, value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| GatewayError::bad_request(format!("Invalid {name}: {e}")))
        })
        .transpose()
}

/// Require a non-empty query value.
fn require_param(name: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::bad_request(format!("Missing query parameter '{name}'")))
}

async fn check_status(State(gw): State<SharedGateway>) -> Result<StatusCode> {
    gw.check_status().await?;
    Ok(StatusCode::OK)
}

async fn experiment_profile(State(gw): State<SharedGateway>) -> Result<Json<ExperimentProfile>> {
    Ok(Json(gw.manager().experiment_profile().await?))
}

async fn update_experiment_profile(
    State(gw): State<SharedGateway>,
    params: std::result::Result<Query<UpdateQuery>, QueryRejection>,
    body: Bytes,
) -> Result<StatusCode> {
    let params = query(params)?;
    let update_type: ProfileUpdateType =
        parse_param("update_type", params.update_type.as_deref())?
            .ok_or_else(|| GatewayError::bad_request("Missing query parameter 'update_type'"))?;
    let profile: ExperimentProfile = parse_body(&body)?;
    gw.manager()
        .update_experiment_profile(profile, update_type)
        .await?;
    Ok(StatusCode::OK)
}

async fn start_experiment(State(gw): State<SharedGateway>, body: Bytes) -> Result<Response> {
    match gw.mode() {
        ExperimentMode::New => {
            let params: Value = parse_body(&body)?;
            let experiment_id = gw.manager().start_experiment(params).await?;
            info!(experiment_id = %experiment_id, "Experiment started");
            Ok(Json(json!({ "experiment_id": experiment_id })).into_response())
        }
        ExperimentMode::Resume => {
            gw.manager().resume_experiment().await?;
            info!("Experiment resumed");
            Ok(StatusCode::OK.into_response())
        }
    }
}

async fn stop_experiment(State(gw): State<SharedGateway>) -> Result<impl IntoResponse> {
    gw.stop_experiment().await?;
    // In-flight responses, this one included, are written before the
    // listener closes.
    gw.shut_down();
    Ok(([(header::CONNECTION, "close")], StatusCode::OK))
}

async fn job_statistics(
    State(gw): State<SharedGateway>,
) -> Result<Json<Vec<TrialJobStatistics>>> {
    Ok(Json(gw.manager().trial_job_statistics().await?))
}

/// Apply entries in body order. The first failure stops the sweep; earlier
/// entries stay applied.
async fn set_cluster_metadata(State(gw): State<SharedGateway>, body: Bytes) -> Result<StatusCode> {
    let metadata: ClusterMetadata = parse_body(&body)?;
    for (key, value) in &metadata {
        let value = serde_json::to_string(value)?;
        gw.manager().set_cluster_metadata(key, &value).await?;
    }
    Ok(StatusCode::OK)
}

async fn cluster_metadata(
    State(gw): State<SharedGateway>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let raw = gw.manager().cluster_metadata(&key).await?;
    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    Ok(Json(value))
}

async fn list_trial_jobs(
    State(gw): State<SharedGateway>,
    params: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<Vec<TrialJobInfo>>> {
    let params = query(params)?;
    let status: Option<TrialJobStatus> = parse_param("status", params.status.as_deref())?;
    let jobs = gw
        .manager()
        .list_trial_jobs(status)
        .await?
        .into_iter()
        .map(TrialJobInfo::with_stderr_path)
        .collect();
    Ok(Json(jobs))
}

async fn trial_job(
    State(gw): State<SharedGateway>,
    Path(id): Path<String>,
) -> Result<Json<TrialJobInfo>> {
    let job = gw.manager().trial_job(&id).await?;
    Ok(Json(job.with_stderr_path()))
}

async fn add_trial_job(State(gw): State<SharedGateway>, body: Bytes) -> Result<StatusCode> {
    let form: Value = parse_body(&body)?;
    gw.manager()
        .add_custom_trial_job(&serde_json::to_string(&form)?)
        .await?;
    Ok(StatusCode::OK)
}

async fn cancel_trial_job(
    State(gw): State<SharedGateway>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    gw.manager().cancel_trial_job(&id).await?;
    Ok(StatusCode::OK)
}

async fn all_metric_data(
    State(gw): State<SharedGateway>,
    params: std::result::Result<Query<MetricQuery>, QueryRejection>,
) -> Result<Json<Vec<MetricDataRecord>>> {
    let params = query(params)?;
    let kind: Option<MetricType> = parse_param("type", params.kind.as_deref())?;
    Ok(Json(gw.manager().metric_data(None, kind).await?))
}

async fn metric_data(
    State(gw): State<SharedGateway>,
    Path(job_id): Path<String>,
    params: std::result::Result<Query<MetricQuery>, QueryRejection>,
) -> Result<Json<Vec<MetricDataRecord>>> {
    let params = query(params)?;
    let kind: Option<MetricType> = parse_param("type", params.kind.as_deref())?;
    Ok(Json(gw.manager().metric_data(Some(&job_id), kind).await?))
}

async fn latest_metric_data(
    State(gw): State<SharedGateway>,
) -> Result<Json<Vec<MetricDataRecord>>> {
    Ok(Json(gw.manager().latest_metric_data().await?))
}

async fn start_tensorboard(
    State(gw): State<SharedGateway>,
    params: std::result::Result<Query<TensorboardQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let params = query(params)?;
    let job_ids = JobIdSet::parse(&require_param("job_ids", params.job_ids)?)?;
    let command = params
        .tensorboard_cmd
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let endpoint = gw.tensorboards().start(job_ids, command).await?;
    Ok(Json(json!({ "endPoint": endpoint })))
}

async fn stop_tensorboard(
    State(gw): State<SharedGateway>,
    params: std::result::Result<Query<TensorboardQuery>, QueryRejection>,
) -> Result<StatusCode> {
    let params = query(params)?;
    let endpoint = require_param("endpoint", params.endpoint)?;
    gw.tensorboards().stop(&endpoint).await?;
    Ok(StatusCode::OK)
}

async fn list_tensorboards(State(gw): State<SharedGateway>) -> Json<Vec<SessionInfo>> {
    Json(gw.tensorboards().list().await)
}

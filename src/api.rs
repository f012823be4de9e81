use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::ConfigStore;
use crate::error::QueueError;
use crate::pool::WorkerPool;
use crate::store::JobStore;
use crate::types::{Job, JobState};

/// Shared handles behind the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub config: Arc<ConfigStore>,
    pub pool: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(store: Arc<JobStore>, config: Arc<ConfigStore>, pool: Arc<WorkerPool>) -> Self {
        Self {
            store,
            config,
            pool,
        }
    }
}

/// HTTP-facing wrapper that maps engine errors to status codes
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::DuplicateId(_) => StatusCode::CONFLICT,
            QueueError::InvalidArgument(_)
            | QueueError::InvalidConfigKey(_)
            | QueueError::InvalidConfigValue { .. } => StatusCode::BAD_REQUEST,
            QueueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the full API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_summary))
        .route("/api/workers/status", get(worker_status))
        .route("/api/workers/start", post(start_workers))
        .route("/api/workers/stop", post(stop_workers))
        .route("/api/jobs", get(list_jobs).post(enqueue_job))
        .route("/api/jobs/{id}", get(get_job).delete(delete_job))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/dlq", get(list_dead_jobs))
        .route("/api/config", get(get_config).post(set_config))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status_summary(State(state): State<AppState>) -> Json<Value> {
    let counts = state.store.counts();
    Json(json!({
        "total_jobs": counts.total_jobs,
        "pending": counts.pending,
        "processing": counts.processing,
        "completed": counts.completed,
        "failed": counts.failed,
        "dead": counts.dead,
        "active_workers": state.pool.active_workers(),
    }))
}

async fn worker_status(State(state): State<AppState>) -> Response {
    Json(state.pool.status()).into_response()
}

#[derive(Debug, Deserialize)]
struct StartWorkersRequest {
    count: usize,
}

async fn start_workers(
    State(state): State<AppState>,
    Json(req): Json<StartWorkersRequest>,
) -> ApiResult<Json<Value>> {
    state.pool.start(req.count)?;
    info!(count = req.count, "workers started via api");
    Ok(Json(json!({
        "message": format!("started {} workers", req.count)
    })))
}

async fn stop_workers(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.pool.stop().await?;
    Ok(Json(json!({ "message": "workers stopped" })))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    state: Option<String>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Json<Vec<Job>> {
    // An unrecognized state filter falls back to listing everything
    let filter = query
        .state
        .as_deref()
        .and_then(|s| JobState::from_str(s).ok());
    Json(state.store.list(filter))
}

#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    id: Option<String>,
    command: String,
    max_retries: Option<u32>,
}

async fn enqueue_job(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<Response> {
    let max_retries = req
        .max_retries
        .unwrap_or_else(|| state.config.snapshot().max_retries);
    let job = state.store.create(req.id, req.command, max_retries)?;
    info!(job_id = %job.id, "job enqueued");
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let job = state.store.get(&id)?;
    Ok(Json(job).into_response())
}

async fn delete_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.store.delete(&id)?;
    Ok(Json(json!({ "message": format!("job '{id}' deleted") })))
}

async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let job = state.store.retry_dead(&id)?;
    info!(job_id = %job.id, "dead job requeued");
    Ok(Json(job).into_response())
}

async fn list_dead_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.store.dead_jobs())
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(state.config.get_all())
}

#[derive(Debug, Deserialize)]
struct SetConfigRequest {
    key: String,
    value: Value,
}

async fn set_config(
    State(state): State<AppState>,
    Json(req): Json<SetConfigRequest>,
) -> ApiResult<Json<Value>> {
    state.config.set(&req.key, &req.value)?;
    info!(key = %req.key, value = %req.value, "config updated");
    Ok(Json(json!({
        "success": true,
        "key": req.key,
        "value": req.value,
    })))
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::SchedulerError;
use crate::scheduler::{Job, JobScheduler};

#[derive(Clone)]
pub struct DashboardState {
    pub scheduler: Arc<JobScheduler>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `POST /job`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub job_id: String,
    pub time_interval: i64,
    pub time_frame: i64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub target_function: String,
    #[serde(default)]
    pub arg_type: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub job_cost_prediction: f64,
    #[serde(default)]
    pub stake: f64,
}

impl From<SubmitJobRequest> for Job {
    fn from(req: SubmitJobRequest) -> Self {
        Job::new(req.job_id, req.time_interval, req.time_frame)
            .with_max_retries(req.max_retries)
            .with_owner(req.user_id, req.chain_id)
            .with_target(req.contract_address, req.target_function)
            .with_arguments(req.arg_type, req.arguments)
            .with_cost(req.job_cost_prediction, req.stake)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub success: bool,
    pub job_id: Option<String>,
    pub error: Option<String>,
}

/// Body of `PUT /system/limits`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsRequest {
    pub max_cpu: f64,
    pub max_memory: f64,
}

/// Build the observability API router.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/system/metrics", get(metrics_handler))
        .route("/system/limits", put(set_limits_handler))
        .route("/queue/status", get(queue_status_handler))
        .route("/queue/waiting", get(waiting_jobs_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/job", post(submit_job_handler))
        .route("/job/{id}", get(job_details_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind the API listener. Failing here is a startup error.
pub async fn bind_dashboard(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await.inspect_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
    })?;
    tracing::info!(addr = %addr, "Starting dashboard server");
    Ok(listener)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn run_dashboard(
    listener: TcpListener,
    state: DashboardState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Dashboard server failed"))
}

fn error_status(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::InvalidSchedule { .. } => StatusCode::BAD_REQUEST,
        SchedulerError::NotFound(_) | SchedulerError::QuorumNotFound(_) => StatusCode::NOT_FOUND,
        SchedulerError::DuplicateJob(_) => StatusCode::CONFLICT,
        SchedulerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn metrics_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.scheduler.get_system_metrics().await)
}

async fn set_limits_handler(
    State(state): State<DashboardState>,
    Json(limits): Json<LimitsRequest>,
) -> impl IntoResponse {
    state
        .scheduler
        .set_resource_limits(limits.max_cpu, limits.max_memory)
        .await;
    Json(state.scheduler.get_system_metrics().await)
}

async fn queue_status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.scheduler.get_queue_status().await)
}

async fn waiting_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.scheduler.waiting_jobs().await)
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.scheduler.list_jobs().await)
}

async fn job_details_handler(
    State(state): State<DashboardState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.get_job_details(&job_id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn submit_job_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    let job: Job = payload.into();
    let job_id = job.job_id.clone();

    match state.scheduler.submit_job(job).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(SubmitJobResponse {
                success: true,
                job_id: Some(job_id),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Job submission rejected");
            (
                error_status(&e),
                Json(SubmitJobResponse {
                    success: false,
                    job_id: Some(job_id),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(
            error_status(&SchedulerError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&SchedulerError::DuplicateJob("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&SchedulerError::InvalidSchedule {
                time_interval: 0,
                time_frame: 1
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn submit_request_fills_optional_fields() {
        let req: SubmitJobRequest =
            serde_json::from_str(r#"{"job_id": "j", "time_interval": 5, "time_frame": 60}"#)
                .unwrap();
        let job: Job = req.into();
        assert_eq!(job.job_id, "j");
        assert_eq!(job.max_retries, 0);
        assert!(job.arguments.is_empty());
    }
}

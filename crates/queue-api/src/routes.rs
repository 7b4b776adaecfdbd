use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use queue_core::{JobStatus, JobStore, QueryService, RateGate, SubmissionService};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{bad_request_response, query_error_response, submit_error_response};

pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub rate_gate: Arc<dyn RateGate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub tenant_id: String,
    pub payload: serde_json::Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: &'static str,
    pub trace_id: Uuid,
}

pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitJobRequest>,
) -> Response {
    let service = SubmissionService::new(state.store.as_ref(), state.rate_gate.as_ref());
    match service
        .submit(&request.tenant_id, request.payload, request.idempotency_key)
        .await
    {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(SubmitJobResponse {
                job_id: outcome.job_id,
                status: outcome.status.as_str(),
                trace_id: outcome.trace_id,
            }),
        )
            .into_response(),
        Err(err) => submit_error_response(err),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: &'static str,
    pub trace_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> Response {
    let service = QueryService::new(state.store.as_ref());
    match service.get_job_status(job_id).await {
        Ok(job) => (
            StatusCode::OK,
            Json(JobResponse {
                job_id: job.id,
                status: job.status.as_str(),
                trace_id: job.trace_id,
                created_at: job.created_at,
                started_at: job.started_at,
                completed_at: job.completed_at,
                retry_count: job.retry_count,
                error_message: job.error_message,
            }),
        )
            .into_response(),
        Err(err) => query_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    let Some(tenant_id) = query.tenant_id.filter(|t| !t.trim().is_empty()) else {
        return bad_request_response("invalid_argument", "tenantId is required");
    };

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match JobStatus::from_db(raw) {
            Some(status) => Some(status),
            None => {
                return bad_request_response(
                    "invalid_argument",
                    "status must be one of pending, running, completed, failed",
                );
            }
        },
    };

    let service = QueryService::new(state.store.as_ref());
    match service
        .list_jobs(&tenant_id, status, query.limit.unwrap_or(0))
        .await
    {
        Ok(jobs) => {
            let jobs = jobs
                .into_iter()
                .map(|job| JobResponse {
                    job_id: job.id,
                    status: job.status.as_str(),
                    trace_id: job.trace_id,
                    created_at: job.created_at,
                    started_at: job.started_at,
                    completed_at: job.completed_at,
                    retry_count: job.retry_count,
                    error_message: job.error_message,
                })
                .collect();
            (StatusCode::OK, Json(ListJobsResponse { jobs })).into_response()
        }
        Err(err) => query_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub tenant_id: Option<String>,
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let service = QueryService::new(state.store.as_ref());
    let tenant_id = query.tenant_id.filter(|t| !t.trim().is_empty());
    match service.get_metrics(tenant_id.as_deref()).await {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(err) => query_error_response(err),
    }
}

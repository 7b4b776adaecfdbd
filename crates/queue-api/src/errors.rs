use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use queue_core::{QueryError, StoreError, SubmitError};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub(super) fn bad_request_response(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub(super) fn not_found_response(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not_found".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "internal_error".to_string(),
            message: "Unexpected server error".to_string(),
        }),
    )
        .into_response()
}

pub(super) fn submit_error_response(err: SubmitError) -> Response {
    match err {
        SubmitError::InvalidArgument(message) => bad_request_response("invalid_argument", &message),
        SubmitError::RateLimited { reason } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody {
                error: "rate_limited".to_string(),
                message: reason.message().to_string(),
            }),
        )
            .into_response(),
        SubmitError::Store(store_err) => store_error_response(store_err),
    }
}

pub(super) fn query_error_response(err: QueryError) -> Response {
    match err {
        QueryError::NotFound(job_id) => not_found_response(&format!("job {job_id} not found")),
        QueryError::Store(store_err) => store_error_response(store_err),
    }
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(job_id) => not_found_response(&format!("job {job_id} not found")),
        other => {
            error!(error = %other, "store operation failed");
            internal_error_response()
        }
    }
}

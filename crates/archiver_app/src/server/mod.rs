//! HTTP surface: export start, progress stream and channel discovery.
mod routes;

use std::sync::Arc;

use archiver_engine::{ApiError, ExportService};
use archiver_logging::archiver_error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub use routes::router;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExportService>,
}

impl AppState {
    pub fn new(service: Arc<ExportService>) -> Self {
        Self { service }
    }
}

/// Handler error, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug)]
pub enum AppError {
    Api(ApiError),
    BadRequest(String),
    MissingToken,
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError::Api(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Api(err) => {
                let (status, code) = match err {
                    ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                    ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
                    _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
                };
                if status == StatusCode::BAD_GATEWAY {
                    archiver_error!("Upstream request failed: {}", err);
                }
                (status, code, err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN",
                "an Authorization header with the user token is required".to_string(),
            ),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

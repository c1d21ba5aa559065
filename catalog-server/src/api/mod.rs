//! HTTP API handlers

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod entries;
pub mod health;
pub mod transfer;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog_common::Error;
use serde_json::json;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wraps the common error type so it can carry an HTTP mapping
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateName(_) => StatusCode::CONFLICT,
            Error::HasDependents(_)
            | Error::InvalidReference(_)
            | Error::InvalidInput(_)
            | Error::CrossFunctionReassignment => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Locked(_) => StatusCode::LOCKED,
            Error::Database(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::PartialMigration(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = json!({
            "error": self.0.category(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

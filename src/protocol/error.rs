//! # Error → HTTP mapping (§7)
//!
//! Maps [`crate::error::Error`] onto the status codes and JSON error
//! body shape the HTTP surface returns. Kept separate from
//! `crate::error` so the core error type has no `axum` dependency.

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    reason: String,
}

pub fn status_code(error: &Error) -> StatusCode {
    match error {
        Error::Parse { .. } | Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::IndexNotFound { .. } => StatusCode::NOT_FOUND,
        Error::ShardUnavailable { .. } | Error::NodeUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Error::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
        Error::Pipeline { .. } | Error::Cache { .. } | Error::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn kind_for(error: &Error) -> &'static str {
    match error {
        Error::Parse { .. } => "parse_exception",
        Error::Validation { .. } => "validation_exception",
        Error::IndexNotFound { .. } => "index_not_found_exception",
        Error::ShardUnavailable { .. } => "shard_unavailable_exception",
        Error::NodeUnavailable { .. } => "node_unavailable_exception",
        Error::UpstreamTimeout { .. } => "timeout_exception",
        Error::UpstreamError { .. } => "upstream_exception",
        Error::Pipeline { .. } => "pipeline_exception",
        Error::Cache { .. } | Error::Internal { .. } => "internal_exception",
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        let body = ErrorBody {
            error: ErrorDetail {
                kind: kind_for(&self),
                reason: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

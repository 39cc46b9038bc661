//! Plain-text responses produced by the pipeline itself.
//!
//! Units that stop a request early (prefix mismatch, oversized body, a
//! panic caught by the request-context registrar) answer with short
//! `text/plain` bodies so clients never see an empty error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Status plus a plain-text body.
pub fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

/// `404 Not found`.
pub async fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "Not found")
}

/// `500 Internal Server Error`.
pub fn internal_error() -> Response {
    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

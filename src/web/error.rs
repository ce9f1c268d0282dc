// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON error responses for the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::LeafscanError;

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub error: String,
    pub message: String,
}

/// Errors a handler can return
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - malformed upload
    BadRequest(String),
    /// 500 Internal Server Error - decode, inference, storage or report failure
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<LeafscanError> for ApiError {
    fn from(err: LeafscanError) -> Self {
        error!("Request failed: {}", err);
        ApiError::Internal(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("Malformed upload: {}", err))
    }
}

// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Boundary error type: every handler returns `Result<T, ApiError>`, collapsed from the
// library crates' own error enums. The HTTP envelope is `{errno, result|error}` (§6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] helion_core::CoreError),

    #[error(transparent)]
    Store(#[from] helion_store::StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let body = Json(serde_json::json!({ "errno": 1, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use axum::{http::StatusCode, response::IntoResponse, Json};
use prismq_store::StoreError;
use thiserror::Error;

/// The standardized error returned by the PrismQ HTTP surface. Maps store
/// error kinds onto HTTP status codes.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("task {0} not found")]
    NotFound(i64),

    #[error("task {0} is already in a terminal state")]
    AlreadyTerminal(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind) = match &self {
            HttpError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            HttpError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HttpError::AlreadyTerminal(_) => (StatusCode::CONFLICT, "already_terminal"),
            HttpError::Store(StoreError::Busy) => (StatusCode::SERVICE_UNAVAILABLE, "busy"),
            HttpError::Store(StoreError::IntegrityViolation(_)) => {
                (StatusCode::CONFLICT, "integrity_violation")
            }
            HttpError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            HttpError::Store(StoreError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            HttpError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };
        let body = Json(serde_json::json!({
            "status": "error",
            "error": kind,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

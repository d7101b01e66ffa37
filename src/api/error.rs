use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::core::IndexError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("malformed widget id: {0}")]
    BadId(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Index(IndexError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Index(IndexError::InvalidArgument { .. })
            | ApiError::Index(IndexError::ZOverflow(_))
            | ApiError::BadId(_) => StatusCode::BAD_REQUEST,
            ApiError::Index(IndexError::DuplicateId(_)) => StatusCode::CONFLICT,
            ApiError::Index(IndexError::Corrupt(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected ({}): {}", status, self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

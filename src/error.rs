use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("order is closed: {0}")]
    OrderClosed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition(_) | AppError::OrderClosed(_) | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attaches the stable error key clients switch on.
    pub fn keyed(self, key: &'static str) -> KnownError {
        KnownError { key, error: self }
    }

    fn default_key(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "err.not_found",
            AppError::BadRequest(_) => "err.bind",
            AppError::Unauthorized(_) | AppError::Forbidden(_) => "err.auth",
            AppError::InvalidTransition(_) => "err.transition",
            AppError::OrderClosed(_) => "err.order.closed",
            AppError::Conflict(_) => "err.conflict",
            AppError::Persistence(_) => "err.persistence",
            AppError::Internal(_) => "err.internal",
        }
    }
}

/// An [`AppError`] together with the key of the operation that failed,
/// e.g. `err.order.update`.
#[derive(Debug)]
pub struct KnownError {
    pub key: &'static str,
    pub error: AppError,
}

impl From<AppError> for KnownError {
    fn from(error: AppError) -> Self {
        let key = error.default_key();
        Self { key, error }
    }
}

impl IntoResponse for KnownError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.key,
            "message": self.error.to_string(),
        }));

        (self.error.status_code(), body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        KnownError::from(self).into_response()
    }
}

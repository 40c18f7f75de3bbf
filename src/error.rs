use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::delivery::TransportError;

/// Envelope shared by every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
            error: Some(error.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}: {detail}")]
    Validation { message: String, detail: String },
    #[error(transparent)]
    Auth(AuthError),
    #[error("bulk request would exceed daily limit")]
    QuotaExceeded,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        source: TransportError,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        Self::validation("Invalid request payload", detail)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Auth(err) => err.status(),
            AppError::QuotaExceeded | AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Transport { .. } | AppError::Db(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing (message, error) pair. Database and internal details stay in the log.
    fn public_parts(&self) -> (String, String) {
        match self {
            AppError::Validation { message, detail } => (message.clone(), detail.clone()),
            AppError::Auth(err) => (err.message().to_string(), err.detail().to_string()),
            AppError::QuotaExceeded => (
                "Bulk request would exceed daily limit".into(),
                "Requested messages exceed available daily quota".into(),
            ),
            AppError::RateLimited => (
                "Rate limit exceeded".into(),
                "Too many requests per second for this client".into(),
            ),
            AppError::Transport { context, source } => ((*context).into(), source.to_string()),
            AppError::NotFound(what) => (format!("{what} not found"), "not found".into()),
            AppError::Conflict(message) => (message.clone(), "conflict".into()),
            AppError::Db(_) | AppError::Internal(_) => {
                ("Internal server error".into(), "internal error".into())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(db) => AppError::Db(db),
            other => AppError::Auth(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid_payload(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("Invalid query parameters", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation("Invalid path parameter", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        let (message, error) = self.public_parts();
        (status, Json(ApiResponse::<()>::failed(message, error, None))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

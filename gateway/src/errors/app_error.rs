//! Errors returned by the credential mint endpoint.
//!
//! Every variant renders as a JSON body with a matching status code, so a
//! handler can bail out with `?` and the caller still gets a structured reply.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Server misconfigured (missing OPENAI_API_KEY)")]
    MissingProviderKey,

    /// The query string could not be read
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid mode '{requested}'")]
    InvalidMode {
        requested: String,
        allowed: Vec<&'static str>,
    },

    /// The provider answered with a non-success status
    #[error("OpenAI error (status {status})")]
    Provider { status: StatusCode, details: Value },

    /// The provider could not be reached or its reply could not be read
    #[error("Failed to mint client secret: {0}")]
    ProviderTransport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MissingProviderKey => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidQuery(_) | AppError::InvalidMode { .. } => StatusCode::BAD_REQUEST,
            AppError::Provider { status, .. } => *status,
            AppError::ProviderTransport(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::InvalidQuery(details) => json!({
                "error": "Invalid query",
                "details": details,
            }),
            AppError::InvalidMode { allowed, .. } => json!({
                "error": "Invalid mode",
                "allowed": allowed,
            }),
            AppError::Provider { details, .. } => json!({
                "error": "OpenAI error",
                "details": details,
            }),
            // Transport details stay in the logs
            AppError::ProviderTransport(_) => json!({ "error": "Failed to mint client secret" }),
            AppError::Internal(_) => json!({ "error": "Internal server error" }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Mint request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Mint request rejected");
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Caller authentication failures on the mint endpoint
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    MissingSecret,

    #[error("Unauthorized")]
    InvalidSecret,

    /// No shared secret configured, so nobody can be authenticated
    #[error("Token service disabled (missing TOKEN_SERVICE_SHARED_SECRET)")]
    ServiceDisabled,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingSecret | AuthError::InvalidSecret => StatusCode::UNAUTHORIZED,
            AuthError::ServiceDisabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::MissingSecret.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidSecret.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::ServiceDisabled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_mismatch_and_missing_look_identical() {
        assert_eq!(
            AuthError::MissingSecret.to_string(),
            AuthError::InvalidSecret.to_string()
        );
    }
}

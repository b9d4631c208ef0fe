use crate::auth::{extract_caller_secret, secrets_match};
use crate::errors::auth_error::AuthError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Shared-secret authentication middleware for the mint endpoint
///
/// The middleware:
/// 1. Refuses every request with 503 when no shared secret is configured
/// 2. Extracts the caller secret from `X-Token-Service-Secret` or `Authorization: Bearer`
/// 3. Compares it to the configured secret in constant time
/// 4. Returns 401 on a missing or mismatched secret, otherwise passes the request on
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let request_method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    let Some(expected) = state
        .config
        .token_service_shared_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    else {
        tracing::error!(
            path = %request_path,
            "Token service disabled: TOKEN_SERVICE_SHARED_SECRET is not configured"
        );
        return Err(AuthError::ServiceDisabled);
    };

    let Some(presented) = extract_caller_secret(request.headers()) else {
        tracing::warn!(
            method = %request_method,
            path = %request_path,
            "Shared secret authentication failed: no secret presented"
        );
        return Err(AuthError::MissingSecret);
    };

    if !secrets_match(&presented, expected) {
        tracing::warn!(
            method = %request_method,
            path = %request_path,
            "Shared secret authentication failed: secret mismatch"
        );
        return Err(AuthError::InvalidSecret);
    }

    tracing::debug!(
        method = %request_method,
        path = %request_path,
        "Shared secret authentication successful"
    );
    Ok(next.run(request).await)
}

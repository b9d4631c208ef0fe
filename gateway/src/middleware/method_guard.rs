use axum::{extract::Request, http::Method, middleware::Next, response::Response};

use crate::errors::AppError;

/// Reject anything but `GET` before authentication or rate limiting runs.
pub async fn get_only_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    if request.method() != Method::GET {
        tracing::debug!(method = %request.method(), "Rejecting non-GET mint request");
        return Err(AppError::MethodNotAllowed);
    }
    Ok(next.run(request).await)
}

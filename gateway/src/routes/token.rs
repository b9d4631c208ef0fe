use axum::{Router, routing::any};
use tower_http::trace::TraceLayer;

use crate::handlers::token;
use crate::state::AppState;
use std::sync::Arc;

/// Path of the credential mint endpoint
pub const TOKEN_PATH: &str = "/api/realtime/token";

/// Create the credential mint router
///
/// Every method is routed to the handler so the method guard middleware, not
/// axum's default 405, answers non-GET requests with the JSON error body.
///
/// Note: the method guard, authentication, rate limiting and `Cache-Control`
/// layers are applied once state is available (see [`crate::routes::create_app`]).
pub fn create_token_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(TOKEN_PATH, any(token::mint_token))
        .layer(TraceLayer::new_for_http())
}

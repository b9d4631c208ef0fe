pub mod api;
pub mod token;

use axum::{
    Router,
    http::{HeaderValue, header::CACHE_CONTROL},
    middleware,
};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::{auth_middleware, get_only_middleware, rate_limit_middleware};
use crate::state::AppState;

/// Assemble the application router with its per-route middleware.
///
/// Layer order on the mint route (outer to inner):
/// no-store header -> method guard -> shared secret auth -> rate limit -> handler.
/// Failed authentication therefore never consumes rate-limit budget, and every
/// mint response, rejections included, carries `Cache-Control: no-store`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let token_routes = token::create_token_router()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(middleware::from_fn(get_only_middleware))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    api::create_public_router()
        .merge(token_routes)
        .with_state(state)
}

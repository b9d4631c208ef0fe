//! Per-address fixed-window rate limiting for the mint endpoint
//!
//! One bucket per process: a window start plus an address → hit count map.
//! The first request after the window expires clears every count. Behind a
//! load balancer each instance keeps its own bucket, so the effective limit
//! scales with the instance count; treat it as best-effort abuse protection.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use tutor_gateway::middleware::rate_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/api/realtime/token", any(mint_token))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         rate_limit_middleware,
//!     ));
//! ```

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::AppError;
use crate::state::AppState;

/// Length of one counting window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Address used when no forwarding header identifies the caller
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[derive(Debug, Default)]
struct WindowState {
    window_start: Option<Instant>,
    hits: HashMap<String, u32>,
}

/// Process-local fixed-window limiter.
///
/// Window reset and the per-address read-modify-write happen under one lock.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(limit_per_window: u32) -> Self {
        Self::with_window(limit_per_window, RATE_LIMIT_WINDOW)
    }

    pub fn with_window(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit: limit_per_window,
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request from `client` against the current window.
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Same as [`RateLimiter::check`] with an explicit clock reading.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut state = self.state.lock();

        let expired = match state.window_start {
            Some(start) => now.saturating_duration_since(start) >= self.window,
            None => true,
        };
        if expired {
            state.window_start = Some(now);
            state.hits.clear();
        }

        let current = state.hits.get(client).copied().unwrap_or(0);
        if current >= self.limit {
            return RateDecision::Limited {
                retry_after_secs: self.window.as_secs(),
            };
        }

        state.hits.insert(client.to_string(), current + 1);
        RateDecision::Allowed {
            remaining: self.limit - current - 1,
        }
    }

    /// Number of addresses counted in the current window
    pub fn tracked_clients(&self) -> usize {
        self.state.lock().hits.len()
    }
}

/// Resolve the caller address from forwarding headers.
///
/// First `X-Forwarded-For` entry, else `X-Real-IP`, else `"unknown"`; values
/// are trimmed. These headers are caller-controlled, which is acceptable for
/// a best-effort limiter behind a trusted proxy.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.split(',').next())
    {
        return first.trim().to_string();
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return real_ip.trim().to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

/// Middleware applying the process-wide [`RateLimiter`] held in [`AppState`].
///
/// Rejections carry `Retry-After` with the window length in seconds.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(request.headers());

    match state.rate_limiter.check(&ip) {
        RateDecision::Allowed { remaining } => {
            tracing::trace!(ip = %ip, remaining, "Rate limit check passed");
            Ok(next.run(request).await)
        }
        RateDecision::Limited { retry_after_secs } => {
            tracing::warn!(
                ip = %ip,
                limit = state.rate_limiter.limit(),
                "Rejecting mint request: rate limit exceeded"
            );
            Err(AppError::RateLimited { retry_after_secs })
        }
    }
}

pub mod auth;
pub mod method_guard;
pub mod rate_limit;

// Re-export middleware functions
pub use auth::auth_middleware;
pub use method_guard::get_only_middleware;
pub use rate_limit::{RateDecision, RateLimiter, client_ip, rate_limit_middleware};

//! Mock provider servers shared by the integration tests
//!
//! - `websocket_mock` - scripted Gemini Live socket

// Each test binary uses a different subset of the helpers
#![allow(dead_code)]

pub mod websocket_mock;

use std::time::Duration;

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `token` - Ephemeral client secret minting for live sessions

pub mod api;
pub mod token;

pub use token::mint_token;

//! Live tutoring session clients.
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime** over a WebRTC peer connection ([`openai`])
//! - **Gemini Live** over a single WebSocket ([`gemini`])
//! - a scripted mock for demos and tests ([`MockLiveClient`])
//!
//! # Architecture
//!
//! - [`SessionClient`] is the capability set every provider implements
//! - [`LiveClient`] is the tagged union of providers, built by
//!   [`RealtimeClientFactory`] from a [`ProviderPreference`]
//! - clients report through an [`EventSink`]; closing it silences the client
//! - peer-connection secrets come from the token service
//!   ([`TokenServiceClient`])
//!
//! # Example
//!
//! ```rust,ignore
//! use tutor_gateway::core::realtime::*;
//! use tutor_gateway::core::topic::Topic;
//!
//! let (sink, mut events) = EventSink::channel();
//! let mut client = RealtimeClientFactory::make_client(
//!     ProviderPreference::Gemini,
//!     ModelPreferences::default(),
//!     &credentials,
//!     &ClientContext::default(),
//! );
//! client.start(Topic::custom("Animals"), sink)?;
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! ```

mod base;
pub mod factory;
pub mod gemini;
pub mod mock;
pub mod openai;
mod sink;
pub mod token_service;

pub use base::{
    ClientSecret, ProviderPreference, RealtimeError, RealtimeModelPreference, RealtimeResult,
    SessionClient, SessionEvent,
};
pub use factory::{
    ClientBuilder, ClientContext, LiveClient, ModelPreferences, ProviderCredentials,
    RealtimeClientFactory,
};
pub use gemini::{LiveClientConfig, LiveModelPreference, SocketLiveClient};
pub use mock::MockLiveClient;
pub use openai::{PeerClientConfig, PeerConnectionClient, PeerState};
pub use sink::EventSink;
pub use token_service::{
    ClientSecretSource, SecretRequest, StaticSecretSource, TokenServiceClient, TokenServiceConfig,
    TokenServiceError,
};

/// Get list of supported realtime providers.
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai", "gemini", "mock"]
}

//! Client factory: provider preference in, ready-to-start client out.

use enum_dispatch::enum_dispatch;
use std::fmt;
use std::sync::Arc;

use super::base::{ProviderPreference, RealtimeModelPreference, RealtimeResult, SessionClient};
use super::gemini::{LiveClientConfig, LiveModelPreference, SocketLiveClient};
use super::mock::MockLiveClient;
use super::openai::{
    PeerClientConfig, PeerConnectionClient, PeerTransportFactory, default_transport_factory,
};
use super::sink::EventSink;
use super::token_service::{ClientSecretSource, TokenServiceClient, TokenServiceConfig};
use crate::core::audio::{AudioBackend, AudioSession, InMemoryAudioSession, NullAudioBackend};
use crate::core::topic::{LearnerContext, Topic};

/// One session client of any provider kind
#[enum_dispatch(SessionClient)]
pub enum LiveClient {
    Peer(PeerConnectionClient),
    Socket(SocketLiveClient),
    Mock(MockLiveClient),
}

impl LiveClient {
    pub fn provider(&self) -> ProviderPreference {
        match self {
            LiveClient::Peer(_) => ProviderPreference::OpenAi,
            LiveClient::Socket(_) => ProviderPreference::Gemini,
            LiveClient::Mock(_) => ProviderPreference::Mock,
        }
    }
}

/// Makes a fresh client for every session a model starts
pub type ClientBuilder = Box<dyn Fn() -> LiveClient + Send + Sync>;

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LiveClient").field(&self.provider()).finish()
    }
}

/// Model choice per provider family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelPreferences {
    pub realtime: RealtimeModelPreference,
    pub live: LiveModelPreference,
}

/// Credentials and endpoints the clients need
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub token_service: TokenServiceConfig,
    pub google_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    /// Override of the Gemini Live WebSocket URL
    pub gemini_url: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("token_service", &self.token_service)
            .field(
                "google_api_key_configured",
                &self
                    .google_api_key
                    .as_deref()
                    .is_some_and(|key| !key.trim().is_empty()),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("gemini_url", &self.gemini_url)
            .finish()
    }
}

/// Device-side collaborators shared by every client
#[derive(Clone)]
pub struct ClientContext {
    pub learner: LearnerContext,
    pub audio_backend: Arc<dyn AudioBackend>,
    pub audio_session: Arc<dyn AudioSession>,
    pub peer_transport: Arc<dyn PeerTransportFactory>,
    /// Replaces the token service as source of peer client secrets
    pub secret_source: Option<Arc<dyn ClientSecretSource>>,
}

impl ClientContext {
    pub fn new(audio_backend: Arc<dyn AudioBackend>, audio_session: Arc<dyn AudioSession>) -> Self {
        Self {
            learner: LearnerContext::default(),
            peer_transport: default_transport_factory(audio_backend.clone()),
            audio_backend,
            audio_session,
            secret_source: None,
        }
    }

    pub fn with_learner(mut self, learner: LearnerContext) -> Self {
        self.learner = learner;
        self
    }

    pub fn with_peer_transport(mut self, transport: Arc<dyn PeerTransportFactory>) -> Self {
        self.peer_transport = transport;
        self
    }

    pub fn with_secret_source(mut self, source: Arc<dyn ClientSecretSource>) -> Self {
        self.secret_source = Some(source);
        self
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new(
            Arc::new(NullAudioBackend),
            Arc::new(InMemoryAudioSession::default()),
        )
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("learner", &self.learner)
            .field("secret_source", &self.secret_source.is_some())
            .finish()
    }
}

pub struct RealtimeClientFactory;

impl RealtimeClientFactory {
    /// Build the client for `provider`. Never falls back to another provider;
    /// missing credentials surface when the client starts.
    pub fn make_client(
        provider: ProviderPreference,
        models: ModelPreferences,
        credentials: &ProviderCredentials,
        context: &ClientContext,
    ) -> LiveClient {
        match provider {
            ProviderPreference::OpenAi => {
                let config = PeerClientConfig {
                    api_base_url: credentials.openai_base_url.clone(),
                    token_service: credentials.token_service.clone(),
                    model: models.realtime,
                    learner: context.learner.clone(),
                };
                let secrets = context.secret_source.clone().unwrap_or_else(|| {
                    Arc::new(TokenServiceClient::new(credentials.token_service.clone()))
                });
                LiveClient::Peer(PeerConnectionClient::new(
                    config,
                    secrets,
                    context.peer_transport.clone(),
                    context.audio_session.clone(),
                ))
            }
            ProviderPreference::Gemini => {
                let config = LiveClientConfig {
                    api_key: credentials.google_api_key.clone(),
                    model: models.live,
                    url: credentials.gemini_url.clone(),
                    learner: context.learner.clone(),
                };
                LiveClient::Socket(SocketLiveClient::new(
                    config,
                    context.audio_backend.clone(),
                    context.audio_session.clone(),
                ))
            }
            ProviderPreference::Mock => LiveClient::Mock(MockLiveClient::default()),
        }
    }

    /// Capture the choices once; each call of the returned builder makes a new
    /// unstarted client
    pub fn builder(
        provider: ProviderPreference,
        models: ModelPreferences,
        credentials: ProviderCredentials,
        context: ClientContext,
    ) -> ClientBuilder {
        Box::new(move || Self::make_client(provider, models, &credentials, &context))
    }

    /// Convenience: build and start in one call
    pub fn start_client(
        provider: ProviderPreference,
        models: ModelPreferences,
        credentials: &ProviderCredentials,
        context: &ClientContext,
        topic: Topic,
        sink: EventSink,
    ) -> RealtimeResult<LiveClient> {
        let mut client = Self::make_client(provider, models, credentials, context);
        client.start(topic, sink)?;
        Ok(client)
    }
}

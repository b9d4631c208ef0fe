use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use http::{
    HeaderName, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing_subscriber::EnvFilter;

use anyhow::anyhow;

use tutor_gateway::{
    ServerConfig,
    auth::SHARED_SECRET_HEADER,
    core::audio::{AudioBackend, InMemoryAudioSession},
    core::realtime::{
        ClientContext, LiveModelPreference, ModelPreferences, ProviderCredentials,
        ProviderPreference, RealtimeClientFactory, RealtimeModelPreference, TokenServiceConfig,
    },
    core::session::{CountingStayAwake, SessionModel},
    core::topic::{LearnerContext, Topic},
    routes,
    state::AppState,
};

/// Tutor Gateway - credential mint service and live tutoring session clients
#[derive(Parser, Debug)]
#[command(name = "tutor-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the token service
    Serve,

    /// Print the preset topics as JSON
    Presets,

    /// Run one live session in the terminal and print the transcript
    Session {
        /// Provider: openai, gemini or mock
        #[arg(short = 'p', long = "provider", default_value = "mock")]
        provider: String,

        /// Preset topic id or a free-form title
        #[arg(short = 't', long = "topic", default_value = "friends")]
        topic: String,

        /// Peer-connection model tier: realtimeMini or realtime
        #[arg(long = "mode", default_value = "realtimeMini")]
        mode: String,

        /// Learner context as JSON (camelCase keys)
        #[arg(long = "learner")]
        learner: Option<String>,

        /// Hide diagnostic system notes
        #[arg(long = "quiet")]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Presets => {
            println!("{}", serde_json::to_string_pretty(Topic::presets())?);
            Ok(())
        }
        Commands::Session {
            provider,
            topic,
            mode,
            learner,
            quiet,
        } => run_session(&provider, &topic, &mode, learner.as_deref(), quiet).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration from file or environment
    let config = if let Some(config_path) = config_path {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();
    let is_tls_enabled = config.is_tls_enabled();
    let cors_origins = config.cors_allowed_origins.clone();
    info!(
        token_service_enabled = config.is_token_service_enabled(),
        openai_key_configured = config.openai_api_key.is_some(),
        rpm = config.token_rate_limit_per_minute,
        "Starting server on {address}"
    );

    let app_state = AppState::new(config);

    let allowed_headers = [
        AUTHORIZATION,
        CONTENT_TYPE,
        HeaderName::from_static(SHARED_SECRET_HEADER),
    ];
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(allowed_headers)
                .allow_credentials(false)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(allowed_headers)
                .allow_credentials(true)
        }
    } else {
        info!(
            "CORS not configured, defaulting to same-origin only. \
             Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
        );
        CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(allowed_headers)
            .allow_credentials(false)
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = routes::create_app(app_state)
        .layer(cors_layer)
        .layer(security_headers);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    match tls_config.filter(|_| is_tls_enabled) {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to load TLS certificates from {} and {}: {}",
                        tls.cert_path.display(),
                        tls.key_path.display(),
                        e
                    )
                })?;

            println!("Server listening on https://{} (TLS enabled)", socket_addr);

            axum_server::bind_rustls(socket_addr, rustls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .map_err(|e| anyhow!("TLS server error: {}", e))?;
        }
        None => {
            println!("Server listening on http://{}", socket_addr);

            let listener = TcpListener::bind(&socket_addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }

    Ok(())
}

fn audio_backend() -> Arc<dyn AudioBackend> {
    #[cfg(feature = "device-audio")]
    {
        Arc::new(tutor_gateway::core::audio::cpal_backend::CpalAudioBackend)
    }
    #[cfg(not(feature = "device-audio"))]
    {
        Arc::new(tutor_gateway::core::audio::NullAudioBackend)
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

async fn run_session(
    provider: &str,
    topic: &str,
    mode: &str,
    learner: Option<&str>,
    quiet: bool,
) -> anyhow::Result<()> {
    let provider = ProviderPreference::parse(provider)
        .ok_or_else(|| anyhow!("Unknown provider '{provider}' (expected openai, gemini or mock)"))?;
    let realtime = RealtimeModelPreference::parse(mode)
        .ok_or_else(|| anyhow!("Unknown mode '{mode}' (expected realtimeMini or realtime)"))?;
    let live = non_blank_env("GEMINI_LIVE_MODEL")
        .and_then(|name| LiveModelPreference::parse(&name))
        .unwrap_or_default();
    let topic = Topic::preset(topic)
        .cloned()
        .unwrap_or_else(|| Topic::custom(topic.trim()));
    let learner: LearnerContext = match learner {
        Some(json) => serde_json::from_str(json)?,
        None => LearnerContext::default(),
    };

    let credentials = ProviderCredentials {
        token_service: TokenServiceConfig {
            base_url: non_blank_env("TOKEN_SERVICE_BASE_URL"),
            shared_secret: non_blank_env("TOKEN_SERVICE_SHARED_SECRET"),
        },
        google_api_key: non_blank_env("GOOGLE_API_KEY"),
        openai_base_url: non_blank_env("OPENAI_API_BASE_URL"),
        gemini_url: non_blank_env("GEMINI_LIVE_URL"),
    };
    let context = ClientContext::new(audio_backend(), Arc::new(InMemoryAudioSession::default()))
        .with_learner(learner);
    let make_client = RealtimeClientFactory::builder(
        provider,
        ModelPreferences { realtime, live },
        credentials,
        context,
    );

    let mut session =
        SessionModel::new(make_client, !quiet, Arc::new(CountingStayAwake::default()));
    session.start(topic)?;
    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session.next_event() => {
                if event.is_none() {
                    break;
                }
            }
        }
        for entry in &session.messages()[printed..] {
            println!("{entry}");
        }
        printed = session.messages().len();
    }
    session.stop();
    Ok(())
}

//! WebSocket Mock Server for the Gemini Live socket
//!
//! Answers `setup` with `setupComplete`, waits for the greeting turn, then
//! plays a script of frames. Everything the client sends is recorded.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// One scripted server action
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Json(Value),
    /// Arbitrary text, not necessarily JSON
    Raw(String),
    Binary(Vec<u8>),
    Pause(Duration),
    Close(String),
}

#[derive(Default)]
pub struct Recorded {
    pub api_keys: Vec<String>,
    pub messages: Vec<Value>,
    pub close_reasons: Vec<String>,
}

pub struct GeminiLiveMock {
    pub addr: SocketAddr,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl GeminiLiveMock {
    pub async fn start(script: Vec<ScriptStep>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let state = recorded.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = state.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, script).await {
                        eprintln!("mock connection ended: {e}");
                    }
                });
            }
        });

        Self { addr, recorded }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/live", self.addr)
    }

    pub fn messages(&self) -> Vec<Value> {
        self.recorded.lock().messages.clone()
    }

    pub fn api_keys(&self) -> Vec<String> {
        self.recorded.lock().api_keys.clone()
    }

    pub fn close_reasons(&self) -> Vec<String> {
        self.recorded.lock().close_reasons.clone()
    }

    pub fn received_audio_stream_end(&self) -> bool {
        self.messages()
            .iter()
            .any(|m| m["realtimeInput"]["audioStreamEnd"] == json!(true))
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<Mutex<Recorded>>,
    script: Vec<ScriptStep>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = state.clone();
    let capture_key = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(key) = request
            .headers()
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
        {
            header_state.lock().api_keys.push(key.to_string());
        }
        Ok(response)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, capture_key).await?;
    let (mut write, mut read) = ws_stream.split();

    // setup -> setupComplete, then wait for the greeting turn
    let mut handshake_frames = 0;
    while handshake_frames < 2 {
        let Some(message) = read.next().await else {
            return Ok(());
        };
        if let Message::Text(text) = message? {
            let value: Value = serde_json::from_str(text.as_str())?;
            let is_setup = value.get("setup").is_some();
            state.lock().messages.push(value);
            handshake_frames += 1;
            if is_setup {
                write
                    .send(Message::Text(json!({ "setupComplete": {} }).to_string().into()))
                    .await?;
            }
        }
    }

    for step in script {
        match step {
            ScriptStep::Json(value) => write.send(Message::Text(value.to_string().into())).await?,
            ScriptStep::Raw(text) => write.send(Message::Text(text.into())).await?,
            ScriptStep::Binary(data) => write.send(Message::Binary(data.into())).await?,
            ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
            ScriptStep::Close(reason) => {
                write
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: reason.into(),
                    })))
                    .await?;
                return Ok(());
            }
        }
    }

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                    state.lock().messages.push(value);
                }
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                state.lock().close_reasons.push(reason);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

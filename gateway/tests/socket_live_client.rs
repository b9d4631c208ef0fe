//! Socket Live Client Tests
//!
//! Runs `SocketLiveClient` against a scripted local WebSocket server that
//! speaks the Gemini Live message shapes.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use mock_providers::wait_until;
use mock_providers::websocket_mock::{GeminiLiveMock, ScriptStep};
use tutor_gateway::core::audio::{InMemoryAudioSession, NullAudioBackend};
use tutor_gateway::core::realtime::{
    EventSink, LiveClientConfig, RealtimeError, SessionClient, SessionEvent, SocketLiveClient,
};
use tutor_gateway::core::topic::Topic;

const TIMEOUT: Duration = Duration::from_secs(5);

fn client_for(mock: &GeminiLiveMock) -> SocketLiveClient {
    let config = LiveClientConfig {
        api_key: Some("g-key".to_string()),
        url: Some(mock.url()),
        ..Default::default()
    };
    SocketLiveClient::new(
        config,
        Arc::new(NullAudioBackend),
        Arc::new(InMemoryAudioSession::default()),
    )
}

async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a session event")
}

/// Collect events up to and including the first one matching `predicate`
async fn collect_until<F: Fn(&SessionEvent) -> bool>(
    rx: &mut UnboundedReceiver<SessionEvent>,
    predicate: F,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(rx).await {
        let done = predicate(&event);
        events.push(event);
        if done {
            break;
        }
    }
    events
}

fn teacher_messages(events: &[SessionEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TeacherMessage(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_setup_handshake() {
    let mock = GeminiLiveMock::start(vec![]).await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink).unwrap();
    let events = collect_until(&mut rx, |e| *e == SessionEvent::Connected).await;
    assert_eq!(
        events,
        vec![
            SessionEvent::System("Starting Gemini Live session…".into()),
            SessionEvent::Connected,
        ]
    );
    assert_eq!(
        next_event(&mut rx).await,
        Some(SessionEvent::System("Gemini Live setup complete.".into()))
    );

    assert!(wait_until(TIMEOUT, || mock.messages().len() >= 2).await);
    let messages = mock.messages();
    let setup = &messages[0]["setup"];
    assert_eq!(
        setup["model"],
        "models/gemini-2.5-flash-native-audio-preview-09-2025"
    );
    assert_eq!(setup["generationConfig"]["responseModalities"], json!(["AUDIO"]));
    assert_eq!(setup["sessionResumption"], json!({}));
    assert!(
        setup["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Selected topic: Animals")
    );
    assert_eq!(messages[1]["clientContent"]["turnComplete"], json!(true));
    assert_eq!(mock.api_keys(), vec!["g-key".to_string()]);

    client.stop();
}

#[tokio::test]
async fn test_transcript_coalesced_into_one_turn() {
    let mock = GeminiLiveMock::start(vec![
        ScriptStep::Json(json!({ "serverContent": { "outputTranscription": { "text": "Hel" } } })),
        ScriptStep::Json(
            json!({ "serverContent": { "outputTranscription": { "text": "Hello there" } } }),
        ),
        ScriptStep::Json(json!({ "serverContent": { "modelTurn": { "parts": [{ "text": "ignored" }] } } })),
        ScriptStep::Json(json!({ "serverContent": { "turnComplete": true } })),
        ScriptStep::Json(json!({ "serverContent": { "inputTranscription": { "text": " I like cats " } } })),
        ScriptStep::Json(json!({ "serverContent": { "modelTurn": { "parts": [{ "text": "Cats " }, { "text": "are great!" }] } } })),
        ScriptStep::Json(json!({ "serverContent": { "generationComplete": true } })),
    ])
    .await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink).unwrap();
    let events = collect_until(&mut rx, |e| {
        *e == SessionEvent::TeacherMessage("Cats are great!".into())
    })
    .await;

    assert_eq!(teacher_messages(&events), vec!["Hello there", "Cats are great!"]);
    assert!(events.contains(&SessionEvent::System("You: I like cats".into())));
    client.stop();
}

#[tokio::test]
async fn test_malformed_frames_are_reported_and_session_continues() {
    let mock = GeminiLiveMock::start(vec![
        ScriptStep::Raw("not json".to_string()),
        ScriptStep::Binary(vec![0xff, 0xfe, 0x00]),
        ScriptStep::Binary(
            json!({ "serverContent": { "outputTranscription": { "text": "Still here" }, "turnComplete": true } })
                .to_string()
                .into_bytes(),
        ),
    ])
    .await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink).unwrap();
    let events = collect_until(&mut rx, |e| matches!(e, SessionEvent::TeacherMessage(_))).await;

    assert!(events.contains(&SessionEvent::System(
        "Gemini Live: received unparseable server message.".into()
    )));
    assert!(events.contains(&SessionEvent::System(
        "Gemini Live received non-UTF8 binary frame (3 bytes, hex prefix: fffe00).".into()
    )));
    assert_eq!(teacher_messages(&events), vec!["Still here"]);
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    client.stop();
}

#[tokio::test]
async fn test_go_away_then_close_is_an_error() {
    let mock = GeminiLiveMock::start(vec![
        ScriptStep::Json(json!({ "goAway": { "timeLeft": "10s" } })),
        ScriptStep::Pause(Duration::from_millis(20)),
        ScriptStep::Close("session over".to_string()),
    ])
    .await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink).unwrap();
    let events = collect_until(&mut rx, |e| matches!(e, SessionEvent::Error(_))).await;

    let notices: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::System(text) if text.contains("disconnect soon")))
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0],
        &SessionEvent::System("Gemini Live: server will disconnect soon (timeLeft: 10s).".into())
    );
    match events.last() {
        Some(SessionEvent::Error(text)) => {
            assert!(text.starts_with("Gemini Live socket closed by server"), "{text}")
        }
        other => panic!("expected an error, got {other:?}"),
    }
    client.stop();
}

#[tokio::test]
async fn test_mute_sends_audio_stream_end() {
    let mock = GeminiLiveMock::start(vec![]).await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink).unwrap();
    collect_until(&mut rx, |e| *e == SessionEvent::Connected).await;

    client.set_muted(true);
    assert!(client.is_muted());
    assert!(wait_until(TIMEOUT, || mock.received_audio_stream_end()).await);
    client.stop();
}

#[tokio::test]
async fn test_stop_says_goodbye_and_silences_sink() {
    let mock = GeminiLiveMock::start(vec![]).await;
    let mut client = client_for(&mock);
    let (sink, mut rx) = EventSink::channel();

    client.start(Topic::custom("Animals"), sink.clone()).unwrap();
    collect_until(&mut rx, |e| *e == SessionEvent::Connected).await;

    client.stop();
    client.stop();
    assert!(sink.is_closed());
    let rest = collect_until(&mut rx, |_| false).await;
    assert_eq!(
        rest.last(),
        Some(&SessionEvent::System("Gemini Live session stopped.".into()))
    );
    assert_eq!(
        rest.iter()
            .filter(|e| **e == SessionEvent::System("Gemini Live session stopped.".into()))
            .count(),
        1
    );

    assert!(wait_until(TIMEOUT, || !mock.close_reasons().is_empty()).await);
    assert_eq!(mock.close_reasons(), vec!["going away".to_string()]);
    assert!(mock.received_audio_stream_end());
}

#[tokio::test]
async fn test_missing_key_refuses_to_start() {
    let mock = GeminiLiveMock::start(vec![]).await;
    let mut client = SocketLiveClient::new(
        LiveClientConfig {
            api_key: Some("   ".to_string()),
            url: Some(mock.url()),
            ..Default::default()
        },
        Arc::new(NullAudioBackend),
        Arc::new(InMemoryAudioSession::default()),
    );
    let (sink, mut rx) = EventSink::channel();

    let result = client.start(Topic::custom("Animals"), sink);
    assert!(matches!(result, Err(RealtimeError::ConfigurationMissing(_))));
    assert!(rx.try_recv().is_err());
    assert!(mock.api_keys().is_empty());
}

// End-to-end session tests against mock transport and audio, driving the
// session through the same surface the HTTP handlers use.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, timeout};

use viva_session::config::{AudioConfig, HttpConfig, RealtimeConfig, ServiceConfig};
use viva_session::session::SessionConfig;
use viva_session::{
    AppState, AssessmentSession, AudioBackend, AudioFrame, ChannelMessage, Config, Connected,
    ControlChannel, Error, PlaybackSink, Result, TurnState,
};

struct MockChannel {
    inbound: mpsc::Receiver<ChannelMessage>,
    outbound: mpsc::UnboundedSender<Value>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        let value: Value = serde_json::from_str(&text).expect("outbound must be JSON");
        self.outbound.send(value).map_err(|_| Error::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockBackend {
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl AudioBackend for MockBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (_, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockPlayback {
    pushed: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackSink for MockPlayback {
    fn push(&mut self, samples: &[i16]) {
        self.pushed.fetch_add(samples.len(), Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    session: Arc<AssessmentSession>,
    server_tx: mpsc::Sender<ChannelMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Value>,
    frames_tx: mpsc::Sender<AudioFrame>,
    channel_closed: Arc<AtomicBool>,
    backend_stopped: Arc<AtomicBool>,
    playback_pushed: Arc<AtomicUsize>,
    playback_stopped: Arc<AtomicBool>,
}

fn mock_transport() -> (
    Connected,
    mpsc::Sender<ChannelMessage>,
    mpsc::UnboundedReceiver<Value>,
    mpsc::Sender<AudioFrame>,
    Arc<AtomicBool>,
    Arc<AtomicBool>,
    Arc<AtomicUsize>,
    Arc<AtomicBool>,
) {
    let (server_tx, inbound) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames) = mpsc::channel(64);

    let channel_closed = Arc::new(AtomicBool::new(false));
    let backend_stopped = Arc::new(AtomicBool::new(false));
    let playback_pushed = Arc::new(AtomicUsize::new(0));
    let playback_stopped = Arc::new(AtomicBool::new(false));

    let connected = Connected {
        channel: Box::new(MockChannel {
            inbound,
            outbound: outbound_tx,
            closed: Arc::clone(&channel_closed),
        }),
        backend: Box::new(MockBackend {
            stopped: Arc::clone(&backend_stopped),
        }),
        frames,
        playback: Box::new(MockPlayback {
            pushed: Arc::clone(&playback_pushed),
            stopped: Arc::clone(&playback_stopped),
        }),
        remote_description: "v=0".to_string(),
    };

    (
        connected,
        server_tx,
        outbound_rx,
        frames_tx,
        channel_closed,
        backend_stopped,
        playback_pushed,
        playback_stopped,
    )
}

async fn start_session(seed_instructions: Option<&str>) -> Harness {
    let (
        connected,
        server_tx,
        outbound_rx,
        frames_tx,
        channel_closed,
        backend_stopped,
        playback_pushed,
        playback_stopped,
    ) = mock_transport();

    let config = SessionConfig {
        seed_instructions: seed_instructions.map(str::to_string),
        ..SessionConfig::default()
    };

    let cancel = AtomicBool::new(false);
    let session = AssessmentSession::activate(config, connected, &cancel)
        .await
        .expect("activation");

    Harness {
        session,
        server_tx,
        outbound_rx,
        frames_tx,
        channel_closed,
        backend_stopped,
        playback_pushed,
        playback_stopped,
    }
}

impl Harness {
    async fn next_outbound(&mut self) -> Value {
        timeout(Duration::from_secs(1), self.outbound_rx.recv())
            .await
            .expect("timed out waiting for outbound event")
            .expect("outbound channel closed")
    }

    async fn expect_no_outbound(&mut self, wait: Duration) {
        if let Ok(Some(event)) = timeout(wait, self.outbound_rx.recv()).await {
            panic!("unexpected outbound event: {event}");
        }
    }

    async fn send_server(&self, event: Value) {
        self.server_tx
            .send(ChannelMessage::Control(event.to_string()))
            .await
            .expect("server channel");
    }

    async fn send_frame(&self, samples: Vec<i16>) {
        self.frames_tx
            .send(AudioFrame {
                samples,
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: 0,
            })
            .await
            .expect("frames channel");
    }
}

fn assistant_item(text: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": text }],
        },
    })
}

fn user_item(text: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "user",
            "content": [{ "type": "text", "text": text }],
        },
    })
}

fn tool_call(call_id: &str, arguments: &str) -> Value {
    json!({
        "type": "response.output_item.done",
        "item": {
            "type": "function_call",
            "status": "completed",
            "name": "assess_math_answer",
            "call_id": call_id,
            "arguments": arguments,
        },
    })
}

const VALID_ARGS: &str =
    r#"{"question":"What is 2+2?","correctAnswer":"4","userAnswer":"4","score":100}"#;

#[tokio::test]
async fn seed_context_is_first_outbound_event() {
    let mut harness = start_session(Some("You are a teacher.")).await;

    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "conversation.item.create");
    assert_eq!(event["item"]["role"], "system");
    assert_eq!(event["item"]["content"][0]["type"], "input_text");
    assert!(!event["event_id"].as_str().unwrap().is_empty());

    harness.session.stop().await;
}

#[tokio::test]
async fn session_created_configures_tools_exactly_once() {
    let mut harness = start_session(None).await;

    harness.send_server(json!({ "type": "session.created" })).await;
    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "session.update");
    assert_eq!(event["session"]["tools"][0]["name"], "assess_math_answer");
    assert_eq!(event["session"]["tool_choice"], "auto");

    harness.send_server(json!({ "type": "session.created" })).await;
    harness.expect_no_outbound(Duration::from_millis(200)).await;

    harness.session.stop().await;
}

#[tokio::test]
async fn assistant_utterance_arms_recording() {
    let harness = start_session(None).await;

    harness.send_server(assistant_item("What is 2+2?")).await;
    sleep(Duration::from_millis(100)).await;

    let status = harness.session.status().await;
    assert_eq!(status.turn_state, TurnState::Recording);
    assert_eq!(status.last_utterance, "What is 2+2?");

    harness.session.stop().await;
}

#[tokio::test]
async fn capture_frames_forwarded_only_while_recording() {
    let mut harness = start_session(None).await;

    // Listening: the chunk is dropped at the gate.
    harness.send_frame(vec![1, 2, 3]).await;
    harness.expect_no_outbound(Duration::from_millis(200)).await;

    harness.send_server(assistant_item("Go ahead.")).await;
    sleep(Duration::from_millis(100)).await;

    harness.send_frame(vec![4, 5, 6]).await;
    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "input_audio_buffer.append");
    assert_eq!(event["audio_buffer"], json!([4, 5, 6]));

    harness.session.stop().await;
}

#[tokio::test]
async fn stop_recording_commits_surfaces_turn_and_requests_response() {
    let mut harness = start_session(None).await;

    harness.send_server(assistant_item("What orbits the sun?")).await;
    sleep(Duration::from_millis(100)).await;
    harness.send_server(user_item("the planets")).await;
    sleep(Duration::from_millis(100)).await;

    harness.session.stop_recording().await.unwrap();

    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "input_audio_buffer.commit");
    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "conversation.item.create");
    assert_eq!(event["item"]["role"], "user");
    assert_eq!(event["item"]["content"][0]["text"], "the planets");
    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "response.create");

    let status = harness.session.status().await;
    assert_eq!(status.turn_state, TurnState::AwaitingResponse);

    harness.session.stop().await;
}

#[tokio::test]
async fn stop_recording_with_empty_transcript_only_commits() {
    let mut harness = start_session(None).await;

    harness.send_server(assistant_item("Anything to add?")).await;
    sleep(Duration::from_millis(100)).await;

    harness.session.stop_recording().await.unwrap();

    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "input_audio_buffer.commit");
    harness.expect_no_outbound(Duration::from_millis(200)).await;

    harness.session.stop().await;
}

#[tokio::test]
async fn duplicate_tool_calls_record_once_and_follow_up_once() {
    let mut harness = start_session(None).await;

    harness.send_server(tool_call("c1", VALID_ARGS)).await;
    harness.send_server(tool_call("c1", VALID_ARGS)).await;
    sleep(Duration::from_millis(100)).await;

    let results = harness.session.results().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].call_id, "c1");
    assert_eq!(results[0].score, 100.0);

    // One deferred follow-up response, with instructions attached.
    let event = timeout(Duration::from_secs(2), harness.outbound_rx.recv())
        .await
        .expect("follow-up never arrived")
        .unwrap();
    assert_eq!(event["type"], "response.create");
    assert!(event["response"]["instructions"].as_str().unwrap().len() > 0);

    harness.expect_no_outbound(Duration::from_millis(800)).await;

    harness.session.stop().await;
}

#[tokio::test]
async fn malformed_tool_arguments_do_not_end_the_session() {
    let harness = start_session(None).await;

    harness.send_server(tool_call("c1", "{broken")).await;
    sleep(Duration::from_millis(100)).await;

    assert!(harness.session.is_active().await);
    assert!(harness.session.results().await.is_empty());

    // The same call_id can still land once the payload is well formed.
    harness.send_server(tool_call("c1", VALID_ARGS)).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.session.results().await.len(), 1);

    harness.session.stop().await;
}

#[tokio::test]
async fn malformed_control_payload_tears_down_the_session() {
    let harness = start_session(None).await;

    harness
        .server_tx
        .send(ChannelMessage::Control("not json".to_string()))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    assert!(!harness.session.is_active().await);
    assert!(harness.channel_closed.load(Ordering::SeqCst));
    assert!(harness.backend_stopped.load(Ordering::SeqCst));
    assert!(harness.playback_stopped.load(Ordering::SeqCst));

    let status = harness.session.status().await;
    assert_eq!(status.turn_state, TurnState::Idle);
}

#[tokio::test]
async fn channel_loss_tears_down_the_session() {
    let harness = start_session(None).await;

    drop(harness.server_tx);
    sleep(Duration::from_millis(200)).await;

    assert!(!harness.session.is_active().await);
    assert!(harness.backend_stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn close_during_connect_releases_transport() {
    let (connected, _server_tx, _outbound_rx, _frames_tx, channel_closed, backend_stopped, _, playback_stopped) =
        mock_transport();

    let cancel = AtomicBool::new(true);
    let result = AssessmentSession::activate(SessionConfig::default(), connected, &cancel).await;

    assert!(matches!(result, Err(Error::Connect(_))));
    assert!(channel_closed.load(Ordering::SeqCst));
    assert!(backend_stopped.load(Ordering::SeqCst));
    assert!(playback_stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let harness = start_session(None).await;

    harness.session.stop().await;
    assert!(!harness.session.is_active().await);
    harness.session.stop().await;
    assert!(!harness.session.is_active().await);
}

#[tokio::test]
async fn inbound_media_reaches_playback() {
    let harness = start_session(None).await;

    harness
        .server_tx
        .send(ChannelMessage::Media(vec![1, 2, 3, 4]))
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.playback_pushed.load(Ordering::SeqCst), 4);

    harness.session.stop().await;
}

#[tokio::test]
async fn event_log_records_both_directions_newest_first() {
    let mut harness = start_session(Some("seed")).await;

    let _ = harness.next_outbound().await; // seed context
    harness.send_server(json!({ "type": "session.created" })).await;
    let _ = harness.next_outbound().await; // session.update
    sleep(Duration::from_millis(100)).await;

    let events = harness.session.events(None).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "session.update");
    assert_eq!(events[1]["type"], "session.created");
    assert_eq!(events[2]["type"], "conversation.item.create");

    let limited = harness.session.events(Some(1)).await;
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0]["type"], "session.update");

    harness.session.stop().await;
}

fn test_config() -> Config {
    Config {
        service: ServiceConfig {
            name: "viva-session".to_string(),
            http: HttpConfig {
                bind: "127.0.0.1".to_string(),
                port: 0,
            },
        },
        realtime: RealtimeConfig {
            token_url: "http://localhost:3000/token".to_string(),
            base_url: "https://example.test/v1/realtime".to_string(),
            model: "test-model".to_string(),
            instructions: None,
        },
        audio: AudioConfig {
            sample_rate: 16000,
            channels: 1,
            chunk_ms: 100,
        },
    }
}

#[tokio::test]
async fn overlapping_starts_tear_down_the_displaced_session() {
    let state = AppState::new(test_config());
    let release = Arc::new(Notify::new());
    // Keeps the mock server side of each channel alive so the drivers idle
    // instead of seeing the channel close.
    let keep: Arc<std::sync::Mutex<Vec<mpsc::Sender<ChannelMessage>>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));

    // First start blocks inside its connect while holding establishment.
    let first = {
        let state = state.clone();
        let release = Arc::clone(&release);
        let keep = Arc::clone(&keep);
        tokio::spawn(async move {
            state
                .establish_session(|cancel| async move {
                    release.notified().await;
                    let (connected, server_tx, ..) = mock_transport();
                    keep.lock().unwrap().push(server_tx);
                    AssessmentSession::activate(SessionConfig::default(), connected, &cancel).await
                })
                .await
        })
    };
    sleep(Duration::from_millis(100)).await;

    // Second start overlaps the first; it must wait, then displace the
    // first session through a full teardown.
    let second = {
        let state = state.clone();
        let keep = Arc::clone(&keep);
        tokio::spawn(async move {
            state
                .establish_session(|cancel| async move {
                    let (connected, server_tx, ..) = mock_transport();
                    keep.lock().unwrap().push(server_tx);
                    AssessmentSession::activate(SessionConfig::default(), connected, &cancel).await
                })
                .await
        })
    };
    sleep(Duration::from_millis(100)).await;
    release.notify_one();

    let first = first
        .await
        .unwrap()
        .expect("first start")
        .expect("first start not cancelled");
    let second = second
        .await
        .unwrap()
        .expect("second start")
        .expect("second start not cancelled");

    assert!(!first.is_active().await, "displaced session must be stopped");
    assert!(second.is_active().await);

    let stored = state.session.read().await.clone().expect("a stored session");
    assert_eq!(stored.session_id(), second.session_id());

    second.stop().await;
}

#[tokio::test]
async fn failed_send_leaves_no_phantom_log_entry() {
    let harness = start_session(None).await;

    // Sever the outbound side; the next send fails and ends the session.
    drop(harness.outbound_rx);
    harness.session.say("hello?".to_string()).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    assert!(!harness.session.is_active().await);
    let events = harness.session.events(None).await;
    assert!(
        events.iter().all(|e| e["type"] != "conversation.item.create"),
        "unsent event must not appear in the log"
    );
}

#[tokio::test]
async fn say_injects_assistant_speech() {
    let mut harness = start_session(None).await;

    harness.session.say("Let's begin.".to_string()).await.unwrap();

    let event = harness.next_outbound().await;
    assert_eq!(event["type"], "conversation.item.create");
    assert_eq!(event["item"]["role"], "assistant");
    assert_eq!(event["item"]["content"][0]["text"], "Let's begin.");

    harness.session.stop().await;
}

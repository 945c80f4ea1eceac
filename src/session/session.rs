use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::machine::{CaptureAction, Effects, TurnMachine};
use super::stats::SessionStatus;
use crate::assessment::{
    AssessmentExtractor, AssessmentResult, FOLLOW_UP_DELAY, FOLLOW_UP_INSTRUCTIONS,
};
use crate::audio::{AudioBackend, AudioFrame, CapturePipeline, PlaybackSink};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{decode_event, encode_event, ClientEvent, ToolCallEvent};
use crate::transport::{self, ChannelMessage, Connected, ControlChannel};

/// Commands issued into the driver loop by the UI layer and deferred tasks
#[derive(Debug)]
pub enum Command {
    StartRecording,
    StopRecording,
    Speak(String),
    Respond(String),
    Close,
}

/// State shared between the driver task and UI readers. One mutex, one
/// writer discipline: only the driver mutates it.
struct Inner {
    machine: TurnMachine,
    extractor: AssessmentExtractor,
    /// Every inbound and outbound event, newest first
    event_log: Vec<Value>,
    active: bool,
    started_at: DateTime<Utc>,
}

/// One live assessment session.
///
/// Owns the transport exclusively through its driver task; at most one
/// session exists at a time (enforced by the HTTP state). All turn-taking
/// transitions are serialized on the driver.
pub struct AssessmentSession {
    config: SessionConfig,
    inner: Arc<Mutex<Inner>>,
    cmd_tx: mpsc::Sender<Command>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl AssessmentSession {
    /// Activate an established transport session.
    ///
    /// The cancel flag is checked one final time here: a close request that
    /// raced the connect wins, and the freshly built transport is torn down
    /// immediately instead of leaving a dangling active session.
    pub async fn activate(
        config: SessionConfig,
        connected: Connected,
        cancel: &AtomicBool,
    ) -> Result<Arc<Self>> {
        if cancel.load(Ordering::SeqCst) {
            warn!(session_id = %config.session_id, "session closed during connect, tearing down");
            connected.close().await;
            return Err(Error::Connect("session closed during connect".into()));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let inner = Arc::new(Mutex::new(Inner {
            machine: TurnMachine::new(config.seed_instructions.clone()),
            extractor: AssessmentExtractor::new(),
            event_log: Vec::new(),
            active: true,
            started_at: Utc::now(),
        }));

        let driver = Driver {
            inner: Arc::clone(&inner),
            channel: connected.channel,
            backend: connected.backend,
            frames: connected.frames,
            frames_open: true,
            playback: connected.playback,
            pipeline: CapturePipeline::new(),
            cmd_rx,
            cmd_tx: cmd_tx.clone(),
            deferred: Vec::new(),
        };

        info!(session_id = %config.session_id, "session active");

        let handle = tokio::spawn(driver.run());

        let session = Arc::new(Self {
            config,
            inner,
            cmd_tx,
            driver: Mutex::new(Some(handle)),
        });

        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Explicit "start recording" entry point
    pub async fn start_recording(&self) -> Result<()> {
        self.command(Command::StartRecording).await
    }

    /// Explicit "stop recording" entry point: commits the buffer and, when a
    /// transcript exists, requests a response
    pub async fn stop_recording(&self) -> Result<()> {
        self.command(Command::StopRecording).await
    }

    /// Inject assistant speech into the conversation
    pub async fn say(&self, text: String) -> Result<()> {
        self.command(Command::Speak(text)).await
    }

    /// Stop the session and release all transport resources.
    ///
    /// Stopping an already-stopped session is a no-op.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
        if let Some(handle) = self.driver.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "session driver panicked");
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        let duration = Utc::now().signed_duration_since(inner.started_at);
        SessionStatus {
            active: inner.active,
            turn_state: inner.machine.state(),
            transcript: inner.machine.transcript().to_string(),
            last_utterance: inner.machine.last_utterance().to_string(),
            started_at: inner.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            events_logged: inner.event_log.len(),
            results_count: inner.extractor.len(),
        }
    }

    /// Extracted assessment results, newest first
    pub async fn results(&self) -> Vec<AssessmentResult> {
        self.inner.lock().await.extractor.results().to_vec()
    }

    /// Event log, newest first, optionally truncated
    pub async fn events(&self, limit: Option<usize>) -> Vec<Value> {
        let inner = self.inner.lock().await;
        match limit {
            Some(n) => inner.event_log.iter().take(n).cloned().collect(),
            None => inner.event_log.clone(),
        }
    }

    async fn command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Fetch a credential and establish a full session from service config
pub async fn connect(config: &Config, cancel: Arc<AtomicBool>) -> Result<Arc<AssessmentSession>> {
    let client = reqwest::Client::new();
    let credential = transport::negotiate::fetch_credential(&client, &config.realtime.token_url).await?;

    let connected = transport::connect(&config.realtime, &config.audio, &credential).await?;

    let session_config = SessionConfig {
        seed_instructions: config.realtime.instructions.clone(),
        ..SessionConfig::default()
    };

    AssessmentSession::activate(session_config, connected, &cancel).await
}

/// The single task that serializes every state transition and send.
///
/// All suspension points are at the transport boundary; there is no queue of
/// pending transitions. Capture chunks, inbound messages, and UI commands
/// are interleaved here in arrival order.
struct Driver {
    inner: Arc<Mutex<Inner>>,
    channel: Box<dyn ControlChannel>,
    backend: Box<dyn AudioBackend>,
    frames: mpsc::Receiver<AudioFrame>,
    frames_open: bool,
    playback: Box<dyn PlaybackSink>,
    pipeline: CapturePipeline,
    cmd_rx: mpsc::Receiver<Command>,
    cmd_tx: mpsc::Sender<Command>,
    /// Deferred follow-up tasks, aborted on teardown
    deferred: Vec<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self) {
        // Activation clears the log and transcript, then seeds context.
        let effects = {
            let mut inner = self.inner.lock().await;
            inner.event_log.clear();
            inner.machine.on_activated()
        };
        if self.apply(effects).await.is_err() {
            self.teardown().await;
            return;
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(Command::Close) => break,
                        Some(cmd) => {
                            let effects = {
                                let mut inner = self.inner.lock().await;
                                match cmd {
                                    Command::StartRecording => inner.machine.on_start_recording(),
                                    Command::StopRecording => inner.machine.on_stop_recording(),
                                    Command::Speak(text) => inner.machine.on_speak(text),
                                    Command::Respond(instructions) => inner.machine.on_respond(instructions),
                                    Command::Close => unreachable!(),
                                }
                            };
                            if self.apply(effects).await.is_err() {
                                break;
                            }
                        }
                    }
                }

                msg = self.channel.recv() => {
                    match msg {
                        None => {
                            warn!("control channel lost");
                            break;
                        }
                        Some(ChannelMessage::Media(samples)) => {
                            self.playback.push(&samples);
                        }
                        Some(ChannelMessage::Control(text)) => {
                            match decode_event(&text) {
                                Err(e) => {
                                    error!(error = %e, "malformed event stream, closing session");
                                    break;
                                }
                                Ok((raw, event)) => {
                                    let effects = {
                                        let mut inner = self.inner.lock().await;
                                        inner.event_log.insert(0, raw);
                                        inner.machine.on_server_event(&event)
                                    };
                                    if self.apply(effects).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }

                frame = self.frames.recv(), if self.frames_open => {
                    match frame {
                        None => {
                            warn!("capture stream ended");
                            self.frames_open = false;
                        }
                        Some(frame) => {
                            // Chunks outside a recording turn are dropped,
                            // never queued across the boundary.
                            if self.pipeline.is_recording() {
                                let event = ClientEvent::AppendAudio { samples: frame.samples };
                                if self.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Apply one transition's effects: capture first, then sends in order,
    /// then the tool-call hand-off.
    async fn apply(&mut self, effects: Effects) -> Result<()> {
        match effects.capture {
            CaptureAction::Start => {
                self.pipeline.start();
            }
            CaptureAction::Stop => {
                self.pipeline.stop();
            }
            CaptureAction::None => {}
        }

        for event in effects.outbound {
            self.send(event).await?;
        }

        if let Some(call) = effects.tool_call {
            self.observe_tool_call(&call).await;
        }

        Ok(())
    }

    // The event is logged only once the channel accepted it; a failed send
    // must not leave a phantom entry in the UI log.
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let wire = encode_event(&event, None);
        let text = wire.to_string();
        self.channel.send(text).await.map_err(|e| {
            error!(error = %e, "control channel send failed");
            e
        })?;
        self.inner.lock().await.event_log.insert(0, wire);
        Ok(())
    }

    async fn observe_tool_call(&mut self, call: &ToolCallEvent) {
        let accepted = {
            let mut inner = self.inner.lock().await;
            inner.extractor.observe(call)
        };

        match accepted {
            Ok(true) => {
                info!(call_id = %call.call_id, "assessment result recorded");
                // Close the loop: ask the model to speak about the result so
                // the conversation does not stall after the tool call.
                let tx = self.cmd_tx.clone();
                self.deferred.push(tokio::spawn(async move {
                    tokio::time::sleep(FOLLOW_UP_DELAY).await;
                    let _ = tx
                        .send(Command::Respond(FOLLOW_UP_INSTRUCTIONS.to_string()))
                        .await;
                }));
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, call_id = %call.call_id, "tool call rejected"),
        }
    }

    async fn teardown(&mut self) {
        for handle in self.deferred.drain(..) {
            handle.abort();
        }
        self.pipeline.stop();

        let _ = self.channel.close().await;
        if let Err(e) = self.backend.stop().await {
            error!(error = %e, "failed to stop capture backend");
        }
        self.playback.stop();

        let mut inner = self.inner.lock().await;
        inner.machine.on_deactivated();
        inner.active = false;

        info!("session torn down");
    }
}

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::channel::{ws_endpoint, ControlChannel, WsControlChannel};
use super::negotiate;
use crate::audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, CpalPlayback, PlaybackSink,
};
use crate::config::{AudioConfig, RealtimeConfig};
use crate::error::Result;

/// An established transport session: the resources the driver task takes
/// exclusive ownership of. No component outside the session may hold these
/// past close.
pub struct Connected {
    pub channel: Box<dyn ControlChannel>,
    pub backend: Box<dyn AudioBackend>,
    pub frames: mpsc::Receiver<AudioFrame>,
    pub playback: Box<dyn PlaybackSink>,
    /// Remote session description from negotiation
    pub remote_description: String,
}

impl Connected {
    /// Release every transport resource: capture device, control channel,
    /// playback sink.
    pub async fn close(mut self) {
        let _ = self.channel.close().await;
        if let Err(e) = self.backend.stop().await {
            warn!(error = %e, "failed to stop capture backend");
        }
        self.playback.stop();
    }
}

/// Establish the transport session.
///
/// Order matters: (1) acquire the microphone, (2) open the control channel —
/// the single synchronization point the rest of the system waits on, (3)
/// negotiate with the supplied credential, (4) wire the inbound media track
/// to a playback sink. A failure at any step unwinds the earlier ones and
/// leaves the system idle; nothing is retried here.
pub async fn connect(
    realtime: &RealtimeConfig,
    audio: &AudioConfig,
    credential: &str,
) -> Result<Connected> {
    let mut backend = AudioBackendFactory::create(AudioBackendConfig {
        sample_rate: audio.sample_rate,
        channels: audio.channels,
        chunk_ms: audio.chunk_ms,
    })?;
    let frames = backend.start().await?;

    let ws_url = ws_endpoint(&realtime.base_url, &realtime.model);
    let mut channel = match WsControlChannel::open(&ws_url, credential).await {
        Ok(channel) => channel,
        Err(e) => {
            let _ = backend.stop().await;
            return Err(e);
        }
    };

    let client = reqwest::Client::new();
    let offer = negotiate::local_description(audio.sample_rate);
    let remote_description = match negotiate::negotiate(
        &client,
        &realtime.base_url,
        &realtime.model,
        credential,
        &offer,
    )
    .await
    {
        Ok(answer) => answer,
        Err(e) => {
            let _ = channel.close().await;
            let _ = backend.stop().await;
            return Err(e);
        }
    };

    let playback = match CpalPlayback::new() {
        Ok(playback) => playback,
        Err(e) => {
            let _ = channel.close().await;
            let _ = backend.stop().await;
            return Err(e);
        }
    };

    info!(model = %realtime.model, "transport session established");

    Ok(Connected {
        channel: Box::new(channel),
        backend,
        frames,
        playback: Box::new(playback),
        remote_description,
    })
}

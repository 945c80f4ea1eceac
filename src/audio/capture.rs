use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Error, Result};

/// Microphone capture backend built on cpal.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated capture
/// thread that drains the shared sample buffer into timed frames. The async
/// side only sees the frame channel and the stop flag.
pub struct MicBackend {
    config: AudioBackendConfig,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(true)),
            thread: None,
        }
    }
}

#[async_trait]
impl AudioBackend for MicBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            return Err(Error::MediaAcquisition("capture already started".into()));
        }

        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        self.stop_flag.store(false, Ordering::SeqCst);
        let stop_flag = Arc::clone(&self.stop_flag);
        let config = self.config.clone();

        let thread = std::thread::spawn(move || {
            run_capture(config, frames_tx, stop_flag, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.thread = Some(thread);
                debug!(
                    sample_rate = self.config.sample_rate,
                    chunk_ms = self.config.chunk_ms,
                    "microphone capture started"
                );
                Ok(frames_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::MediaAcquisition("capture thread died".into()))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            debug!("microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some() && !self.stop_flag.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

fn run_capture(
    config: AudioBackendConfig,
    frames_tx: mpsc::Sender<AudioFrame>,
    stop_flag: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(Error::MediaAcquisition(
                "no input device available".into(),
            )));
            return;
        }
    };

    let supported = device
        .supported_input_configs()
        .ok()
        .and_then(|mut configs| {
            configs.find(|c| {
                c.channels() == config.channels
                    && c.min_sample_rate() <= SampleRate(config.sample_rate)
                    && c.max_sample_rate() >= SampleRate(config.sample_rate)
            })
        });

    let supported = match supported {
        Some(c) => c,
        None => {
            let _ = ready_tx.send(Err(Error::MediaAcquisition(
                "no suitable input config found".into(),
            )));
            return;
        }
    };

    let stream_config = supported
        .with_sample_rate(SampleRate(config.sample_rate))
        .config();

    let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let callback_buffer = Arc::clone(&buffer);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = callback_buffer.lock() {
                buf.extend(
                    data.iter()
                        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16),
                );
            }
        },
        |err| {
            error!(error = %err, "microphone capture error");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(Error::MediaAcquisition(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(Error::MediaAcquisition(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    let started = Instant::now();
    let cadence = Duration::from_millis(config.chunk_ms);

    while !stop_flag.load(Ordering::SeqCst) {
        std::thread::sleep(cadence);

        let samples = match buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => break,
        };
        if samples.is_empty() {
            continue;
        }

        let frame = AudioFrame {
            samples,
            sample_rate: config.sample_rate,
            channels: config.channels,
            timestamp_ms: started.elapsed().as_millis() as u64,
        };

        if frames_tx.blocking_send(frame).is_err() {
            break;
        }
    }

    drop(stream);
}

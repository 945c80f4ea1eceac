use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Sample rate of the inbound media track from the remote endpoint
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Sink for the inbound media track
pub trait PlaybackSink: Send {
    /// Queue decoded PCM samples for playback
    fn push(&mut self, samples: &[i16]);

    /// Stop playback and release the output device
    fn stop(&mut self);
}

/// Plays queued PCM to the default output device.
///
/// As with capture, the cpal stream is not `Send` and lives on its own
/// thread; `push` only appends to the shared queue the output callback
/// drains, so playback is continuous across frames.
pub struct CpalPlayback {
    queue: Arc<Mutex<VecDeque<i16>>>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalPlayback {
    pub fn new() -> Result<Self> {
        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let thread_queue = Arc::clone(&queue);
        let thread_stop = Arc::clone(&stop_flag);

        let thread = std::thread::spawn(move || {
            run_playback(thread_queue, thread_stop, ready_tx);
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                queue,
                stop_flag,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                stop_flag.store(true, Ordering::SeqCst);
                Err(Error::MediaAcquisition("playback setup timed out".into()))
            }
        }
    }
}

impl PlaybackSink for CpalPlayback {
    fn push(&mut self, samples: &[i16]) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples.iter().copied());
        }
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("audio playback stopped");
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_playback(
    queue: Arc<Mutex<VecDeque<i16>>>,
    stop_flag: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<Result<()>>,
) {
    let host = cpal::default_host();

    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(Error::MediaAcquisition(
                "no output device available".into(),
            )));
            return;
        }
    };

    let supported = device
        .supported_output_configs()
        .ok()
        .and_then(|mut configs| {
            configs.find(|c| {
                c.channels() <= 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        });

    let supported = match supported {
        Some(c) => c,
        None => {
            let _ = ready_tx.send(Err(Error::MediaAcquisition(
                "no suitable output config found".into(),
            )));
            return;
        }
    };

    let stream_config = supported
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = stream_config.channels as usize;

    let callback_queue = Arc::clone(&queue);
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut queue = match callback_queue.lock() {
                Ok(q) => q,
                Err(_) => return,
            };
            for frame in data.chunks_mut(channels) {
                let sample = queue
                    .pop_front()
                    .map(|s| f32::from(s) / 32768.0)
                    .unwrap_or(0.0);
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        |err| {
            error!(error = %err, "audio playback error");
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

    while !stop_flag.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
}

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Audio sample data (16-bit PCM, mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for the capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture sample rate (16 kHz for speech)
    pub sample_rate: u32,
    /// Channel count (1 = mono)
    pub channels: u16,
    /// Chunk cadence in milliseconds (affects latency)
    pub chunk_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_ms: 100,
        }
    }
}

/// Microphone capture backend trait
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames on the
    /// configured cadence. Fails with `MediaAcquisition` when no suitable
    /// input device is available.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        Ok(Box::new(super::capture::MicBackend::new(config)))
    }
}

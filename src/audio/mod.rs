pub mod backend;
pub mod capture;
pub mod pipeline;
pub mod playback;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame};
pub use capture::MicBackend;
pub use pipeline::CapturePipeline;
pub use playback::{CpalPlayback, PlaybackSink, PLAYBACK_SAMPLE_RATE};

use std::sync::atomic::{AtomicBool, Ordering};

/// Logical recording gate for the capture pipeline.
///
/// The microphone stream runs for the whole session; this gate decides which
/// chunks are forwarded to the protocol encoder. Chunks produced while the
/// gate is off are dropped, never queued. `start` and `stop` are idempotent.
#[derive(Debug, Default)]
pub struct CapturePipeline {
    recording: AtomicBool,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Returns false when already recording.
    pub fn start(&self) -> bool {
        !self.recording.swap(true, Ordering::SeqCst)
    }

    /// Close the gate. Returns false when already stopped.
    pub fn stop(&self) -> bool {
        self.recording.swap(false, Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

use async_trait::async_trait;

use crate::domain::errors::RecordingError;
use crate::domain::keyframe::Keyframe;

// Port for reading the current time in seconds. Must never run backwards within a session.
pub trait Clock: Send + Sync {
    fn now_seconds(&self) -> f64;
}

// Port for the durable writer a recording is appended to, one keyframe per line.
#[async_trait]
pub trait RecordingSink: Send {
    async fn append(&mut self, keyframe: &Keyframe) -> Result<(), RecordingError>;
    async fn flush(&mut self) -> Result<(), RecordingError>;
    // Flushes and releases the handle; closing twice is a no-op.
    async fn close(&mut self) -> Result<(), RecordingError>;
}

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::errors::RecordingError;
use crate::domain::keyframe::Keyframe;
use crate::domain::ports::RecordingSink;

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub append: bool,
    pub flush: bool,
}

#[derive(Default)]
pub(crate) struct SinkLog {
    pub frames: Vec<Keyframe>,
    pub flushes: usize,
    pub closes: usize,
    closed: bool,
}

// In-memory recording sink; clones share the same log.
#[derive(Clone, Default)]
pub(crate) struct MemorySink {
    log: Arc<Mutex<SinkLog>>,
    failures: FailureFlags,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_failures(mut self, failures: FailureFlags) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn frames(&self) -> Vec<Keyframe> {
        self.log.lock().expect("sink mutex poisoned").frames.clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.log.lock().expect("sink mutex poisoned").closes
    }

    pub(crate) fn flushes(&self) -> usize {
        self.log.lock().expect("sink mutex poisoned").flushes
    }
}

#[async_trait]
impl RecordingSink for MemorySink {
    async fn append(&mut self, keyframe: &Keyframe) -> Result<(), RecordingError> {
        let mut log = self.log.lock().expect("sink mutex poisoned");
        if log.closed {
            return Err(RecordingError::Closed);
        }
        if self.failures.append {
            return Err(RecordingError::Io(std::io::Error::other("append failed")));
        }
        log.frames.push(keyframe.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), RecordingError> {
        let mut log = self.log.lock().expect("sink mutex poisoned");
        if self.failures.flush {
            return Err(RecordingError::Io(std::io::Error::other("flush failed")));
        }
        log.flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RecordingError> {
        let mut log = self.log.lock().expect("sink mutex poisoned");
        if !log.closed {
            log.closed = true;
            log.closes += 1;
        }
        Ok(())
    }
}

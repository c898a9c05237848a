// Domain-level errors for recording storage.

use std::fmt;

#[derive(Debug)]
pub enum RecordingError {
    /// Underlying file or stream failure.
    Io(std::io::Error),
    /// The sink was already closed.
    Closed,
    /// A keyframe could not be encoded.
    Encode(String),
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::Io(e) => write!(f, "recording io error: {e}"),
            RecordingError::Closed => f.write_str("recording sink already closed"),
            RecordingError::Encode(e) => write!(f, "failed to encode keyframe: {e}"),
        }
    }
}

impl std::error::Error for RecordingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(e: std::io::Error) -> Self {
        RecordingError::Io(e)
    }
}

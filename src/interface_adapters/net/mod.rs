// Network adapter: the line-protocol server and the synchronizing client.

pub mod client;
pub mod lines;
pub mod server;

pub use client::SyncClient;
pub use lines::{BoundedLines, LineEvent};
pub use server::{MAX_LINE_LEN, MAX_NAME_LEN, accept_loop, keyframe_broadcaster};

use std::fmt;

#[derive(Debug)]
pub enum NetError {
    Io(std::io::Error),
    // No JOIN-ACK within the bounded wait. Not retried.
    JoinTimeout,
    JoinRejected(String),
    ClosedBeforeAck,
    // The client was closed, or joined twice.
    InvalidState(&'static str),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Io(e) => write!(f, "socket error: {e}"),
            NetError::JoinTimeout => f.write_str("timed out waiting for JOIN-ACK"),
            NetError::JoinRejected(reason) => write!(f, "join rejected: {reason}"),
            NetError::ClosedBeforeAck => f.write_str("connection closed before JOIN-ACK"),
            NetError::InvalidState(what) => write!(f, "invalid client state: {what}"),
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetError {
    fn from(e: std::io::Error) -> Self {
        NetError::Io(e)
    }
}

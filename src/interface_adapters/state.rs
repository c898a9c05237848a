use crate::use_cases::GameEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc, watch};

#[derive(Clone)]
pub struct AppState {
    // Events flowing from connections into the world loop.
    pub events_tx: mpsc::Sender<GameEvent>,
    // Encoded keyframe lines (newline included), shared across all connections.
    pub frames_tx: broadcast::Sender<Arc<str>>,
    // Open connections, for counting and shutdown logging.
    pub connections: ConnectionRegistry,
    // Flips to true once the server is stopping.
    pub shutdown_rx: watch::Receiver<bool>,
    // Upper bound on a single socket write before the line is skipped.
    pub write_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub addr: SocketAddr,
    pub name: Option<String>,
}

/// Shared table of open connections keyed by connection id.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<u64, ConnectionInfo>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn_id: u64, addr: SocketAddr) {
        self.inner
            .write()
            .await
            .insert(conn_id, ConnectionInfo { addr, name: None });
    }

    pub async fn set_name(&self, conn_id: u64, name: &str) {
        if let Some(info) = self.inner.write().await.get_mut(&conn_id) {
            info.name = Some(name.to_string());
        }
    }

    pub async fn unregister(&self, conn_id: u64) -> Option<ConnectionInfo> {
        self.inner.write().await.remove(&conn_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn joined(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|info| info.name.is_some())
            .count()
    }
}

// Framework bootstrap for the simulation server runtime.

use crate::domain::Keyframe;
use crate::frameworks::config;
use crate::interface_adapters::clock::SystemClock;
use crate::interface_adapters::net::{accept_loop, keyframe_broadcaster};
use crate::interface_adapters::state::{AppState, ConnectionRegistry};
use crate::interface_adapters::storage::{FileSink, RecordingDirectory};
use crate::use_cases::{
    GameEvent, Recorder, RecordingConfig, SimContext, SimSettings, SnapshotReceiver, WorldHandle,
    spawn_world,
};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::{io::Result, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

// Bound on waiting for the network tasks once shutdown is signalled.
const TASK_STOP_GRACE: Duration = Duration::from_secs(2);

pub fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub dir: PathBuf,
    pub config: RecordingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub sim: SimSettings,
    pub broadcast_interval: Duration,
    pub write_timeout: Duration,
    /// `None` disables recording.
    pub recording: Option<RecordingSettings>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            sim: SimSettings::default(),
            broadcast_interval: Duration::from_millis(50),
            write_timeout: config::WRITE_TIMEOUT,
            recording: None,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let recording = config::recording_enabled().then(|| RecordingSettings {
            dir: config::recordings_dir(),
            config: config::recording_config(),
        });
        Self {
            sim: config::sim_settings(),
            broadcast_interval: config::broadcast_interval(),
            write_timeout: config::WRITE_TIMEOUT,
            recording,
        }
    }
}

/// A running server. Dropping it signals shutdown without waiting.
pub struct ServerHandle {
    local_addr: SocketAddr,
    connections: ConnectionRegistry,
    snapshots: SnapshotReceiver,
    shutdown_tx: watch::Sender<bool>,
    world: Option<WorldHandle>,
    recorder: Option<Recorder>,
    recording_path: Option<PathBuf>,
    tasks: Vec<JoinHandle<()>>,
}

/// Starts the world loop, the keyframe broadcaster, the optional recorder and the accept
/// loop on `listener`.
pub async fn spawn(listener: TcpListener, settings: ServerSettings) -> Result<ServerHandle> {
    let local_addr = listener.local_addr()?;

    // events_tx/rx: joins, leaves and inputs from every connection go to the one world loop.
    let (events_tx, events_rx) = mpsc::channel::<GameEvent>(config::EVENT_CHANNEL_CAPACITY);
    // frames_tx: encoded keyframe lines shared across all connections.
    let (frames_tx, _) = broadcast::channel::<Arc<str>>(config::FRAME_BROADCAST_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut ctx = SimContext::new(settings.sim);
    ctx.populate();
    let (world, snapshots) = spawn_world(ctx, events_rx, Arc::new(SystemClock))?;

    let (recorder, recording_path) = match settings.recording {
        Some(recording) => start_recorder(recording, snapshots.clone()).await,
        None => (None, None),
    };

    let connections = ConnectionRegistry::new();
    let state = Arc::new(AppState {
        events_tx,
        frames_tx: frames_tx.clone(),
        connections: connections.clone(),
        shutdown_rx: shutdown_rx.clone(),
        write_timeout: settings.write_timeout,
    });

    let tasks = vec![
        tokio::spawn(keyframe_broadcaster(
            snapshots.clone(),
            frames_tx,
            settings.broadcast_interval,
            shutdown_rx,
        )),
        tokio::spawn(accept_loop(listener, state)),
    ];

    tracing::info!(address = %local_addr, "listening");

    Ok(ServerHandle {
        local_addr,
        connections,
        snapshots,
        shutdown_tx,
        world: Some(world),
        recorder,
        recording_path,
        tasks,
    })
}

async fn start_recorder(
    recording: RecordingSettings,
    snapshots: SnapshotReceiver,
) -> (Option<Recorder>, Option<PathBuf>) {
    let path = RecordingDirectory::new(&recording.dir).new_recording_path();
    match FileSink::create(&path).await {
        Ok(sink) => (
            Some(Recorder::spawn(sink, snapshots, recording.config)),
            Some(path),
        ),
        Err(e) => {
            // The session still runs; it just is not recorded.
            tracing::error!(path = %path.display(), error = %e, "failed to open recording");
            (None, None)
        }
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    pub fn latest_snapshot(&self) -> Option<Arc<Keyframe>> {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> SnapshotReceiver {
        self.snapshots.clone()
    }

    pub fn recording_path(&self) -> Option<&PathBuf> {
        self.recording_path.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stops accepting, disconnects every client, closes the recording and stops the world
    /// loop. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        tracing::info!(
            connections = self.connections.len().await,
            "shutting down"
        );

        for task in self.tasks.drain(..) {
            if tokio::time::timeout(TASK_STOP_GRACE, task).await.is_err() {
                tracing::warn!("network task did not stop in time");
            }
        }

        if let Some(mut recorder) = self.recorder.take() {
            if let Some(stats) = recorder.stop().await {
                tracing::info!(
                    written = stats.written,
                    skipped = stats.skipped,
                    dropped = stats.dropped,
                    failed = stats.failed,
                    "recording finished"
                );
            }
        }

        if let Some(mut world) = self.world.take() {
            // The world thread is joined with a blocking wait; keep it off the runtime workers.
            let stopped =
                tokio::task::spawn_blocking(move || world.stop(config::WORLD_STOP_GRACE)).await;
            match stopped {
                Ok(true) => {}
                Ok(false) => tracing::warn!("world loop did not stop within grace period"),
                Err(e) => tracing::error!(error = %e, "world stop task failed"),
            }
        }
        tracing::info!("server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Serves on `listener` with settings from the environment until Ctrl-C.
pub async fn run(listener: TcpListener) -> Result<()> {
    let mut server = spawn(listener, ServerSettings::from_env()).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    server.shutdown().await;
    Ok(())
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([0, 0, 0, 0], config::server_port()));

    // Bind TCP listener with error handling
    let listener = TcpListener::bind(address).await.inspect_err(|e| {
        tracing::error!(%address, error = %e, "failed to bind");
    })?;

    run(listener).await
}

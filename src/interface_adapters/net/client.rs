//! Client side of the synchronizer: joins a server, buffers the keyframes it receives and
//! samples interpolated positions a fixed delay behind the local clock.

use super::NetError;
use super::lines::{BoundedLines, LineEvent};
use crate::domain::ports::Clock;
use crate::domain::{EntityId, Keyframe};
use crate::interface_adapters::protocol::{
    ServerLine, format_input, format_join, parse_server_line,
};
use crate::use_cases::throttle::{log_ready, should_log};
use crate::use_cases::{SyncBuffer, SyncSettings};

use glam::Vec2;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

// Received-frame count between progress log lines.
const FRAME_LOG_EVERY: u64 = 50;
// Longest server line accepted; longer ones are skipped.
const MAX_SERVER_LINE_LEN: usize = 1 << 20;

type LegacyMirror = HashMap<EntityId, Vec2>;

/// State shared between the client handle and its receive task.
struct Shared {
    buffer: Mutex<SyncBuffer>,
    legacy: Mutex<LegacyMirror>,
    received: AtomicU64,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, SyncBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn legacy(&self) -> MutexGuard<'_, LegacyMirror> {
        self.legacy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept_keyframe(&self, keyframe: Keyframe) {
        if self.buffer().push(keyframe) {
            let received = self.received.fetch_add(1, Ordering::Relaxed) + 1;
            if received % FRAME_LOG_EVERY == 0 {
                debug!(received, "keyframes received");
            }
        }
    }

    fn accept_legacy(&self, entries: Vec<(EntityId, Vec2)>) {
        self.legacy().extend(entries);
    }
}

pub struct SyncClient {
    server: SocketAddr,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Option<BoundedLines<OwnedReadHalf>>,
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    joined: bool,
    shutdown_tx: watch::Sender<bool>,
    receive_task: Option<JoinHandle<()>>,
}

impl SyncClient {
    pub async fn connect(
        server: SocketAddr,
        settings: SyncSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NetError> {
        let stream = TcpStream::connect(server).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        let (shutdown_tx, _) = watch::channel(false);
        info!(%server, "connected");

        Ok(Self {
            server,
            writer: tokio::sync::Mutex::new(Some(writer)),
            reader: Some(BoundedLines::new(reader, MAX_SERVER_LINE_LEN)),
            shared: Arc::new(Shared {
                buffer: Mutex::new(SyncBuffer::new(settings)),
                legacy: Mutex::new(HashMap::new()),
                received: AtomicU64::new(0),
            }),
            clock,
            joined: false,
            shutdown_tx,
            receive_task: None,
        })
    }

    /// Sends `JOIN:<name>` and blocks up to `wait` for `JOIN-ACK`.
    ///
    /// Keyframes that arrive before the ack are buffered. A timeout is final; callers that
    /// want another attempt reconnect.
    pub async fn join(&mut self, name: &str, wait: Duration) -> Result<(), NetError> {
        if self.joined {
            return Err(NetError::InvalidState("already joined"));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(NetError::InvalidState("receive loop already started"));
        };

        send_line(&self.writer, &format_join(name))
            .await
            .map_err(hangup_as_closed)?;

        let shared = &self.shared;
        let wait_for_ack = async {
            loop {
                let line = match reader.next_line().await.map_err(NetError::from) {
                    Ok(Some(LineEvent::Line(line))) => line,
                    Ok(Some(LineEvent::TooLong)) => {
                        debug!("skipping over-long line before join ack");
                        continue;
                    }
                    Ok(None) => return Err(NetError::ClosedBeforeAck),
                    Err(e) => return Err(hangup_as_closed(e)),
                };
                match parse_server_line(&line) {
                    ServerLine::JoinAck => return Ok(()),
                    ServerLine::JoinReject(reason) => return Err(NetError::JoinRejected(reason)),
                    ServerLine::Keyframe(keyframe) => shared.accept_keyframe(keyframe),
                    ServerLine::LegacyState(entries) => shared.accept_legacy(entries),
                    ServerLine::Unknown => debug!("ignoring line before join ack"),
                }
            }
        };

        match timeout(wait, wait_for_ack).await {
            Ok(Ok(())) => {
                self.joined = true;
                info!(server = %self.server, name, "joined");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(server = %self.server, wait_ms = wait.as_millis(), "join timed out");
                Err(NetError::JoinTimeout)
            }
        }
    }

    /// Starts the background task that feeds received lines into the buffer.
    /// Returns false if it is already running or the client was closed.
    pub fn start_receive_loop(&mut self) -> bool {
        let Some(lines) = self.reader.take() else {
            return false;
        };
        let shared = self.shared.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let span = info_span!("sync_client", server = %self.server);
        self.receive_task = Some(tokio::spawn(
            receive_loop(lines, shared, shutdown_rx).instrument(span),
        ));
        true
    }

    pub async fn send_input(&self, velocity: Vec2) -> Result<(), NetError> {
        send_line(&self.writer, &format_input(velocity)).await
    }

    /// Interpolated positions for `now` minus the interpolation delay.
    pub fn sample(&self, now: f64) -> HashMap<EntityId, Vec2> {
        self.shared.buffer().sample(now)
    }

    pub fn sample_now(&self) -> HashMap<EntityId, Vec2> {
        self.sample(self.clock.now_seconds())
    }

    /// Last known positions from legacy `STATE:` lines.
    pub fn legacy_mirror(&self) -> HashMap<EntityId, Vec2> {
        self.shared.legacy().clone()
    }

    pub fn received_frames(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Stops the receive task and shuts the socket down. Closing twice is a no-op.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.receive_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "receive task failed");
            }
        }
        self.reader = None;
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "socket shutdown error");
            }
            info!(server = %self.server, "disconnected");
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// A peer that hung up mid-join shows up as a reset or broken pipe, not a clean EOF.
fn hangup_as_closed(e: NetError) -> NetError {
    match e {
        NetError::Io(err)
            if matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            NetError::ClosedBeforeAck
        }
        other => other,
    }
}

async fn send_line(
    writer: &tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    line: &str,
) -> Result<(), NetError> {
    let mut guard = writer.lock().await;
    let Some(writer) = guard.as_mut() else {
        return Err(NetError::InvalidState("client closed"));
    };
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    writer.write_all(buf.as_bytes()).await?;
    Ok(())
}

async fn receive_loop(
    mut lines: BoundedLines<OwnedReadHalf>,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ignored: u64 = 0;
    let mut last_ignored_log = log_ready();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(LineEvent::TooLong)) => {
                    ignored += 1;
                    if should_log(&mut last_ignored_log) {
                        warn!(max = MAX_SERVER_LINE_LEN, "skipping over-long server line");
                    }
                }
                Ok(Some(LineEvent::Line(line))) => match parse_server_line(&line) {
                    ServerLine::Keyframe(keyframe) => shared.accept_keyframe(keyframe),
                    ServerLine::LegacyState(entries) => shared.accept_legacy(entries),
                    ServerLine::JoinAck | ServerLine::JoinReject(_) | ServerLine::Unknown => {
                        ignored += 1;
                        if should_log(&mut last_ignored_log) {
                            debug!(ignored, "ignoring unrecognised server line");
                        }
                    }
                },
                Ok(None) => {
                    info!("server closed the stream");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "read failed; receive loop exiting");
                    break;
                }
            }
        }
    }

    debug!(
        received = shared.received.load(Ordering::Relaxed),
        ignored, "receive loop stopped"
    );
}

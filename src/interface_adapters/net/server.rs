use super::lines::{BoundedLines, LineEvent};
use crate::domain::SchemaTag;
use crate::interface_adapters::protocol::{
    ClientCommand, JOIN_ACK, encode_keyframe, format_join_reject, parse_client_line,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::next_conn_id;
use crate::use_cases::throttle::{log_ready, should_log};
use crate::use_cases::{GameEvent, SnapshotReceiver};

use glam::Vec2;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};

// Consecutive timed-out writes before a client is treated as dead.
const MAX_STALLED_WRITES: u32 = 10;
// Longest inbound line; anything longer ends the connection.
pub const MAX_LINE_LEN: usize = 4096;
// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;
// Unrecognised lines tolerated per connection.
const MAX_INVALID_LINES: u32 = 10;
// Retry cadence for an input the world queue had no room for.
const INPUT_RETRY: Duration = Duration::from_millis(5);

/// Accepts connections until shutdown and spawns one task per socket.
pub async fn accept_loop(listener: TcpListener, state: Arc<AppState>) {
    let mut shutdown_rx = state.shutdown_rx.clone();
    let mut last_accept_error_log = log_ready();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(stream, addr, state.clone()));
                }
                Err(e) => {
                    // Usually fd exhaustion; back off briefly instead of spinning.
                    if should_log(&mut last_accept_error_log) {
                        warn!(error = %e, "accept failed");
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    info!("accept loop stopped");
}

/// Encodes the latest world snapshot on a fixed cadence and fans the line out to every
/// connection. Each snapshot is encoded once, however many clients are connected.
pub async fn keyframe_broadcaster(
    snapshots: SnapshotReceiver,
    frames_tx: broadcast::Sender<Arc<str>>,
    cadence: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(cadence.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sent: Option<f64> = None;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(snapshot) = snapshots.borrow().clone() else {
                    continue;
                };
                // Skip when the world has not produced a new snapshot since the last send.
                if last_sent == Some(snapshot.timestamp()) {
                    continue;
                }

                let line = match encode_keyframe(&snapshot, SchemaTag::Wire) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "failed to encode keyframe");
                        continue;
                    }
                };
                last_sent = Some(snapshot.timestamp());
                // No receivers just means nobody is connected.
                let _ = frames_tx.send(Arc::from(format!("{line}\n")));
            }
        }
    }

    debug!("keyframe broadcaster stopped");
}

enum LoopControl {
    Continue,
    Disconnect,
}

struct ConnCtx {
    conn_id: u64,
    name: Option<String>,
    events_tx: mpsc::Sender<GameEvent>,
    write_timeout: Duration,

    lines_in: u64,
    frames_out: u64,
    frames_skipped: u64,
    stalled_writes: u32,
    invalid_lines: u32,
    // Newest input not yet accepted by the world queue.
    pending_input: Option<Vec2>,

    last_input_full_log: Instant,
    last_invalid_log: Instant,
    last_lag_log: Instant,
    last_stall_log: Instant,
}

impl ConnCtx {
    fn new(conn_id: u64, events_tx: mpsc::Sender<GameEvent>, write_timeout: Duration) -> Self {
        let now = log_ready();
        Self {
            conn_id,
            name: None,
            events_tx,
            write_timeout,
            lines_in: 0,
            frames_out: 0,
            frames_skipped: 0,
            stalled_writes: 0,
            invalid_lines: 0,
            pending_input: None,
            last_input_full_log: now,
            last_invalid_log: now,
            last_lag_log: now,
            last_stall_log: now,
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<AppState>) {
    let conn_id = next_conn_id();
    let span = info_span!("conn", conn_id, %addr, name = tracing::field::Empty);
    run_connection(stream, addr, conn_id, state)
        .instrument(span)
        .await;
}

async fn run_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u64,
    state: Arc<AppState>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }

    // Subscribe before anything else so no broadcast is missed.
    let mut frames_rx = state.frames_tx.subscribe();
    let mut shutdown_rx = state.shutdown_rx.clone();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BoundedLines::new(reader, MAX_LINE_LEN);

    state.connections.register(conn_id, addr).await;
    info!("client connected");

    let mut ctx = ConnCtx::new(conn_id, state.events_tx.clone(), state.write_timeout);

    loop {
        let control = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    LoopControl::Disconnect
                } else {
                    LoopControl::Continue
                }
            }

            line = lines.next_line() => match line {
                Ok(Some(LineEvent::Line(line))) => {
                    handle_line(&line, &mut ctx, &mut writer, &state).await
                }
                Ok(Some(LineEvent::TooLong)) => {
                    warn!(max = MAX_LINE_LEN, "inbound line too long; disconnecting");
                    LoopControl::Disconnect
                }
                Ok(None) => {
                    debug!("client closed the stream");
                    LoopControl::Disconnect
                }
                Err(e) => {
                    debug!(error = %e, "read failed");
                    LoopControl::Disconnect
                }
            },

            frame = frames_rx.recv() => match frame {
                Ok(frame) => forward_frame(&frame, &mut ctx, &mut writer).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // The next recv yields the oldest retained frame; older ones are gone.
                    ctx.frames_skipped += missed;
                    if should_log(&mut ctx.last_lag_log) {
                        warn!(missed, "client lagged behind keyframe broadcast; skipping ahead");
                    }
                    LoopControl::Continue
                }
                Err(broadcast::error::RecvError::Closed) => LoopControl::Disconnect,
            },

            _ = tokio::time::sleep(INPUT_RETRY), if ctx.pending_input.is_some() => {
                flush_pending_input(&mut ctx)
            }
        };

        if let LoopControl::Disconnect = control {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "socket shutdown error");
    }
    disconnect_cleanup(&ctx, &state).await;
}

async fn handle_line(
    line: &str,
    ctx: &mut ConnCtx,
    writer: &mut OwnedWriteHalf,
    state: &AppState,
) -> LoopControl {
    ctx.lines_in += 1;

    match parse_client_line(line) {
        ClientCommand::Join { name } => {
            if name.is_empty() {
                let reply = format!("{}\n", format_join_reject("empty name"));
                return write_line(writer, &reply, ctx).await;
            }
            if name.chars().count() > MAX_NAME_LEN {
                let reply = format!("{}\n", format_join_reject("name too long"));
                return write_line(writer, &reply, ctx).await;
            }

            // Acknowledge first; the ack is never batched behind keyframes.
            let control = write_line(writer, &format!("{JOIN_ACK}\n"), ctx).await;
            if ctx.name.is_some() {
                if should_log(&mut ctx.last_invalid_log) {
                    debug!("duplicate join acknowledged without respawn");
                }
                return control;
            }

            tracing::Span::current().record("name", name.as_str());
            state.connections.set_name(ctx.conn_id, &name).await;
            if ctx
                .events_tx
                .send(GameEvent::Join {
                    conn_id: ctx.conn_id,
                    name: name.clone(),
                })
                .await
                .is_err()
            {
                warn!("world loop gone; disconnecting");
                return LoopControl::Disconnect;
            }
            info!(name = %name, "client joined");
            ctx.name = Some(name);
            control
        }
        ClientCommand::Input { velocity } => {
            if ctx.name.is_none() {
                if should_log(&mut ctx.last_invalid_log) {
                    debug!("input before join ignored");
                }
                return LoopControl::Continue;
            }
            if !velocity.is_finite() {
                if should_log(&mut ctx.last_invalid_log) {
                    warn!("invalid input values (NaN/inf); dropping");
                }
                return LoopControl::Continue;
            }

            // A newer input replaces one still waiting for queue space.
            ctx.pending_input = Some(velocity);
            flush_pending_input(ctx)
        }
        ClientCommand::Unknown => {
            ctx.invalid_lines = ctx.invalid_lines.saturating_add(1);
            if ctx.invalid_lines > MAX_INVALID_LINES {
                warn!(invalid = ctx.invalid_lines, "too many invalid lines; disconnecting");
                return LoopControl::Disconnect;
            }
            if should_log(&mut ctx.last_invalid_log) {
                debug!(invalid = ctx.invalid_lines, "unrecognised line ignored");
            }
            LoopControl::Continue
        }
    }
}

/// Offers the pending input to the world queue. On a full queue it stays pending and the
/// connection loop retries it, unless a newer input replaces it first.
fn flush_pending_input(ctx: &mut ConnCtx) -> LoopControl {
    let Some(velocity) = ctx.pending_input else {
        return LoopControl::Continue;
    };
    match ctx.events_tx.try_send(GameEvent::Input {
        conn_id: ctx.conn_id,
        velocity,
    }) {
        Ok(()) => {
            ctx.pending_input = None;
            LoopControl::Continue
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            if should_log(&mut ctx.last_input_full_log) {
                warn!("input channel full; holding newest input");
            }
            LoopControl::Continue
        }
        Err(mpsc::error::TrySendError::Closed(_)) => LoopControl::Disconnect,
    }
}

async fn forward_frame(
    frame: &str,
    ctx: &mut ConnCtx,
    writer: &mut OwnedWriteHalf,
) -> LoopControl {
    let control = write_line(writer, frame, ctx).await;
    if let LoopControl::Continue = control {
        ctx.frames_out += 1;
    }
    control
}

/// Writes one terminated line within the connection's write timeout.
///
/// A timed-out write is skipped, not retried; the stream may then carry a partial line the
/// client discards. Write errors and too many consecutive stalls end the connection.
async fn write_line(writer: &mut OwnedWriteHalf, line: &str, ctx: &mut ConnCtx) -> LoopControl {
    match timeout(ctx.write_timeout, writer.write_all(line.as_bytes())).await {
        Ok(Ok(())) => {
            ctx.stalled_writes = 0;
            LoopControl::Continue
        }
        Ok(Err(e)) => {
            debug!(error = %e, "write failed");
            LoopControl::Disconnect
        }
        Err(_) => {
            ctx.stalled_writes += 1;
            ctx.frames_skipped += 1;
            if should_log(&mut ctx.last_stall_log) {
                warn!(stalled = ctx.stalled_writes, "slow client; write skipped");
            }
            if ctx.stalled_writes >= MAX_STALLED_WRITES {
                warn!("client stalled too long; disconnecting");
                LoopControl::Disconnect
            } else {
                LoopControl::Continue
            }
        }
    }
}

async fn disconnect_cleanup(ctx: &ConnCtx, state: &AppState) {
    if ctx.name.is_some() {
        // The world may already be gone during shutdown.
        let _ = ctx
            .events_tx
            .send(GameEvent::Leave {
                conn_id: ctx.conn_id,
            })
            .await;
    }
    state.connections.unregister(ctx.conn_id).await;

    info!(
        lines_in = ctx.lines_in,
        frames_out = ctx.frames_out,
        frames_skipped = ctx.frames_skipped,
        invalid_lines = ctx.invalid_lines,
        "client disconnected"
    );
}

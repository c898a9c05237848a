use super::simulation::SimContext;
use super::types::GameEvent;
use crate::domain::Keyframe;
use crate::domain::ports::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Latest snapshot published by the world loop. `None` until the first tick completes.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<Keyframe>>>;

/// Ticks between collision log lines while an overlap persists.
const COLLISION_LOG_EVERY: u64 = 120;

/// Owner of the thread running the fixed-step world loop.
pub struct WorldHandle {
    stop: Arc<AtomicBool>,
    done_rx: std_mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

/// Starts the world loop on its own thread.
///
/// Each tick drains pending events, steps the simulation by the configured tick interval and
/// publishes a snapshot stamped with `clock`. The loop never awaits; the async side only
/// reads the published snapshots.
pub fn spawn_world(
    mut ctx: SimContext,
    mut events_rx: mpsc::Receiver<GameEvent>,
    clock: Arc<dyn Clock>,
) -> std::io::Result<(WorldHandle, SnapshotReceiver)> {
    let (snapshots_tx, snapshots_rx) = watch::channel(None);
    let (done_tx, done_rx) = std_mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let thread = std::thread::Builder::new()
        .name("world".to_string())
        .spawn(move || {
            let tick_interval = ctx.settings().tick_interval;
            let dt = tick_interval.as_secs_f32();
            let mut next_tick = Instant::now() + tick_interval;
            info!(tick_ms = tick_interval.as_millis(), "world loop started");

            while !stop_flag.load(Ordering::Acquire) {
                while let Ok(event) = events_rx.try_recv() {
                    apply_event(&mut ctx, event);
                }

                let report = ctx.step(dt);
                if report.collided && report.tick % COLLISION_LOG_EVERY == 1 {
                    debug!(tick = report.tick, "avatar collided with ai");
                }

                let snapshot = Arc::new(ctx.snapshot(clock.now_seconds()));
                snapshots_tx.send_replace(Some(snapshot));

                let now = Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                    next_tick += tick_interval;
                } else {
                    // Running behind; restart the cadence instead of bursting catch-up ticks.
                    next_tick = now + tick_interval;
                }
            }

            ctx.shutdown();
            info!(ticks = ctx.tick(), "world loop stopped");
            let _ = done_tx.send(());
        })?;

    Ok((
        WorldHandle {
            stop,
            done_rx,
            thread: Some(thread),
        },
        snapshots_rx,
    ))
}

fn apply_event(ctx: &mut SimContext, event: GameEvent) {
    match event {
        GameEvent::Join { conn_id, name } => {
            ctx.join_remote(conn_id, &name);
        }
        GameEvent::Leave { conn_id } => ctx.leave_remote(conn_id),
        GameEvent::Input { conn_id, velocity } => {
            ctx.set_remote_input(conn_id, velocity);
        }
    }
}

impl WorldHandle {
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Asks the loop to stop and waits up to `grace` for it to finish its current tick.
    ///
    /// Returns false when the loop did not finish in time; the thread is then detached.
    /// Calling again after a stop is a no-op that returns true.
    pub fn stop(&mut self, grace: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        self.stop.store(true, Ordering::Release);

        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("world thread panicked");
                }
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = grace.as_millis(),
                    "world loop did not stop in time; detaching"
                );
                false
            }
        }
    }
}

impl Drop for WorldHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

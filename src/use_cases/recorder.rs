//! Throttled keyframe capture into a [`RecordingSink`].
//!
//! Two tasks cooperate: the capture task samples the latest world snapshot on its own
//! cadence and decides what to keep, and the writer task owns the sink. They are joined by
//! a bounded queue so a slow sink never stalls capture. The writer always flushes and closes
//! the sink before it exits, whether the recorder was stopped, dropped, or the world went
//! away.

use super::throttle::{log_ready, should_log};
use super::world::SnapshotReceiver;
use crate::domain::ports::RecordingSink;
use crate::domain::{EntityId, Keyframe, RecordingError};
use glam::Vec2;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RecordingConfig {
    /// Cadence of the capture task, independent of the network broadcast cadence.
    pub keyframe_interval: Duration,
    /// Samples where no entity moved at least this far (pixels) since the last written
    /// sample are skipped.
    pub position_threshold: f32,
    /// Positions are rounded to this many decimal places before writing.
    pub quantize_decimals: u32,
    /// Keyframes buffered between capture and the writer.
    pub queue_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: Duration::from_millis(500),
            position_threshold: 0.5,
            quantize_decimals: 2,
            queue_capacity: 2048,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub written: u64,
    /// Samples skipped by the movement throttle.
    pub skipped: u64,
    /// Samples lost because the writer queue was full.
    pub dropped: u64,
    /// Appends the sink rejected.
    pub failed: u64,
}

/// Decides whether a sample differs enough from the last written one.
#[derive(Debug, Default)]
pub struct RecordingThrottle {
    threshold: f32,
    last: Option<HashMap<EntityId, Vec2>>,
}

impl RecordingThrottle {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            last: None,
        }
    }

    /// True for the first sample, when the entity set changed, or when any entity moved at
    /// least the threshold. A true result becomes the new reference sample.
    pub fn should_write(&mut self, keyframe: &Keyframe) -> bool {
        let changed = match &self.last {
            None => true,
            Some(last) => {
                last.len() != keyframe.len()
                    || keyframe.entities().iter().any(|e| match last.get(&e.id) {
                        Some(prev) => prev.distance(e.position) >= self.threshold,
                        None => true,
                    })
            }
        };

        if changed {
            self.last = Some(
                keyframe
                    .entities()
                    .iter()
                    .map(|e| (e.id.clone(), e.position))
                    .collect(),
            );
        }
        changed
    }
}

pub struct Recorder {
    shutdown_tx: watch::Sender<bool>,
    capture: Option<JoinHandle<RecorderStats>>,
    writer: Option<JoinHandle<(u64, u64)>>,
}

impl Recorder {
    /// Starts recording snapshots from `snapshots` into `sink`. Must be called inside a
    /// tokio runtime.
    pub fn spawn<S>(sink: S, snapshots: SnapshotReceiver, config: RecordingConfig) -> Self
    where
        S: RecordingSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));

        let writer = tokio::spawn(write_loop(sink, queue_rx));
        let capture = tokio::spawn(capture_loop(snapshots, queue_tx, shutdown_rx, config));

        info!(
            interval_ms = config.keyframe_interval.as_millis(),
            threshold = config.position_threshold,
            "recorder started"
        );
        Self {
            shutdown_tx,
            capture: Some(capture),
            writer: Some(writer),
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Stops capture, waits for queued keyframes to be written and the sink to close.
    ///
    /// Returns `None` when the recorder was already stopped.
    pub async fn stop(&mut self) -> Option<RecorderStats> {
        let capture = self.capture.take()?;
        let _ = self.shutdown_tx.send(true);

        let mut stats = match capture.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "recorder capture task failed");
                RecorderStats::default()
            }
        };

        if let Some(writer) = self.writer.take() {
            match writer.await {
                Ok((written, failed)) => {
                    stats.written = written;
                    stats.failed = failed;
                }
                Err(e) => error!(error = %e, "recorder writer task failed"),
            }
        }

        info!(
            written = stats.written,
            skipped = stats.skipped,
            dropped = stats.dropped,
            failed = stats.failed,
            "recorder stopped"
        );
        Some(stats)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // The tasks finish on their own and the writer still closes the sink.
        let _ = self.shutdown_tx.send(true);
    }
}

async fn capture_loop(
    snapshots: SnapshotReceiver,
    queue_tx: mpsc::Sender<Keyframe>,
    mut shutdown_rx: watch::Receiver<bool>,
    config: RecordingConfig,
) -> RecorderStats {
    let mut stats = RecorderStats::default();
    let mut throttle = RecordingThrottle::new(config.position_threshold);
    let mut origin: Option<f64> = None;
    let mut last_drop_log = log_ready();

    let period = config.keyframe_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if snapshots.has_changed().is_err() {
                    debug!("snapshot source closed; recorder capture exiting");
                    break;
                }
                let Some(latest) = snapshots.borrow().clone() else {
                    continue;
                };

                let start = *origin.get_or_insert(latest.timestamp());
                let sample = latest
                    .retimed(latest.timestamp() - start)
                    .quantized(config.quantize_decimals);

                if !throttle.should_write(&sample) {
                    stats.skipped += 1;
                    continue;
                }

                match queue_tx.try_send(sample) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        stats.dropped += 1;
                        if should_log(&mut last_drop_log) {
                            warn!(dropped = stats.dropped, "recording queue full; sample dropped");
                        }
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("recording writer gone; capture exiting");
                        break;
                    }
                }
            }
        }
    }

    stats
}

async fn write_loop<S: RecordingSink>(
    mut sink: S,
    mut queue_rx: mpsc::Receiver<Keyframe>,
) -> (u64, u64) {
    let mut written = 0;
    let mut failed = 0;
    let mut last_error_log = log_ready();

    while let Some(keyframe) = queue_rx.recv().await {
        match sink.append(&keyframe).await {
            Ok(()) => written += 1,
            Err(RecordingError::Closed) => {
                warn!("recording sink closed underneath the writer");
                failed += 1;
                break;
            }
            Err(e) => {
                failed += 1;
                if should_log(&mut last_error_log) {
                    warn!(error = %e, failed, "failed to append keyframe");
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        warn!(error = %e, "failed to flush recording");
    }
    if let Err(e) = sink.close().await {
        warn!(error = %e, "failed to close recording");
    }
    (written, failed)
}

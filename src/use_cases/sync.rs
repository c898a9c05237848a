// Client-side delay buffer over received keyframes.

use crate::domain::{EntityId, Keyframe, Timeline};
use glam::Vec2;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Keyframes older than this (relative to the newest) are discarded.
    pub retention: Duration,
    /// Sampling lags the caller's clock by this much.
    pub interpolation_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(2),
            interpolation_delay: Duration::from_millis(120),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncBuffer {
    timeline: Timeline,
    settings: SyncSettings,
    received: u64,
    rejected: u64,
    resets: u64,
}

impl SyncBuffer {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            timeline: Timeline::new(),
            settings,
            received: 0,
            rejected: 0,
            resets: 0,
        }
    }

    /// Adds a received keyframe and trims the buffer to the retention window.
    ///
    /// Keyframes older than the newest buffered one are counted and dropped, unless they are
    /// older by more than the retention window: the sender restarted or its clock stepped
    /// back, so the buffer is cleared and starts over from that frame.
    pub fn push(&mut self, keyframe: Keyframe) -> bool {
        let retention = self.settings.retention.as_secs_f64();
        if let Some(newest) = self.newest_timestamp() {
            if newest - keyframe.timestamp() > retention {
                self.resets += 1;
                info!(
                    newest,
                    incoming = keyframe.timestamp(),
                    resets = self.resets,
                    "keyframe clock went backwards; resetting sync buffer"
                );
                self.timeline = Timeline::new();
            }
        }
        if !self.timeline.push(keyframe) {
            self.rejected += 1;
            return false;
        }
        self.received += 1;
        self.timeline.retain_recent(retention);
        true
    }

    /// Positions at `now` minus the interpolation delay.
    pub fn sample(&self, now: f64) -> HashMap<EntityId, Vec2> {
        self.sample_at(now - self.settings.interpolation_delay.as_secs_f64())
    }

    /// Positions at exactly `t`. Empty while nothing has been received.
    pub fn sample_at(&self, t: f64) -> HashMap<EntityId, Vec2> {
        self.timeline
            .window(t)
            .map(|window| window.by_id())
            .unwrap_or_default()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Times the buffer was cleared because the stream restarted.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn newest_timestamp(&self) -> Option<f64> {
        self.timeline.last().map(Keyframe::timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityObservation;

    fn frame(t: f64, x: f32) -> Keyframe {
        Keyframe::new(t, vec![EntityObservation::new("A", x, 0.0)])
    }

    #[test]
    fn when_sampling_now_then_query_lags_by_the_delay() {
        let mut buffer = SyncBuffer::new(SyncSettings::default());
        buffer.push(frame(10.0, 0.0));
        buffer.push(frame(10.2, 20.0));

        // 10.22 - 0.12 = 10.10, halfway between the two frames.
        let sample = buffer.sample(10.22);
        let a = sample[&EntityId::from("A")];
        assert!((a.x - 10.0).abs() < 1e-3, "got {a:?}");
    }

    #[test]
    fn when_frames_exceed_retention_then_oldest_are_dropped() {
        let mut buffer = SyncBuffer::new(SyncSettings::default());
        for i in 0..20 {
            buffer.push(frame(f64::from(i) * 0.25, 0.0));
        }
        // newest is 4.75; anything before 2.75 is gone
        assert_eq!(buffer.len(), 9);
        assert_eq!(buffer.received(), 20);
    }

    #[test]
    fn when_a_stale_frame_arrives_then_it_is_rejected() {
        let mut buffer = SyncBuffer::new(SyncSettings::default());
        assert!(buffer.push(frame(1.0, 0.0)));
        assert!(!buffer.push(frame(0.5, 0.0)));
        assert_eq!(buffer.rejected(), 1);
        assert_eq!(buffer.newest_timestamp(), Some(1.0));
    }

    #[test]
    fn when_stream_restarts_earlier_then_buffer_resets() {
        let mut buffer = SyncBuffer::new(SyncSettings::default());
        buffer.push(frame(500.0, 0.0));
        buffer.push(frame(500.2, 10.0));

        // A restarted server counts from zero again.
        assert!(buffer.push(frame(0.5, 1.0)));
        assert!(buffer.push(frame(0.7, 3.0)));
        assert_eq!(buffer.resets(), 1);
        assert_eq!(buffer.rejected(), 0);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.newest_timestamp(), Some(0.7));

        let a = buffer.sample_at(0.6)[&EntityId::from("A")];
        assert!((a.x - 2.0).abs() < 1e-3, "got {a:?}");
    }

    #[test]
    fn when_nothing_received_then_sample_is_empty() {
        let buffer = SyncBuffer::new(SyncSettings::default());
        assert!(buffer.sample(5.0).is_empty());
    }
}

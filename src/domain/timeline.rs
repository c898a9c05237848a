//! Ordered keyframe sequences and the bracket/blend sampling shared by live sync and replay.
//!
//! A query time `t` selects the pair of keyframes around it and a blend factor `u` between
//! them. Before the first keyframe and after the last one the pair collapses onto that end
//! keyframe, so sampling never extrapolates.

use super::entity::EntityId;
use super::keyframe::Keyframe;
use glam::Vec2;
use std::collections::{HashMap, VecDeque};

/// Spans shorter than this are treated as zero and blend to the first keyframe.
const SPAN_EPSILON: f64 = 1e-6;

/// A bracketing pair of keyframes plus the blend factor for one query time.
#[derive(Debug, Clone, Copy)]
pub struct InterpolationWindow<'a> {
    pub from: &'a Keyframe,
    pub to: &'a Keyframe,
    pub blend: f64,
}

impl<'a> InterpolationWindow<'a> {
    fn new(from: &'a Keyframe, to: &'a Keyframe, t: f64) -> Self {
        let span = to.timestamp() - from.timestamp();
        let blend = if span.abs() < SPAN_EPSILON {
            0.0
        } else {
            ((t - from.timestamp()) / span).clamp(0.0, 1.0)
        };
        Self { from, to, blend }
    }

    /// Interpolated positions matched by entity id.
    ///
    /// Entities present in only one side of the bracket are left out.
    pub fn by_id(&self) -> HashMap<EntityId, Vec2> {
        let targets: HashMap<&EntityId, Vec2> = self
            .to
            .entities()
            .iter()
            .map(|e| (&e.id, e.position))
            .collect();

        self.from
            .entities()
            .iter()
            .filter_map(|e| {
                let end = targets.get(&e.id)?;
                Some((e.id.clone(), blend(e.position, *end, self.blend)))
            })
            .collect()
    }

    /// Interpolated positions matched by list position, at most `limit` entries.
    pub fn by_index(&self, limit: usize) -> Vec<Vec2> {
        self.from
            .entities()
            .iter()
            .zip(self.to.entities())
            .take(limit)
            .map(|(a, b)| blend(a.position, b.position, self.blend))
            .collect()
    }
}

fn blend(a: Vec2, b: Vec2, u: f64) -> Vec2 {
    let u = u as f32;
    a * (1.0 - u) + b * u
}

/// Keyframes with non-decreasing timestamps.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    frames: VecDeque<Keyframe>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a timeline from keyframes in any order. Equal timestamps keep their input order.
    pub fn from_unsorted(mut frames: Vec<Keyframe>) -> Self {
        frames.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        Self {
            frames: frames.into(),
        }
    }

    /// Appends a keyframe. Returns false (and drops it) when it is older than the newest one.
    pub fn push(&mut self, keyframe: Keyframe) -> bool {
        if let Some(last) = self.frames.back() {
            if keyframe.timestamp() < last.timestamp() {
                return false;
            }
        }
        self.frames.push_back(keyframe);
        true
    }

    /// Drops keyframes more than `max_age` seconds older than the newest one.
    pub fn retain_recent(&mut self, max_age: f64) {
        let Some(newest) = self.frames.back().map(Keyframe::timestamp) else {
            return;
        };
        while let Some(front) = self.frames.front() {
            if newest - front.timestamp() > max_age {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> Option<&Keyframe> {
        self.frames.front()
    }

    pub fn last(&self) -> Option<&Keyframe> {
        self.frames.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyframe> {
        self.frames.iter()
    }

    /// Bracketing pair for query time `t`, or `None` for an empty timeline.
    pub fn window(&self, t: f64) -> Option<InterpolationWindow<'_>> {
        let first = self.frames.front()?;
        let last = self.frames.back()?;

        if t <= first.timestamp() {
            return Some(InterpolationWindow::new(first, first, t));
        }
        if t >= last.timestamp() {
            return Some(InterpolationWindow::new(last, last, t));
        }

        // Linear scan; live buffers hold a few dozen frames and replay scans once per tick.
        let pair = self
            .frames
            .iter()
            .zip(self.frames.iter().skip(1))
            .find(|(a, b)| a.timestamp() <= t && t <= b.timestamp());

        match pair {
            Some((a, b)) => Some(InterpolationWindow::new(a, b, t)),
            None => Some(InterpolationWindow::new(last, last, t)),
        }
    }
}

// Deterministic playback of a recorded timeline.

use crate::domain::entity::DEFAULT_COLOR;
use crate::domain::{EntityId, Shape, Timeline};
use glam::Vec2;

const DEFAULT_SIZE: Vec2 = Vec2::splat(20.0);

/// One replayed entity, built from the first keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEntity {
    pub id: EntityId,
    pub position: Vec2,
    pub shape: Shape,
    pub size: Vec2,
    pub color: [f32; 4],
    /// False while the current bracket has fewer entities than this one's index.
    pub visible: bool,
}

pub struct ReplayPlayer {
    timeline: Timeline,
    entities: Vec<PlaybackEntity>,
    clock: f64,
    start: f64,
    end: f64,
}

impl ReplayPlayer {
    /// Builds the entity set from the first keyframe and positions the clock at its
    /// timestamp. An empty timeline yields a player with no entities that is already finished.
    pub fn new(timeline: Timeline) -> Self {
        let start = timeline.first().map_or(0.0, |kf| kf.timestamp());
        let end = timeline.last().map_or(start, |kf| kf.timestamp());

        let entities = timeline
            .first()
            .map(|kf| {
                kf.entities()
                    .iter()
                    .map(|e| PlaybackEntity {
                        id: e.id.clone(),
                        position: e.position,
                        shape: e.shape.unwrap_or(Shape::Rectangle),
                        size: e.size.unwrap_or(DEFAULT_SIZE),
                        color: e.color.unwrap_or(DEFAULT_COLOR),
                        visible: true,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut player = Self {
            timeline,
            entities,
            clock: start,
            start,
            end,
        };
        player.apply();
        player
    }

    pub fn entities(&self) -> &[PlaybackEntity] {
        &self.entities
    }

    /// Current playback time, in the recording's own timestamps.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_finished(&self) -> bool {
        self.clock >= self.end
    }

    /// Moves the clock forward by `dt` seconds, stopping at the last keyframe.
    pub fn advance(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.clock = (self.clock + dt).min(self.end);
        }
        self.apply();
    }

    /// Jumps to `t`, clamped to the recording's time range.
    pub fn seek(&mut self, t: f64) {
        if t.is_nan() {
            return;
        }
        self.clock = t.clamp(self.start, self.end);
        self.apply();
    }

    fn apply(&mut self) {
        let Some(window) = self.timeline.window(self.clock) else {
            return;
        };

        let positions = window.by_index(self.entities.len());
        for (k, entity) in self.entities.iter_mut().enumerate() {
            match positions.get(k) {
                Some(position) => {
                    entity.position = *position;
                    entity.visible = true;
                }
                None => entity.visible = false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityObservation, Keyframe};

    fn timeline() -> Timeline {
        Timeline::from_unsorted(vec![
            Keyframe::new(
                2.0,
                vec![
                    EntityObservation::new("A", 10.0, 0.0),
                    EntityObservation::new("B", 0.0, 10.0),
                ],
            ),
            Keyframe::new(
                0.0,
                vec![
                    EntityObservation {
                        color: Some([1.0, 0.0, 0.0, 1.0]),
                        shape: Some(Shape::Circle),
                        ..EntityObservation::new("A", 0.0, 0.0)
                    },
                    EntityObservation::new("B", 0.0, 0.0),
                ],
            ),
            Keyframe::new(4.0, vec![EntityObservation::new("A", 20.0, 0.0)]),
        ])
    }

    #[test]
    fn when_built_then_entities_come_from_first_keyframe() {
        let player = ReplayPlayer::new(timeline());
        let ids: Vec<&str> = player.entities().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(player.entities()[0].shape, Shape::Circle);
        assert_eq!(player.entities()[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(player.entities()[1].color, DEFAULT_COLOR);
        assert_eq!(player.clock(), 0.0);
    }

    #[test]
    fn when_advanced_then_positions_interpolate_and_clock_clamps() {
        let mut player = ReplayPlayer::new(timeline());
        player.advance(1.0);
        assert!((player.entities()[0].position.x - 5.0).abs() < 1e-5);
        assert!((player.entities()[1].position.y - 5.0).abs() < 1e-5);

        player.advance(100.0);
        assert_eq!(player.clock(), 4.0);
        assert!(player.is_finished());
    }

    #[test]
    fn when_bracket_has_fewer_entities_then_extras_are_hidden() {
        let mut player = ReplayPlayer::new(timeline());
        player.seek(3.0);

        assert!(player.entities()[0].visible);
        assert!((player.entities()[0].position.x - 15.0).abs() < 1e-5);
        assert!(!player.entities()[1].visible);
    }

    #[test]
    fn when_seeking_out_of_range_then_clock_is_clamped() {
        let mut player = ReplayPlayer::new(timeline());
        player.seek(-5.0);
        assert_eq!(player.clock(), 0.0);
        player.seek(50.0);
        assert_eq!(player.clock(), 4.0);
    }

    #[test]
    fn when_replayed_twice_then_positions_are_identical() {
        let run = || {
            let mut player = ReplayPlayer::new(timeline());
            let mut trace = Vec::new();
            while !player.is_finished() {
                player.advance(0.3);
                trace.push(player.entities().to_vec());
            }
            trace
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn when_timeline_is_empty_then_player_is_finished_with_no_entities() {
        let mut player = ReplayPlayer::new(Timeline::new());
        player.advance(1.0);
        assert!(player.entities().is_empty());
        assert!(player.is_finished());
    }
}

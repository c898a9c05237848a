//! AI wander and short-range avoidance.
//!
//! Avoidance scans each unordered pair once: entity `i` only accumulates repulsion from
//! peers with a higher index, and nothing is written back to those peers in the same pass.

use crate::domain::tuning::SteeringTuning;
use glam::Vec2;
use rand::Rng;

/// Per-entity wander state, created on first sight of a steered entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AiState {
    pub target_velocity: Vec2,
    /// Seconds since the target was last drawn.
    pub retarget_timer: f32,
    /// Seconds the current target is kept for.
    pub retarget_after: f32,
}

impl AiState {
    pub fn roll<R: Rng>(rng: &mut R, tuning: &SteeringTuning) -> Self {
        Self {
            target_velocity: roll_target(rng, tuning),
            retarget_timer: 0.0,
            retarget_after: roll_retarget_interval(rng, tuning),
        }
    }
}

pub fn roll_target<R: Rng>(rng: &mut R, tuning: &SteeringTuning) -> Vec2 {
    let s = tuning.wander_speed.abs();
    Vec2::new(rng.random_range(-s..=s), rng.random_range(-s..=s))
}

pub fn roll_retarget_interval<R: Rng>(rng: &mut R, tuning: &SteeringTuning) -> f32 {
    let lo = tuning.retarget_min.min(tuning.retarget_max);
    let hi = tuning.retarget_min.max(tuning.retarget_max);
    rng.random_range(lo..=hi)
}

/// Advances the wander timer and returns the velocity blended toward the wander target.
pub fn wander<R: Rng>(
    velocity: Vec2,
    state: &mut AiState,
    dt: f32,
    tuning: &SteeringTuning,
    rng: &mut R,
) -> Vec2 {
    state.retarget_timer += dt;
    if state.retarget_timer >= state.retarget_after {
        state.target_velocity = roll_target(rng, tuning);
        state.retarget_after = roll_retarget_interval(rng, tuning);
        state.retarget_timer = 0.0;
    }

    velocity
        .lerp(state.target_velocity, tuning.wander_blend)
        .clamp_length_max(tuning.max_speed)
}

/// Repulsion accumulated on `index` from every higher-indexed peer inside the avoid radius.
pub fn avoidance_vector(index: usize, positions: &[Vec2], tuning: &SteeringTuning) -> Vec2 {
    let Some(&own) = positions.get(index) else {
        return Vec2::ZERO;
    };

    positions
        .iter()
        .skip(index + 1)
        .fold(Vec2::ZERO, |acc, &other| {
            let offset = own - other;
            let distance = offset.length();
            if distance > 0.0 && distance < tuning.avoid_radius {
                let falloff = (tuning.avoid_radius - distance) / tuning.avoid_radius;
                acc + (offset / distance) * falloff * tuning.avoid_strength
            } else {
                acc
            }
        })
}

/// Nudges `velocity` along `avoidance`. A zero avoidance vector leaves it unchanged.
pub fn apply_avoidance(velocity: Vec2, avoidance: Vec2, dt: f32, tuning: &SteeringTuning) -> Vec2 {
    let magnitude = avoidance.length();
    if magnitude <= 0.0 {
        return velocity;
    }

    let push = (avoidance / magnitude) * magnitude.min(tuning.avoid_strength) * dt * tuning.avoid_gain;
    velocity
        .lerp(velocity + push, tuning.avoid_blend)
        .clamp_length_max(tuning.max_speed)
}

/// Steers the contiguous slice of velocities starting at `offset` in the full steered list.
///
/// `positions` covers the whole list; only `velocities` is written.
pub fn steer_batch(
    offset: usize,
    velocities: &mut [Vec2],
    positions: &[Vec2],
    dt: f32,
    tuning: &SteeringTuning,
) {
    for (k, velocity) in velocities.iter_mut().enumerate() {
        let avoidance = avoidance_vector(offset + k, positions, tuning);
        *velocity = apply_avoidance(*velocity, avoidance, dt, tuning);
    }
}

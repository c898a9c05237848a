/// Tuning for AI wander and pairwise avoidance.
#[derive(Debug, Clone, Copy)]
pub struct SteeringTuning {
    /// Wander targets are drawn from `[-wander_speed, wander_speed]` on each axis.
    pub wander_speed: f32,

    /// Shortest time in seconds before a new wander target is drawn.
    pub retarget_min: f32,

    /// Longest time in seconds before a new wander target is drawn.
    pub retarget_max: f32,

    /// Per-tick blend from current velocity toward the wander target.
    pub wander_blend: f32,

    /// Speed cap applied after wander and after avoidance, in pixels per second.
    pub max_speed: f32,

    /// Peers closer than this (pixels) push each other away.
    pub avoid_radius: f32,

    /// Repulsion magnitude at zero distance; also caps the accumulated avoidance.
    pub avoid_strength: f32,

    /// Per-tick blend toward the avoidance-adjusted velocity.
    pub avoid_blend: f32,

    /// Multiplier on `avoidance * dt` when building the avoidance target.
    pub avoid_gain: f32,

    /// Below this many steered entities avoidance runs serially.
    pub parallel_threshold: usize,
}

impl Default for SteeringTuning {
    fn default() -> Self {
        Self {
            wander_speed: 75.0,
            retarget_min: 2.0,
            retarget_max: 4.0,
            wander_blend: 0.1,
            max_speed: 150.0,
            avoid_radius: 80.0,
            avoid_strength: 50.0,
            avoid_blend: 0.15,
            avoid_gain: 10.0,
            parallel_threshold: 10,
        }
    }
}

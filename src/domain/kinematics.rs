// Per-entity kinematic state integrated by the physics step.

use glam::Vec2;
use tracing::warn;

/// Lowest mass a body may carry.
pub const MIN_MASS: f32 = 0.1;

/// Position, velocity and drag parameters for one simulated entity.
///
/// The physics step is the only writer of `acceleration` during a tick. Steering and network
/// input write `velocity` between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub use_gravity: bool,
    pub gravity: Vec2,
    pub enabled: bool,
    mass: f32,
    friction: f32,
}

impl Default for KinematicBody {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            use_gravity: false,
            gravity: Vec2::new(0.0, 9.8),
            enabled: true,
            mass: 1.0,
            friction: 0.9,
        }
    }
}

impl KinematicBody {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.set_mass(mass);
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.set_friction(friction);
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Stores `mass`, raised to [`MIN_MASS`] when smaller (or NaN).
    pub fn set_mass(&mut self, mass: f32) {
        let clamped = mass.max(MIN_MASS);
        if clamped != mass {
            warn!(requested = mass, stored = clamped, "mass clamped");
        }
        self.mass = clamped;
    }

    /// Stores `friction` clamped into `[0, 1]`. NaN is treated as "no drag".
    pub fn set_friction(&mut self, friction: f32) {
        let clamped = if friction.is_nan() {
            1.0
        } else {
            friction.clamp(0.0, 1.0)
        };
        if clamped != friction {
            warn!(requested = friction, stored = clamped, "friction clamped");
        }
        self.friction = clamped;
    }

    /// Accumulates `force / mass` into the acceleration consumed by the next physics step.
    pub fn apply_force(&mut self, force: Vec2) {
        self.acceleration += force / self.mass;
    }

    /// Changes velocity immediately by `impulse / mass`.
    pub fn apply_impulse(&mut self, impulse: Vec2) {
        self.velocity += impulse / self.mass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mass_is_stored_as_minimum() {
        let mut body = KinematicBody::default();
        body.set_mass(0.0);
        assert_eq!(body.mass(), MIN_MASS);

        body.set_mass(-3.0);
        assert_eq!(body.mass(), MIN_MASS);
    }

    #[test]
    fn friction_is_clamped_into_unit_range() {
        let mut body = KinematicBody::default();
        body.set_friction(1.5);
        assert_eq!(body.friction(), 1.0);

        body.set_friction(-0.2);
        assert_eq!(body.friction(), 0.0);

        body.set_friction(f32::NAN);
        assert_eq!(body.friction(), 1.0);
    }

    #[test]
    fn force_and_impulse_are_scaled_by_mass() {
        let mut body = KinematicBody::default().with_mass(2.0);
        body.apply_force(Vec2::new(4.0, 0.0));
        body.apply_impulse(Vec2::new(0.0, 6.0));

        assert_eq!(body.acceleration, Vec2::new(2.0, 0.0));
        assert_eq!(body.velocity, Vec2::new(0.0, 3.0));
    }
}

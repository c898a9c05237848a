//! Explicit-Euler integration with drag, plus reflection off the playfield edges.
//!
//! Every function here touches only the body it is given, so any partition of the entity
//! list into batches produces the same result as a serial pass.

use crate::domain::SimEntity;
use crate::domain::kinematics::KinematicBody;
use crate::domain::tuning::WorldBounds;

/// Advances one body by `dt` seconds.
pub fn integrate_body(body: &mut KinematicBody, dt: f32) {
    if body.use_gravity {
        body.acceleration += body.gravity;
    }
    body.velocity += body.acceleration * dt;
    body.velocity *= body.friction();
    body.position += body.velocity * dt;
    body.acceleration = glam::Vec2::ZERO;
}

/// Flips the velocity component of any axis that left the playfield and clamps back inside.
pub fn reflect_at_bounds(body: &mut KinematicBody, bounds: &WorldBounds) {
    let max_x = bounds.max_x();
    if body.position.x < 0.0 || body.position.x > max_x {
        body.velocity.x = -body.velocity.x;
        body.position.x = body.position.x.clamp(0.0, max_x);
    }

    let max_y = bounds.max_y();
    if body.position.y < 0.0 || body.position.y > max_y {
        body.velocity.y = -body.velocity.y;
        body.position.y = body.position.y.clamp(0.0, max_y);
    }
}

/// Integrates every physics-enabled entity in `batch`.
pub fn step_batch(batch: &mut [SimEntity], dt: f32, bounds: &WorldBounds) {
    for entity in batch.iter_mut().filter(|e| e.is_physics_enabled()) {
        integrate_body(&mut entity.body, dt);
        reflect_at_bounds(&mut entity.body, bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn frictionless(position: Vec2, velocity: Vec2) -> KinematicBody {
        KinematicBody::at(position)
            .with_mass(1.0)
            .with_friction(1.0)
            .with_velocity(velocity)
    }

    #[test]
    fn unit_step_without_drag_adds_velocity_to_position() {
        let mut body = frictionless(Vec2::new(100.0, 200.0), Vec2::new(3.0, -4.0));
        integrate_body(&mut body, 1.0);

        assert_eq!(body.position, Vec2::new(103.0, 196.0));
        assert_eq!(body.velocity, Vec2::new(3.0, -4.0));
    }

    #[test]
    fn gravity_and_friction_apply_before_position_update() {
        let mut body = KinematicBody::at(Vec2::ZERO).with_friction(0.5);
        body.use_gravity = true;
        body.gravity = Vec2::new(0.0, 10.0);
        integrate_body(&mut body, 1.0);

        assert_eq!(body.velocity, Vec2::new(0.0, 5.0));
        assert_eq!(body.position, Vec2::new(0.0, 5.0));
        assert_eq!(body.acceleration, Vec2::ZERO);
    }

    #[test]
    fn leaving_the_left_edge_clamps_and_flips_velocity() {
        let bounds = WorldBounds::new(800.0, 600.0);
        let mut body = frictionless(Vec2::new(-5.0, 50.0), Vec2::new(-20.0, 1.0));
        reflect_at_bounds(&mut body, &bounds);

        assert_eq!(body.position.x, 0.0);
        assert_eq!(body.velocity.x, 20.0);
        assert_eq!(body.velocity.y, 1.0);
    }

    #[test]
    fn leaving_the_far_edges_clamps_to_the_margin() {
        let bounds = WorldBounds::new(800.0, 600.0);
        let mut body = frictionless(Vec2::new(790.0, 700.0), Vec2::new(5.0, 5.0));
        reflect_at_bounds(&mut body, &bounds);

        assert_eq!(body.position, Vec2::new(785.0, 585.0));
        assert_eq!(body.velocity, Vec2::new(-5.0, -5.0));
    }

    #[test]
    fn bodies_inside_the_playfield_are_untouched() {
        let bounds = WorldBounds::new(800.0, 600.0);
        let mut body = frictionless(Vec2::new(0.0, 585.0), Vec2::new(-1.0, 1.0));
        reflect_at_bounds(&mut body, &bounds);

        assert_eq!(body.velocity, Vec2::new(-1.0, 1.0));
    }
}

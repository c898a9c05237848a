// Simulation entities and the capability table resolved at spawn time.

use super::keyframe::{EntityObservation, Shape};
use super::kinematics::KinematicBody;
use glam::Vec2;
use std::fmt;
use std::sync::Arc;

/// Stable identifier, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Locally controlled avatar.
    Player,
    /// Wandering steered entity.
    Ai,
    /// Avatar driven by a connected client's input.
    Remote,
    /// Static scenery.
    Decoration,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Player => "Player",
            EntityKind::Ai => "AIPlayer",
            EntityKind::Remote => "RemotePlayer",
            EntityKind::Decoration => "Decoration",
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            EntityKind::Player => Capabilities {
                physics: true,
                steering: false,
                remote_input: false,
                avatar: true,
            },
            EntityKind::Ai => Capabilities {
                physics: true,
                steering: true,
                remote_input: false,
                avatar: false,
            },
            EntityKind::Remote => Capabilities {
                physics: true,
                steering: false,
                remote_input: true,
                avatar: true,
            },
            EntityKind::Decoration => Capabilities::default(),
        }
    }
}

/// Which systems operate on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Integrated by the physics step.
    pub physics: bool,
    /// Wander and avoidance steering.
    pub steering: bool,
    /// Velocity is overwritten from network input each tick.
    pub remote_input: bool,
    /// Checked for collisions against steered entities.
    pub avatar: bool,
}

/// Appearance hints carried into keyframes for replay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Appearance {
    pub shape: Shape,
    pub size: Vec2,
    pub color: [f32; 4],
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            shape: Shape::Rectangle,
            size: Vec2::splat(20.0),
            color: DEFAULT_COLOR,
        }
    }
}

pub const DEFAULT_COLOR: [f32; 4] = [0.9, 0.9, 0.2, 1.0];

#[derive(Debug, Clone)]
pub struct SimEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub capabilities: Capabilities,
    pub body: KinematicBody,
    pub appearance: Appearance,
    pub active: bool,
}

impl SimEntity {
    pub fn spawn(id: EntityId, kind: EntityKind, body: KinematicBody, appearance: Appearance) -> Self {
        Self {
            id,
            kind,
            capabilities: kind.capabilities(),
            body,
            appearance,
            active: true,
        }
    }

    pub fn is_physics_enabled(&self) -> bool {
        self.active && self.capabilities.physics && self.body.enabled
    }

    pub fn is_steered(&self) -> bool {
        self.active && self.capabilities.steering
    }

    pub fn observe(&self) -> EntityObservation {
        EntityObservation {
            id: self.id.clone(),
            position: self.body.position,
            shape: Some(self.appearance.shape),
            size: Some(self.appearance.size),
            color: Some(self.appearance.color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_kind() {
        let ai = SimEntity::spawn(
            EntityId::from("AIPlayer#1"),
            EntityKind::Ai,
            KinematicBody::default(),
            Appearance::default(),
        );
        assert!(ai.is_steered());
        assert!(ai.is_physics_enabled());

        let deco = SimEntity::spawn(
            EntityId::from("Decoration#1"),
            EntityKind::Decoration,
            KinematicBody::default(),
            Appearance::default(),
        );
        assert!(!deco.is_physics_enabled());
        assert!(!deco.is_steered());
    }

    #[test]
    fn inactive_entities_drop_out_of_every_system() {
        let mut ai = SimEntity::spawn(
            EntityId::from("AIPlayer#2"),
            EntityKind::Ai,
            KinematicBody::default(),
            Appearance::default(),
        );
        ai.active = false;
        assert!(!ai.is_steered());
        assert!(!ai.is_physics_enabled());
    }
}

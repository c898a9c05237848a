// Domain layer: simulation data, interpolation math and per-entity rules.

pub mod entity;
pub mod errors;
pub mod keyframe;
pub mod kinematics;
pub mod ports;
pub mod systems;
pub mod timeline;
pub mod tuning;

pub use entity::{Appearance, Capabilities, EntityId, EntityKind, SimEntity};
pub use errors::RecordingError;
pub use keyframe::{EntityObservation, Keyframe, SchemaTag, Shape};
pub use kinematics::KinematicBody;
pub use timeline::{InterpolationWindow, Timeline};

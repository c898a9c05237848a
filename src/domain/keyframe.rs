// Timestamped snapshots of entity positions shared by live sync, recording and replay.

use super::entity::EntityId;
use glam::Vec2;

/// Payload tag carried by a serialized keyframe.
///
/// Both tags describe the same schema; the tag records which stream produced the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaTag {
    /// Live broadcast over the socket (`"kf"`).
    Wire,
    /// Line in a recording file (`"keyframe"`).
    Record,
}

impl SchemaTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaTag::Wire => "kf",
            SchemaTag::Record => "keyframe",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "kf" => Some(SchemaTag::Wire),
            "keyframe" => Some(SchemaTag::Record),
            _ => None,
        }
    }
}

/// Render hint for replayed entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rectangle,
    Circle,
    Line,
    Custom,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Rectangle => "RECTANGLE",
            Shape::Circle => "CIRCLE",
            Shape::Line => "LINE",
            Shape::Custom => "CUSTOM",
        }
    }

    /// Unknown names map to [`Shape::Custom`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "RECTANGLE" => Shape::Rectangle,
            "CIRCLE" => Shape::Circle,
            "LINE" => Shape::Line,
            _ => Shape::Custom,
        }
    }
}

/// One entity's position inside a keyframe, with optional appearance hints.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityObservation {
    pub id: EntityId,
    pub position: Vec2,
    pub shape: Option<Shape>,
    pub size: Option<Vec2>,
    pub color: Option<[f32; 4]>,
}

impl EntityObservation {
    pub fn new(id: impl Into<EntityId>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            position: Vec2::new(x, y),
            shape: None,
            size: None,
            color: None,
        }
    }
}

/// Snapshot of all tracked entities at `timestamp` seconds. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    timestamp: f64,
    entities: Vec<EntityObservation>,
}

impl Keyframe {
    pub fn new(timestamp: f64, entities: Vec<EntityObservation>) -> Self {
        Self {
            timestamp,
            entities,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn entities(&self) -> &[EntityObservation] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityObservation> {
        self.entities.iter().find(|e| &e.id == id)
    }

    /// Copy of this keyframe moved to another timestamp.
    pub fn retimed(&self, timestamp: f64) -> Self {
        Self {
            timestamp,
            entities: self.entities.clone(),
        }
    }

    /// Copy with positions rounded to `decimals` places.
    pub fn quantized(&self, decimals: u32) -> Self {
        let scale = 10f32.powi(decimals.min(6) as i32);
        let entities = self
            .entities
            .iter()
            .map(|e| EntityObservation {
                position: (e.position * scale).round() / scale,
                ..e.clone()
            })
            .collect();
        Self {
            timestamp: self.timestamp,
            entities,
        }
    }
}

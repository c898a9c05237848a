use glam::Vec2;
use tracing::warn;

/// Inset from the far edges so a body's extent stays on screen.
pub const EDGE_MARGIN: f32 = 15.0;

/// Playfield the physics step reflects bodies inside of.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    width: f32,
    height: f32,
}

impl WorldBounds {
    /// Dimensions no larger than the edge margin (or non-finite) are raised to just above it.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: clamp_extent("width", width),
            height: clamp_extent("height", height),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Largest valid x coordinate.
    pub fn max_x(&self) -> f32 {
        self.width - EDGE_MARGIN
    }

    /// Largest valid y coordinate.
    pub fn max_y(&self) -> f32 {
        self.height - EDGE_MARGIN
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

fn clamp_extent(axis: &'static str, value: f32) -> f32 {
    let min = EDGE_MARGIN + 1.0;
    if value.is_finite() && value >= min {
        value
    } else {
        warn!(axis, requested = value, stored = min, "screen bound clamped");
        min
    }
}

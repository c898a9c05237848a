// Use-case level inputs for the world loop.

use glam::Vec2;

#[derive(Debug, Clone)]
pub enum GameEvent {
    Join { conn_id: u64, name: String },
    Leave { conn_id: u64 },
    Input { conn_id: u64, velocity: Vec2 },
}

// Use cases layer: session orchestration over the domain.

pub mod recorder;
pub mod replay;
pub mod simulation;
pub mod sync;
pub mod throttle;
pub mod types;
pub mod workers;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use recorder::{Recorder, RecorderStats, RecordingConfig, RecordingThrottle};
pub use replay::{PlaybackEntity, ReplayPlayer};
pub use simulation::{SimContext, SimSettings, TickReport};
pub use sync::{SyncBuffer, SyncSettings};
pub use types::GameEvent;
pub use workers::{BatchReport, WorkerPool};
pub use world::{SnapshotReceiver, WorldHandle, spawn_world};

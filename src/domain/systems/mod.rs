// Per-entity simulation rules. Parallel scheduling lives in the use-case layer.

pub mod physics;
pub mod steering;

// Gameplay tuning, kept separate from runtime configuration (ports, cadences, capacities).

pub mod bounds;
pub mod population;
pub mod steering;

pub use bounds::WorldBounds;
pub use population::PopulationTuning;
pub use steering::SteeringTuning;

/// Tuning for what a session spawns and when.
#[derive(Debug, Clone, Copy)]
pub struct PopulationTuning {
    /// AI entities spawned when the session starts.
    pub initial_ai: usize,

    /// Seconds of simulated time between extra AI spawns (0 disables).
    pub spawn_interval: f32,

    /// No further AI spawns once this many are active.
    pub max_ai: usize,

    /// AI entities never spawn closer than this to the screen centre.
    pub min_center_distance: f32,

    /// Static decorations spawned when the session starts.
    pub decorations: usize,

    /// Distance (pixels) at which an avatar counts as touching an AI entity.
    pub collision_radius: f32,
}

impl Default for PopulationTuning {
    fn default() -> Self {
        Self {
            initial_ai: 30,
            spawn_interval: 2.0,
            max_ai: 120,
            min_center_distance: 100.0,
            decorations: 5,
            collision_radius: 30.0,
        }
    }
}

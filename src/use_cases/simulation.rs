// Simulation context: the entity set, wander state and worker pool for one session.
//
// One context is created per session and passed by reference to whatever drives the tick.
// Within a tick the order is fixed: remote input, wander, avoidance, physics, collisions,
// timed spawns.

use super::workers::{BatchReport, WorkerPool};
use crate::domain::keyframe::{Keyframe, Shape};
use crate::domain::systems::physics;
use crate::domain::systems::steering::{self, AiState};
use crate::domain::tuning::{PopulationTuning, SteeringTuning, WorldBounds};
use crate::domain::{Appearance, EntityId, EntityKind, KinematicBody, SimEntity};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Spawn attempts before an AI entity is accepted regardless of centre distance.
const SPAWN_ATTEMPTS: usize = 16;

const PLAYER_FRICTION: f32 = 0.95;
const AI_MASS: f32 = 0.5;
const AI_FRICTION: f32 = 0.98;

#[derive(Debug, Clone)]
pub struct SimSettings {
    pub bounds: WorldBounds,
    pub tick_interval: Duration,
    pub workers: usize,
    pub seed: u64,
    pub population: PopulationTuning,
    pub steering: SteeringTuning,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            tick_interval: Duration::from_millis(16),
            workers: WorkerPool::default_worker_count(),
            seed: 0,
            population: PopulationTuning::default(),
            steering: SteeringTuning::default(),
        }
    }
}

/// What one call to [`SimContext::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub avoidance: BatchReport,
    pub physics: BatchReport,
    /// An avatar touched an AI entity this tick.
    pub collided: bool,
    pub spawned: usize,
}

pub struct SimContext {
    settings: SimSettings,
    entities: Vec<SimEntity>,
    ai_states: HashMap<EntityId, AiState>,
    remote_inputs: HashMap<EntityId, Vec2>,
    remotes: HashMap<u64, EntityId>,
    pool: WorkerPool,
    rng: StdRng,
    elapsed: f64,
    spawn_timer: f32,
    tick: u64,
    next_id: u64,
}

impl SimContext {
    pub fn new(settings: SimSettings) -> Self {
        let pool = WorkerPool::with_workers(settings.workers);
        let rng = StdRng::seed_from_u64(settings.seed);
        debug!(
            workers = pool.workers(),
            seed = settings.seed,
            width = settings.bounds.width(),
            height = settings.bounds.height(),
            "simulation context created"
        );
        Self {
            settings,
            entities: Vec::new(),
            ai_states: HashMap::new(),
            remote_inputs: HashMap::new(),
            remotes: HashMap::new(),
            pool,
            rng,
            elapsed: 0.0,
            spawn_timer: 0.0,
            tick: 0,
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn entities(&self) -> &[SimEntity] {
        &self.entities
    }

    pub fn entity(&self, id: &EntityId) -> Option<&SimEntity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    pub fn ai_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_steered()).count()
    }

    pub fn tracked_ai_states(&self) -> usize {
        self.ai_states.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds since the context was created.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Spawns the session's starting set: the player at the centre, the initial AI
    /// population and the decorations.
    pub fn populate(&mut self) {
        let center = self.settings.bounds.center();
        self.spawn_entity(
            EntityKind::Player,
            KinematicBody::at(center).with_friction(PLAYER_FRICTION),
            Appearance {
                shape: Shape::Rectangle,
                size: Vec2::splat(30.0),
                color: [0.2, 0.6, 1.0, 1.0],
            },
        );

        for _ in 0..self.settings.population.initial_ai {
            self.spawn_ai();
        }

        for _ in 0..self.settings.population.decorations {
            let position = self.random_position();
            self.spawn_entity(
                EntityKind::Decoration,
                KinematicBody::at(position),
                Appearance {
                    shape: Shape::Line,
                    size: Vec2::new(40.0, 2.0),
                    color: [0.6, 0.6, 0.6, 1.0],
                },
            );
        }

        info!(
            entities = self.entities.len(),
            ai = self.ai_count(),
            "session populated"
        );
    }

    pub fn spawn_entity(
        &mut self,
        kind: EntityKind,
        body: KinematicBody,
        appearance: Appearance,
    ) -> EntityId {
        let id = EntityId::from(format!("{}#{}", kind.label(), self.next_id));
        self.next_id += 1;
        self.entities
            .push(SimEntity::spawn(id.clone(), kind, body, appearance));
        id
    }

    /// Spawns one AI entity at a random position away from the screen centre.
    pub fn spawn_ai(&mut self) -> EntityId {
        let center = self.settings.bounds.center();
        let min_distance = self.settings.population.min_center_distance;

        let mut position = self.random_position();
        for _ in 1..SPAWN_ATTEMPTS {
            if position.distance(center) >= min_distance {
                break;
            }
            position = self.random_position();
        }

        let velocity = steering::roll_target(&mut self.rng, &self.settings.steering);
        self.spawn_entity(
            EntityKind::Ai,
            KinematicBody::at(position)
                .with_mass(AI_MASS)
                .with_friction(AI_FRICTION)
                .with_velocity(velocity),
            Appearance {
                shape: Shape::Circle,
                size: Vec2::splat(20.0),
                color: [1.0, 0.3, 0.3, 1.0],
            },
        )
    }

    /// Removes an entity and any state keyed by it. Returns false when it was not present.
    pub fn despawn(&mut self, id: &EntityId) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| &e.id != id);
        self.ai_states.remove(id);
        self.remote_inputs.remove(id);
        before != self.entities.len()
    }

    pub fn set_active(&mut self, id: &EntityId, active: bool) -> bool {
        match self.entities.iter_mut().find(|e| &e.id == id) {
            Some(entity) => {
                entity.active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_velocity(&mut self, id: &EntityId, velocity: Vec2) -> bool {
        match self.entities.iter_mut().find(|e| &e.id == id) {
            Some(entity) => {
                entity.body.velocity = velocity;
                true
            }
            None => false,
        }
    }

    /// Spawns the remote-controlled entity owned by a connection.
    pub fn join_remote(&mut self, conn_id: u64, name: &str) -> EntityId {
        if let Some(existing) = self.remotes.get(&conn_id) {
            return existing.clone();
        }
        let center = self.settings.bounds.center();
        let id = self.spawn_entity(
            EntityKind::Remote,
            KinematicBody::at(center),
            Appearance {
                shape: Shape::Rectangle,
                size: Vec2::splat(30.0),
                color: [0.3, 1.0, 0.4, 1.0],
            },
        );
        info!(conn_id, name, entity_id = %id, "remote entity spawned");
        self.remotes.insert(conn_id, id.clone());
        id
    }

    pub fn leave_remote(&mut self, conn_id: u64) {
        if let Some(id) = self.remotes.remove(&conn_id) {
            self.despawn(&id);
            info!(conn_id, entity_id = %id, "remote entity despawned");
        }
    }

    /// Records the latest velocity requested by a connection. Last write wins.
    ///
    /// Non-finite components are rejected and leave the previous input in place.
    pub fn set_remote_input(&mut self, conn_id: u64, velocity: Vec2) -> bool {
        if !velocity.is_finite() {
            debug!(conn_id, ?velocity, "non-finite input dropped");
            return false;
        }
        match self.remotes.get(&conn_id) {
            Some(id) => {
                self.remote_inputs.insert(id.clone(), velocity);
                true
            }
            None => false,
        }
    }

    /// Advances the session by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> TickReport {
        self.apply_remote_inputs();
        self.wander(dt);
        let avoidance = self.avoid(dt);

        let bounds = self.settings.bounds;
        let physics = self
            .pool
            .run_batches(&mut self.entities, |_, batch| {
                physics::step_batch(batch, dt, &bounds)
            });
        if !physics.is_clean() {
            warn!(
                tick = self.tick,
                failed = physics.failed,
                "physics tick finished with failed batches"
            );
        }

        let collided = self.detect_collision();
        let spawned = self.spawn_due(dt);

        self.elapsed += f64::from(dt);
        self.tick += 1;
        TickReport {
            tick: self.tick,
            avoidance,
            physics,
            collided,
            spawned,
        }
    }

    /// Positions of every active entity, in entity order.
    pub fn snapshot(&self, timestamp: f64) -> Keyframe {
        Keyframe::new(
            timestamp,
            self.entities
                .iter()
                .filter(|e| e.active)
                .map(SimEntity::observe)
                .collect(),
        )
    }

    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }

    fn random_position(&mut self) -> Vec2 {
        let bounds = self.settings.bounds;
        Vec2::new(
            self.rng.random_range(0.0..=bounds.max_x()),
            self.rng.random_range(0.0..=bounds.max_y()),
        )
    }

    fn apply_remote_inputs(&mut self) {
        if self.remote_inputs.is_empty() {
            return;
        }
        for entity in self
            .entities
            .iter_mut()
            .filter(|e| e.active && e.capabilities.remote_input)
        {
            if let Some(velocity) = self.remote_inputs.get(&entity.id) {
                entity.body.velocity = *velocity;
            }
        }
    }

    fn wander(&mut self, dt: f32) {
        let Self {
            entities,
            ai_states,
            rng,
            settings,
            ..
        } = self;
        let tuning = &settings.steering;

        ai_states.retain(|id, _| entities.iter().any(|e| &e.id == id && e.is_steered()));

        for entity in entities.iter_mut().filter(|e| e.is_steered()) {
            let state = ai_states
                .entry(entity.id.clone())
                .or_insert_with(|| AiState::roll(rng, tuning));
            entity.body.velocity = steering::wander(entity.body.velocity, state, dt, tuning, rng);
        }
    }

    fn avoid(&mut self, dt: f32) -> BatchReport {
        let steered: Vec<usize> = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_steered())
            .map(|(i, _)| i)
            .collect();
        if steered.is_empty() {
            return BatchReport::default();
        }

        // Positions are read-only for the whole pass; only the velocity copy is written.
        let positions: Vec<Vec2> = steered
            .iter()
            .map(|&i| self.entities[i].body.position)
            .collect();
        let mut velocities: Vec<Vec2> = steered
            .iter()
            .map(|&i| self.entities[i].body.velocity)
            .collect();

        let tuning = self.settings.steering;
        let steer = |offset: usize, batch: &mut [Vec2]| {
            steering::steer_batch(offset, batch, &positions, dt, &tuning)
        };
        let report = if steered.len() < tuning.parallel_threshold {
            self.pool.run_serial(&mut velocities, steer)
        } else {
            self.pool.run_batches(&mut velocities, steer)
        };

        for (&i, velocity) in steered.iter().zip(velocities) {
            self.entities[i].body.velocity = velocity;
        }
        report
    }

    fn detect_collision(&self) -> bool {
        let radius = self.settings.population.collision_radius;
        self.entities
            .iter()
            .filter(|e| e.active && e.capabilities.avatar)
            .any(|avatar| {
                self.entities.iter().filter(|e| e.is_steered()).any(|ai| {
                    avatar.body.position.distance(ai.body.position) < radius
                })
            })
    }

    fn spawn_due(&mut self, dt: f32) -> usize {
        let interval = self.settings.population.spawn_interval;
        if interval <= 0.0 {
            return 0;
        }

        self.spawn_timer += dt;
        let mut spawned = 0;
        while self.spawn_timer >= interval {
            self.spawn_timer -= interval;
            if self.ai_count() < self.settings.population.max_ai {
                let id = self.spawn_ai();
                debug!(entity_id = %id, "timed ai spawn");
                spawned += 1;
            }
        }
        spawned
    }
}

impl Drop for SimContext {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

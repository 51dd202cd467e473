use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ColorIndex, EntityId, WorldPos,
    agent::Agent,
    config::{LevelOptions, LevelParams},
    layout::{Placement, Terrain},
    level::{self, Entity, EntityKind, LevelError},
    map::Grid,
    maze::{DepthFirstMazeGenerator, MazeGenerator},
    movement::{Aabb, MAX_SPEED, MoveAction, Mover},
    progress::ProgressEstimator,
    stage::StageTracker,
};

/// Reward for reaching the exit. No other event is rewarded.
pub const COMPLETION_BONUS: f32 = 10.0;

/// What one step reports back to the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub reward: f32,
    pub done: bool,
    pub level_complete: bool,
    pub level_progress: i32,
    pub level_progress_max: i32,
}

/// Result of the agent touching an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEffect {
    Finished,
    KeyCollected(ColorIndex),
    DoorUnlocked(ColorIndex),
    /// Touched a door without its key; nothing happens.
    DoorLocked(ColorIndex),
    Ignored,
}

/// Holds the state of the agent within the level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub position: WorldPos,
    pub radius: f32,
    /// Last horizontal direction moved, for sprites that face their motion.
    pub facing_left: bool,
}

/// Provides a read-only view of the level relevant to an agent.
#[derive(Debug)]
pub struct EnvironmentView<'a> {
    pub agent: &'a AgentState,
    pub terrain: &'a Grid<Terrain>,
    pub entities: &'a [Entity],
    pub tracker: &'a StageTracker,
    pub scale: f32,
}

/// One episode-scoped heist level and everything needed to step it.
///
/// Each instance owns all of its state, including the generator, so
/// environments can run side by side on separate threads.
pub struct Environment {
    pub(crate) options: LevelOptions,
    pub(crate) generator: Box<dyn MazeGenerator + Send>,
    pub(crate) episode: u64,
    pub(crate) steps: u32,
    pub(crate) params: LevelParams,
    pub(crate) terrain: Grid<Terrain>,
    pub(crate) placement: Placement,
    pub(crate) entities: Vec<Entity>,
    pub(crate) agent: AgentState,
    pub(crate) tracker: StageTracker,
    pub(crate) progress: ProgressEstimator,
    pub(crate) done: bool,
    pub(crate) level_complete: bool,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("episode", &self.episode)
            .field("steps", &self.steps)
            .field("params", &self.params)
            .field("agent", &self.agent)
            .field("tracker", &self.tracker)
            .field("progress", &self.progress)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Seed of episode `episode` under base seed `seed`.
fn episode_seed(seed: u64, episode: u64) -> u64 {
    seed ^ episode.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl Environment {
    /// Creates an environment with the depth-first maze generator and builds
    /// episode 0.
    pub fn new(options: LevelOptions) -> Result<Self, LevelError> {
        Self::with_generator(options, Box::new(DepthFirstMazeGenerator))
    }

    pub fn with_generator(
        options: LevelOptions,
        mut generator: Box<dyn MazeGenerator + Send>,
    ) -> Result<Self, LevelError> {
        let mut rng = StdRng::seed_from_u64(episode_seed(options.seed, 0));
        let world_size = options.difficulty.world_dim() as f32;
        let level = level::assemble(&options, world_size, generator.as_mut(), &mut rng)?;

        Ok(Environment {
            options,
            generator,
            episode: 0,
            steps: 0,
            params: level.params,
            terrain: level.terrain,
            placement: level.placement,
            entities: level.entities,
            agent: AgentState {
                position: level.agent_spawn,
                radius: level.agent_radius,
                facing_left: false,
            },
            tracker: level.tracker,
            progress: ProgressEstimator::new(),
            done: false,
            level_complete: false,
        })
    }

    /// Replaces the level with a freshly generated one for the next episode.
    pub fn reset(&mut self) -> Result<(), LevelError> {
        let episode = self.episode + 1;
        let mut rng = StdRng::seed_from_u64(episode_seed(self.options.seed, episode));
        let world_size = self.options.difficulty.world_dim() as f32;
        let level = level::assemble(&self.options, world_size, self.generator.as_mut(), &mut rng)?;

        self.episode = episode;
        self.steps = 0;
        self.params = level.params;
        self.terrain = level.terrain;
        self.placement = level.placement;
        self.entities = level.entities;
        self.agent = AgentState {
            position: level.agent_spawn,
            radius: level.agent_radius,
            facing_left: false,
        };
        self.tracker = level.tracker;
        self.progress = ProgressEstimator::new();
        self.done = false;
        self.level_complete = false;
        Ok(())
    }

    /// Asks `agent` for a move and applies it.
    pub fn process_turn(&mut self, agent: &mut dyn Agent) -> StepOutcome {
        let action = agent.get_action(&self.view());
        self.step(action)
    }

    /// Applies one move: movement, contacts, then progress.
    ///
    /// Once the episode is done further steps change nothing until
    /// [`Environment::reset`].
    pub fn step(&mut self, action: MoveAction) -> StepOutcome {
        if self.done {
            return self.outcome(0.0);
        }
        self.steps += 1;

        let scale = self.placement.scale;
        let (vx, vy) = action.velocity(self.options.velocity_factor());
        let locked_doors: Vec<Aabb> = self
            .entities
            .iter()
            .filter(|e| !self.is_passable(e))
            .map(|e| Aabb::around(e.pos, e.radius))
            .collect();
        let mover = Mover::new(&self.terrain, scale, locked_doors);
        self.agent.position = mover.slide(
            self.agent.position,
            self.agent.radius,
            vx * MAX_SPEED * scale,
            vy * MAX_SPEED * scale,
        );
        if vx != 0.0 {
            self.agent.facing_left = vx < 0.0;
        }

        let touching: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|e| e.overlaps(self.agent.position, self.agent.radius))
            .map(|e| e.id)
            .collect();

        let mut reward = 0.0;
        for id in touching {
            if self.handle_contact(id) == ContactEffect::Finished {
                reward += COMPLETION_BONUS;
            }
        }

        if self.level_complete {
            self.progress.complete();
        } else {
            self.progress.observe(&self.tracker, self.agent.position);
        }

        if !self.done && self.steps >= self.options.episode_timeout {
            debug!(episode = self.episode, steps = self.steps, "episode timed out");
            self.done = true;
        }

        self.outcome(reward)
    }

    /// Applies the effect of the agent touching entity `id`.
    ///
    /// Keys and doors are only removed once the stage tracker accepts the
    /// pickup or unlock; a rejected one leaves the level untouched.
    pub fn handle_contact(&mut self, id: EntityId) -> ContactEffect {
        let Some(entity) = self.entities.iter().find(|e| e.id == id).copied() else {
            return ContactEffect::Ignored;
        };

        match entity.kind {
            EntityKind::Exit => {
                self.done = true;
                self.level_complete = true;
                info!(episode = self.episode, steps = self.steps, "level complete");
                ContactEffect::Finished
            }
            EntityKind::Key(color) => {
                if !self.tracker.collect_key(color) {
                    return ContactEffect::Ignored;
                }
                self.remove_entity(id);
                debug!(%color, "key collected");
                ContactEffect::KeyCollected(color)
            }
            EntityKind::Door(color) => {
                if !self.tracker.unlock_door(color) {
                    return ContactEffect::DoorLocked(color);
                }
                self.remove_entity(id);
                debug!(%color, "door unlocked");
                ContactEffect::DoorUnlocked(color)
            }
            EntityKind::KeyRing(_) => ContactEffect::Ignored,
        }
    }

    fn remove_entity(&mut self, id: EntityId) {
        self.entities.retain(|e| e.id != id);
    }

    /// Whether the agent may move through `entity`. Doors block until their
    /// key is held.
    pub fn is_passable(&self, entity: &Entity) -> bool {
        match entity.kind {
            EntityKind::Door(color) => self.tracker.has_key(color),
            EntityKind::Key(_) | EntityKind::Exit | EntityKind::KeyRing(_) => true,
        }
    }

    /// Whether renderers should draw `entity`. Key-ring indicators appear once
    /// their key is held.
    pub fn is_visible(&self, entity: &Entity) -> bool {
        match entity.kind {
            EntityKind::KeyRing(color) => self.tracker.has_key(color),
            EntityKind::Key(_) | EntityKind::Door(_) | EntityKind::Exit => true,
        }
    }

    fn outcome(&self, reward: f32) -> StepOutcome {
        StepOutcome {
            reward,
            done: self.done,
            level_complete: self.level_complete,
            level_progress: self.progress.level_progress(),
            level_progress_max: self.progress.level_progress_max(),
        }
    }

    pub fn view(&self) -> EnvironmentView<'_> {
        EnvironmentView {
            agent: &self.agent,
            terrain: &self.terrain,
            entities: &self.entities,
            tracker: &self.tracker,
            scale: self.placement.scale,
        }
    }

    pub fn options(&self) -> &LevelOptions {
        &self.options
    }

    pub fn params(&self) -> &LevelParams {
        &self.params
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    /// Seed the current level was generated from.
    pub fn level_seed(&self) -> u64 {
        episode_seed(self.options.seed, self.episode)
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn terrain(&self) -> &Grid<Terrain> {
        &self.terrain
    }

    pub fn scale(&self) -> f32 {
        self.placement.scale
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    pub fn progress(&self) -> &ProgressEstimator {
        &self.progress
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_level_complete(&self) -> bool {
        self.level_complete
    }
}

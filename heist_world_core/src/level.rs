use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    ColorIndex, EntityId, Position, WorldPos,
    config::{LevelOptions, LevelParams},
    layout::{self, Placement, Terrain},
    map::Grid,
    maze::{self, GenerationError, MazeCell, MazeGenerator, NestingViolation},
    stage::StageTracker,
};

/// Generation attempts before a reset gives up on a level.
pub const MAX_GENERATION_ATTEMPTS: usize = 16;

/// Radius of keys, the exit and the agent, in cells.
pub const COLLECTIBLE_RADIUS: f32 = 0.375;
/// Doors fill their whole cell.
pub const DOOR_RADIUS: f32 = 0.5;
/// Radius of a key-ring indicator, in screen units.
pub const KEY_RING_RADIUS: f32 = 0.03;

#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("Maze side {maze_dim} does not fit in a world of side {world_dim}")]
    MazeTooLarge { maze_dim: usize, world_dim: usize },
    #[error("Maze generation failed after {attempts} attempts")]
    Generation {
        attempts: usize,
        #[source]
        source: GenerationError,
    },
    #[error("Every generated maze broke the key/door order ({attempts} attempts)")]
    Nesting {
        attempts: usize,
        #[source]
        source: NestingViolation,
    },
    #[error("Generated maze has no {0}")]
    MissingCell(&'static str),
}

/// What an entity is; the set is closed, so interactions match on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Key(ColorIndex),
    Door(ColorIndex),
    Exit,
    /// HUD indicator shown once the key of this color is held.
    KeyRing(ColorIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: WorldPos,
    /// Half the side of the entity's square footprint.
    pub radius: f32,
    /// Positioned in screen space (`0..1` on both axes) rather than the world.
    pub screen_space: bool,
}

impl Entity {
    /// Strict overlap of two square footprints; touching edges do not count.
    pub fn overlaps(&self, pos: WorldPos, radius: f32) -> bool {
        !self.screen_space
            && (self.pos.x - pos.x).abs() < self.radius + radius
            && (self.pos.y - pos.y).abs() < self.radius + radius
    }
}

/// A fully assembled level, ready to be stepped.
#[derive(Debug, Clone)]
pub struct Level {
    pub params: LevelParams,
    pub terrain: Grid<Terrain>,
    pub placement: Placement,
    pub entities: Vec<Entity>,
    pub agent_spawn: WorldPos,
    pub agent_radius: f32,
    pub tracker: StageTracker,
}

/// Builds the level for one episode.
///
/// Rolls the maze size and key count, asks `generator` for a maze, checks its
/// key/door nesting, and places it at a random offset inside the outer world.
/// Every key, door and the exit becomes an entity sized to the world scale,
/// and one screen-space key-ring indicator is added per color. The stage
/// tracker starts at the agent spawn.
///
/// Mazes that fail to generate or break the key/door nesting order are
/// regenerated, up to [`MAX_GENERATION_ATTEMPTS`] times.
///
/// # Arguments
///
/// * `options`: Difficulty, overrides and seed for the environment.
/// * `world_size`: Side of the outer world in world units.
/// * `generator`: Source of abstract mazes.
/// * `rng`: The episode's random stream; consumed by the roll, the generator
///   and the placement, in that order.
///
/// # Errors
///
/// Returns [`LevelError::MazeTooLarge`] when an override asks for a maze wider
/// than the world, and [`LevelError::Generation`] or [`LevelError::Nesting`]
/// when no attempt produced a usable maze.
pub fn assemble(
    options: &LevelOptions,
    world_size: f32,
    generator: &mut dyn MazeGenerator,
    rng: &mut StdRng,
) -> Result<Level, LevelError> {
    let params = LevelParams::roll(options, rng);
    if params.maze_dim > params.world_dim {
        return Err(LevelError::MazeTooLarge {
            maze_dim: params.maze_dim,
            world_dim: params.world_dim,
        });
    }

    let maze = generate_nested(generator, rng, &params)?;

    let slack = params.world_dim - params.maze_dim;
    let offset = Position {
        x: rng.random_range(0..=slack),
        y: rng.random_range(0..=slack),
    };
    let layout = layout::interpret(&maze, Placement::new(params.world_dim, world_size, offset));
    let scale = layout.placement.scale;

    let mut entities = Vec::new();
    let mut spawn_entity = |kind, pos, radius, screen_space| {
        let id = entities.len();
        entities.push(Entity {
            id,
            kind,
            pos,
            radius,
            screen_space,
        });
    };

    let mut keys = vec![None; params.key_count];
    let mut doors = vec![None; params.key_count];
    let mut exit = None;
    let mut agent_spawn = None;

    for cell in &layout.cells {
        match cell.kind {
            MazeCell::Key(color) => {
                spawn_entity(EntityKind::Key(color), cell.center, COLLECTIBLE_RADIUS * scale, false);
                keys[color.index()] = Some(cell.center);
            }
            MazeCell::Door(color) => {
                spawn_entity(EntityKind::Door(color), cell.center, DOOR_RADIUS * scale, false);
                doors[color.index()] = Some(cell.center);
            }
            MazeCell::Exit => {
                spawn_entity(EntityKind::Exit, cell.center, COLLECTIBLE_RADIUS * scale, false);
                exit = Some(cell.center);
            }
            MazeCell::AgentStart => agent_spawn = Some(cell.center),
            MazeCell::Open | MazeCell::Wall => {}
        }
    }

    for color in ColorIndex::all(params.key_count) {
        let r = KEY_RING_RADIUS;
        let pos = WorldPos::new(1.0 - r * (2.0 * color.index() as f32 + 1.25), r * 0.75);
        spawn_entity(EntityKind::KeyRing(color), pos, r, true);
    }

    let keys = keys
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(LevelError::MissingCell("key"))?;
    let doors = doors
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(LevelError::MissingCell("door"))?;
    let exit = exit.ok_or(LevelError::MissingCell("exit"))?;
    let agent_spawn = agent_spawn.ok_or(LevelError::MissingCell("agent start"))?;

    info!(
        world_dim = params.world_dim,
        maze_dim = params.maze_dim,
        key_count = params.key_count,
        offset_x = offset.x,
        offset_y = offset.y,
        "level assembled"
    );

    Ok(Level {
        params,
        terrain: layout.terrain,
        placement: layout.placement,
        entities,
        agent_spawn,
        agent_radius: COLLECTIBLE_RADIUS * scale,
        tracker: StageTracker::new(agent_spawn, keys, doors, exit),
    })
}

fn generate_nested(
    generator: &mut dyn MazeGenerator,
    rng: &mut StdRng,
    params: &LevelParams,
) -> Result<Grid<MazeCell>, LevelError> {
    let mut last_error = None;

    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let rejection = match generator.generate(rng, params.maze_dim, params.key_count) {
            Ok(maze) => match maze::check_nesting(&maze, params.key_count) {
                Ok(()) => return Ok(maze),
                Err(violation) => LevelError::Nesting {
                    attempts: MAX_GENERATION_ATTEMPTS,
                    source: violation,
                },
            },
            Err(err) => LevelError::Generation {
                attempts: MAX_GENERATION_ATTEMPTS,
                source: err,
            },
        };
        warn!(attempt, reason = %rejection, "rejected generated maze");
        last_error = Some(rejection);
    }

    Err(last_error.unwrap_or(LevelError::MissingCell("maze")))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{config::Difficulty, maze::tests::parse};

    /// Always returns the same maze.
    struct Fixed(Grid<MazeCell>);

    impl MazeGenerator for Fixed {
        fn generate(
            &mut self,
            _rng: &mut StdRng,
            _maze_dim: usize,
            _key_count: usize,
        ) -> Result<Grid<MazeCell>, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn corridor_options() -> LevelOptions {
        LevelOptions::new(Difficulty::Easy, 0)
            .with_maze_dim(9)
            .with_key_count(1)
    }

    /// A 9x9 maze whose only open row is `row`.
    fn single_row(row: &str) -> Fixed {
        let row = parse(&[row]);
        Fixed(Grid::from_generator(9, 9, |x, y| {
            if y == 0 { row[(x, 0)] } else { MazeCell::Wall }
        }))
    }

    fn corridor() -> Fixed {
        single_row("S.k0..D0..E")
    }

    #[test]
    fn spawns_one_entity_per_object_cell() {
        let mut rng = StdRng::seed_from_u64(5);
        let level = assemble(&corridor_options(), 9.0, &mut corridor(), &mut rng).expect("level");

        let kinds: Vec<EntityKind> = level.entities.iter().map(|e| e.kind).collect();
        let c0 = ColorIndex::new(0);
        assert_eq!(
            kinds,
            vec![
                EntityKind::Key(c0),
                EntityKind::Door(c0),
                EntityKind::Exit,
                EntityKind::KeyRing(c0)
            ]
        );
        assert_eq!(level.entities[0].radius, 0.375);
        assert_eq!(level.entities[1].radius, 0.5);
        assert!(level.entities[3].screen_space);
        assert_eq!(level.entities[3].pos, WorldPos::new(1.0 - KEY_RING_RADIUS * 1.25, KEY_RING_RADIUS * 0.75));

        // The maze fills the world, so there is no room to offset it.
        assert_eq!(level.agent_spawn, WorldPos::new(0.5, 0.5));
        assert_eq!(level.tracker.last_anchor(), level.agent_spawn);
        assert_eq!(level.tracker.next_anchor(), WorldPos::new(2.5, 0.5));
        assert_eq!(level.tracker.total_stages(), 3);
    }

    #[test]
    fn oversized_maze_is_rejected() {
        let options = LevelOptions::new(Difficulty::Easy, 0).with_maze_dim(11);
        let err = assemble(&options, 9.0, &mut corridor(), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(LevelError::MazeTooLarge { maze_dim: 11, world_dim: 9 })));
    }

    #[test]
    fn broken_nesting_is_retried_then_reported() {
        let mut broken = single_row("S.D0k0....E");
        let err = assemble(&corridor_options(), 9.0, &mut broken, &mut StdRng::seed_from_u64(0));
        assert!(matches!(
            err,
            Err(LevelError::Nesting {
                source: NestingViolation::KeyUnreachable(_),
                ..
            })
        ));
    }

    #[test]
    fn generated_levels_assemble_for_every_tier() {
        let mut generator = maze::DepthFirstMazeGenerator;
        for difficulty in [Difficulty::Easy, Difficulty::Hard, Difficulty::Memory] {
            for seed in 0..20 {
                let options = LevelOptions::new(difficulty, seed);
                let mut rng = StdRng::seed_from_u64(seed);
                let level = assemble(&options, difficulty.world_dim() as f32, &mut generator, &mut rng)
                    .expect("default levels always generate");
                let key_count = level.params.key_count;
                let rings = level
                    .entities
                    .iter()
                    .filter(|e| matches!(e.kind, EntityKind::KeyRing(_)))
                    .count();
                assert_eq!(rings, key_count);
                assert_eq!(level.tracker.total_stages(), 2 * key_count + 1);
            }
        }
    }
}

#![allow(dead_code)]

use heist_world_core::{
    ColorIndex,
    config::{Difficulty, LevelOptions},
    environment::{Environment, StepOutcome},
    level::{Entity, EntityKind},
    map::Grid,
    maze::{GenerationError, MazeCell, MazeGenerator},
    movement::MoveAction,
};
use rand::rngs::StdRng;

/// Hands out the same maze on every reset.
pub struct FixedMaze(pub Grid<MazeCell>);

impl MazeGenerator for FixedMaze {
    fn generate(
        &mut self,
        _rng: &mut StdRng,
        _maze_dim: usize,
        _key_count: usize,
    ) -> Result<Grid<MazeCell>, GenerationError> {
        Ok(self.0.clone())
    }
}

/// Builds a square maze from rows of `#` wall, `.` open, `S` start, `E` exit,
/// `kN` key N and `DN` door N, padding with wall to `side`.
pub fn maze(side: usize, rows: &[&str]) -> Grid<MazeCell> {
    let parsed: Vec<Vec<MazeCell>> = rows.iter().map(|row| parse_row(row)).collect();
    Grid::from_generator(side, side, |x, y| {
        parsed
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(MazeCell::Wall)
    })
}

fn parse_row(row: &str) -> Vec<MazeCell> {
    let mut cells = Vec::new();
    let mut chars = row.chars();
    while let Some(c) = chars.next() {
        let cell = match c {
            '#' => MazeCell::Wall,
            '.' => MazeCell::Open,
            'S' => MazeCell::AgentStart,
            'E' => MazeCell::Exit,
            'k' | 'D' => {
                let digit = chars.next().and_then(|d| d.to_digit(10)).expect("color digit");
                let color = ColorIndex::new(digit as u8);
                if c == 'k' {
                    MazeCell::Key(color)
                } else {
                    MazeCell::Door(color)
                }
            }
            other => panic!("unknown maze char {other}"),
        };
        cells.push(cell);
    }
    cells
}

/// An environment whose every level is `rows`, filling the tier's world.
pub fn fixed_env(difficulty: Difficulty, key_count: usize, rows: &[&str]) -> Environment {
    let side = difficulty.world_dim();
    let options = LevelOptions::new(difficulty, 0)
        .with_maze_dim(side)
        .with_key_count(key_count);
    Environment::with_generator(options, Box::new(FixedMaze(maze(side, rows))))
        .expect("fixed maze assembles")
}

/// Two-key corridor filling a hard-tier world.
pub fn two_key_corridor() -> Environment {
    fixed_env(Difficulty::Hard, 2, &["S.k0.D0.k1.D1...E"])
}

pub fn walk(env: &mut Environment, action: MoveAction, steps: usize) -> Vec<StepOutcome> {
    (0..steps).map(|_| env.step(action)).collect()
}

/// Steps `action` until `until` holds; returns whether it did within `max`.
pub fn walk_until(
    env: &mut Environment,
    action: MoveAction,
    max: usize,
    until: impl Fn(&Environment) -> bool,
) -> bool {
    for _ in 0..max {
        if until(env) {
            return true;
        }
        env.step(action);
    }
    until(env)
}

pub fn find(env: &Environment, kind: EntityKind) -> Option<Entity> {
    env.entities().iter().find(|e| e.kind == kind).copied()
}

pub fn assert_counters_ordered(env: &Environment) {
    let tracker = env.tracker();
    assert!(tracker.doors_unlocked() <= tracker.keys_collected());
    assert!(tracker.keys_collected() <= tracker.key_count());
}

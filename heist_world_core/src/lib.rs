use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod environment;
pub mod layout;
pub mod level;
pub mod map;
pub mod maze;
pub mod movement;
pub mod progress;
pub mod snapshot;
pub mod stage;
pub mod trajectory;

/// Unique identifier for entities placed in a level (keys, doors, exit, HUD).
pub type EntityId = usize;

/// Upper bound on the number of key/door colors in a level.
pub const MAX_KEYS: usize = 3;

/// Represents a 2D cell coordinate on a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

/// A continuous coordinate in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f32,
    pub y: f32,
}

impl WorldPos {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: WorldPos) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Links one key to the one door it unlocks.
///
/// The same index is the key's place in the dependency chain: key `i` must be
/// collected, and door `i` unlocked, before key `i + 1` becomes reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColorIndex(u8);

impl ColorIndex {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Position of this color in per-color tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over the first `count` colors in chain order.
    pub fn all(count: usize) -> impl Iterator<Item = ColorIndex> {
        (0..count.min(u8::MAX as usize)).map(|i| ColorIndex(i as u8))
    }
}

impl std::fmt::Display for ColorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "color {}", self.0)
    }
}

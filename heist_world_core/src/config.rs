use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::MAX_KEYS;

/// Smallest maze side the difficulty roll can produce.
pub const MIN_MAZE_DIM: usize = 5;

/// Steps after which an unfinished episode ends without reward.
pub const DEFAULT_EPISODE_TIMEOUT: u32 = 1000;

/// Distribution tier; each one fixes the side of the outer world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Easy,
    Hard,
    /// Large world with a camera that follows the agent, so the layout has to
    /// be remembered rather than seen.
    Memory,
}

impl Difficulty {
    pub fn world_dim(self) -> usize {
        match self {
            Difficulty::Easy => 9,
            Difficulty::Hard => 13,
            Difficulty::Memory => 23,
        }
    }

    /// Whether renderers should keep the agent in the middle of the view.
    pub fn centers_agent(self) -> bool {
        self == Difficulty::Memory
    }

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Hard => "hard",
            Difficulty::Memory => "memory",
        }
    }
}

/// Per-environment settings supplied by whoever drives the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOptions {
    pub difficulty: Difficulty,
    /// Fixed maze side instead of the rolled one.
    pub maze_dim: Option<usize>,
    /// Fixed number of keys instead of the rolled one. Capped at [`MAX_KEYS`].
    pub key_count: Option<usize>,
    /// Base seed; episode `n` is generated from `(seed, n)`.
    pub seed: u64,
    pub episode_timeout: u32,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            maze_dim: None,
            key_count: None,
            seed: 0,
            episode_timeout: DEFAULT_EPISODE_TIMEOUT,
        }
    }
}

impl LevelOptions {
    pub fn new(difficulty: Difficulty, seed: u64) -> Self {
        Self {
            difficulty,
            seed,
            ..Self::default()
        }
    }

    /// Builds options from the integer overrides used on the environment
    /// boundary, where any negative value means "unset".
    pub fn from_raw(difficulty: Difficulty, seed: u64, level_size: i32, key_count: i32) -> Self {
        Self {
            maze_dim: usize::try_from(level_size).ok(),
            key_count: usize::try_from(key_count).ok(),
            ..Self::new(difficulty, seed)
        }
    }

    pub fn with_maze_dim(mut self, maze_dim: usize) -> Self {
        self.maze_dim = Some(maze_dim);
        self
    }

    pub fn with_key_count(mut self, key_count: usize) -> Self {
        self.key_count = Some(key_count);
        self
    }

    /// Hand-tuned levels move the agent at half speed.
    pub fn velocity_factor(&self) -> f32 {
        if self.maze_dim.is_none() && self.key_count.is_none() {
            1.0
        } else {
            0.5
        }
    }
}

/// Level parameters resolved for one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelParams {
    pub world_dim: usize,
    pub maze_dim: usize,
    pub key_count: usize,
    /// The roll that sized the maze, in `0..=(world_dim - MIN_MAZE_DIM) / 2`.
    pub roll: usize,
}

impl LevelParams {
    /// Rolls the maze size and key count for one episode.
    ///
    /// Draws the difficulty roll first and the key bonus second, so the
    /// generator sees the same RNG stream for the same seed regardless of
    /// which overrides are set.
    pub fn roll(options: &LevelOptions, rng: &mut StdRng) -> Self {
        let world_dim = options.difficulty.world_dim();
        let max_roll = world_dim.saturating_sub(MIN_MAZE_DIM) / 2;
        let roll = rng.random_range(0..=max_roll);

        let rolled_keys = match options.difficulty {
            Difficulty::Memory => rng.random_range(0..=MAX_KEYS),
            Difficulty::Easy | Difficulty::Hard => roll + rng.random_range(0..=1),
        };
        let key_count = options.key_count.unwrap_or(rolled_keys).min(MAX_KEYS);
        let maze_dim = options.maze_dim.unwrap_or(2 * roll + MIN_MAZE_DIM);

        Self {
            world_dim,
            maze_dim,
            key_count,
            roll,
        }
    }

    pub fn total_stages(&self) -> usize {
        2 * self.key_count + 1
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn rolled_mazes_fit_the_world() {
        for difficulty in [Difficulty::Easy, Difficulty::Hard, Difficulty::Memory] {
            let options = LevelOptions::new(difficulty, 0);
            for seed in 0..200 {
                let params = LevelParams::roll(&options, &mut StdRng::seed_from_u64(seed));
                assert_eq!(params.world_dim, difficulty.world_dim());
                assert!(params.maze_dim >= MIN_MAZE_DIM);
                assert!(params.maze_dim <= params.world_dim);
                assert_eq!(params.maze_dim % 2, 1);
                assert!(params.key_count <= MAX_KEYS);
            }
        }
    }

    #[test]
    fn easy_tier_keys_track_the_roll() {
        let options = LevelOptions::new(Difficulty::Easy, 0);
        for seed in 0..100 {
            let params = LevelParams::roll(&options, &mut StdRng::seed_from_u64(seed));
            let expected = params.key_count == params.roll || params.key_count == params.roll + 1;
            assert!(expected || params.key_count == MAX_KEYS, "{params:?}");
        }
    }

    #[test]
    fn overrides_win_and_keys_are_capped() {
        let options = LevelOptions::new(Difficulty::Hard, 3)
            .with_maze_dim(7)
            .with_key_count(9);
        let params = LevelParams::roll(&options, &mut StdRng::seed_from_u64(1));
        assert_eq!(params.maze_dim, 7);
        assert_eq!(params.key_count, MAX_KEYS);
        assert_eq!(params.total_stages(), 7);
    }

    #[test]
    fn negative_raw_overrides_are_unset() {
        let unset = LevelOptions::from_raw(Difficulty::Easy, 0, -1, -1);
        assert_eq!(unset.maze_dim, None);
        assert_eq!(unset.key_count, None);
        assert_eq!(unset.velocity_factor(), 1.0);

        let keyed = LevelOptions::from_raw(Difficulty::Easy, 0, -1, 2);
        assert_eq!(keyed.key_count, Some(2));
        assert_eq!(keyed.velocity_factor(), 0.5);
    }
}

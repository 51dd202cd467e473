use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{environment::EnvironmentView, movement::MoveAction};

/// Trait defining the behavior of an agent.
/// Agents decide which move to make based on the EnvironmentView.
pub trait Agent {
    /// `&mut self` allows the agent to keep internal state between steps.
    fn get_action(&mut self, view: &EnvironmentView) -> MoveAction;
}

/// An agent that picks one of the nine moves uniformly at random.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn get_action(&mut self, _view: &EnvironmentView) -> MoveAction {
        let index = self.rng.random_range(0..MoveAction::COUNT);
        MoveAction::new(index).unwrap_or(MoveAction::STAY)
    }
}

/// Replays a fixed list of moves, then stands still.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    moves: VecDeque<MoveAction>,
}

impl ScriptedAgent {
    pub fn new(moves: impl IntoIterator<Item = MoveAction>) -> Self {
        Self {
            moves: moves.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.moves.len()
    }
}

impl Agent for ScriptedAgent {
    fn get_action(&mut self, _view: &EnvironmentView) -> MoveAction {
        self.moves.pop_front().unwrap_or(MoveAction::STAY)
    }
}

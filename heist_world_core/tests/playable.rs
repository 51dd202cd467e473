use std::collections::{HashSet, VecDeque};

use heist_world_core::{
    config::{Difficulty, LevelOptions},
    environment::Environment,
    movement::MoveAction,
};

/// Breadth-first search over agent positions and chain progress, replaying
/// every move from a snapshot of each reached state.
fn can_complete(seed: u64, difficulty: Difficulty) -> bool {
    let options = LevelOptions {
        episode_timeout: u32::MAX,
        ..LevelOptions::new(difficulty, seed)
    };
    let mut env = Environment::new(options).expect("level");
    let key = |env: &Environment| {
        let pos = env.agent().position;
        (pos.x.to_bits(), pos.y.to_bits(), env.tracker().current_stage())
    };

    let mut seen = HashSet::from([key(&env)]);
    let mut queue = VecDeque::from([env.snapshot()]);
    while let Some(state) = queue.pop_front() {
        for index in 0..MoveAction::COUNT {
            let action = MoveAction::new(index).expect("index below COUNT");
            env.restore(state.clone()).expect("same world");
            env.step(action);
            if env.is_level_complete() {
                return true;
            }
            if seen.insert(key(&env)) {
                queue.push_back(env.snapshot());
            }
        }
    }
    false
}

#[test]
fn corridor_side_passages_can_be_entered() {
    // The only way out of this level's first corridor is a one-cell opening
    // that fixed-length steps from the spawn never line up with exactly.
    assert!(can_complete(29, Difficulty::Easy));
}

#[test]
fn generated_levels_can_be_completed() {
    for (difficulty, seeds) in [
        (Difficulty::Easy, 0..40),
        (Difficulty::Hard, 0..15),
        (Difficulty::Memory, 0..5),
    ] {
        let unsolvable: Vec<u64> = seeds.filter(|&seed| !can_complete(seed, difficulty)).collect();
        assert!(unsolvable.is_empty(), "{difficulty:?} seeds {unsolvable:?} cannot be won");
    }
}

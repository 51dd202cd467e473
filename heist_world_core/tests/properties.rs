mod common;

use common::assert_counters_ordered;
use heist_world_core::{
    config::{Difficulty, LevelOptions},
    environment::Environment,
    level::EntityKind,
    movement::{MoveAction, Mover},
};
use proptest::prelude::*;

fn difficulty() -> impl Strategy<Value = Difficulty> {
    prop_oneof![
        Just(Difficulty::Easy),
        Just(Difficulty::Hard),
        Just(Difficulty::Memory),
    ]
}

fn moves() -> impl Strategy<Value = Vec<MoveAction>> {
    let action = (0u8..MoveAction::COUNT).prop_map(|i| MoveAction::new(i).unwrap_or(MoveAction::STAY));
    prop::collection::vec(action, 1..300)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stepping_keeps_the_level_consistent(
        seed in any::<u64>(),
        difficulty in difficulty(),
        moves in moves(),
    ) {
        let mut env = Environment::new(LevelOptions::new(difficulty, seed)).expect("level");
        let mut best = env.progress().level_progress_max();

        for action in moves {
            let outcome = env.step(action);
            prop_assert!(outcome.level_progress >= 0 && outcome.level_progress <= 100);
            prop_assert!(outcome.level_progress_max >= best);
            prop_assert!(outcome.level_progress <= outcome.level_progress_max);
            best = outcome.level_progress_max;
            assert_counters_ordered(&env);

            let agent = *env.agent();
            let walls = Mover::new(env.terrain(), env.scale(), vec![]);
            prop_assert!(!walls.is_blocked(agent.position, agent.radius));

            for door in env.entities().iter().filter(|e| matches!(e.kind, EntityKind::Door(_))) {
                if !env.is_passable(door) {
                    let aabb_gap = (door.pos.x - agent.position.x).abs()
                        .max((door.pos.y - agent.position.y).abs());
                    prop_assert!(aabb_gap >= door.radius + agent.radius - 1e-3);
                }
            }
        }
    }

    #[test]
    fn progress_never_decreases(seed in any::<u64>(), moves in moves()) {
        let mut env = Environment::new(LevelOptions::new(Difficulty::Easy, seed)).expect("level");
        let mut last = env.progress().level_progress();
        for action in moves {
            let outcome = env.step(action);
            prop_assert!(outcome.level_progress >= last);
            last = outcome.level_progress;
        }
    }

    #[test]
    fn snapshots_replay_identically(
        seed in any::<u64>(),
        prefix in moves(),
        suffix in moves(),
    ) {
        let options = LevelOptions::new(Difficulty::Hard, seed);
        let mut env = Environment::new(options.clone()).expect("level");
        for action in prefix {
            env.step(action);
        }
        let saved = env.save_state().expect("save");

        let mut twin = Environment::new(options).expect("level");
        twin.load_state(&saved).expect("load");
        for action in suffix {
            prop_assert_eq!(env.step(action), twin.step(action));
            prop_assert_eq!(env.agent(), twin.agent());
        }
        prop_assert_eq!(env.snapshot(), twin.snapshot());
    }
}

//! Save and restore of a running episode.
//!
//! A snapshot holds everything stepping reads or writes, so restoring one into
//! any environment built with the same options replays identically. The
//! encoding is bincode, which stores `f32` values bit for bit.

use serde::{Deserialize, Serialize};

use crate::{
    config::LevelParams,
    environment::{AgentState, Environment},
    layout::{Placement, Terrain},
    level::Entity,
    map::Grid,
    progress::ProgressEstimator,
    stage::StageTracker,
};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to encode snapshot")]
    Encode(#[source] bincode::Error),
    #[error("Failed to decode snapshot")]
    Decode(#[source] bincode::Error),
    #[error("Snapshot world side {snapshot} does not match environment side {environment}")]
    WorldMismatch { snapshot: usize, environment: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub episode: u64,
    pub steps: u32,
    pub params: LevelParams,
    pub placement: Placement,
    pub terrain: Grid<Terrain>,
    pub entities: Vec<Entity>,
    pub agent: AgentState,
    pub tracker: StageTracker,
    pub progress: ProgressEstimator,
    pub done: bool,
    pub level_complete: bool,
}

impl EnvironmentSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(SnapshotError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        bincode::deserialize(bytes).map_err(SnapshotError::Decode)
    }
}

impl Environment {
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            episode: self.episode,
            steps: self.steps,
            params: self.params,
            placement: self.placement,
            terrain: self.terrain.clone(),
            entities: self.entities.clone(),
            agent: self.agent,
            tracker: self.tracker.clone(),
            progress: self.progress,
            done: self.done,
            level_complete: self.level_complete,
        }
    }

    /// Replaces the episode state with `snapshot`.
    ///
    /// The snapshot must come from an environment with the same difficulty
    /// tier; options such as speed and timeout stay those of `self`.
    pub fn restore(&mut self, snapshot: EnvironmentSnapshot) -> Result<(), SnapshotError> {
        let world_dim = self.options.difficulty.world_dim();
        if snapshot.params.world_dim != world_dim || snapshot.terrain.width() != world_dim {
            return Err(SnapshotError::WorldMismatch {
                snapshot: snapshot.params.world_dim,
                environment: world_dim,
            });
        }

        self.episode = snapshot.episode;
        self.steps = snapshot.steps;
        self.params = snapshot.params;
        self.placement = snapshot.placement;
        self.terrain = snapshot.terrain;
        self.entities = snapshot.entities;
        self.agent = snapshot.agent;
        self.tracker = snapshot.tracker;
        self.progress = snapshot.progress;
        self.done = snapshot.done;
        self.level_complete = snapshot.level_complete;
        Ok(())
    }

    /// Snapshot encoded to bytes.
    pub fn save_state(&self) -> Result<Vec<u8>, SnapshotError> {
        self.snapshot().encode()
    }

    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        self.restore(EnvironmentSnapshot::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Difficulty, LevelOptions};

    #[test]
    fn encoded_snapshot_round_trips_exactly() {
        let env = Environment::new(LevelOptions::new(Difficulty::Hard, 11)).expect("level");
        let snapshot = env.snapshot();
        let bytes = snapshot.encode().expect("encode");
        assert_eq!(EnvironmentSnapshot::decode(&bytes).expect("decode"), snapshot);
    }

    #[test]
    fn snapshots_only_restore_into_matching_worlds() {
        let easy = Environment::new(LevelOptions::new(Difficulty::Easy, 1)).expect("level");
        let mut hard = Environment::new(LevelOptions::new(Difficulty::Hard, 1)).expect("level");
        let err = hard.restore(easy.snapshot());
        assert!(matches!(
            err,
            Err(SnapshotError::WorldMismatch {
                snapshot: 9,
                environment: 13
            })
        ));
        assert!(matches!(
            EnvironmentSnapshot::decode(&[1, 2, 3]),
            Err(SnapshotError::Decode(_))
        ));
    }
}

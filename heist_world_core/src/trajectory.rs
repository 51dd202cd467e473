//! Per-episode trajectory logs and their summaries.
//!
//! A [`TrajectoryRecorder`] writes one bincode file per finished episode,
//! named `<prefix><index>.traj` with a nine-digit index, so a directory of
//! them sorts back into play order. [`trajectory_sequences`] and
//! [`Trajectory::summary`] read them back for analysis.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::{LevelOptions, LevelParams},
    environment::{Environment, StepOutcome},
};

pub const TRAJECTORY_EXTENSION: &str = "traj";

#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    #[error("Trajectory directory {0} already exists")]
    DirectoryExists(PathBuf),
    #[error("Failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write trajectory {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("Failed to read trajectory {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

impl TrajectoryError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the files of one recording session go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogMethod {
    /// Straight into the given directory, which must not exist yet.
    Direct,
    /// Into a fresh subdirectory named after the session start time, so
    /// repeated sessions can share one directory.
    #[default]
    Append,
}

/// What one step reported, plus the level it was played on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub reward: f32,
    pub done: bool,
    pub level_complete: bool,
    pub level_progress: i32,
    pub level_progress_max: i32,
    pub level_seed: u64,
    /// Whether the episode recorded before this one completed its level.
    pub prev_level_complete: bool,
}

/// Every step of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub options: LevelOptions,
    pub params: LevelParams,
    pub steps: Vec<StepRecord>,
}

/// The per-episode figures of interest when looking over a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub level_seed: u64,
    pub options: LevelOptions,
    pub params: LevelParams,
    pub length: usize,
    pub reward: f32,
    pub level_complete: bool,
    /// Progress reported by the final step.
    pub final_progress: i32,
    pub max_progress: i32,
}

impl Trajectory {
    /// Summarises the episode; `None` for a trajectory with no steps.
    pub fn summary(&self) -> Option<EpisodeSummary> {
        let first = self.steps.first()?;
        let last = self.steps.last()?;
        Some(EpisodeSummary {
            level_seed: first.level_seed,
            options: self.options.clone(),
            params: self.params,
            length: self.steps.len(),
            reward: self.steps.iter().map(|s| s.reward).sum(),
            level_complete: last.level_complete,
            final_progress: last.level_progress,
            max_progress: last.level_progress_max,
        })
    }
}

/// Collects steps as they are played and writes each episode on completion.
#[derive(Debug)]
pub struct TrajectoryRecorder {
    directory: PathBuf,
    prefix: String,
    next_index: u64,
    prev_level_complete: bool,
    current: Option<Trajectory>,
}

impl TrajectoryRecorder {
    /// Creates the output directory for a recording session.
    ///
    /// # Arguments
    ///
    /// * `base`: The directory given on the command line.
    /// * `prefix`: Prepended to each file's episode index.
    /// * `method`: Whether files go in `base` itself or in a new session
    ///   subdirectory of it.
    ///
    /// # Errors
    ///
    /// Fails if the target directory already exists or cannot be created.
    pub fn create(base: &Path, prefix: &str, method: LogMethod) -> Result<Self, TrajectoryError> {
        let directory = match method {
            LogMethod::Direct => base.to_path_buf(),
            LogMethod::Append => {
                let started = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                base.join(started.to_string())
            }
        };
        if directory.exists() {
            return Err(TrajectoryError::DirectoryExists(directory));
        }
        fs::create_dir_all(&directory).map_err(TrajectoryError::io(&directory))?;

        Ok(Self {
            directory,
            prefix: prefix.to_string(),
            next_index: 0,
            prev_level_complete: false,
            current: None,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Appends the outcome of the step `environment` just took.
    pub fn record(&mut self, environment: &Environment, outcome: &StepOutcome) {
        let trajectory = self.current.get_or_insert_with(|| Trajectory {
            options: environment.options().clone(),
            params: *environment.params(),
            steps: Vec::new(),
        });
        trajectory.steps.push(StepRecord {
            reward: outcome.reward,
            done: outcome.done,
            level_complete: outcome.level_complete,
            level_progress: outcome.level_progress,
            level_progress_max: outcome.level_progress_max,
            level_seed: environment.level_seed(),
            prev_level_complete: self.prev_level_complete,
        });
    }

    /// Writes the episode recorded so far and starts a new one. Returns the
    /// file written, or `None` if no step was recorded.
    pub fn finish_episode(&mut self) -> Result<Option<PathBuf>, TrajectoryError> {
        let Some(trajectory) = self.current.take() else {
            return Ok(None);
        };
        let path = self
            .directory
            .join(format!("{}{:09}.{TRAJECTORY_EXTENSION}", self.prefix, self.next_index));
        self.next_index += 1;
        self.prev_level_complete = trajectory.steps.last().is_some_and(|s| s.level_complete);

        let file = File::create(&path).map_err(TrajectoryError::io(&path))?;
        bincode::serialize_into(BufWriter::new(file), &trajectory).map_err(|source| {
            TrajectoryError::Encode {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), steps = trajectory.steps.len(), "trajectory written");
        Ok(Some(path))
    }
}

pub fn read_trajectory(path: &Path) -> Result<Trajectory, TrajectoryError> {
    let file = File::open(path).map_err(TrajectoryError::io(path))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| TrajectoryError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Episode index encoded at the end of a trajectory file name.
fn episode_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    stem[stem.len() - digits..].parse().ok()
}

/// The trajectory files directly inside `dir`, in episode order.
pub fn trajectory_paths(dir: &Path) -> Result<Vec<PathBuf>, TrajectoryError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(TrajectoryError::io(dir))? {
        let path = entry.map_err(TrajectoryError::io(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == TRAJECTORY_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| episode_index(a).cmp(&episode_index(b)).then_with(|| a.cmp(b)));
    Ok(paths)
}

/// Groups the recordings under `dir` by session.
///
/// A directory holding trajectory files is one session. Otherwise each
/// session subdirectory (as made by [`LogMethod::Append`]) is one, oldest
/// first; other subdirectories are skipped.
pub fn trajectory_sequences(dir: &Path) -> Result<Vec<Vec<PathBuf>>, TrajectoryError> {
    let paths = trajectory_paths(dir)?;
    if !paths.is_empty() {
        return Ok(vec![paths]);
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(dir).map_err(TrajectoryError::io(dir))? {
        let path = entry.map_err(TrajectoryError::io(dir))?.path();
        let started = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<u64>().ok());
        if let (true, Some(started)) = (path.is_dir(), started) {
            sessions.push((started, path));
        }
    }
    sessions.sort();

    let mut sequences = Vec::new();
    for (_, session) in sessions {
        let paths = trajectory_paths(&session)?;
        if paths.is_empty() {
            warn!(dir = %session.display(), "session directory holds no trajectories");
        } else {
            sequences.push(paths);
        }
    }
    Ok(sequences)
}

use serde::{Deserialize, Serialize};

use crate::{WorldPos, stage::StageTracker};

/// Slope used when the last and next anchors coincide. Any agent not exactly
/// on the anchor then scores far below the stage floor and is clamped away.
pub const COINCIDENT_ANCHOR_SLOPE: f64 = -1.0e6;

/// Distance-interpolated completion for the current stage, in `0..=100`.
///
/// Within stage `s` of `n`, the value runs linearly from `s / n` at the last
/// anchor to `(s + 1) / n` at the next one.
pub fn interpolate(tracker: &StageTracker, agent: WorldPos) -> i32 {
    let (last, next) = (tracker.last_anchor(), tracker.next_anchor());
    let stage_dist = f64::from(last.distance(next));
    let dist_to_next = f64::from(next.distance(agent));

    let slope = if stage_dist > 0.0 {
        -1.0 / stage_dist
    } else {
        COINCIDENT_ANCHOR_SLOPE
    };

    let stages_done = slope * dist_to_next + tracker.current_stage() as f64 + 1.0;
    let percent = (stages_done / tracker.total_stages() as f64 * 100.0).round();
    // f64 holds the sentinel product exactly enough; clamp before narrowing.
    percent.clamp(0.0, 100.0) as i32
}

/// Monotone progress metrics reported each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEstimator {
    level_progress: i32,
    level_progress_max: i32,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the current position into both metrics. Neither ever decreases,
    /// even when the agent walks away from its next anchor.
    pub fn observe(&mut self, tracker: &StageTracker, agent: WorldPos) {
        let raw = interpolate(tracker, agent);
        self.level_progress = self.level_progress.max(raw);
        self.level_progress_max = self.level_progress_max.max(self.level_progress);
    }

    /// Pins both metrics to 100 once the level is complete.
    pub fn complete(&mut self) {
        self.level_progress = 100;
        self.level_progress_max = 100;
    }

    pub fn level_progress(&self) -> i32 {
        self.level_progress
    }

    pub fn level_progress_max(&self) -> i32 {
        self.level_progress_max
    }
}

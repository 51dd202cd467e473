use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ColorIndex, WorldPos};

/// Tracks progress through the objective chain
/// start → key₀ → door₀ → … → key₍ₙ₋₁₎ → door₍ₙ₋₁₎ → exit.
///
/// Keys can be picked up in any physical order; the next anchor is derived
/// only from how many keys are held and how many doors are open. That matches
/// the chain as long as the maze keeps door `i` as the only way to key `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTracker {
    key_count: usize,
    has_keys: Vec<bool>,
    key_positions: Vec<WorldPos>,
    door_positions: Vec<WorldPos>,
    exit: WorldPos,
    keys_collected: usize,
    doors_unlocked: usize,
    current_stage: usize,
    total_stages: usize,
    last_anchor: WorldPos,
    next_anchor: WorldPos,
}

impl StageTracker {
    /// Creates a tracker standing at the start of a chain.
    ///
    /// The first anchor pair runs from `start` to key 0, or straight to the
    /// exit when there are no keys.
    ///
    /// # Arguments
    ///
    /// * `start`: Where the agent spawns; the first `last_anchor`.
    /// * `keys`: `keys[i]` is the position of the key of color `i`.
    /// * `doors`: `doors[i]` is the position of the door of color `i`. Must be
    ///   as long as `keys`.
    /// * `exit`: Position of the exit, the final anchor.
    pub fn new(start: WorldPos, keys: Vec<WorldPos>, doors: Vec<WorldPos>, exit: WorldPos) -> Self {
        debug_assert_eq!(keys.len(), doors.len());
        let key_count = keys.len();
        let next_anchor = keys.first().copied().unwrap_or(exit);

        Self {
            key_count,
            has_keys: vec![false; key_count],
            key_positions: keys,
            door_positions: doors,
            exit,
            keys_collected: 0,
            doors_unlocked: 0,
            current_stage: 0,
            total_stages: 2 * key_count + 1,
            last_anchor: start,
            next_anchor,
        }
    }

    /// Moves to the next stage of the chain.
    ///
    /// Called once per key pickup and once per door unlock, after the
    /// matching counter has been bumped.
    pub fn advance_stage(&mut self) {
        self.current_stage += 1;
        self.last_anchor = self.next_anchor;

        self.next_anchor = self.position_of(self.next_objective());

        debug!(
            stage = self.current_stage,
            keys = self.keys_collected,
            doors = self.doors_unlocked,
            next_x = self.next_anchor.x,
            next_y = self.next_anchor.y,
            "stage advanced"
        );
    }

    /// Records a key pickup. Returns `false`, changing nothing, if the color is
    /// unknown or already held.
    pub fn collect_key(&mut self, color: ColorIndex) -> bool {
        match self.has_keys.get_mut(color.index()) {
            Some(held) if !*held => *held = true,
            _ => return false,
        }
        self.keys_collected += 1;
        self.advance_stage();
        true
    }

    /// Records a door unlock. Returns `false`, changing nothing, unless the
    /// door's key is held.
    pub fn unlock_door(&mut self, color: ColorIndex) -> bool {
        if !self.has_key(color) || self.doors_unlocked >= self.keys_collected {
            return false;
        }
        self.doors_unlocked += 1;
        self.advance_stage();
        true
    }

    pub fn has_key(&self, color: ColorIndex) -> bool {
        self.has_keys.get(color.index()).copied().unwrap_or(false)
    }

    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn keys_collected(&self) -> usize {
        self.keys_collected
    }

    pub fn doors_unlocked(&self) -> usize {
        self.doors_unlocked
    }

    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    pub fn total_stages(&self) -> usize {
        self.total_stages
    }

    pub fn last_anchor(&self) -> WorldPos {
        self.last_anchor
    }

    pub fn next_anchor(&self) -> WorldPos {
        self.next_anchor
    }

    pub fn key_position(&self, color: ColorIndex) -> Option<WorldPos> {
        self.key_positions.get(color.index()).copied()
    }

    pub fn door_position(&self, color: ColorIndex) -> Option<WorldPos> {
        self.door_positions.get(color.index()).copied()
    }

    pub fn exit(&self) -> WorldPos {
        self.exit
    }

    /// True once every door is open and only the exit remains.
    pub fn on_final_stage(&self) -> bool {
        self.doors_unlocked == self.key_count
    }

    /// What the agent has to reach next, from the counters alone.
    ///
    /// With every door open that is the exit. Otherwise, with as many doors
    /// open as keys held, it is the next key; while a key is held whose door
    /// is still shut, it is the first shut door.
    pub fn next_objective(&self) -> Objective {
        let color = |n: usize| ColorIndex::all(self.key_count).nth(n);
        if self.on_final_stage() {
            Objective::Exit
        } else if self.keys_collected == self.doors_unlocked {
            color(self.keys_collected).map_or(Objective::Exit, Objective::Key)
        } else {
            color(self.doors_unlocked).map_or(Objective::Exit, Objective::Door)
        }
    }

    /// Position of `objective`, falling back to the exit for unknown colors.
    pub fn position_of(&self, objective: Objective) -> WorldPos {
        match objective {
            Objective::Key(color) => self.key_position(color),
            Objective::Door(color) => self.door_position(color),
            Objective::Exit => None,
        }
        .unwrap_or(self.exit)
    }
}

/// The next anchor of the chain, named by what sits there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Key(ColorIndex),
    Door(ColorIndex),
    Exit,
}

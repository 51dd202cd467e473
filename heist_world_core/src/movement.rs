use serde::{Deserialize, Serialize};

use crate::{WorldPos, layout::Terrain, map::Grid};

/// Distance covered per step at full velocity, in cells.
pub const MAX_SPEED: f32 = 0.75;

/// Penetration ignored by collision, so a box clamped flush against a wall
/// can still slide along it after float rounding.
pub const CONTACT_EPSILON: f32 = 1e-4;

/// One of the nine discrete moves: index `m` maps to the velocity
/// `(m / 3 - 1, m % 3 - 1)`, so 4 stands still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveAction(u8);

impl MoveAction {
    pub const COUNT: u8 = 9;
    pub const STAY: MoveAction = MoveAction(4);
    pub const UP: MoveAction = MoveAction(3);
    pub const DOWN: MoveAction = MoveAction(5);
    pub const LEFT: MoveAction = MoveAction(1);
    pub const RIGHT: MoveAction = MoveAction(7);

    /// Returns `None` for indices outside `0..9`.
    pub fn new(index: u8) -> Option<Self> {
        (index < Self::COUNT).then_some(Self(index))
    }

    /// The move whose velocity has the signs of `dx` and `dy`.
    pub fn from_direction(dx: i32, dy: i32) -> Self {
        let (vx, vy) = (dx.signum() + 1, dy.signum() + 1);
        Self((vx * 3 + vy) as u8)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Velocity components in `{-1, 0, 1}`, scaled by `factor`.
    pub fn velocity(self, factor: f32) -> (f32, f32) {
        let vx = (self.0 / 3) as f32 - 1.0;
        let vy = (self.0 % 3) as f32 - 1.0;
        (vx * factor, vy * factor)
    }
}

/// Axis-aligned box used for collision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: WorldPos,
    pub max: WorldPos,
}

impl Aabb {
    pub fn around(center: WorldPos, radius: f32) -> Self {
        Self {
            min: WorldPos::new(center.x - radius, center.y - radius),
            max: WorldPos::new(center.x + radius, center.y + radius),
        }
    }

    /// Overlap deeper than [`CONTACT_EPSILON`]; boxes sharing an edge do not
    /// collide.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x - CONTACT_EPSILON
            && self.max.x > other.min.x + CONTACT_EPSILON
            && self.min.y < other.max.y - CONTACT_EPSILON
            && self.max.y > other.min.y + CONTACT_EPSILON
    }
}

/// Largest offset from a cell centre, in cells, that a blocked move corrects
/// by snapping onto the centre.
pub const CORNER_ASSIST: f32 = 0.375;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn of(self, pos: WorldPos) -> f32 {
        match self {
            Axis::X => pos.x,
            Axis::Y => pos.y,
        }
    }

    fn with(self, pos: WorldPos, value: f32) -> WorldPos {
        match self {
            Axis::X => WorldPos::new(value, pos.y),
            Axis::Y => WorldPos::new(pos.x, value),
        }
    }

    fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Signed distance from `v` to the centre of the cell containing it.
fn offset_from_cell_centre(v: f32, scale: f32) -> f32 {
    v - ((v / scale).floor() + 0.5) * scale
}

/// Resolves agent moves against static terrain and a set of blocking boxes.
///
/// Anything outside the terrain grid counts as wall.
#[derive(Debug)]
pub struct Mover<'a> {
    terrain: &'a Grid<Terrain>,
    scale: f32,
    blockers: Vec<Aabb>,
}

impl<'a> Mover<'a> {
    pub fn new(terrain: &'a Grid<Terrain>, scale: f32, blockers: Vec<Aabb>) -> Self {
        Self {
            terrain,
            scale,
            blockers,
        }
    }

    /// Moves a box of `radius` centred at `pos` by `(dx, dy)`, one axis at a
    /// time, stopping flush against the first obstacle on each axis.
    ///
    /// A blocked move that would get further from the centre of the agent's
    /// cell across the move snaps onto that centre first, as long as the
    /// agent is within [`CORNER_ASSIST`] of it. Fixed-length steps along a
    /// corridor then always reach a position that fits each side passage.
    ///
    /// Displacements must stay below one cell so nothing can be skipped over.
    pub fn slide(&self, pos: WorldPos, radius: f32, dx: f32, dy: f32) -> WorldPos {
        let moved = self.assisted_slide(pos, radius, dx, Axis::X);
        self.assisted_slide(moved, radius, dy, Axis::Y)
    }

    /// True if a box of `radius` at `pos` overlaps a wall or blocker.
    pub fn is_blocked(&self, pos: WorldPos, radius: f32) -> bool {
        !self.obstacles(&Aabb::around(pos, radius)).is_empty()
    }

    fn assisted_slide(&self, pos: WorldPos, radius: f32, delta: f32, axis: Axis) -> WorldPos {
        let moved = self.slide_axis(pos, radius, delta, axis);
        if delta == 0.0 || axis.of(moved) == axis.of(pos) + delta {
            return moved;
        }

        let across = axis.other();
        let offset = offset_from_cell_centre(across.of(pos), self.scale);
        if offset == 0.0 || offset.abs() > CORNER_ASSIST * self.scale {
            return moved;
        }
        let snapped = across.with(pos, across.of(pos) - offset);
        if self.is_blocked(snapped, radius) {
            return moved;
        }

        let assisted = self.slide_axis(snapped, radius, delta, axis);
        let travelled = |p: WorldPos| (axis.of(p) - axis.of(pos)).abs();
        if travelled(assisted) > travelled(moved) + CONTACT_EPSILON {
            assisted
        } else {
            moved
        }
    }

    fn slide_axis(&self, pos: WorldPos, radius: f32, delta: f32, axis: Axis) -> WorldPos {
        let origin = axis.of(pos);
        if delta == 0.0 {
            return pos;
        }

        let target = origin + delta;
        let hits = self.obstacles(&Aabb::around(axis.with(pos, target), radius));
        if hits.is_empty() {
            return axis.with(pos, target);
        }

        let stop = if delta > 0.0 {
            let edge = hits.iter().map(|b| axis.of(b.min)).fold(f32::INFINITY, f32::min);
            (edge - radius).clamp(origin, target)
        } else {
            let edge = hits.iter().map(|b| axis.of(b.max)).fold(f32::NEG_INFINITY, f32::max);
            (edge + radius).clamp(target, origin)
        };
        axis.with(pos, stop)
    }

    /// Every wall cell and blocker that strictly overlaps `area`.
    fn obstacles(&self, area: &Aabb) -> Vec<Aabb> {
        let first = |v: f32| ((v + CONTACT_EPSILON) / self.scale).floor() as i64;
        let last = |v: f32| ((v - CONTACT_EPSILON) / self.scale).ceil() as i64 - 1;

        let mut hits = Vec::new();
        for cy in first(area.min.y)..=last(area.max.y) {
            for cx in first(area.min.x)..=last(area.max.x) {
                let wall = !matches!(self.terrain.get_signed(cx, cy), Some(Terrain::Space));
                if wall {
                    let min = WorldPos::new(cx as f32 * self.scale, cy as f32 * self.scale);
                    let max = WorldPos::new(min.x + self.scale, min.y + self.scale);
                    hits.push(Aabb { min, max });
                }
            }
        }
        hits.extend(self.blockers.iter().filter(|b| b.overlaps(area)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor(cells: &[Terrain]) -> Grid<Terrain> {
        Grid::from_generator(cells.len(), 1, |x, _| cells[x])
    }

    #[test]
    fn move_index_maps_to_velocity() {
        assert_eq!(MoveAction::new(0).map(|m| m.velocity(1.0)), Some((-1.0, -1.0)));
        assert_eq!(MoveAction::STAY.velocity(1.0), (0.0, 0.0));
        assert_eq!(MoveAction::new(8).map(|m| m.velocity(0.5)), Some((0.5, 0.5)));
        assert_eq!(MoveAction::new(9), None);
        assert_eq!(MoveAction::from_direction(5, 0), MoveAction::RIGHT);
        assert_eq!(MoveAction::from_direction(0, -2), MoveAction::UP);
        assert_eq!(MoveAction::UP.velocity(1.0), (0.0, -1.0));
    }

    #[test]
    fn slides_until_flush_with_a_wall() {
        use Terrain::{Space, Wall};
        let terrain = corridor(&[Space, Space, Wall]);
        let mover = Mover::new(&terrain, 1.0, vec![]);

        let pos = mover.slide(WorldPos::new(0.5, 0.5), 0.375, 0.75, 0.0);
        assert_eq!(pos, WorldPos::new(1.25, 0.5));
        let pos = mover.slide(pos, 0.375, 0.75, 0.0);
        assert_eq!(pos, WorldPos::new(1.625, 0.5));
        // Outside the grid is wall, so an upward move stops at the top edge.
        assert_eq!(mover.slide(pos, 0.375, 0.0, -0.75), WorldPos::new(1.625, 0.375));
    }

    #[test]
    fn blockers_stop_movement_like_walls() {
        let terrain = corridor(&[Terrain::Space; 4]);
        let door = Aabb::around(WorldPos::new(2.5, 0.5), 0.5);
        let blocked = Mover::new(&terrain, 1.0, vec![door]);
        let open = Mover::new(&terrain, 1.0, vec![]);

        let start = WorldPos::new(1.5, 0.5);
        assert_eq!(blocked.slide(start, 0.375, 0.75, 0.0), WorldPos::new(1.625, 0.5));
        assert_eq!(open.slide(start, 0.375, 0.75, 0.0), WorldPos::new(2.25, 0.5));
        assert!(blocked.is_blocked(WorldPos::new(2.5, 0.5), 0.375));
        assert!(!open.is_blocked(WorldPos::new(2.5, 0.5), 0.375));
    }

    /// A corridor along row 0 with a single opening down at column 1.
    fn tee() -> Grid<Terrain> {
        Grid::from_generator(3, 2, |x, y| {
            if y == 0 || x == 1 { Terrain::Space } else { Terrain::Wall }
        })
    }

    #[test]
    fn clipped_corners_snap_onto_the_opening() {
        let terrain = tee();
        let mover = Mover::new(&terrain, 1.0, vec![]);

        assert_eq!(mover.slide(WorldPos::new(1.25, 0.5), 0.375, 0.0, 0.75), WorldPos::new(1.5, 1.25));
        assert_eq!(mover.slide(WorldPos::new(1.875, 0.5), 0.375, 0.0, 0.75), WorldPos::new(1.5, 1.25));
        // Too far from the centre: the move stops against the corner instead.
        assert_eq!(mover.slide(WorldPos::new(1.0, 0.5), 0.375, 0.0, 0.75), WorldPos::new(1.0, 0.625));
    }

    #[test]
    fn head_on_walls_never_snap() {
        let terrain = tee();
        let mover = Mover::new(&terrain, 1.0, vec![]);

        // Pushing up into the outer wall gains nothing from snapping.
        assert_eq!(mover.slide(WorldPos::new(1.25, 0.5), 0.375, 0.0, -0.75), WorldPos::new(1.25, 0.375));
        // Nor does pushing down where the whole cell below is wall.
        assert_eq!(mover.slide(WorldPos::new(0.625, 0.5), 0.375, 0.0, 0.75), WorldPos::new(0.625, 0.625));
    }
}

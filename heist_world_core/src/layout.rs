use serde::{Deserialize, Serialize};

use crate::{Position, WorldPos, map::Grid, maze::MazeCell};

/// Static terrain of the outer world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terrain {
    Wall,
    Space,
}

/// Where a maze sits inside the outer world, and how big a cell is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub world_dim: usize,
    /// Cell of the outer world that maze cell `(0, 0)` lands on.
    pub offset: Position,
    /// World units per cell.
    pub scale: f32,
}

impl Placement {
    /// A placement whose cells divide a world `world_size` units across into
    /// `world_dim` cells.
    pub fn new(world_dim: usize, world_size: f32, offset: Position) -> Self {
        Self {
            world_dim,
            offset,
            scale: world_size / world_dim as f32,
        }
    }

    /// World-space centre of outer-world cell `(x, y)`.
    pub fn cell_center(&self, x: usize, y: usize) -> WorldPos {
        WorldPos::new((x as f32 + 0.5) * self.scale, (y as f32 + 0.5) * self.scale)
    }
}

/// A non-wall maze cell after it has been placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedCell {
    /// Outer-world cell coordinates.
    pub cell: Position,
    pub center: WorldPos,
    pub kind: MazeCell,
}

/// The interpreted maze: world terrain plus every cell that needs an entity
/// or marks a spawn point.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub terrain: Grid<Terrain>,
    pub cells: Vec<PlacedCell>,
    pub placement: Placement,
}

/// Interprets a generated maze inside the outer world.
///
/// Everything outside the maze's footprint stays wall. The maze is trusted to
/// fit inside the world at the given offset; cells that would fall outside are
/// skipped.
pub fn interpret(maze: &Grid<MazeCell>, placement: Placement) -> Layout {
    let mut terrain = Grid::square(placement.world_dim, Terrain::Wall);
    let mut cells = Vec::new();

    for ((i, j), kind) in maze.enumerate() {
        if kind.is_wall() {
            continue;
        }
        let (x, y) = (placement.offset.x + i, placement.offset.y + j);
        if terrain.set(x, y, Terrain::Space).is_err() {
            continue;
        }
        cells.push(PlacedCell {
            cell: Position { x, y },
            center: placement.cell_center(x, y),
            kind: *kind,
        });
    }

    Layout {
        terrain,
        cells,
        placement,
    }
}

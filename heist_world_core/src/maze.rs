use std::collections::VecDeque;

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{ColorIndex, Position, map::Grid};

/// One cell of a generated maze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MazeCell {
    Wall,
    Open,
    AgentStart,
    Exit,
    Key(ColorIndex),
    Door(ColorIndex),
}

impl MazeCell {
    #[inline]
    pub fn is_wall(self) -> bool {
        matches!(self, MazeCell::Wall)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Maze dimension must be at least 1")]
    EmptyMaze,
    #[error("Longest path holds {available} cells but {key_count} keys need {required}")]
    PathTooShort {
        key_count: usize,
        required: usize,
        available: usize,
    },
}

/// Ways a generated maze can break the key/door nesting order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NestingViolation {
    #[error("Maze has no agent start cell")]
    MissingStart,
    #[error("Key/door cell uses {0} but the level only has {1} colors")]
    UnknownColor(ColorIndex, usize),
    #[error("Key for {0} cannot be reached once the earlier doors are open")]
    KeyUnreachable(ColorIndex),
    #[error("Key for {0} is reachable before the door guarding it is open")]
    KeyReachableEarly(ColorIndex),
    #[error("Door for {0} cannot be reached once its key is held")]
    DoorUnreachable(ColorIndex),
    #[error("Exit is reachable before every door is open")]
    ExitReachableEarly,
    #[error("Exit cannot be reached with every door open")]
    ExitUnreachable,
}

/// Produces a square maze with `key_count` key/door pairs.
///
/// Implementations must honour the nesting invariant: door `i` is the only way
/// to key `i + 1` (or to the exit for the last color), and key `i` is reachable
/// with doors `0..i` open.
pub trait MazeGenerator {
    fn generate(
        &mut self,
        rng: &mut StdRng,
        maze_dim: usize,
        key_count: usize,
    ) -> Result<Grid<MazeCell>, GenerationError>;
}

/// Carves a perfect maze with a randomized depth-first search and threads the
/// key/door chain along its longest path.
///
/// Maze nodes sit on even coordinates; odd cells between two nodes become
/// corridors when carved. Because the result is a tree, a door on the longest
/// path cuts the maze in two, which makes the nesting invariant hold by
/// construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthFirstMazeGenerator;

const DIRECTIONS: [(i64, i64); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

impl MazeGenerator for DepthFirstMazeGenerator {
    fn generate(
        &mut self,
        rng: &mut StdRng,
        maze_dim: usize,
        key_count: usize,
    ) -> Result<Grid<MazeCell>, GenerationError> {
        if maze_dim == 0 {
            return Err(GenerationError::EmptyMaze);
        }

        let mut grid = Grid::square(maze_dim, MazeCell::Wall);
        carve(&mut grid, rng);

        let mut path = longest_path(&grid);
        if rng.random_bool(0.5) {
            path.reverse();
        }

        let last = path.len() - 1;
        let required = if key_count == 0 { 1 } else { 2 * (key_count + 1) };
        if last < required {
            return Err(GenerationError::PathTooShort {
                key_count,
                required: required + 1,
                available: path.len(),
            });
        }

        // Evenly spaced doors leave at least one free path cell before each.
        let doors: Vec<Position> = (0..key_count)
            .map(|i| path[(i + 1) * last / (key_count + 1)])
            .collect();
        for (color, door) in ColorIndex::all(key_count).zip(&doors) {
            grid[*door] = MazeCell::Door(color);
        }

        let start = path[0];
        let regions = label_regions(&grid, start, &doors);
        for color in ColorIndex::all(key_count) {
            let candidates: Vec<Position> = regions
                .enumerate()
                .filter(|&((x, y), region)| {
                    *region == Some(color.index()) && grid[(x, y)] == MazeCell::Open
                })
                .map(|((x, y), _)| Position { x, y })
                .filter(|pos| *pos != start)
                .collect();
            // Door spacing guarantees the cell just before each door qualifies.
            let key = candidates[rng.random_range(0..candidates.len())];
            grid[key] = MazeCell::Key(color);
        }

        grid[start] = MazeCell::AgentStart;
        grid[path[last]] = MazeCell::Exit;
        Ok(grid)
    }
}

fn carve(grid: &mut Grid<MazeCell>, rng: &mut StdRng) {
    let nodes = grid.width().div_ceil(2);
    let mut visited = Grid::square(nodes, false);

    let origin = (rng.random_range(0..nodes), rng.random_range(0..nodes));
    visited[origin] = true;
    grid[(origin.0 * 2, origin.1 * 2)] = MazeCell::Open;

    let mut stack = vec![origin];
    while let Some(&(cx, cy)) = stack.last() {
        let unvisited: Vec<(usize, usize)> = DIRECTIONS
            .iter()
            .filter_map(|&(dx, dy)| {
                let (nx, ny) = (cx as i64 + dx, cy as i64 + dy);
                match visited.get_signed(nx, ny) {
                    Some(false) => Some((nx as usize, ny as usize)),
                    _ => None,
                }
            })
            .collect();

        if unvisited.is_empty() {
            stack.pop();
            continue;
        }

        let (nx, ny) = unvisited[rng.random_range(0..unvisited.len())];
        visited[(nx, ny)] = true;
        grid[(cx + nx, cy + ny)] = MazeCell::Open;
        grid[(nx * 2, ny * 2)] = MazeCell::Open;
        stack.push((nx, ny));
    }
}

/// Breadth-first distances from `from` over cells accepted by `passable`.
fn flood(
    grid: &Grid<MazeCell>,
    from: Position,
    mut passable: impl FnMut(MazeCell) -> bool,
) -> Grid<Option<(usize, Position)>> {
    let mut seen: Grid<Option<(usize, Position)>> =
        Grid::filled(grid.width(), grid.height(), None);
    seen[from] = Some((0, from));

    let mut queue = VecDeque::from([from]);
    while let Some(current) = queue.pop_front() {
        let Some((dist, _)) = seen[current] else {
            continue;
        };
        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (current.x as i64 + dx, current.y as i64 + dy);
            let Some(&cell) = grid.get_signed(nx, ny) else {
                continue;
            };
            let next = Position {
                x: nx as usize,
                y: ny as usize,
            };
            if seen[next].is_none() && passable(cell) {
                seen[next] = Some((dist + 1, current));
                queue.push_back(next);
            }
        }
    }
    seen
}

/// The diameter of the carved tree, found with two breadth-first sweeps.
fn longest_path(grid: &Grid<MazeCell>) -> Vec<Position> {
    let open = |cell: MazeCell| !cell.is_wall();
    let seed = grid
        .position_of(|cell| !cell.is_wall())
        .unwrap_or(Position { x: 0, y: 0 });

    let farthest = |dists: &Grid<Option<(usize, Position)>>| {
        dists
            .enumerate()
            .filter_map(|((x, y), d)| d.map(|(dist, _)| (dist, Position { x, y })))
            .max_by_key(|(dist, _)| *dist)
            .map(|(_, pos)| pos)
    };

    let a = farthest(&flood(grid, seed, open)).unwrap_or(seed);
    let from_a = flood(grid, a, open);
    let b = farthest(&from_a).unwrap_or(a);

    let mut path = vec![b];
    let mut current = b;
    while current != a {
        match from_a[current] {
            Some((_, parent)) => {
                current = parent;
                path.push(current);
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Assigns each open cell the number of doors that stand between it and the
/// start. Door cells themselves are left unlabelled.
fn label_regions(
    grid: &Grid<MazeCell>,
    start: Position,
    doors: &[Position],
) -> Grid<Option<usize>> {
    let mut regions = Grid::filled(grid.width(), grid.height(), None);
    let is_door = |cell: MazeCell| matches!(cell, MazeCell::Door(_));

    let fill = |regions: &mut Grid<Option<usize>>, from: Position, label: usize| {
        let reached = flood(grid, from, |cell| !cell.is_wall() && !is_door(cell));
        for ((x, y), dist) in reached.enumerate() {
            if dist.is_some() && !is_door(grid[(x, y)]) && regions[(x, y)].is_none() {
                regions[(x, y)] = Some(label);
            }
        }
    };

    fill(&mut regions, start, 0);
    for (i, door) in doors.iter().enumerate() {
        fill(&mut regions, *door, i + 1);
    }
    regions
}

/// Verifies the key/door nesting order of a maze by replaying the chain.
///
/// For each color `i`, with doors `0..i` open, key `i` and door `i` must be
/// reachable while no later key and not the exit are. With every door open the
/// exit must be reachable.
pub fn check_nesting(grid: &Grid<MazeCell>, key_count: usize) -> Result<(), NestingViolation> {
    let start = grid
        .position_of(|cell| *cell == MazeCell::AgentStart)
        .ok_or(NestingViolation::MissingStart)?;

    for (_, cell) in grid.enumerate() {
        if let MazeCell::Key(color) | MazeCell::Door(color) = *cell {
            if color.index() >= key_count {
                return Err(NestingViolation::UnknownColor(color, key_count));
            }
        }
    }

    let reached_with = |open_doors: usize| {
        flood(grid, start, |cell| match cell {
            MazeCell::Wall => false,
            MazeCell::Door(color) => color.index() < open_doors,
            _ => true,
        })
    };
    let touches = |reached: &Grid<Option<(usize, Position)>>, target: MazeCell| {
        reached.enumerate().any(|((x, y), dist)| {
            dist.is_some()
                && DIRECTIONS
                    .iter()
                    .any(|&(dx, dy)| grid.get_signed(x as i64 + dx, y as i64 + dy) == Some(&target))
        })
    };
    let contains = |reached: &Grid<Option<(usize, Position)>>, target: MazeCell| {
        reached
            .enumerate()
            .any(|((x, y), dist)| dist.is_some() && grid[(x, y)] == target)
    };

    for color in ColorIndex::all(key_count) {
        let reached = reached_with(color.index());
        if !contains(&reached, MazeCell::Key(color)) {
            return Err(NestingViolation::KeyUnreachable(color));
        }
        if let Some(later) = ColorIndex::all(key_count)
            .skip(color.index() + 1)
            .find(|later| contains(&reached, MazeCell::Key(*later)))
        {
            return Err(NestingViolation::KeyReachableEarly(later));
        }
        if !touches(&reached, MazeCell::Door(color)) {
            return Err(NestingViolation::DoorUnreachable(color));
        }
        if contains(&reached, MazeCell::Exit) {
            return Err(NestingViolation::ExitReachableEarly);
        }
    }

    if !contains(&reached_with(key_count), MazeCell::Exit) {
        return Err(NestingViolation::ExitUnreachable);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::SeedableRng;

    use super::*;

    /// Parses rows like `"S.k0D0E"` into a maze; `#` wall, `.` open, `S`
    /// start, `E` exit, `kN` key N, `DN` door N.
    pub(crate) fn parse(rows: &[&str]) -> Grid<MazeCell> {
        let parsed: Vec<Vec<MazeCell>> = rows.iter().map(|row| parse_row(row)).collect();
        Grid::from_generator(parsed[0].len(), parsed.len(), |x, y| parsed[y][x])
    }

    fn parse_row(row: &str) -> Vec<MazeCell> {
        let mut cells = Vec::new();
        let mut chars = row.chars();
        while let Some(c) = chars.next() {
            let cell = match c {
                '#' => MazeCell::Wall,
                '.' => MazeCell::Open,
                'S' => MazeCell::AgentStart,
                'E' => MazeCell::Exit,
                'k' | 'D' => {
                    let digit = chars.next().and_then(|d| d.to_digit(10)).unwrap_or(0);
                    let color = ColorIndex::new(digit as u8);
                    if c == 'k' {
                        MazeCell::Key(color)
                    } else {
                        MazeCell::Door(color)
                    }
                }
                other => panic!("unknown maze char {other}"),
            };
            cells.push(cell);
        }
        cells
    }

    fn count(grid: &Grid<MazeCell>, pred: impl Fn(MazeCell) -> bool) -> usize {
        grid.enumerate().filter(|(_, c)| pred(**c)).count()
    }

    #[test]
    fn generated_mazes_hold_the_chain() {
        let mut generator = DepthFirstMazeGenerator;
        for seed in 0..40u64 {
            for dim in [5usize, 7, 9, 13, 23] {
                for keys in 0..=3usize {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let grid = generator
                        .generate(&mut rng, dim, keys)
                        .expect("odd mazes of side 5+ fit three keys");
                    assert_eq!(check_nesting(&grid, keys), Ok(()), "seed {seed} dim {dim}");
                    assert_eq!(count(&grid, |c| c == MazeCell::AgentStart), 1);
                    assert_eq!(count(&grid, |c| c == MazeCell::Exit), 1);
                    assert_eq!(count(&grid, |c| matches!(c, MazeCell::Key(_))), keys);
                    assert_eq!(count(&grid, |c| matches!(c, MazeCell::Door(_))), keys);
                }
            }
        }
    }

    #[test]
    fn same_seed_same_maze() {
        let mut generator = DepthFirstMazeGenerator;
        let a = generator.generate(&mut StdRng::seed_from_u64(7), 11, 2);
        let b = generator.generate(&mut StdRng::seed_from_u64(7), 11, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn single_cell_maze_is_too_short() {
        let mut generator = DepthFirstMazeGenerator;
        let result = generator.generate(&mut StdRng::seed_from_u64(1), 1, 0);
        assert!(matches!(result, Err(GenerationError::PathTooShort { .. })));
        assert_eq!(
            generator.generate(&mut StdRng::seed_from_u64(1), 0, 0),
            Err(GenerationError::EmptyMaze)
        );
    }

    #[test]
    fn corridor_chain_is_nested() {
        let grid = parse(&["S.k0D0.k1D1.E"]);
        assert_eq!(check_nesting(&grid, 2), Ok(()));
    }

    #[test]
    fn key_behind_its_own_door_is_rejected() {
        let grid = parse(&["S.D0k0.E"]);
        assert_eq!(
            check_nesting(&grid, 1),
            Err(NestingViolation::KeyUnreachable(ColorIndex::new(0)))
        );
    }

    #[test]
    fn later_key_in_first_region_is_rejected() {
        let grid = parse(&["k1S.k0D0.D1E"]);
        assert_eq!(
            check_nesting(&grid, 2),
            Err(NestingViolation::KeyReachableEarly(ColorIndex::new(1)))
        );
    }

    #[test]
    fn exit_beside_the_chain_is_rejected() {
        let grid = parse(&["ES.k0D0."]);
        assert_eq!(check_nesting(&grid, 1), Err(NestingViolation::ExitReachableEarly));
        let walled = parse(&["S.#E"]);
        assert_eq!(check_nesting(&walled, 0), Err(NestingViolation::ExitUnreachable));
    }

    #[test]
    fn stray_color_is_rejected() {
        let grid = parse(&["S.k2D2.E"]);
        assert_eq!(
            check_nesting(&grid, 1),
            Err(NestingViolation::UnknownColor(ColorIndex::new(2), 1))
        );
    }
}

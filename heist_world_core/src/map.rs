use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// A 2D grid stored row-major in a flat vector.
///
/// Used both for the generator's maze (one [`MazeCell`](crate::maze::MazeCell)
/// per cell) and for the outer world terrain the agent collides with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, every cell set to
    /// `value`.
    ///
    /// # Arguments
    ///
    /// * `width`: The width of the grid.
    /// * `height`: The height of the grid.
    /// * `value`: The value cloned into each cell.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn filled(width: usize, height: usize, value: T) -> Self
    where
        T: Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![value; size],
        }
    }

    /// Creates a square grid of side `dim` filled with `value`.
    pub fn square(dim: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::filled(dim, dim, value)
    }

    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator `f` takes `(x, y)` coordinates and returns the value for
    /// that cell. Cells are produced row by row, so a stateful generator sees
    /// them in row-major order.
    ///
    /// # Arguments
    ///
    /// * `width`: The width of the grid.
    /// * `height`: The height of the grid.
    /// * `f`: A function `FnMut(usize, usize) -> T` to generate cell values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn coords_to_index(&self, x: usize, y: usize) -> Option<usize> {
        if self.is_valid(x, y) {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Checks if the given coordinates are within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Like [`Grid::get`], but takes signed coordinates so callers probing
    /// neighbours of edge cells need no underflow checks.
    pub fn get_signed(&self, x: i64, y: i64) -> Option<&T> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }

    /// Returns `None` if the coordinates are out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        let index = self.coords_to_index(x, y)?;
        self.cells.get(index)
    }

    /// Sets the value of the cell at the given coordinates.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> Result<(), GridError> {
        let index = self.coords_to_index(x, y).ok_or(GridError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Yields `((x, y), &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = ((usize, usize), &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| ((index % width, index / width), cell))
    }

    /// Finds the coordinates of the first cell matching `pred`.
    pub fn position_of(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Position> {
        self.enumerate()
            .find(|(_, cell)| pred(cell))
            .map(|((x, y), _)| Position { x, y })
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        match self.coords_to_index(x, y) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                x, y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.coords_to_index(x, y) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                x, y, width, height
            ),
        }
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        &self[(index.x, index.y)]
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: Position) -> &mut Self::Output {
        &mut self[(index.x, index.y)]
    }
}

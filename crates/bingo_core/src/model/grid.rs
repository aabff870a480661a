//! Grid topology for square bingo cards.
//!
//! # Responsibility
//! - Map a grid configuration to its valid item positions and capacity.
//! - Generate the winning lines (rows, columns, diagonals) of an N x N grid.
//! - Convert between flat positions and `(row, col)` for presentation.
//!
//! # Invariants
//! - Every function here is pure and deterministic.
//! - `grid_size` is within `MIN_GRID_SIZE..=MAX_GRID_SIZE`.
//! - The free-space cell never counts as a valid item position.
//! - Pattern order is stable: rows, then columns, then main and anti diagonal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Flat cell index in `0..grid_size * grid_size`, row-major.
pub type Position = usize;

/// Smallest supported grid edge length.
pub const MIN_GRID_SIZE: usize = 2;
/// Largest supported grid edge length.
pub const MAX_GRID_SIZE: usize = 10;
/// Edge length of the classic "BINGO" card.
pub const DEFAULT_GRID_SIZE: usize = 5;

/// Validation failures for grid configuration and positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Edge length outside the supported policy range.
    InvalidGridSize { grid_size: usize },
    /// Free-space index does not fall inside the grid.
    FreeSpaceOutOfRange {
        position: Position,
        grid_size: usize,
    },
    /// Position lies outside the grid.
    PositionOutOfRange {
        position: Position,
        grid_size: usize,
    },
    /// Position is the free-space cell and cannot hold an item.
    PositionIsFreeSpace { position: Position },
}

impl GridError {
    /// Returns whether this error describes a bad card configuration rather
    /// than a bad item placement.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGridSize { .. } | Self::FreeSpaceOutOfRange { .. }
        )
    }
}

impl Display for GridError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGridSize { grid_size } => write!(
                f,
                "grid size {grid_size} is outside the supported range {MIN_GRID_SIZE}..={MAX_GRID_SIZE}"
            ),
            Self::FreeSpaceOutOfRange {
                position,
                grid_size,
            } => write!(
                f,
                "free space position {position} is outside a {grid_size}x{grid_size} grid"
            ),
            Self::PositionOutOfRange {
                position,
                grid_size,
            } => write!(
                f,
                "position {position} is outside a {grid_size}x{grid_size} grid"
            ),
            Self::PositionIsFreeSpace { position } => {
                write!(f, "position {position} is the free space")
            }
        }
    }
}

impl Error for GridError {}

/// Kind of a winning line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum LineKind {
    Row(usize),
    Column(usize),
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

/// One winning line: `grid_size` positions that complete a bingo together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPattern {
    pub kind: LineKind,
    pub positions: Vec<Position>,
}

/// Validated grid shape of one card.
///
/// Built once when a card is created and carried unchanged afterwards, so
/// callers never re-derive grid rules from raw columns.
/// Serializes in the stored record shape:
/// `{grid_size, has_free_space, free_space_position}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "GridRecord")]
pub struct GridConfig {
    grid_size: usize,
    free_space: Option<Position>,
}

#[derive(Serialize)]
struct GridRecord {
    grid_size: usize,
    has_free_space: bool,
    free_space_position: Position,
}

impl From<GridConfig> for GridRecord {
    fn from(value: GridConfig) -> Self {
        Self {
            grid_size: value.grid_size,
            has_free_space: value.has_free_space(),
            free_space_position: value.free_space_position(),
        }
    }
}

impl GridConfig {
    /// Builds a validated configuration.
    ///
    /// `free_space_position` is ignored when `has_free_space` is `false`.
    pub fn new(
        grid_size: usize,
        has_free_space: bool,
        free_space_position: Position,
    ) -> Result<Self, GridError> {
        validate_grid_size(grid_size)?;
        let free_space = if has_free_space {
            if free_space_position >= cell_count(grid_size) {
                return Err(GridError::FreeSpaceOutOfRange {
                    position: free_space_position,
                    grid_size,
                });
            }
            Some(free_space_position)
        } else {
            None
        };
        Ok(Self {
            grid_size,
            free_space,
        })
    }

    /// Grid with the free space on its centre cell.
    pub fn with_center_free_space(grid_size: usize) -> Result<Self, GridError> {
        validate_grid_size(grid_size)?;
        Self::new(grid_size, true, center_position(grid_size))
    }

    /// Grid with no free space.
    pub fn without_free_space(grid_size: usize) -> Result<Self, GridError> {
        Self::new(grid_size, false, 0)
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn has_free_space(&self) -> bool {
        self.free_space.is_some()
    }

    /// Free-space cell, if the grid has one.
    pub fn free_space(&self) -> Option<Position> {
        self.free_space
    }

    /// Stored `free_space_position` column value. Centre cell when the grid
    /// has no free space.
    pub fn free_space_position(&self) -> Position {
        self.free_space
            .unwrap_or_else(|| center_position(self.grid_size))
    }

    pub fn cell_count(&self) -> usize {
        cell_count(self.grid_size)
    }

    pub fn capacity(&self) -> usize {
        capacity(self.grid_size, self.has_free_space())
    }

    pub fn is_free_space(&self, position: Position) -> bool {
        self.free_space == Some(position)
    }

    /// Checks that `position` may hold an item.
    pub fn validate_position(&self, position: Position) -> Result<(), GridError> {
        if position >= self.cell_count() {
            return Err(GridError::PositionOutOfRange {
                position,
                grid_size: self.grid_size,
            });
        }
        if self.is_free_space(position) {
            return Err(GridError::PositionIsFreeSpace { position });
        }
        Ok(())
    }

    /// Valid item positions in ascending order.
    pub fn valid_positions(&self) -> Vec<Position> {
        (0..self.cell_count())
            .filter(|position| !self.is_free_space(*position))
            .collect()
    }

    pub fn patterns(&self) -> Vec<GridPattern> {
        generate_patterns(self.grid_size)
    }

    /// `(row, col)` of a cell, or `None` outside the grid.
    pub fn row_col(&self, position: Position) -> Option<(usize, usize)> {
        (position < self.cell_count()).then(|| row_col_of_position(position, self.grid_size))
    }

    /// Flat position of `(row, col)`, or `None` outside the grid.
    pub fn position_at(&self, row: usize, col: usize) -> Option<Position> {
        (row < self.grid_size && col < self.grid_size)
            .then(|| position_of_row_col(row, col, self.grid_size))
    }
}

/// Returns the set of positions that may hold an item.
///
/// # Errors
/// - `InvalidGridSize` when `grid_size` is outside the policy range.
/// - `FreeSpaceOutOfRange` when `has_free_space` and `free_space_position`
///   is not inside the grid.
pub fn valid_positions(
    grid_size: usize,
    has_free_space: bool,
    free_space_position: Position,
) -> Result<BTreeSet<Position>, GridError> {
    let config = GridConfig::new(grid_size, has_free_space, free_space_position)?;
    Ok(config.valid_positions().into_iter().collect())
}

/// Number of items a fully populated card holds.
pub fn capacity(grid_size: usize, has_free_space: bool) -> usize {
    let cells = cell_count(grid_size);
    if has_free_space {
        cells.saturating_sub(1)
    } else {
        cells
    }
}

/// Generates all `2 * grid_size + 2` winning lines.
pub fn generate_patterns(grid_size: usize) -> Vec<GridPattern> {
    let n = grid_size;
    let mut patterns = Vec::with_capacity(2 * n + 2);

    for row in 0..n {
        patterns.push(GridPattern {
            kind: LineKind::Row(row),
            positions: (0..n).map(|col| row * n + col).collect(),
        });
    }
    for col in 0..n {
        patterns.push(GridPattern {
            kind: LineKind::Column(col),
            positions: (0..n).map(|row| row * n + col).collect(),
        });
    }
    patterns.push(GridPattern {
        kind: LineKind::Diagonal,
        positions: (0..n).map(|i| i * n + i).collect(),
    });
    patterns.push(GridPattern {
        kind: LineKind::AntiDiagonal,
        positions: (0..n).map(|i| i * n + (n - 1 - i)).collect(),
    });

    patterns
}

/// Converts a flat position to `(row, col)`.
///
/// # Panics
/// When `grid_size` is zero. Use [`GridConfig::row_col`] for a validated
/// grid.
pub fn row_col_of_position(position: Position, grid_size: usize) -> (usize, usize) {
    (position / grid_size, position % grid_size)
}

/// Converts `(row, col)` back to a flat position. `col` is expected to be
/// below `grid_size`; see [`GridConfig::position_at`] for a checked form.
pub fn position_of_row_col(row: usize, col: usize, grid_size: usize) -> Position {
    row * grid_size + col
}

/// Centre cell for odd sizes; the cell just below and right of centre for
/// even sizes.
pub fn center_position(grid_size: usize) -> Position {
    (grid_size / 2) * grid_size + grid_size / 2
}

fn cell_count(grid_size: usize) -> usize {
    grid_size * grid_size
}

fn validate_grid_size(grid_size: usize) -> Result<(), GridError> {
    if (MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size) {
        Ok(())
    } else {
        Err(GridError::InvalidGridSize { grid_size })
    }
}

//! 4×4 binary grids and boundary modes
//!
//! A grid is stored bit-packed in a `u16`, row-major with cell (0, 0) in the
//! most significant bit. The packed value doubles as the state hash, which is
//! therefore injective over all 2^16 grids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CtmError, Result};

/// Rows and columns per grid.
pub const GRID_SIZE: usize = 4;
/// Cells per grid.
pub const GRID_CELLS: usize = GRID_SIZE * GRID_SIZE;
/// Number of distinct grids.
pub const GRID_STATES: usize = 1 << GRID_CELLS;

/// Policy for neighbors that fall outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Boundary {
    /// Out-of-range neighbors read as 0.
    ZeroPadded,
    /// Row and column indices wrap modulo the grid size.
    #[default]
    Toroidal,
}

impl Boundary {
    /// Decode the integer boundary code (0 = zero-padded, 1 = toroidal).
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Boundary::ZeroPadded),
            1 => Ok(Boundary::Toroidal),
            other => Err(CtmError::InvalidArgument(format!(
                "boundary mode must be 0 (zero-padded) or 1 (toroidal), got {}",
                other
            ))),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Boundary::ZeroPadded => 0,
            Boundary::Toroidal => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Boundary::ZeroPadded => "zero_padded",
            Boundary::Toroidal => "toroidal",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Boundary {
    type Err = CtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "toroidal" | "torus" | "wrap" | "1" => Ok(Boundary::Toroidal),
            "zero_padded" | "zero-padded" | "zero" | "0" => Ok(Boundary::ZeroPadded),
            other => Err(CtmError::InvalidArgument(format!(
                "unknown boundary mode '{}'",
                other
            ))),
        }
    }
}

impl Serialize for Boundary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundaryRepr {
    Code(i64),
    Name(String),
}

impl<'de> Deserialize<'de> for Boundary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match BoundaryRepr::deserialize(deserializer)? {
            BoundaryRepr::Code(code) => Boundary::from_code(code).map_err(serde::de::Error::custom),
            BoundaryRepr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A 4×4 binary cellular automaton configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Grid {
    bits: u16,
}

impl Grid {
    /// The all-zero grid.
    pub const EMPTY: Grid = Grid { bits: 0 };

    /// Build from the packed row-major representation.
    pub const fn from_bits(bits: u16) -> Self {
        Self { bits }
    }

    pub const fn bits(self) -> u16 {
        self.bits
    }

    #[inline]
    const fn shift(row: usize, col: usize) -> usize {
        GRID_CELLS - 1 - (row * GRID_SIZE + col)
    }

    /// Cell state at (row, col), 0 or 1.
    #[inline]
    pub fn get(self, row: usize, col: usize) -> u8 {
        debug_assert!(row < GRID_SIZE && col < GRID_SIZE);
        ((self.bits >> Self::shift(row, col)) & 1) as u8
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        debug_assert!(row < GRID_SIZE && col < GRID_SIZE);
        let mask = 1u16 << Self::shift(row, col);
        if alive {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    /// Injective state hash: the 16 cells concatenated row-major.
    #[inline]
    pub fn hash(self) -> u64 {
        u64::from(self.bits)
    }

    pub fn count_ones(self) -> u32 {
        self.bits.count_ones()
    }

    /// Decode a flat row-major array of exactly 16 cells (0 or 1).
    pub fn from_flat(flat: &[u32]) -> Result<Self> {
        if flat.len() != GRID_CELLS {
            return Err(CtmError::GridLength {
                expected: GRID_CELLS,
                got: flat.len(),
            });
        }
        let mut bits = 0u16;
        for (index, &value) in flat.iter().enumerate() {
            if value > 1 {
                return Err(CtmError::InvalidCell { index, value });
            }
            bits = (bits << 1) | value as u16;
        }
        Ok(Self { bits })
    }

    /// Encode as a flat row-major array of 16 cells.
    pub fn to_flat(self) -> [u32; GRID_CELLS] {
        let mut flat = [0u32; GRID_CELLS];
        for (i, cell) in flat.iter_mut().enumerate() {
            *cell = u32::from((self.bits >> (GRID_CELLS - 1 - i)) & 1);
        }
        flat
    }
}

/// Serialized as its 16 flat cells.
impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_flat().serialize(serializer)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                write!(f, "{}", self.get(row, col))?;
            }
            if row + 1 < GRID_SIZE {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Decode a contiguous batch of flat grids.
pub fn decode_batch(flat: &[u32]) -> Result<Vec<Grid>> {
    if flat.len() % GRID_CELLS != 0 {
        return Err(CtmError::GridLength {
            expected: GRID_CELLS,
            got: flat.len(),
        });
    }
    let mut grids = Vec::new();
    crate::error::try_reserve(&mut grids, flat.len() / GRID_CELLS, "grid batch")?;
    for (i, chunk) in flat.chunks_exact(GRID_CELLS).enumerate() {
        let grid = Grid::from_flat(chunk).map_err(|e| match e {
            CtmError::InvalidCell { index, value } => CtmError::InvalidCell {
                index: i * GRID_CELLS + index,
                value,
            },
            other => other,
        })?;
        grids.push(grid);
    }
    Ok(grids)
}

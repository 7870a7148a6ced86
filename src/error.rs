//! Error types for conditional-ctm.

use thiserror::Error;

/// Errors surfaced by the engine.
///
/// A pair with no matching rule and a cancelled run are not errors; they are
/// reported through the result types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CtmError {
    /// A flat grid (or grid batch) has the wrong number of cells.
    #[error("grid length mismatch: expected a multiple of {expected}, got {got}")]
    GridLength {
        /// Cells per grid.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },

    /// A cell holds something other than 0 or 1.
    #[error("invalid cell value {value} at flat index {index}")]
    InvalidCell {
        /// Flat index of the offending cell.
        index: usize,
        /// The value found there.
        value: u32,
    },

    /// Flat rule words are not a whole number of rules.
    #[error("rule length mismatch: expected a multiple of {expected} words, got {got}")]
    RuleLength {
        /// Words per rule.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },

    /// The X and Y batches describe a different number of pairs.
    #[error("batch mismatch: {xs} input grids but {ys} target grids")]
    BatchMismatch {
        /// Number of X grids.
        xs: usize,
        /// Number of Y grids.
        ys: usize,
    },

    /// A parameter is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An output buffer could not be allocated.
    #[error("allocation failed for {what}")]
    Allocation {
        /// The buffer being reserved.
        what: &'static str,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CtmError>;

/// Reserve `additional` slots in `vec`, mapping failure to [`CtmError::Allocation`].
pub(crate) fn try_reserve<T>(vec: &mut Vec<T>, additional: usize, what: &'static str) -> Result<()> {
    vec.try_reserve(additional)
        .map_err(|_| CtmError::Allocation { what })
}

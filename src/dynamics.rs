//! Rule application and bounded simulation
//!
//! Every update is synchronous: the whole next grid is computed from the
//! current one. Simulations stop when the target is reached, when a state
//! repeats (the dynamics are deterministic, so nothing new can follow), when
//! the step bound runs out, or when the cancel token is raised.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::grid::{Boundary, Grid, GRID_SIZE, GRID_STATES};
use crate::rule::Rule;

/// Step bound used when the caller passes `max_steps <= 0`.
pub const DEFAULT_MAX_STEPS: usize = 65536;

/// Resolve a caller step bound, mapping non-positive values to the default.
pub fn resolve_max_steps(max_steps: i64) -> usize {
    if max_steps <= 0 {
        DEFAULT_MAX_STEPS
    } else {
        usize::try_from(max_steps).unwrap_or(usize::MAX)
    }
}

/// 9-bit neighborhood code of cell (row, col).
///
/// Offsets are visited row-major over dr, dc ∈ {-1, 0, 1}; offset number
/// `idx` sets bit `idx`. Under [`Boundary::ZeroPadded`] out-of-range offsets
/// leave their bit clear.
#[inline]
pub fn neighborhood_code(grid: Grid, row: usize, col: usize, boundary: Boundary) -> u16 {
    let n = GRID_SIZE as i32;
    let mut code = 0u16;
    let mut idx = 0;
    for dr in -1i32..=1 {
        for dc in -1i32..=1 {
            let r = row as i32 + dr;
            let c = col as i32 + dc;
            let bit = match boundary {
                Boundary::Toroidal => grid.get(r.rem_euclid(n) as usize, c.rem_euclid(n) as usize),
                Boundary::ZeroPadded => {
                    if (0..n).contains(&r) && (0..n).contains(&c) {
                        grid.get(r as usize, c as usize)
                    } else {
                        0
                    }
                }
            };
            code |= u16::from(bit) << idx;
            idx += 1;
        }
    }
    code
}

/// One synchronous update of every cell.
pub fn apply(grid: Grid, rule: &Rule, boundary: Boundary) -> Grid {
    let mut next = Grid::EMPTY;
    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            let code = neighborhood_code(grid, row, col, boundary);
            next.set(row, col, rule.output(code) == 1);
        }
    }
    next
}

/// Exact membership set over grid hashes.
///
/// One bit per possible grid; clearing only touches the words that were set,
/// so a single allocation serves any number of simulations.
#[derive(Debug, Clone)]
pub struct SeenStates {
    words: Vec<u64>,
    touched: Vec<u16>,
}

impl Default for SeenStates {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenStates {
    pub fn new() -> Self {
        Self {
            words: vec![0; GRID_STATES / 64],
            touched: Vec::new(),
        }
    }

    /// Record `hash`; returns false if it was already present.
    #[inline]
    pub fn insert(&mut self, hash: u64) -> bool {
        let h = hash as usize;
        debug_assert!(h < GRID_STATES);
        let mask = 1u64 << (h % 64);
        let word = &mut self.words[h / 64];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.touched.push(h as u16);
        true
    }

    #[cfg(test)]
    fn contains(&self, hash: u64) -> bool {
        let h = hash as usize;
        h < GRID_STATES && self.words[h / 64] & (1u64 << (h % 64)) != 0
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.touched.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    pub fn clear(&mut self) {
        for &h in &self.touched {
            self.words[h as usize / 64] = 0;
        }
        self.touched.clear();
    }
}

/// How a simulate-to-target run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Target reached after this many steps.
    Reached(usize),
    /// A state repeated before the target appeared.
    Cycle,
    /// The step bound ran out.
    StepLimit,
    /// The cancel token was raised.
    Cancelled,
}

impl Outcome {
    /// Depth on success, `None` for every other ending.
    pub fn depth(self) -> Option<usize> {
        match self {
            Outcome::Reached(depth) => Some(depth),
            _ => None,
        }
    }
}

/// How a trajectory walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkEnd {
    /// The next state had already been visited.
    Repeat,
    StepLimit,
    Cancelled,
}

/// Reusable simulation workspace.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    seen: SeenStates,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `start` under `rule` until it equals `target`.
    ///
    /// Each step checks, in order: cancellation, target equality, repetition.
    /// Only then is the state recorded and advanced, so a target that is also
    /// a repeat still counts as reached.
    pub fn run_to_target(
        &mut self,
        start: Grid,
        target: Grid,
        rule: &Rule,
        boundary: Boundary,
        limit: usize,
        cancel: &CancelToken,
    ) -> Outcome {
        self.seen.clear();
        let mut current = start;
        for t in 0..limit {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            if current == target {
                return Outcome::Reached(t);
            }
            if !self.seen.insert(current.hash()) {
                return Outcome::Cycle;
            }
            current = apply(current, rule, boundary);
        }
        Outcome::StepLimit
    }

    /// Visit every distinct state reached from `start`, with its step index.
    ///
    /// A repeated state or the step bound ends the walk without being visited.
    pub fn walk<F>(
        &mut self,
        start: Grid,
        rule: &Rule,
        boundary: Boundary,
        limit: usize,
        cancel: &CancelToken,
        mut visit: F,
    ) -> Result<WalkEnd>
    where
        F: FnMut(Grid, usize) -> Result<()>,
    {
        self.seen.clear();
        let mut current = start;
        for t in 0..limit {
            if cancel.is_cancelled() {
                return Ok(WalkEnd::Cancelled);
            }
            if !self.seen.insert(current.hash()) {
                return Ok(WalkEnd::Repeat);
            }
            visit(current, t)?;
            current = apply(current, rule, boundary);
        }
        Ok(WalkEnd::StepLimit)
    }
}

/// Single-shot simulate-to-target with a fresh workspace.
///
/// `max_steps <= 0` selects [`DEFAULT_MAX_STEPS`].
pub fn simulate_to_target(
    start: Grid,
    target: Grid,
    rule: &Rule,
    boundary: Boundary,
    max_steps: i64,
    cancel: &CancelToken,
) -> Outcome {
    Simulator::new().run_to_target(start, target, rule, boundary, resolve_max_steps(max_steps), cancel)
}

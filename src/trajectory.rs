//! Trajectory collection for an explicit rule set
//!
//! Each caller-supplied rule is run from the same start grid, recording every
//! newly distinct state and the step at which it first appeared.

use log::{info, warn};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::dynamics::{resolve_max_steps, Simulator, WalkEnd};
use crate::error::{try_reserve, Result};
use crate::grid::{Boundary, Grid};
use crate::rule::{decode_rules, Rule, RuleId};

/// A state visited by a rule, with the step it first appeared at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visit {
    pub grid: Grid,
    pub step: usize,
}

/// Distinct states one rule visits from the start grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trajectory {
    pub rule_id: RuleId,
    pub visits: Vec<Visit>,
    pub end: WalkEnd,
}

impl Trajectory {
    /// True unless the walk was stopped by a cancel request.
    pub fn is_complete(&self) -> bool {
        self.end != WalkEnd::Cancelled
    }
}

/// Result of a trajectory run. Rules after a cancellation point are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrajectoryReport {
    pub trajectories: Vec<Trajectory>,
    pub cancelled: bool,
}

fn collect_one(
    sim: &mut Simulator,
    start: Grid,
    rule: &Rule,
    boundary: Boundary,
    limit: usize,
    cancel: &CancelToken,
) -> Result<Trajectory> {
    let mut visits = Vec::new();
    let end = sim.walk(start, rule, boundary, limit, cancel, |grid, step| {
        try_reserve(&mut visits, 1, "trajectory")?;
        visits.push(Visit { grid, step });
        Ok(())
    })?;
    Ok(Trajectory {
        rule_id: rule.id(),
        visits,
        end,
    })
}

/// Trajectory of a single rule; `max_steps <= 0` selects the default bound.
pub fn collect_trajectory(
    start: Grid,
    rule: &Rule,
    boundary: Boundary,
    max_steps: i64,
    cancel: &CancelToken,
) -> Result<Trajectory> {
    collect_one(&mut Simulator::new(), start, rule, boundary, resolve_max_steps(max_steps), cancel)
}

/// Trajectories of every rule from one start grid, in rule order.
pub fn collect_trajectories(
    start: Grid,
    rules: &[Rule],
    boundary: Boundary,
    max_steps: i64,
    cancel: &CancelToken,
) -> Result<TrajectoryReport> {
    let limit = resolve_max_steps(max_steps);
    info!(
        "Trajectory run: {} rules, {} boundary, max_steps {}",
        rules.len(),
        boundary,
        limit
    );

    let mut sim = Simulator::new();
    let mut trajectories = Vec::new();
    try_reserve(&mut trajectories, rules.len(), "trajectory list")?;
    let mut cancelled = false;

    for rule in rules {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let trajectory = collect_one(&mut sim, start, rule, boundary, limit, cancel)?;
        let stop = !trajectory.is_complete();
        trajectories.push(trajectory);
        if stop {
            cancelled = true;
            break;
        }
    }

    if cancelled {
        warn!(
            "Trajectory run interrupted after {} of {} rules",
            trajectories.len(),
            rules.len()
        );
    }

    Ok(TrajectoryReport { trajectories, cancelled })
}

/// Flat entry point: 16 cells for the start grid, 8 words per rule.
pub fn collect_trajectories_flat(
    x_flat: &[u32],
    rules_flat: &[u64],
    boundary: Boundary,
    max_steps: i64,
    cancel: &CancelToken,
) -> Result<TrajectoryReport> {
    let start = Grid::from_flat(x_flat)?;
    let rules = decode_rules(rules_flat)?;
    collect_trajectories(start, &rules, boundary, max_steps, cancel)
}

//! Induction over reachable outputs
//!
//! Trajectories of a rule set from a test input are pooled by output grid.
//! Each output y' is scored with
//!
//! ```text
//! K(y'|x) = -log2(rules reaching y' / total rules) + log2(time)
//! ```
//!
//! where `time` is the earliest or mean step at which y' appeared. The
//! hypothesis is the lowest-scoring output other than the input itself.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CtmError, Result};
use crate::grid::Grid;
use crate::rule::RuleId;
use crate::trajectory::Trajectory;

/// Which step statistic enters the time penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeMetric {
    #[default]
    #[serde(rename = "t_min")]
    Min,
    #[serde(rename = "t_mean")]
    Mean,
}

impl FromStr for TimeMetric {
    type Err = CtmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "t_min" | "min" => Ok(TimeMetric::Min),
            "t_mean" | "mean" => Ok(TimeMetric::Mean),
            other => Err(CtmError::InvalidArgument(format!("unknown time metric '{}'", other))),
        }
    }
}

/// An output grid and the rules that reach it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub grid: Grid,
    /// Rules that visited this grid, in rule order
    pub rules: Vec<RuleId>,
    pub t_min: usize,
    pub t_mean: f64,
}

/// A candidate with its conditional complexity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub grid: Grid,
    pub num_rules: usize,
    /// Fraction of all rules reaching this grid (0 when the score is infinite)
    pub freq: f64,
    pub k_ctm: f64,
    pub t_min: usize,
    pub t_mean: f64,
}

/// Pool all visited states by grid, ordered by first appearance.
pub fn collect_candidates(trajectories: &[Trajectory]) -> Vec<Candidate> {
    let mut index: HashMap<Grid, usize> = HashMap::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut step_sums: Vec<usize> = Vec::new();

    for trajectory in trajectories {
        for visit in &trajectory.visits {
            let slot = *index.entry(visit.grid).or_insert_with(|| {
                candidates.push(Candidate {
                    grid: visit.grid,
                    rules: Vec::new(),
                    t_min: visit.step,
                    t_mean: 0.0,
                });
                step_sums.push(0);
                candidates.len() - 1
            });
            let candidate = &mut candidates[slot];
            candidate.rules.push(trajectory.rule_id);
            candidate.t_min = candidate.t_min.min(visit.step);
            step_sums[slot] += visit.step;
        }
    }

    for (candidate, sum) in candidates.iter_mut().zip(step_sums) {
        candidate.t_mean = sum as f64 / candidate.rules.len() as f64;
    }
    candidates
}

/// Score every candidate against `total_rules` rules.
pub fn score_candidates(
    candidates: &[Candidate],
    total_rules: usize,
    metric: TimeMetric,
) -> Result<Vec<ScoredCandidate>> {
    if total_rules == 0 {
        return Err(CtmError::InvalidArgument("total_rules must be greater than 0".to_string()));
    }

    Ok(candidates
        .iter()
        .map(|c| {
            let num_rules = c.rules.len();
            let freq = num_rules as f64 / total_rules as f64;
            let time = match metric {
                TimeMetric::Min => c.t_min as f64,
                TimeMetric::Mean => c.t_mean,
            };
            let (freq, k_ctm) = if freq <= 0.0 || time <= 0.0 {
                (0.0, f64::INFINITY)
            } else {
                (freq, -freq.log2() + time.log2())
            };
            ScoredCandidate {
                grid: c.grid,
                num_rules,
                freq,
                k_ctm,
                t_min: c.t_min,
                t_mean: c.t_mean,
            }
        })
        .collect())
}

/// Eligible candidates (finite score, not the step-0 input) by ascending score.
pub fn rank_hypotheses(scored: &[ScoredCandidate]) -> Vec<&ScoredCandidate> {
    let mut ranked: Vec<&ScoredCandidate> = scored
        .iter()
        .filter(|c| c.t_min > 0 && c.k_ctm.is_finite())
        .collect();
    // Stable: ties keep first-appearance order
    ranked.sort_by(|a, b| a.k_ctm.total_cmp(&b.k_ctm));
    ranked
}

/// Lowest-scoring eligible candidate.
pub fn select_hypothesis(scored: &[ScoredCandidate]) -> Option<&ScoredCandidate> {
    rank_hypotheses(scored).into_iter().next()
}

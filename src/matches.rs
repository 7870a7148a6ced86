//! Match aggregation over a sampled rule ensemble
//!
//! For each (X, Y) pair, every rule of a seeded ensemble is simulated from X;
//! rules that reach Y are recorded with their depth. The fraction of matching
//! rules is m(Y|X), and -log2(m) is the conditional CTM estimate.
//!
//! The ensemble is drawn once, before any pair is processed, so every pair is
//! tested against the same rules in the same order.

use log::{debug, info, warn};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::dynamics::{resolve_max_steps, Outcome, Simulator, DEFAULT_MAX_STEPS};
use crate::error::{try_reserve, CtmError, Result};
use crate::grid::{decode_batch, Boundary, Grid};
use crate::prng::Xoshiro256PlusPlus;
use crate::rule::{Rule, RuleId};

/// How the rule sweep of a pair is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    /// Fan rules out over the rayon pool; results are restored to draw order.
    Parallel,
}

/// Parameters for a match run.
#[derive(Debug, Clone)]
pub struct MatchParams {
    /// Rules to sample (must be > 0)
    pub num_rules: usize,
    pub seed: u64,
    pub boundary: Boundary,
    /// Step bound per simulation; <= 0 selects the default
    pub max_steps: i64,
    pub execution: Execution,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            num_rules: 1_000_000,
            seed: 42,
            boundary: Boundary::Toroidal,
            max_steps: DEFAULT_MAX_STEPS as i64,
            execution: Execution::Sequential,
        }
    }
}

/// A rule that reached the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// Position of the rule in the sampled ensemble
    pub rule_index: usize,
    pub rule_id: RuleId,
    /// Update steps taken; 0 means X already equals Y
    pub depth: usize,
}

/// Statistics for one (X, Y) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStats {
    /// Matches in rule draw order
    pub matches: Vec<MatchRecord>,
    /// Fraction of sampled rules that matched
    pub m: f64,
    /// -log2(m), or +inf when nothing matched
    pub ctm: f64,
    /// False when a stop request cut the rule sweep short
    pub complete: bool,
}

impl PairStats {
    fn from_matches(matches: Vec<MatchRecord>, num_rules: usize, complete: bool) -> Self {
        let (m, ctm) = complexity_estimate(matches.len(), num_rules);
        Self { matches, m, ctm, complete }
    }

    /// A pair never reached because the run was cancelled.
    fn skipped() -> Self {
        Self {
            matches: Vec::new(),
            m: 0.0,
            ctm: f64::INFINITY,
            complete: false,
        }
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Smallest depth among the matches.
    pub fn min_depth(&self) -> Option<usize> {
        self.matches.iter().map(|r| r.depth).min()
    }
}

/// Result of a match run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    /// One entry per input pair, in input order
    pub pairs: Vec<PairStats>,
    pub num_rules: usize,
    /// True when the run stopped on request rather than running to completion
    pub cancelled: bool,
}

/// m = matches / num_rules and its CTM estimate -log2(m).
pub fn complexity_estimate(match_count: usize, num_rules: usize) -> (f64, f64) {
    if num_rules == 0 {
        return (0.0, f64::INFINITY);
    }
    let m = match_count as f64 / num_rules as f64;
    // 0.0 - log2(1.0) keeps the all-match case at +0.0
    let ctm = if match_count > 0 { 0.0 - m.log2() } else { f64::INFINITY };
    (m, ctm)
}

/// Draw `num_rules` rules from a freshly seeded generator.
pub fn draw_rules(seed: u64, num_rules: usize) -> Result<Vec<Rule>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut rules = Vec::new();
    try_reserve(&mut rules, num_rules, "rule ensemble")?;
    for _ in 0..num_rules {
        rules.push(Rule::random(&mut rng));
    }
    Ok(rules)
}

/// Run the match aggregation over decoded grids.
pub fn run_matches(
    xs: &[Grid],
    ys: &[Grid],
    params: &MatchParams,
    cancel: &CancelToken,
) -> Result<MatchReport> {
    if xs.len() != ys.len() {
        return Err(CtmError::BatchMismatch { xs: xs.len(), ys: ys.len() });
    }
    if params.num_rules == 0 {
        return Err(CtmError::InvalidArgument("num_rules must be greater than 0".to_string()));
    }

    let limit = resolve_max_steps(params.max_steps);
    info!(
        "Match run: {} pairs x {} rules, seed {}, {} boundary, max_steps {}, {:?}",
        xs.len(),
        params.num_rules,
        params.seed,
        params.boundary,
        limit,
        params.execution
    );

    let rules = draw_rules(params.seed, params.num_rules)?;

    let mut pairs = Vec::new();
    try_reserve(&mut pairs, xs.len(), "pair statistics")?;
    let mut sim = Simulator::new();
    let mut cancelled = false;

    for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
        if cancelled || cancel.is_cancelled() {
            cancelled = true;
            pairs.push(PairStats::skipped());
            continue;
        }

        let (matches, complete) = match params.execution {
            Execution::Sequential => sweep_sequential(&mut sim, x, y, &rules, params.boundary, limit, cancel)?,
            Execution::Parallel => sweep_parallel(x, y, &rules, params.boundary, limit, cancel)?,
        };
        cancelled = !complete;

        let stats = PairStats::from_matches(matches, params.num_rules, complete);
        debug!(
            "Pair {}: {} matches, m = {:.6}, ctm = {:.4}",
            i,
            stats.match_count(),
            stats.m,
            stats.ctm
        );
        pairs.push(stats);
    }

    if cancelled {
        warn!("Match run interrupted; results are partial");
    }

    Ok(MatchReport {
        pairs,
        num_rules: params.num_rules,
        cancelled,
    })
}

/// Run the match aggregation over flat row-major grid batches.
pub fn run_matches_flat(
    xs_flat: &[u32],
    ys_flat: &[u32],
    params: &MatchParams,
    cancel: &CancelToken,
) -> Result<MatchReport> {
    let xs = decode_batch(xs_flat)?;
    let ys = decode_batch(ys_flat)?;
    run_matches(&xs, &ys, params, cancel)
}

fn sweep_sequential(
    sim: &mut Simulator,
    x: Grid,
    y: Grid,
    rules: &[Rule],
    boundary: Boundary,
    limit: usize,
    cancel: &CancelToken,
) -> Result<(Vec<MatchRecord>, bool)> {
    let mut matches = Vec::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok((matches, false));
        }
        match sim.run_to_target(x, y, rule, boundary, limit, cancel) {
            Outcome::Reached(depth) => {
                try_reserve(&mut matches, 1, "match list")?;
                matches.push(MatchRecord {
                    rule_index,
                    rule_id: rule.id(),
                    depth,
                });
            }
            Outcome::Cancelled => return Ok((matches, false)),
            Outcome::Cycle | Outcome::StepLimit => {}
        }
    }
    Ok((matches, true))
}

fn sweep_parallel(
    x: Grid,
    y: Grid,
    rules: &[Rule],
    boundary: Boundary,
    limit: usize,
    cancel: &CancelToken,
) -> Result<(Vec<MatchRecord>, bool)> {
    let outcomes: Vec<(usize, Outcome)> = rules
        .par_iter()
        .enumerate()
        .map_init(Simulator::new, |sim, (rule_index, rule)| {
            if cancel.is_cancelled() {
                return (rule_index, Outcome::Cancelled);
            }
            (rule_index, sim.run_to_target(x, y, rule, boundary, limit, cancel))
        })
        .filter(|(_, outcome)| matches!(outcome, Outcome::Reached(_) | Outcome::Cancelled))
        .collect();

    let complete = !outcomes.iter().any(|(_, o)| *o == Outcome::Cancelled);
    let mut matches = Vec::new();
    try_reserve(&mut matches, outcomes.len(), "match list")?;
    for (rule_index, outcome) in outcomes {
        if let Outcome::Reached(depth) = outcome {
            matches.push(MatchRecord {
                rule_index,
                rule_id: rules[rule_index].id(),
                depth,
            });
        }
    }
    matches.sort_by_key(|r| r.rule_index);
    Ok((matches, complete))
}

/// A rule that reached the target for every pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonRule {
    pub rule_index: usize,
    pub rule_id: RuleId,
    /// (pair index, depth) for every pair, in pair order
    pub depths: Vec<(usize, usize)>,
}

/// Rules that matched every pair, in draw order.
pub fn common_rules(report: &MatchReport) -> Vec<CommonRule> {
    let Some((first, rest)) = report.pairs.split_first() else {
        return Vec::new();
    };

    first
        .matches
        .iter()
        .filter_map(|seed| {
            let mut depths = Vec::with_capacity(report.pairs.len());
            depths.push((0, seed.depth));
            for (offset, pair) in rest.iter().enumerate() {
                // Match lists are sorted by rule index
                let idx = pair
                    .matches
                    .binary_search_by_key(&seed.rule_index, |r| r.rule_index)
                    .ok()?;
                depths.push((offset + 1, pair.matches[idx].depth));
            }
            Some(CommonRule {
                rule_index: seed.rule_index,
                rule_id: seed.rule_id,
                depths,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::simulate_to_target;

    fn block_x() -> Grid {
        Grid::from_flat(&[
            0, 0, 0, 0,
            0, 1, 1, 0,
            0, 1, 1, 0,
            0, 0, 0, 0,
        ])
        .unwrap()
    }

    fn params(num_rules: usize, execution: Execution) -> MatchParams {
        MatchParams {
            num_rules,
            seed: 42,
            boundary: Boundary::Toroidal,
            max_steps: 100,
            execution,
        }
    }

    #[test]
    fn test_identity_pair_matches_every_rule() {
        let x = block_x();
        let report = run_matches(&[x], &[x], &params(1000, Execution::Sequential), &CancelToken::new()).unwrap();

        assert!(!report.cancelled);
        let pair = &report.pairs[0];
        assert_eq!(pair.match_count(), 1000);
        assert_eq!(pair.m, 1.0);
        assert_eq!(pair.ctm, 0.0);
        assert!(pair.matches.iter().all(|r| r.depth == 0));
        assert_eq!(pair.min_depth(), Some(0));
        assert!(pair.complete);
    }

    #[test]
    fn test_match_order_follows_draw_order() {
        let x = block_x();
        let report = run_matches(&[x], &[x], &params(64, Execution::Sequential), &CancelToken::new()).unwrap();
        let rules = draw_rules(42, 64).unwrap();
        for (i, record) in report.pairs[0].matches.iter().enumerate() {
            assert_eq!(record.rule_index, i);
            assert_eq!(record.rule_id, rules[i].id());
        }
    }

    #[test]
    fn test_matches_agree_with_direct_simulation() {
        let x = block_x();
        let y = Grid::from_bits(0);
        let p = params(300, Execution::Sequential);
        let report = run_matches(&[x], &[y], &p, &CancelToken::new()).unwrap();

        let cancel = CancelToken::new();
        let expected: Vec<(usize, usize)> = draw_rules(42, 300)
            .unwrap()
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                simulate_to_target(x, y, r, Boundary::Toroidal, 100, &cancel)
                    .depth()
                    .map(|d| (i, d))
            })
            .collect();
        let got: Vec<(usize, usize)> = report.pairs[0].matches.iter().map(|r| (r.rule_index, r.depth)).collect();
        assert_eq!(got, expected);

        let (m, ctm) = complexity_estimate(expected.len(), 300);
        assert_eq!(report.pairs[0].m, m);
        assert_eq!(report.pairs[0].ctm, ctm);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let xs = [block_x(), Grid::from_bits(0x8421)];
        let ys = [Grid::from_bits(0), Grid::from_bits(0x4218)];
        let cancel = CancelToken::new();
        let seq = run_matches(&xs, &ys, &params(500, Execution::Sequential), &cancel).unwrap();
        let par = run_matches(&xs, &ys, &params(500, Execution::Parallel), &cancel).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_complexity_estimate() {
        assert_eq!(complexity_estimate(1, 4), (0.25, 2.0));
        assert_eq!(complexity_estimate(4, 4), (1.0, 0.0));
        assert_eq!(complexity_estimate(3, 8).0, 0.375);
        assert_eq!(complexity_estimate(3, 8).1, -(0.375f64).log2());
        let (m, ctm) = complexity_estimate(0, 10);
        assert_eq!(m, 0.0);
        assert!(ctm.is_infinite() && ctm > 0.0);
    }

    #[test]
    fn test_no_match_is_infinite() {
        // A step bound of 1 only compares the start grid
        let x = Grid::from_bits(u16::MAX);
        let y = Grid::from_bits(0x1234);
        let mut p = params(50, Execution::Sequential);
        p.max_steps = 1;
        let report = run_matches(&[x], &[y], &p, &CancelToken::new()).unwrap();
        let pair = &report.pairs[0];
        assert_eq!(pair.match_count(), 0);
        assert_eq!(pair.m, 0.0);
        assert_eq!(pair.ctm, f64::INFINITY);
        assert_eq!(pair.min_depth(), None);
    }

    #[test]
    fn test_same_seed_same_report() {
        let xs = [block_x()];
        let ys = [Grid::from_bits(0x0EE0)];
        let cancel = CancelToken::new();
        let a = run_matches(&xs, &ys, &params(200, Execution::Sequential), &cancel).unwrap();
        let b = run_matches(&xs, &ys, &params(200, Execution::Sequential), &cancel).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_arguments() {
        let x = block_x();
        let cancel = CancelToken::new();
        assert!(matches!(
            run_matches(&[x], &[x], &params(0, Execution::Sequential), &cancel),
            Err(CtmError::InvalidArgument(_))
        ));
        assert_eq!(
            run_matches(&[x, x], &[x], &params(1, Execution::Sequential), &cancel),
            Err(CtmError::BatchMismatch { xs: 2, ys: 1 })
        );
        assert!(run_matches_flat(&[0; 17], &[0; 16], &params(1, Execution::Sequential), &cancel).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let report = run_matches(&[], &[], &params(10, Execution::Sequential), &CancelToken::new()).unwrap();
        assert!(report.pairs.is_empty());
        assert!(!report.cancelled);
    }

    #[test]
    fn test_cancelled_run_is_partial() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let x = block_x();
        let report = run_matches(&[x, x], &[x, x], &params(10, Execution::Sequential), &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pairs.len(), 2);
        for pair in &report.pairs {
            assert!(!pair.complete);
            assert_eq!(pair.match_count(), 0);
            assert_eq!(pair.ctm, f64::INFINITY);
        }
    }

    #[test]
    fn test_cancel_mid_run_keeps_finished_pairs() {
        let x = block_x();
        let xs = [x, x, x];
        let ys = [x, Grid::EMPTY, x];
        let num_rules = 200;

        for execution in [Execution::Sequential, Execution::Parallel] {
            let p = params(num_rules, execution);
            let full = run_matches(&xs[..2], &ys[..2], &p, &CancelToken::new()).unwrap();

            // Pair 0 polls once up front and twice per rule (sweep, step 0);
            // the token then trips 40 polls into pair 1
            let cancel = CancelToken::after_checks(1 + 2 * num_rules + 1 + 40);
            let report = run_matches(&xs, &ys, &p, &cancel).unwrap();
            assert!(report.cancelled, "{:?}", execution);
            assert_eq!(report.pairs.len(), 3);

            let done = &report.pairs[0];
            assert!(done.complete);
            assert_eq!(done.match_count(), num_rules);
            assert_eq!(done, &full.pairs[0]);

            let cut = &report.pairs[1];
            assert!(!cut.complete, "{:?}", execution);
            assert!(cut.matches.iter().all(|r| full.pairs[1].matches.contains(r)));
            assert!(cut.matches.windows(2).all(|w| w[0].rule_index < w[1].rule_index));
            assert_eq!(cut.m, cut.match_count() as f64 / num_rules as f64);

            let skipped = &report.pairs[2];
            assert!(!skipped.complete);
            assert_eq!(skipped.match_count(), 0);
            assert_eq!(skipped.m, 0.0);
            assert_eq!(skipped.ctm, f64::INFINITY);
        }
    }

    #[test]
    fn test_flat_entry_point() {
        let flat = block_x().to_flat();
        let report = run_matches_flat(&flat, &flat, &params(20, Execution::Sequential), &CancelToken::new()).unwrap();
        assert_eq!(report.pairs[0].match_count(), 20);
    }

    #[test]
    fn test_common_rules() {
        let x = block_x();
        let y = Grid::from_bits(0);
        let cancel = CancelToken::new();
        let report = run_matches(&[x, x], &[x, y], &params(300, Execution::Sequential), &cancel).unwrap();

        // Pair 0 matches everything, so the common set is exactly pair 1's matches
        let common = common_rules(&report);
        assert_eq!(common.len(), report.pairs[1].match_count());
        for (c, m) in common.iter().zip(&report.pairs[1].matches) {
            assert_eq!(c.rule_index, m.rule_index);
            assert_eq!(c.depths, vec![(0, 0), (1, m.depth)]);
        }
    }

    #[test]
    fn test_common_rules_empty_cases() {
        let empty = MatchReport { pairs: Vec::new(), num_rules: 1, cancelled: false };
        assert!(common_rules(&empty).is_empty());

        let record = MatchRecord { rule_index: 0, rule_id: RuleId([0; 8]), depth: 1 };
        let report = MatchReport {
            pairs: vec![
                PairStats::from_matches(vec![record], 1, true),
                PairStats::from_matches(Vec::new(), 1, true),
            ],
            num_rules: 1,
            cancelled: false,
        };
        assert!(common_rules(&report).is_empty());
    }
}

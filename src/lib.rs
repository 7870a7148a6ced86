//! Conditional Coding Theorem Method estimates over 4×4 cellular automata
//!
//! A large seeded ensemble of 512-entry extended-neighborhood rules is run
//! from an input grid X; the fraction of rules whose trajectory reaches Y
//! estimates the conditional algorithmic probability m(Y|X), and -log2(m)
//! the conditional complexity K(Y|X).
//!
//! - [`matches`]: per-pair match aggregation and rules common to a batch
//! - [`trajectory`]: distinct states visited by an explicit rule set
//! - [`induction`]: scoring reachable outputs of a test input
//! - [`dynamics`]: the single-step update and the bounded simulation loop

pub mod cancel;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod grid;
pub mod induction;
pub mod matches;
pub mod prng;
pub mod report;
pub mod rule;
pub mod trajectory;

pub use cancel::CancelToken;
pub use config::Config;
pub use dynamics::{apply, simulate_to_target, Outcome, Simulator, DEFAULT_MAX_STEPS};
pub use error::{CtmError, Result};
pub use grid::{Boundary, Grid};
pub use induction::{collect_candidates, score_candidates, select_hypothesis, TimeMetric};
pub use matches::{common_rules, run_matches, run_matches_flat, Execution, MatchParams, MatchReport, PairStats};
pub use rule::{Rule, RuleId};
pub use trajectory::{collect_trajectories, collect_trajectories_flat, Trajectory, TrajectoryReport};

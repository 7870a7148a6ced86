//! Run configuration (YAML)
//!
//! Every section has defaults, so a config file only needs to name what it
//! changes. `Config::default()` is itself a runnable template.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dynamics::DEFAULT_MAX_STEPS;
use crate::error::{CtmError, Result};
use crate::grid::{Boundary, Grid, GRID_CELLS};
use crate::induction::TimeMetric;
use crate::matches::{Execution, MatchParams};
use crate::rule::{Rule, RULE_WORDS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule ensemble and simulation bounds
    pub sampling: SamplingConfig,
    pub execution: ExecutionConfig,
    /// (X, Y) pairs as flat row-major cells
    pub pairs: Vec<PairConfig>,
    /// Optional trajectory / induction run
    pub trajectories: TrajectoryConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub num_rules: usize,
    pub seed: u64,
    /// "toroidal" / "zero_padded", or 1 / 0
    pub boundary: Boundary,
    /// <= 0 selects the default bound
    pub max_steps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Spread each pair's rule sweep over all cores
    pub parallel: bool,
    /// Stop and report partial results after N seconds (0 = no limit)
    pub time_limit_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub x: Vec<u32>,
    pub y: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Test input; the trajectory run is skipped when absent
    pub input: Option<Vec<u32>>,
    /// Explicit rules, 8 words each
    pub rules: Vec<[u64; RULE_WORDS]>,
    /// Also run the rules that matched every configured pair
    pub use_common_rules: bool,
    pub time_metric: TimeMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Per-pair CSV summary (empty = none)
    pub csv_path: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            num_rules: 1_000_000,
            seed: 42,
            boundary: Boundary::Toroidal,
            max_steps: DEFAULT_MAX_STEPS as i64,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            time_limit_secs: 0,
        }
    }
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            input: None,
            rules: Vec::new(),
            use_common_rules: false,
            time_metric: TimeMetric::Min,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            execution: ExecutionConfig::default(),
            pairs: vec![
                // 2x2 block widens to the west
                PairConfig {
                    x: vec![0, 0, 0, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 0, 0, 0],
                    y: vec![0, 0, 0, 0, 1, 1, 1, 0, 1, 1, 1, 0, 0, 0, 0, 0],
                },
                // Scattered cells collapse to a central pair
                PairConfig {
                    x: vec![0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0],
                    y: vec![0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0],
                },
            ],
            trajectories: TrajectoryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CtmError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| CtmError::Config(e.to_string()))
    }

    /// Save config to a YAML file
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).map_err(|e| CtmError::Config(e.to_string()))?;
        std::fs::write(path, yaml)
            .map_err(|e| CtmError::Config(format!("writing {}: {}", path.display(), e)))
    }

    /// Write the default config as a template
    pub fn write_template<P: AsRef<Path>>(path: P) -> Result<()> {
        Config::default().to_yaml(path)
    }

    /// Validate configuration and return warnings.
    /// Returns Err with a message on fatal problems.
    pub fn validate(&self) -> std::result::Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.sampling.num_rules == 0 {
            return Err("num_rules must be greater than 0".to_string());
        }
        if self.sampling.max_steps <= 0 {
            warnings.push(format!(
                "max_steps {} is not positive, the default of {} will be used",
                self.sampling.max_steps, DEFAULT_MAX_STEPS
            ));
        }

        for (i, pair) in self.pairs.iter().enumerate() {
            check_cells(&pair.x).map_err(|e| format!("pairs[{}].x: {}", i, e))?;
            check_cells(&pair.y).map_err(|e| format!("pairs[{}].y: {}", i, e))?;
        }

        match &self.trajectories.input {
            Some(input) => {
                check_cells(input).map_err(|e| format!("trajectories.input: {}", e))?;
                if self.trajectories.rules.is_empty() && !self.trajectories.use_common_rules {
                    warnings.push("trajectories.input is set but no rules are configured".to_string());
                }
            }
            None => {
                if !self.trajectories.rules.is_empty() || self.trajectories.use_common_rules {
                    warnings.push(
                        "trajectory rules are configured but trajectories.input is missing; \
                         the trajectory run will be skipped"
                            .to_string(),
                    );
                }
            }
        }

        if self.pairs.is_empty() {
            if self.trajectories.use_common_rules {
                return Err("use_common_rules requires at least one pair".to_string());
            }
            if self.trajectories.input.is_none() {
                warnings.push("no pairs and no trajectory input configured, nothing to do".to_string());
            }
        }

        Ok(warnings)
    }

    /// Apply a command-line override by option name (no leading dashes).
    /// Switches take "true" or "false".
    pub fn apply_override(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "seed" => self.sampling.seed = parse_option(name, value)?,
            "num-rules" => self.sampling.num_rules = parse_option(name, value)?,
            "max-steps" => self.sampling.max_steps = parse_option(name, value)?,
            "boundary" => self.sampling.boundary = parse_option(name, value)?,
            "sequential" => self.execution.parallel = !parse_option::<bool>(name, value)?,
            "time-limit" => self.execution.time_limit_secs = parse_option(name, value)?,
            "time-metric" => self.trajectories.time_metric = parse_option(name, value)?,
            "use-common-rules" => self.trajectories.use_common_rules = parse_option(name, value)?,
            "csv" => self.output.csv_path = value.to_string(),
            other => return Err(CtmError::Config(format!("unknown option --{}", other))),
        }
        Ok(())
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            num_rules: self.sampling.num_rules,
            seed: self.sampling.seed,
            boundary: self.sampling.boundary,
            max_steps: self.sampling.max_steps,
            execution: if self.execution.parallel {
                Execution::Parallel
            } else {
                Execution::Sequential
            },
        }
    }

    /// Decoded X and Y grids of every pair.
    pub fn pair_grids(&self) -> Result<(Vec<Grid>, Vec<Grid>)> {
        let xs = self.pairs.iter().map(|p| Grid::from_flat(&p.x)).collect::<Result<Vec<_>>>()?;
        let ys = self.pairs.iter().map(|p| Grid::from_flat(&p.y)).collect::<Result<Vec<_>>>()?;
        Ok((xs, ys))
    }

    pub fn trajectory_input(&self) -> Result<Option<Grid>> {
        self.trajectories.input.as_deref().map(Grid::from_flat).transpose()
    }

    pub fn trajectory_rules(&self) -> Vec<Rule> {
        self.trajectories.rules.iter().map(Rule::from_words).collect()
    }
}

fn parse_option<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| CtmError::Config(format!("invalid --{} '{}': {}", name, value, e)))
}

fn check_cells(cells: &[u32]) -> std::result::Result<(), String> {
    if cells.len() != GRID_CELLS {
        return Err(format!("expected {} cells, got {}", GRID_CELLS, cells.len()));
    }
    if let Some((i, v)) = cells.iter().enumerate().find(|(_, &v)| v > 1) {
        return Err(format!("cell {} is {}, expected 0 or 1", i, v));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_validates() {
        let config = Config::default();
        assert_eq!(config.validate().unwrap(), Vec::<String>::new());
        let (xs, ys) = config.pair_grids().unwrap();
        assert_eq!(xs.len(), 2);
        assert_eq!(ys[0].count_ones(), 6);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.sampling.boundary = Boundary::ZeroPadded;
        config.trajectories.input = Some(vec![1; 16]);
        config.trajectories.rules = vec![[1, 2, 3, 4, 5, 6, 7, u64::MAX]];

        let path = std::env::temp_dir().join("conditional_ctm_config_test.yaml");
        config.to_yaml(&path).unwrap();
        let loaded = Config::from_yaml(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml_str(
            "sampling:\n  num_rules: 500\n  boundary: 0\npairs: []\n",
        )
        .unwrap();
        assert_eq!(config.sampling.num_rules, 500);
        assert_eq!(config.sampling.seed, 42);
        assert_eq!(config.sampling.boundary, Boundary::ZeroPadded);
        assert!(config.pairs.is_empty());
        assert!(config.execution.parallel);
        assert_eq!(config.trajectories.time_metric, TimeMetric::Min);
    }

    #[test]
    fn test_time_metric_yaml() {
        let config = Config::from_yaml_str("trajectories:\n  time_metric: t_mean\n").unwrap();
        assert_eq!(config.trajectories.time_metric, TimeMetric::Mean);
    }

    #[test]
    fn test_validate_rejects_bad_cells() {
        let mut config = Config::default();
        config.pairs[1].y[3] = 2;
        let err = config.validate().unwrap_err();
        assert!(err.contains("pairs[1].y"), "{}", err);

        let mut config = Config::default();
        config.pairs[0].x.pop();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sampling.num_rules = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = Config::default();
        config.sampling.max_steps = 0;
        config.trajectories.rules = vec![[0; 8]];
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_match_params() {
        let mut config = Config::default();
        config.execution.parallel = false;
        let params = config.match_params();
        assert_eq!(params.num_rules, 1_000_000);
        assert_eq!(params.execution, Execution::Sequential);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config.apply_override("seed", "7").unwrap();
        config.apply_override("boundary", "zero_padded").unwrap();
        config.apply_override("sequential", "true").unwrap();
        config.apply_override("time-metric", "t_mean").unwrap();
        config.apply_override("use-common-rules", "true").unwrap();
        config.apply_override("csv", "out.csv").unwrap();

        assert_eq!(config.sampling.seed, 7);
        assert_eq!(config.sampling.boundary, Boundary::ZeroPadded);
        assert!(!config.execution.parallel);
        assert_eq!(config.trajectories.time_metric, TimeMetric::Mean);
        assert!(config.trajectories.use_common_rules);
        assert_eq!(config.output.csv_path, "out.csv");

        assert!(matches!(
            config.apply_override("time-metric", "median"),
            Err(CtmError::Config(_))
        ));
        assert!(config.apply_override("num-rules", "-3").is_err());
        assert!(config.apply_override("frames-dir", "x").is_err());
        assert_eq!(config.trajectories.time_metric, TimeMetric::Mean);
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        assert!(matches!(
            Config::from_yaml_str("sampling: [1, 2"),
            Err(CtmError::Config(_))
        ));
        assert!(matches!(
            Config::from_yaml_str("sampling:\n  boundary: mirror\n"),
            Err(CtmError::Config(_))
        ));
    }
}

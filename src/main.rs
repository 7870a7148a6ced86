use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use conditional_ctm::config::Config;
use conditional_ctm::grid::Grid;
use conditional_ctm::induction::{collect_candidates, rank_hypotheses, score_candidates};
use conditional_ctm::matches::{common_rules, run_matches, CommonRule};
use conditional_ctm::report::CsvReport;
use conditional_ctm::rule::Rule;
use conditional_ctm::trajectory::collect_trajectories;
use conditional_ctm::CancelToken;
use log::{info, warn};

/// Options that take a value, by long name.
const VALUE_OPTIONS: &[&str] = &[
    "seed",
    "num-rules",
    "max-steps",
    "boundary",
    "time-limit",
    "time-metric",
    "csv",
];
/// Options that take no value.
const SWITCHES: &[&str] = &["sequential", "use-common-rules"];

/// The value following `argv[i]`, exiting with a message when it is missing.
fn arg_value(argv: &[String], i: usize, flag: &str) -> String {
    match argv.get(i) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Missing value for {}", flag);
            process::exit(1);
        }
    }
}

fn parse_args() -> Config {
    let mut config = Config::default();
    let argv: Vec<String> = env::args().collect();

    // First pass: --config / --generate-config
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = arg_value(&argv, i, "--config");
                match Config::from_yaml(&path) {
                    Ok(loaded) => {
                        println!("Loaded config from: {}", path);
                        config = loaded;
                    }
                    Err(e) => {
                        eprintln!("Error loading config file '{}': {}", path, e);
                        process::exit(1);
                    }
                }
            }
            "--generate-config" => {
                let output_path = match argv.get(i + 1) {
                    Some(next) if !next.starts_with('-') => {
                        i += 1;
                        next.clone()
                    }
                    _ => "ctm.yaml".to_string(),
                };
                match Config::write_template(&output_path) {
                    Ok(()) => {
                        println!("Generated config template: {}", output_path);
                        process::exit(0);
                    }
                    Err(e) => {
                        eprintln!("Error writing config template: {}", e);
                        process::exit(1);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    // Second pass: CLI args override config file values
    i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" | "-c" => {
                i += 1; // already loaded
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            arg => {
                let name = match arg {
                    "-s" => "seed",
                    "-n" => "num-rules",
                    _ => arg.strip_prefix("--").unwrap_or(arg),
                };
                let value = if SWITCHES.contains(&name) {
                    "true".to_string()
                } else if VALUE_OPTIONS.contains(&name) {
                    i += 1;
                    arg_value(&argv, i, arg)
                } else {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    process::exit(1);
                };
                if let Err(e) = config.apply_override(name, &value) {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        i += 1;
    }

    match config.validate() {
        Ok(warnings) => {
            for warning in warnings {
                eprintln!("Config warning: {}", warning);
            }
        }
        Err(e) => {
            eprintln!("Config validation error: {}", e);
            process::exit(1);
        }
    }

    config
}

fn print_help() {
    println!("Conditional CTM estimator for 4x4 cellular automata");
    println!();
    println!("USAGE:");
    println!("    ctm [OPTIONS]");
    println!("    ctm --config ctm.yaml");
    println!("    ctm --generate-config [output.yaml]");
    println!();
    println!("CONFIG FILE:");
    println!("    -c, --config <FILE>       Load pairs and settings from a YAML config file");
    println!("    --generate-config [FILE]  Generate template config (default: ctm.yaml)");
    println!();
    println!("OPTIONS (override config file values):");
    println!("    -s, --seed <N>            Rule ensemble seed (default: 42)");
    println!("    -n, --num-rules <N>       Rules to sample (default: 1000000)");
    println!("    --max-steps <N>           Step bound per simulation, <= 0 for default (65536)");
    println!("    --boundary <MODE>         toroidal | zero_padded (default: toroidal)");
    println!("    --sequential              Disable the parallel rule sweep");
    println!("    --time-limit <SECS>       Stop after SECS seconds with partial results");
    println!("    --csv <FILE>              Write per-pair results as CSV");
    println!();
    println!("INDUCTION:");
    println!("    --time-metric <METRIC>    t_min | t_mean time penalty (default: t_min)");
    println!("    --use-common-rules        Also run the rules that matched every pair");
    println!();
    println!("    -h, --help                Print this help message");
    println!();
    println!("Set RUST_LOG=info (or debug) for progress logging.");
}

/// Raise the cancel token once `limit` has elapsed.
fn spawn_deadline(cancel: CancelToken, limit: Duration) {
    thread::spawn(move || {
        thread::sleep(limit);
        warn!("Time limit of {:?} reached, stopping", limit);
        cancel.cancel();
    });
}

fn run_pairs(config: &Config, cancel: &CancelToken) -> Result<Vec<CommonRule>, Box<dyn Error>> {
    let (xs, ys) = config.pair_grids()?;
    let params = config.match_params();

    let start = Instant::now();
    let report = run_matches(&xs, &ys, &params, cancel)?;
    info!("Match run finished in {:.2?}", start.elapsed());

    println!("\nPairs:");
    for (i, stats) in report.pairs.iter().enumerate() {
        let depth = stats
            .min_depth()
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        println!(
            "  [{}] matches {:>8}  m {:.6e}  K(Y|X) {:>9.4}  min depth {}{}",
            i,
            stats.match_count(),
            stats.m,
            stats.ctm,
            depth,
            if stats.complete { "" } else { "  (partial)" }
        );
    }
    if report.cancelled {
        println!("  Run stopped early; remaining estimates are partial.");
    }

    if !config.output.csv_path.is_empty() {
        let mut csv = CsvReport::create(&config.output.csv_path)?;
        csv.write_report(&report)?;
        let rows = csv.rows();
        csv.finish()?;
        println!("Wrote {} rows to {}", rows, config.output.csv_path);
    }

    let common = common_rules(&report);
    println!("\nRules matching every pair: {}", common.len());
    for rule in common.iter().take(5) {
        println!("  #{} {} depths {:?}", rule.rule_index, rule.rule_id, rule.depths);
    }
    Ok(common)
}

fn run_induction(
    config: &Config,
    input: Grid,
    common: &[CommonRule],
    cancel: &CancelToken,
) -> Result<(), Box<dyn Error>> {
    let mut rules = config.trajectory_rules();
    if config.trajectories.use_common_rules {
        rules.extend(common.iter().map(|c| Rule::from(c.rule_id)));
    }
    if rules.is_empty() {
        warn!("No rules for the trajectory run, skipping induction");
        return Ok(());
    }

    let report = collect_trajectories(
        input,
        &rules,
        config.sampling.boundary,
        config.sampling.max_steps,
        cancel,
    )?;
    let candidates = collect_candidates(&report.trajectories);
    let scored = score_candidates(&candidates, rules.len(), config.trajectories.time_metric)?;
    let ranked = rank_hypotheses(&scored);

    println!(
        "\nInduction: {} rules, {} distinct states, {} eligible outputs{}",
        report.trajectories.len(),
        candidates.len(),
        ranked.len(),
        if report.cancelled { " (partial)" } else { "" }
    );
    for c in ranked.iter().take(5) {
        println!(
            "  {:#06x}  rules {:>6}  freq {:.4}  K {:.4}  t_min {}  t_mean {:.2}",
            c.grid.bits(),
            c.num_rules,
            c.freq,
            c.k_ctm,
            c.t_min,
            c.t_mean
        );
    }
    match ranked.first() {
        Some(best) => println!(
            "\nHypothesis ({} live cells):\n{}",
            best.grid.count_ones(),
            best.grid
        ),
        None => println!("\nNo hypothesis: no rule left the input grid"),
    }
    Ok(())
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let cancel = CancelToken::new();
    if config.execution.time_limit_secs > 0 {
        spawn_deadline(cancel.clone(), Duration::from_secs(config.execution.time_limit_secs));
    }

    println!("Conditional CTM");
    println!("===============\n");
    println!("Configuration:");
    println!("  Pairs: {}", config.pairs.len());
    println!("  Rules: {}", config.sampling.num_rules);
    println!("  Seed: {}", config.sampling.seed);
    println!("  Boundary: {}", config.sampling.boundary);
    println!("  Max steps: {}", config.sampling.max_steps);
    println!(
        "  Execution: {}",
        if config.execution.parallel { "parallel" } else { "sequential" }
    );

    let common = if config.pairs.is_empty() {
        Vec::new()
    } else {
        run_pairs(config, &cancel)?
    };

    if let Some(input) = config.trajectory_input()? {
        run_induction(config, input, &common, &cancel)?;
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let config = parse_args();
    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

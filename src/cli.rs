//! CSV-driven CLI surface. A thin collaborator over the library, built the
//! way the teacher builds its runnable `examples/*.rs` demos, but packaged
//! as a proper `clap` subcommand binary rather than one-file-per-demo.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::normalize::MeasurementToken;
use crate::{Observation, SeasonSpec, TrendConfig};

#[derive(Parser)]
#[command(name = "trend", about = "Censored Mann-Kendall trend detection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// CSV column name holding the numeric/censored value.
    #[arg(long, global = true, default_value = "value")]
    pub value_col: String,

    /// CSV column name holding the time coordinate (seconds-since-epoch or
    /// a unit-agnostic numeric axis).
    #[arg(long, global = true, default_value = "time")]
    pub time_col: String,

    /// Significance level.
    #[arg(long, global = true, default_value_t = 0.05)]
    pub alpha: f64,

    /// Deterministic seed for any surrogate/bootstrap machinery invoked.
    #[arg(long, global = true, default_value_t = 0)]
    pub seed: u64,

    /// Optional TOML config file overriding individual `TrendConfig` fields.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a single trend test over the whole series.
    Test {
        input: PathBuf,
        /// Name of an extra CSV column, aligned row-for-row with the
        /// pre-aggregation input, that the caller wants to keep indexable
        /// against the result. Refused with exit code 3 if aggregation
        /// would discard the index it relies on.
        #[arg(long)]
        companion_col: Option<String>,
    },
    /// Run the seasonal trend test (numeric modulus season spec).
    Seasonal {
        input: PathBuf,
        #[arg(long, default_value_t = 12.0)]
        period: f64,
    },
    /// Run the rolling-window trend driver.
    Rolling {
        input: PathBuf,
        #[arg(long)]
        window: f64,
        #[arg(long)]
        step: f64,
    },
    /// Run the breakpoint-segmented trend driver.
    Segmented {
        input: PathBuf,
        #[arg(long, default_value_t = 5)]
        max_breakpoints: usize,
    },
    /// Print summary statistics about the input series.
    Inspect { input: PathBuf },
}

fn read_csv(path: &PathBuf, value_col: &str, time_col: &str) -> Result<(Vec<MeasurementToken>, Vec<f64>), i32> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        eprintln!("failed to open {:?}: {e}", path);
        2
    })?;
    let headers = reader.headers().map_err(|_| 2)?.clone();
    let value_idx = headers.iter().position(|h| h == value_col).ok_or_else(|| {
        eprintln!("column {value_col:?} not found in {:?}", path);
        2
    })?;
    let time_idx = headers.iter().position(|h| h == time_col).ok_or_else(|| {
        eprintln!("column {time_col:?} not found in {:?}", path);
        2
    })?;

    let mut values = Vec::new();
    let mut times = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|_| 2)?;
        let raw_value = record.get(value_idx).unwrap_or("").to_string();
        let raw_time: f64 = record.get(time_idx).unwrap_or("").parse().map_err(|_| {
            eprintln!("unparsable time value in row {:?}", record);
            2
        })?;
        values.push(MeasurementToken::Text(raw_value));
        times.push(raw_time);
    }
    Ok((values, times))
}

fn build_config(cli: &Cli) -> Result<TrendConfig, i32> {
    let mut config = TrendConfig::default().with_alpha(cli.alpha).with_random_state(cli.seed);
    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path).map_err(|e| {
            eprintln!("failed to read config file {:?}: {e}", path);
            2
        })?;
        let overrides: TrendConfig = toml::from_str(&text).map_err(|e| {
            eprintln!("invalid config file {:?}: {e}", path);
            2
        })?;
        config = overrides;
    }
    Ok(config)
}

fn print_result(result: &crate::TrendResult) {
    println!(
        "trend={:?} s={} var_s={} z={} p={} tau={} slope={} slope_ci=[{}, {}] scaled_slope={} {} confidence={} classification={}",
        result.trend,
        result.s,
        result.var_s,
        result.z,
        result.p,
        result.tau,
        result.slope,
        result.slope_lower,
        result.slope_upper,
        result.scaled_slope,
        result.scaled_slope_unit,
        result.confidence,
        result.classification
    );
    for note in &result.analysis_notes {
        println!("note: {note}");
    }
}

/// Run the CLI, returning the process exit code per §6 of the design
/// (0 success, 2 input-shape, 3 alignment conflict, 4 safety refusal).
pub fn run(cli: Cli) -> i32 {
    crate::logging::init();

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(code) => return code,
    };

    match cli.command {
        Command::Test { input, companion_col } => {
            let (values, times) = match read_csv(&input, &cli.value_col, &cli.time_col) {
                Ok(v) => v,
                Err(code) => return code,
            };
            let obs = match crate::normalize::normalize(&values, &times, None, None) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("{e}");
                    return 2;
                }
            };
            match companion_col {
                Some(_) => match crate::trend_test_with_companion(&obs, values.len(), &config) {
                    Ok(result) => {
                        print_result(&result);
                        0
                    }
                    Err(e @ crate::TrendError::Alignment(_)) => {
                        eprintln!("{e}");
                        3
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        2
                    }
                },
                None => {
                    let result = crate::trend_test(&obs, &config);
                    print_result(&result);
                    0
                }
            }
        }
        Command::Seasonal { input, period } => {
            let (values, times) = match read_csv(&input, &cli.value_col, &cli.time_col) {
                Ok(v) => v,
                Err(code) => return code,
            };
            let obs: Vec<Observation> = match crate::normalize::normalize(&values, &times, None, None) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("{e}");
                    return 2;
                }
            };
            let result = crate::seasonal_trend_test(&obs, SeasonSpec::Numeric { period }, &config);
            print_result(&result);
            0
        }
        Command::Rolling { input, window, step } => {
            let (values, times) = match read_csv(&input, &cli.value_col, &cli.time_col) {
                Ok(v) => v,
                Err(code) => return code,
            };
            let obs: Vec<Observation> = match crate::normalize::normalize(&values, &times, None, None) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("{e}");
                    return 2;
                }
            };
            match crate::rolling::rolling_trend_test(&obs, window, step, &config) {
                Ok(results) => {
                    for r in &results {
                        println!("center={} ", r.center);
                        print_result(&r.result);
                    }
                    0
                }
                Err(crate::TrendError::Safety(msg)) => {
                    eprintln!("safety ceiling exceeded: {msg}");
                    4
                }
                Err(e) => {
                    eprintln!("{e}");
                    2
                }
            }
        }
        Command::Segmented { input, max_breakpoints } => {
            let (values, times) = match read_csv(&input, &cli.value_col, &cli.time_col) {
                Ok(v) => v,
                Err(code) => return code,
            };
            let obs: Vec<Observation> = match crate::normalize::normalize(&values, &times, None, None) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("{e}");
                    return 2;
                }
            };
            match crate::segmented::segmented_trend_test(
                &obs,
                max_breakpoints,
                crate::segmented::SelectionCriterion::Bic,
                None,
                &config,
            ) {
                Ok(segmented) => {
                    for seg in &segmented.segments {
                        println!("segment=[{}, {})", seg.segment.start, seg.segment.end);
                        print_result(&seg.result);
                    }
                    0
                }
                Err(e) => {
                    eprintln!("{e}");
                    2
                }
            }
        }
        Command::Inspect { input } => {
            let (values, times) = match read_csv(&input, &cli.value_col, &cli.time_col) {
                Ok(v) => v,
                Err(code) => return code,
            };
            match crate::inspect_trend_data(&values, &times) {
                Ok(report) => {
                    println!("{report:#?}");
                    0
                }
                Err(e) => {
                    eprintln!("{e}");
                    2
                }
            }
        }
    }
}

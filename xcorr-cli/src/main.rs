//! # xcorr - Reference Waveform Search
//!
//! Command-line driver around `xcorr-core`. Loads raw I/Q captures, runs the
//! fast or brute-force correlator, and prints one `seconds value` line per lag.
//!
//! ## Architecture
//! - **Core**: all signal processing lives in `xcorr-core`
//! - **Driver**: file loading, argument parsing and printing live here
//! - **Logging**: `tracing` to stderr, so stdout carries only results

mod capture;
mod report;
mod selftest;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xcorr_core::{
    brute_force_correlate, power::power_profile, CorrelatorConfig, CrossCorrelator, FftEngine,
    Signal, Strategy,
};

/// Sample rate of the captures this tool was written for, in samples per second.
const DEFAULT_SAMPLE_RATE: f64 = 15.36e6;

#[derive(Debug, Parser)]
#[command(name = "xcorr", version, about = "Locate a reference waveform inside an I/Q capture")]
struct Cli {
    /// Capture sample rate in Hz, used to turn lags into seconds
    #[arg(long, global = true, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Overlap-save FFT correlation
    Fast {
        #[command(flatten)]
        inputs: CorrelationInputs,
        #[command(flatten)]
        tuning: CorrelatorOptions,
    },
    /// Brute-force O(R·(D−R)) correlation
    Slow {
        #[command(flatten)]
        inputs: CorrelationInputs,
    },
    /// Mean power over consecutive 1 ms intervals
    Power {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Compare the fast correlator against the brute-force one on random signals
    Selftest {
        #[arg(long, default_value_t = 100)]
        trials: usize,
        /// Seed for reproducible runs; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct CorrelationInputs {
    reference: PathBuf,
    data: PathBuf,
    /// Print only the strongest lag
    #[arg(long)]
    peak: bool,
    /// Print results as JSON instead of text lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct CorrelatorOptions {
    /// JSON file holding a correlator configuration
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_chunk_size: Option<usize>,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Worker threads for the partitioned strategy
    #[arg(long)]
    workers: Option<usize>,
    /// Accept chunk sizes whose wrap-around region is not 64-sample aligned
    #[arg(long)]
    relaxed_alignment: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Sequential,
    Partitioned,
    Paired,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let engine = FftEngine::initialize();
    info!(threads = engine.threads(), "transform engine ready");

    let result = run(cli);
    engine.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let sample_rate = cli.sample_rate;
    match cli.command {
        Command::Fast { inputs, tuning } => {
            let config = tuning.resolve()?;
            let (reference, data) = capture::load_pair(&inputs.reference, &inputs.data)?;
            warn_if_silent(&reference);
            let mut correlator =
                CrossCorrelator::with_config(reference.len(), data.len(), &config)?;
            info!(
                reference_length = correlator.reference_length(),
                data_length = correlator.data_length(),
                strategy = ?correlator.strategy(),
                chunk_size = correlator.chunk_size(),
                windows = correlator.window_count(),
                workers = correlator.worker_count(),
                "correlating"
            );
            let output = correlator.correlate_to_vec(&reference, &data)?;
            report::correlation(&output, sample_rate, inputs.peak, inputs.json)
        }
        Command::Slow { inputs } => {
            let (reference, data) = capture::load_pair(&inputs.reference, &inputs.data)?;
            warn_if_silent(&reference);
            let output = brute_force_correlate(&reference, &data)?;
            report::correlation(&output, sample_rate, inputs.peak, inputs.json)
        }
        Command::Power { file, json } => {
            let signal = capture::load(&file)?;
            let interval = (sample_rate / 1000.0) as usize;
            let profile = power_profile(&signal, interval)?;
            report::power(&profile, sample_rate, json)
        }
        Command::Selftest { trials, seed } => selftest::run(trials, seed),
    }
}

impl CorrelatorOptions {
    /// Starts from the config file (or defaults) and applies flag overrides.
    fn resolve(&self) -> Result<CorrelatorConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => CorrelatorConfig::default(),
        };

        if let Some(max_chunk_size) = self.max_chunk_size {
            config.max_chunk_size = max_chunk_size;
        }
        match self.strategy {
            Some(StrategyArg::Sequential) => config.strategy = Strategy::Sequential,
            Some(StrategyArg::Paired) => config.strategy = Strategy::PairedTransform,
            Some(StrategyArg::Partitioned) => {
                config.strategy = Strategy::WorkerPartitioned { workers: self.workers }
            }
            None => {
                let partitioned = matches!(config.strategy, Strategy::WorkerPartitioned { .. });
                if let (Some(workers), true) = (self.workers, partitioned) {
                    config.strategy = Strategy::WorkerPartitioned { workers: Some(workers) };
                }
            }
        }
        if self.relaxed_alignment {
            config.alignment_strict = false;
        }
        Ok(config)
    }
}

/// Every lag divides by the reference energy, so a silent reference yields NaN.
fn warn_if_silent(reference: &Signal) {
    if reference.energy() == 0.0 {
        warn!("reference has zero energy; correlation values will not be finite");
    }
}

fn load_config(path: &Path) -> Result<CorrelatorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

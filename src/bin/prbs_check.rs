use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use rayon::prelude::*;

use prbs_rs::checker::TrackingPolicy;
use prbs_rs::prbs::reference::cross_check_config;
use prbs_rs::prbs::{Lfsr, StandardPrbs, TapMask};
use prbs_rs::scenario::{Scenario, ScenarioConfig, SignalTrace};
use prbs_rs::PrbsError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cross-check both LFSR formulations of the standard patterns
    Selftest {
        /// Skip patterns longer than this
        #[arg(short, long, default_value_t = 23)]
        max_length: u32,
    },
    /// Run a loopback scenario
    Run {
        /// Scenario TOML file; overrides --pattern
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Standard pattern preset, e.g. prbs13
        #[arg(short, long, default_value = "prbs13")]
        pattern: String,

        #[arg(long, value_enum)]
        policy: Option<Policy>,

        /// Samples per clean phase
        #[arg(long)]
        clean: Option<u64>,

        /// Soak target for data_count
        #[arg(long)]
        soak: Option<u64>,

        /// Write every interval's signals to this file as CBOR
        #[arg(short, long)]
        trace: Option<PathBuf>,
    },
    /// Print a pattern as 0/1 characters
    Generate {
        #[arg(short, long, default_value = "prbs7")]
        pattern: String,

        /// Seed, decimal or 0x-prefixed hex; all ones by default
        #[arg(short, long, value_parser = parse_u64)]
        seed: Option<u64>,

        #[arg(short = 'n', long, default_value_t = 128)]
        count: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    Autonomous,
    StreamDriven,
}

impl From<Policy> for TrackingPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Autonomous => TrackingPolicy::Autonomous,
            Policy::StreamDriven => TrackingPolicy::StreamDriven,
        }
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("{}: {}", s, e))
}

fn selftest(max_length: u32) -> Result<(), PrbsError> {
    let patterns: Vec<StandardPrbs> = StandardPrbs::ALL
        .iter()
        .cloned()
        .filter(|p| p.length() <= max_length)
        .collect();
    let results: Vec<(StandardPrbs, Result<_, PrbsError>)> = patterns
        .par_iter()
        .map(|&p| (p, cross_check_config(&p.config(p.default_seed()))))
        .collect();

    let mut failed = None;
    for (pattern, result) in results {
        match result {
            Ok(report) => println!(
                "{:<7} period {:>10}  zeros {:>10}  ones {:>10}",
                pattern, report.period, report.count_zero, report.count_one
            ),
            Err(e) => {
                println!("{:<7} FAILED: {}", pattern, e);
                failed = Some(e);
            }
        }
    }
    failed.map_or(Ok(()), Err)
}

fn run_scenario(
    config: Option<PathBuf>,
    pattern: &str,
    policy: Option<Policy>,
    clean: Option<u64>,
    soak: Option<u64>,
    trace: Option<PathBuf>,
) -> Result<(), PrbsError> {
    let mut config = match config {
        Some(path) => {
            info!("loading scenario from {}", path.display());
            ScenarioConfig::from_file(path)?
        }
        None => ScenarioConfig::for_pattern(pattern.parse()?),
    };
    if let Some(policy) = policy {
        config.policy = policy.into();
    }
    if let Some(clean) = clean {
        config.clean_samples = clean;
    }
    if soak.is_some() {
        config.soak_samples = soak;
    }

    let mut scenario = Scenario::loopback(config)?;
    if trace.is_some() {
        scenario.set_trace(SignalTrace::default());
    }
    let result = scenario.run();

    if let (Some(path), Some(signals)) = (trace, scenario.take_trace()) {
        let file = BufWriter::new(File::create(&path)?);
        signals.write_cbor(file)?;
        info!(
            "wrote {} intervals to {}",
            signals.records().len(),
            path.display()
        );
    }

    println!("{}", result?);
    Ok(())
}

fn generate(pattern: &str, seed: Option<u64>, count: u64) -> Result<(), PrbsError> {
    let pattern: StandardPrbs = pattern.parse()?;
    let config = pattern.config(seed.unwrap_or_else(|| pattern.default_seed()));
    let lfsr: Lfsr<TapMask> = Lfsr::new(&config)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (i, bit) in lfsr.take(count as usize).enumerate() {
        write!(out, "{}", bit)?;
        if i % 64 == 63 {
            writeln!(out)?;
        }
    }
    if count % 64 != 0 {
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::Selftest { max_length } => selftest(max_length),
        Command::Run {
            config,
            pattern,
            policy,
            clean,
            soak,
            trace,
        } => run_scenario(config, &pattern, policy, clean, soak, trace),
        Command::Generate {
            pattern,
            seed,
            count,
        } => generate(&pattern, seed, count),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(if e.is_config_error() { 2 } else { 1 });
    }
}

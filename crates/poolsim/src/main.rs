//! poolsim - predictive pool-sizing simulator CLI
//!
//! # Usage
//!
//! ```bash
//! # Write a 300 s surge trace
//! poolsim generate --out arrivals.csv
//!
//! # Simulate it and keep the per-interval series
//! poolsim run --arrivals arrivals.csv --intervals-out intervals.csv --summary-out summary.csv
//!
//! # Same stream under every control mode
//! poolsim compare --arrivals arrivals.csv
//!
//! # Start a config file from the defaults
//! poolsim default-config > poolsim.toml
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use poolsim_core::config::{ControlMode, LogFormat, SimConfig};
use poolsim_core::error::ConfigError;
use poolsim_core::logging::init_logging;
use poolsim_core::orchestrator::{Orchestrator, SliSummary};
use poolsim_core::report::{
    SUMMARY_HEADER, load_arrivals, write_arrivals, write_intervals_csv, write_report_json,
    write_summary_csv,
};
use poolsim_core::workload::{SurgeConfig, generate_surge};

/// Predictive pool-sizing simulator
#[derive(Parser, Debug)]
#[command(name = "poolsim")]
#[command(about = "Simulate a resource pool under a predictive resizing controller")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true, env = "POOLSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate an arrival CSV and report SLIs
    Run(RunArgs),
    /// Write a synthetic surge arrival CSV
    Generate(GenerateArgs),
    /// Run every control mode on the same arrivals
    Compare(CompareArgs),
    /// Print the default configuration as TOML
    DefaultConfig,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Arrival CSV (`t,cls` header, one arrival per row)
    #[arg(long)]
    arrivals: PathBuf,

    /// Write per-interval records here
    #[arg(long)]
    intervals_out: Option<PathBuf>,

    /// Write the one-row SLI summary here
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Override the configured control mode
    #[arg(long)]
    mode: Option<ControlMode>,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output format for stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Destination CSV
    #[arg(long)]
    out: PathBuf,

    /// Trace length in seconds
    #[arg(long, default_value_t = 300.0)]
    duration: f64,

    /// Highest class-1 / class-3 weight
    #[arg(long, default_value_t = 8)]
    cap: u32,

    /// Divisor from summed weights to arrivals per second
    #[arg(long, default_value_t = 10.0)]
    rate_div: f64,

    /// Seed of the arrival draws
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Seed of the mix profile
    #[arg(long, default_value_t = 42)]
    profile_seed: u64,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Arrival CSV
    #[arg(long)]
    arrivals: PathBuf,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output format for stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

/// One row of `compare` output.
#[derive(Debug, Serialize)]
struct ModeRow {
    mode: ControlMode,
    #[serde(flatten)]
    summary: SliSummary,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    if matches!(cli.command, Command::DefaultConfig) {
        let text = SimConfig::default().to_toml()?;
        print!("{text}");
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let mut log = config.logging.clone();
    if let Some(level) = cli.log_level {
        log.level = level;
    }
    if let Some(format) = cli.log_format {
        log.format = format;
    }
    if cli.log_file.is_some() {
        log.file = cli.log_file;
    }
    init_logging(&log).context("initializing logging")?;

    match cli.command {
        Command::Run(args) => run(config, &args),
        Command::Generate(args) => generate(&args),
        Command::Compare(args) => compare(config, &args),
        Command::DefaultConfig => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> std::result::Result<SimConfig, ConfigError> {
    match path {
        Some(path) => SimConfig::load_from(path),
        None => Ok(SimConfig::default()),
    }
}

fn run(mut config: SimConfig, args: &RunArgs) -> Result<()> {
    if let Some(mode) = args.mode {
        config.controller.mode = mode;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    let orchestrator = Orchestrator::new(config)?;

    let load = load_arrivals(&args.arrivals)
        .with_context(|| format!("reading arrivals from {}", args.arrivals.display()))?;
    let report = orchestrator.run(&load.arrivals)?;

    if let Some(path) = &args.intervals_out {
        let out = create_output(path)?;
        write_intervals_csv(out, &report.intervals)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = report.intervals.len(), "wrote intervals");
    }
    if let Some(path) = &args.summary_out {
        let out = create_output(path)?;
        write_summary_csv(out, &report.summary)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote summary");
    }

    let stdout = io::stdout();
    match args.format {
        OutputFormat::Json => write_report_json(stdout.lock(), &report)?,
        OutputFormat::Plain => {
            let s = &report.summary;
            let mut out = stdout.lock();
            writeln!(out, "mode:            {}", report.mode)?;
            writeln!(out, "seed:            {}", report.seed)?;
            writeln!(out, "simulated (s):   {:.3}", s.total_simulated_seconds)?;
            writeln!(out, "arrivals:        {}", s.total_arrivals)?;
            writeln!(out, "rejections:      {}", s.total_rejections)?;
            writeln!(out, "rejection rate:  {:.6}", s.rejection_rate)?;
            writeln!(out, "mean idle pool:  {:.3}", s.mean_idle_pool)?;
            writeln!(out, "intervals:       {}", report.intervals.len())?;
            if load.skipped > 0 {
                writeln!(out, "skipped rows:    {}", load.skipped)?;
            }
        }
    }
    Ok(())
}

fn generate(args: &GenerateArgs) -> Result<()> {
    let surge = SurgeConfig {
        duration_sec: args.duration,
        cap: args.cap,
        rate_div: args.rate_div,
        seed: args.seed,
        profile_seed: args.profile_seed,
        ..SurgeConfig::default()
    };
    let arrivals = generate_surge(&surge)?;
    let out = create_output(&args.out)?;
    write_arrivals(out, &arrivals).with_context(|| format!("writing {}", args.out.display()))?;
    println!("wrote {} arrivals to {}", arrivals.len(), args.out.display());
    Ok(())
}

fn compare(config: SimConfig, args: &CompareArgs) -> Result<()> {
    let load = load_arrivals(&args.arrivals)
        .with_context(|| format!("reading arrivals from {}", args.arrivals.display()))?;

    let mut rows = Vec::with_capacity(ControlMode::ALL.len());
    for mode in ControlMode::ALL {
        let mut cfg = config.clone();
        cfg.controller.mode = mode;
        if let Some(seed) = args.seed {
            cfg.run.seed = seed;
        }
        let report = Orchestrator::new(cfg)?.run(&load.arrivals)?;
        rows.push(ModeRow {
            mode,
            summary: report.summary,
        });
    }

    let mut out = io::stdout().lock();
    match args.format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            writeln!(out)?;
        }
        OutputFormat::Plain => {
            writeln!(out, "mode,{SUMMARY_HEADER}")?;
            for row in &rows {
                let s = &row.summary;
                writeln!(
                    out,
                    "{},{:.3},{},{},{:.6},{:.3}",
                    row.mode,
                    s.total_simulated_seconds,
                    s.total_arrivals,
                    s.total_rejections,
                    s.rejection_rate,
                    s.mean_idle_pool
                )?;
            }
        }
    }
    Ok(())
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn report_error(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
    let remediation = if let Some(core) = err.downcast_ref::<poolsim_core::Error>() {
        core.remediation()
    } else if let Some(config) = err.downcast_ref::<ConfigError>() {
        Some(config.remediation())
    } else {
        None
    };
    if let Some(remediation) = remediation {
        eprint!("{}", remediation.render_plain());
    }
}

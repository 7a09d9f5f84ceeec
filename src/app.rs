//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - assembles the pipeline configuration (defaults, `.env`, flags)
//! - runs the batch fit or the radial-velocity correction
//! - prints the result table and writes optional exports

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Command, CorrectArgs, FitArgs};
use crate::domain::{EngineConfig, PipelineConfig};
use crate::error::AppError;
use crate::io::{JsonSpectrumStore, LimbDarkeningTable, load_catalog, load_intervals};
use crate::synth::{ModelInterpolator, MoogEngine};

pub mod pipeline;

pub const ENV_MOOG_PATH: &str = "VSINI_MOOG_PATH";
pub const ENV_MODELS_PATH: &str = "VSINI_MODELS_PATH";
pub const ENV_RUN_DIR: &str = "VSINI_RUN_DIR";

/// Entry point for the `vsini` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Correct(args) => handle_correct(args),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `-v`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let config = pipeline_config_from_args(&args, |key| std::env::var(key).ok());

    let catalog = load_catalog(&args.catalog)?;
    let intervals = load_intervals(&args.intervals)?;
    let limb = LimbDarkeningTable::load(&args.limb_table)?;
    info!(
        stars = catalog.stars.len(),
        rejected_rows = catalog.row_errors.len(),
        intervals = intervals.len(),
        run_dir = %config.engine.run_dir.display(),
        parallel = config.parallel,
        "batch configured"
    );

    let engine = MoogEngine::new(&config.engine);
    let atmosphere = ModelInterpolator::new(&config.engine);
    let batch = pipeline::Batch {
        engine: &engine,
        atmosphere: &atmosphere,
        store: &JsonSpectrumStore,
        limb: &limb,
        config: &config,
    };
    let out = batch.run(&catalog.stars, &intervals);

    if args.details {
        for (row, detail) in out.estimates.iter().zip(&out.details) {
            println!("{}:", row.name);
            print!("{}", crate::report::format_runs(detail));
        }
        println!();
    }
    println!("{}", crate::report::format_estimates(&out.estimates));
    for failure in &out.failures {
        println!("skipped {}: {}", failure.name, failure.message);
    }

    if let Some(path) = &args.export {
        crate::io::export::write_estimates_json(path, &out.estimates)?;
        info!(path = %path.display(), "estimates exported");
    }

    if out.estimates.is_empty() && !catalog.stars.is_empty() {
        return Err(AppError::new(3, "No star produced a vsini estimate."));
    }
    Ok(())
}

fn handle_correct(args: CorrectArgs) -> Result<(), AppError> {
    let store = JsonSpectrumStore;
    for input in &args.inputs {
        let out = crate::doppler::correct_file(&store, input, args.rv, &args.output_dir)?;
        println!("{}", out.display());
    }
    Ok(())
}

/// Flags override environment variables, which override built-in defaults.
pub fn pipeline_config_from_args<F>(args: &FitArgs, env: F) -> PipelineConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = EngineConfig::default();
    let pick = |flag: &Option<PathBuf>, key: &str, fallback: PathBuf| {
        flag.clone()
            .or_else(|| env(key).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or(fallback)
    };

    let engine = EngineConfig {
        run_dir: pick(&args.run_dir, ENV_RUN_DIR, defaults.run_dir),
        moog_binary: pick(&args.moog, ENV_MOOG_PATH, defaults.moog_binary),
        models_dir: pick(&args.models, ENV_MODELS_PATH, defaults.models_dir),
        line_list: args.line_list.clone(),
        timeout: Duration::from_secs(args.timeout),
    };

    PipelineConfig {
        engine,
        flux_error: args.flux_error,
        initial_vrot: args.initial_vrot,
        parallel: args.parallel,
        spectra_dir: args.spectra_dir.clone(),
        ..PipelineConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["vsini", "fit", "--catalog", "c.csv", "--intervals", "i.tsv", "--limb-table", "l.csv"];
        argv.extend_from_slice(extra);
        match crate::cli::Cli::parse_from(argv).command {
            Command::Fit(a) => a,
            Command::Correct(_) => unreachable!(),
        }
    }

    #[test]
    fn defaults_apply_without_env_or_flags() {
        let config = pipeline_config_from_args(&args(&[]), |_| None);
        assert_eq!(config.engine.run_dir, PathBuf::from("running_dir"));
        assert_eq!(config.engine.moog_binary, PathBuf::from("MOOGSILENT"));
        assert_eq!(config.engine.timeout, Duration::from_secs(600));
        assert_eq!(config.vrot_bounds, (0.1, 60.0));
        assert_eq!(config.initial_vrot, 5.0);
        assert_eq!(config.initial_vrot, PipelineConfig::default().initial_vrot);
    }

    #[test]
    fn flags_override_environment() {
        let env = |key: &str| match key {
            ENV_RUN_DIR => Some("/tmp/env_run".to_string()),
            ENV_MOOG_PATH => Some("/opt/moog/MOOGSILENT".to_string()),
            _ => None,
        };
        let config = pipeline_config_from_args(&args(&["--run-dir", "flag_run", "--parallel"]), env);
        assert_eq!(config.engine.run_dir, PathBuf::from("flag_run"));
        assert_eq!(config.engine.moog_binary, PathBuf::from("/opt/moog/MOOGSILENT"));
        assert!(config.parallel);
    }
}

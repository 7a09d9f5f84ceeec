//! Command-line parsing for the vsini estimator.
//!
//! Argument parsing stays separate from command dispatch (`crate::app`) and
//! from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "vsini", version, about = "Projected rotational velocity from iron-line synthesis")]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate vsini (with error propagation) for every star in a catalog.
    Fit(FitArgs),
    /// Shift spectra to the rest frame for a given radial velocity.
    Correct(CorrectArgs),
}

/// Options for a batch fit.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Stellar catalog (CSV: star_name, fits_name, Teff, eTeff, logg, feh, efeh, vtur, instr_broad).
    #[arg(long, value_name = "CSV")]
    pub catalog: PathBuf,

    /// Iron-line interval table (tab separated: ll_li, ll_lf, ll_si, ll_sf).
    #[arg(long, value_name = "TSV")]
    pub intervals: PathBuf,

    /// Limb-darkening grid (CSV with a `Limbo` column).
    #[arg(long = "limb-table", value_name = "CSV")]
    pub limb_table: PathBuf,

    /// Directory holding the spectra named in the catalog.
    #[arg(long, default_value = "Spectra")]
    pub spectra_dir: PathBuf,

    /// Working directory for the synthesis engine [env: VSINI_RUN_DIR].
    #[arg(long)]
    pub run_dir: Option<PathBuf>,

    /// Synthesis engine executable [env: VSINI_MOOG_PATH].
    #[arg(long)]
    pub moog: Option<PathBuf>,

    /// Directory with the atmosphere interpolation tools [env: VSINI_MODELS_PATH].
    #[arg(long)]
    pub models: Option<PathBuf>,

    /// Line list, relative to the run directory.
    #[arg(long, default_value = "../linelist/iron_vrot_moog.list")]
    pub line_list: String,

    /// Seconds before a synthesis call is killed.
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Starting vsini guess (km/s).
    #[arg(long, default_value_t = 5.0)]
    pub initial_vrot: f64,

    /// Nominal flux error used to scale residuals.
    #[arg(long, default_value_t = 0.01)]
    pub flux_error: f64,

    /// Run the five perturbation fits in parallel, each in its own subdirectory.
    #[arg(long)]
    pub parallel: bool,

    /// Print per-variant fit diagnostics for each star.
    #[arg(long)]
    pub details: bool,

    /// Export the per-star estimates to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

/// Options for radial-velocity correction.
#[derive(Debug, Args, Clone)]
pub struct CorrectArgs {
    /// Spectrum files to correct.
    #[arg(required = true, value_name = "SPECTRUM")]
    pub inputs: Vec<PathBuf>,

    /// Radial velocity in km/s.
    #[arg(long, allow_hyphen_values = true)]
    pub rv: f64,

    /// Where the `<name>_rv` files are written.
    #[arg(long, default_value = "Spectra")]
    pub output_dir: PathBuf,
}

//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - loaded from the star catalog / interval table
//! - exported to JSON for downstream scripts

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An observed spectrum on a uniform, strictly increasing wavelength grid.
///
/// Invariant: `wavelength[i] = origin + i * step`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub step: f64,
    pub origin: f64,
}

impl Spectrum {
    /// Build the wavelength axis from a linear calibration.
    pub fn from_calibration(origin: f64, step: f64, flux: Vec<f64>) -> Self {
        let wavelength = (0..flux.len()).map(|i| origin + i as f64 * step).collect();
        Self {
            wavelength,
            flux,
            step,
            origin,
        }
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

/// Wavelength calibration header, keyed the way spectrograph pipelines key it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumHeader {
    #[serde(rename = "CRVAL1")]
    pub reference_wavelength: f64,
    #[serde(rename = "CDELT1")]
    pub wavelength_step: f64,
    #[serde(rename = "NAXIS1")]
    pub sample_count: usize,
    /// Radial velocity (km/s) the spectrum was corrected for, if any.
    #[serde(rename = "RV", default, skip_serializing_if = "Option::is_none")]
    pub radial_velocity: Option<f64>,
    #[serde(rename = "COMMENT", default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

/// An iron-line window nested inside its normalization window.
///
/// Invariant: `large_start <= small_start < small_end <= large_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(rename = "ll_li")]
    pub large_start: f64,
    #[serde(rename = "ll_lf")]
    pub large_end: f64,
    #[serde(rename = "ll_si")]
    pub small_start: f64,
    #[serde(rename = "ll_sf")]
    pub small_end: f64,
}

impl Interval {
    pub fn new(large_start: f64, large_end: f64, small_start: f64, small_end: f64) -> Option<Self> {
        let interval = Self {
            large_start,
            large_end,
            small_start,
            small_end,
        };
        interval.is_nested().then_some(interval)
    }

    pub fn is_nested(&self) -> bool {
        [self.large_start, self.large_end, self.small_start, self.small_end]
            .iter()
            .all(|v| v.is_finite())
            && self.large_start <= self.small_start
            && self.small_start < self.small_end
            && self.small_end <= self.large_end
    }

    pub fn in_large(&self, wavelength: f64) -> bool {
        wavelength >= self.large_start && wavelength <= self.large_end
    }

    pub fn in_small(&self, wavelength: f64) -> bool {
        wavelength >= self.small_start && wavelength <= self.small_end
    }
}

/// Atmospheric and broadening parameters held fixed during one fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StellarParameters {
    pub effective_temperature: f64,
    pub surface_gravity: f64,
    pub metallicity: f64,
    pub microturbulence: f64,
    pub limb_darkening_coefficient: f64,
    pub instrumental_broadening: f64,
}

impl StellarParameters {
    /// Copy with temperature or metallicity shifted by its uncertainty.
    pub fn perturbed(&self, perturbation: Perturbation, unc: &Uncertainties) -> Self {
        let mut out = *self;
        match perturbation {
            Perturbation::Nominal => {}
            Perturbation::TempMinus => out.effective_temperature -= unc.temperature,
            Perturbation::TempPlus => out.effective_temperature += unc.temperature,
            Perturbation::FehMinus => out.metallicity -= unc.metallicity,
            Perturbation::FehPlus => out.metallicity += unc.metallicity,
        }
        out
    }
}

/// One-sigma uncertainties on the perturbed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Uncertainties {
    pub temperature: f64,
    pub metallicity: f64,
}

/// The fixed set of parameter variants fitted per star.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    Nominal,
    TempMinus,
    TempPlus,
    FehMinus,
    FehPlus,
}

impl Perturbation {
    pub const ALL: [Perturbation; 5] = [
        Perturbation::Nominal,
        Perturbation::TempMinus,
        Perturbation::TempPlus,
        Perturbation::FehMinus,
        Perturbation::FehPlus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Perturbation::Nominal => "nominal",
            Perturbation::TempMinus => "temp_minus",
            Perturbation::TempPlus => "temp_plus",
            Perturbation::FehMinus => "feh_minus",
            Perturbation::FehPlus => "feh_plus",
        }
    }
}

/// One row of the stellar catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StarRecord {
    #[serde(rename = "star_name")]
    pub name: String,
    #[serde(rename = "fits_name")]
    pub spectrum_file: String,
    #[serde(default)]
    pub spectrograph: Option<String>,
    #[serde(rename = "Teff")]
    pub teff: f64,
    #[serde(rename = "eTeff")]
    pub teff_err: f64,
    pub logg: f64,
    pub feh: f64,
    pub efeh: f64,
    pub vtur: f64,
    pub instr_broad: f64,
}

impl StarRecord {
    pub fn uncertainties(&self) -> Uncertainties {
        Uncertainties {
            temperature: self.teff_err,
            metallicity: self.efeh,
        }
    }

    pub fn stellar_parameters(&self, limb_darkening_coefficient: f64) -> StellarParameters {
        StellarParameters {
            effective_temperature: self.teff,
            surface_gravity: self.logg,
            metallicity: self.feh,
            microturbulence: self.vtur,
            limb_darkening_coefficient,
            instrumental_broadening: self.instr_broad,
        }
    }
}

/// Optimizer termination status, using the MINPACK/mpfit numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// 0: improper input parameters.
    BadInput,
    /// 1: relative reduction in the sum of squares is at most `ftol`.
    FtolReached,
    /// 2: relative parameter change is at most `xtol`.
    XtolReached,
    /// 3: both 1 and 2 hold.
    BothReached,
    /// 4: cosine between residuals and Jacobian is at most `gtol`.
    GtolReached,
    /// 5: iteration budget exhausted.
    MaxIterations,
    FtolTooSmall,
    XtolTooSmall,
    GtolTooSmall,
    /// -16: a residual became infinite or NaN.
    NonFinite,
    /// -1..=-15: objective asked to stop.
    Terminated(i32),
}

/// How a status should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Converged,
    Exhausted,
    Degenerate,
    Fatal,
}

impl FitStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => FitStatus::BadInput,
            1 => FitStatus::FtolReached,
            2 => FitStatus::XtolReached,
            3 => FitStatus::BothReached,
            4 => FitStatus::GtolReached,
            5 => FitStatus::MaxIterations,
            6 => FitStatus::FtolTooSmall,
            7 => FitStatus::XtolTooSmall,
            8 => FitStatus::GtolTooSmall,
            -16 => FitStatus::NonFinite,
            c @ -15..=-1 => FitStatus::Terminated(c),
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            FitStatus::BadInput => 0,
            FitStatus::FtolReached => 1,
            FitStatus::XtolReached => 2,
            FitStatus::BothReached => 3,
            FitStatus::GtolReached => 4,
            FitStatus::MaxIterations => 5,
            FitStatus::FtolTooSmall => 6,
            FitStatus::XtolTooSmall => 7,
            FitStatus::GtolTooSmall => 8,
            FitStatus::NonFinite => -16,
            FitStatus::Terminated(c) => c,
        }
    }

    pub fn severity(self) -> StatusSeverity {
        match self {
            FitStatus::FtolReached
            | FitStatus::XtolReached
            | FitStatus::BothReached
            | FitStatus::GtolReached => StatusSeverity::Converged,
            FitStatus::MaxIterations => StatusSeverity::Exhausted,
            FitStatus::FtolTooSmall | FitStatus::XtolTooSmall | FitStatus::GtolTooSmall => {
                StatusSeverity::Degenerate
            }
            FitStatus::BadInput | FitStatus::NonFinite | FitStatus::Terminated(_) => {
                StatusSeverity::Fatal
            }
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FitStatus::BadInput => "Improper input parameters.",
            FitStatus::FtolReached => {
                "Both actual and predicted relative reductions in the sum of squares are at most ftol."
            }
            FitStatus::XtolReached => "Relative error between two consecutive iterates is at most xtol.",
            FitStatus::BothReached => "Conditions for status = 1 and status = 2 both hold.",
            FitStatus::GtolReached => {
                "The cosine of the angle between fvec and any column of the jacobian is at most gtol in absolute value."
            }
            FitStatus::MaxIterations => "The maximum number of iterations has been reached.",
            FitStatus::FtolTooSmall => "ftol is too small.",
            FitStatus::XtolTooSmall => "xtol is too small.",
            FitStatus::GtolTooSmall => "gtol is too small.",
            FitStatus::NonFinite => "A parameter or function value has become infinite or an undefined number.",
            FitStatus::Terminated(_) => "The objective function requested termination of the fit.",
        }
    }
}

/// Outcome of one rotational-velocity fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub rotational_velocity: f64,
    /// One-sigma parameter error from the final Jacobian.
    pub uncertainty: f64,
    pub iteration_count: usize,
    /// Sum of squared normalized residuals.
    pub residual_norm: f64,
    pub reduced_chi_square: f64,
    pub status: FitStatus,
}

/// Final per-star estimate, one row of the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarEstimate {
    pub name: String,
    pub instrumental_broadening: f64,
    pub teff: f64,
    pub logg: f64,
    pub feh: f64,
    pub vrot: f64,
    pub vrot_error: f64,
    pub vmac: f64,
    pub status: i32,
    pub total_error: f64,
}

/// Locations and limits of the external synthesis tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Working directory shared by the parameter, script and output files.
    pub run_dir: PathBuf,
    /// Path to the `MOOGSILENT` executable.
    pub moog_binary: PathBuf,
    /// Directory holding `intermod.e` / `transform.e`.
    pub models_dir: PathBuf,
    /// Line list path as seen from `run_dir`.
    pub line_list: String,
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("running_dir"),
            moog_binary: PathBuf::from("MOOGSILENT"),
            models_dir: PathBuf::new(),
            line_list: "../linelist/iron_vrot_moog.list".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Everything a batch run needs besides the catalog itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    /// Nominal flux error used to normalize residuals.
    pub flux_error: f64,
    /// Starting vsini for every fit (km/s).
    pub initial_vrot: f64,
    pub vrot_bounds: (f64, f64),
    /// Run the five perturbation fits on separate working directories in parallel.
    pub parallel: bool,
    pub spectra_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            flux_error: 0.01,
            initial_vrot: 5.0,
            vrot_bounds: (0.1, 60.0),
            parallel: false,
            spectra_dir: PathBuf::from("Spectra"),
        }
    }
}

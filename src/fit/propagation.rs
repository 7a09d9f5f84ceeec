//! Five-run error propagation around the rotational-velocity fit.
//!
//! The nominal fit is repeated with `Teff ± ΔTeff` and `[Fe/H] ± Δ[Fe/H]`;
//! the spread of those results is combined with the fit's own uncertainty
//! by [`total_error`].

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{FitStatus, Interval, Perturbation, PipelineConfig, Spectrum, StellarParameters, TrialResult, Uncertainties};
use crate::error::VsiniError;
use crate::fit::lm::{LmConfig, fit_vrot};
use crate::fit::observed::{ObservedSeries, prepare_observed};
use crate::fit::residuals::SynthesisObjective;
use crate::models::macroturbulence;
use crate::synth::{AtmosphereBuilder, SynthesisEngine, SynthesisRequest};

/// Result of one fit inside the propagation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantFit {
    pub perturbation: Perturbation,
    pub trial: TrialResult,
    pub vmac: f64,
}

/// Combined estimate for one star.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedEstimate {
    pub vrot: f64,
    /// Internal (Jacobian) uncertainty of the nominal fit.
    pub vrot_error: f64,
    pub vmac: f64,
    pub status: FitStatus,
    pub total_error: f64,
    /// Every run, nominal first.
    pub runs: Vec<VariantFit>,
}

impl PropagatedEstimate {
    pub fn nominal(&self) -> &TrialResult {
        &self.runs[0].trial
    }
}

/// Finite-difference sensitivity combined with the internal error.
///
/// Each `Δ` is the signed shift of a perturbed run from the nominal run.
pub fn total_error(nominal: f64, temp_minus: f64, temp_plus: f64, feh_minus: f64, feh_plus: f64, internal: f64) -> f64 {
    let d_teff = (temp_minus - nominal) - (temp_plus - nominal);
    let d_feh = (feh_minus - nominal) - (feh_plus - nominal);
    (d_teff * d_teff + d_feh * d_feh + internal * internal).sqrt()
}

/// Runs the atmosphere builder, synthesis engine and fitter for one star.
pub struct ErrorPropagation<'a, E: SynthesisEngine + ?Sized, A: AtmosphereBuilder + ?Sized> {
    engine: &'a E,
    atmosphere: &'a A,
    config: &'a PipelineConfig,
}

impl<'a, E: SynthesisEngine + ?Sized, A: AtmosphereBuilder + ?Sized> ErrorPropagation<'a, E, A> {
    pub fn new(engine: &'a E, atmosphere: &'a A, config: &'a PipelineConfig) -> Self {
        Self {
            engine,
            atmosphere,
            config,
        }
    }

    fn lm_config(&self) -> LmConfig {
        LmConfig {
            bounds: self.config.vrot_bounds,
            ..LmConfig::default()
        }
    }

    /// Working directory of one variant: shared when sequential, isolated when parallel.
    fn workdir(&self, perturbation: Perturbation) -> PathBuf {
        let run_dir = &self.config.engine.run_dir;
        if self.config.parallel {
            run_dir.join(perturbation.label())
        } else {
            run_dir.clone()
        }
    }

    /// Build the atmosphere, fix vmac and fit vrot for one parameter set.
    pub fn fit_once(
        &self,
        workdir: &Path,
        star: &str,
        observed: &ObservedSeries,
        intervals: &[Interval],
        stellar: &StellarParameters,
    ) -> Result<(TrialResult, f64), VsiniError> {
        fs::create_dir_all(workdir)?;
        self.atmosphere.build(workdir, star, stellar)?;

        let vmac = macroturbulence(stellar.effective_temperature, stellar.surface_gravity);
        let mut objective = SynthesisObjective {
            engine: self.engine,
            workdir: workdir.to_path_buf(),
            template: SynthesisRequest {
                star: star.to_string(),
                stellar: *stellar,
                vrot: self.config.initial_vrot,
                vmac,
                lambda_start: 0.0,
                lambda_end: 0.0,
                delta_lambda: observed.delta_lambda,
            },
            observed,
            intervals,
            flux_error: self.config.flux_error,
        };

        let trial = fit_vrot(self.config.initial_vrot, &self.lm_config(), &mut objective)?;
        Ok((trial, vmac))
    }

    fn run_variant(
        &self,
        perturbation: Perturbation,
        star: &str,
        observed: &ObservedSeries,
        intervals: &[Interval],
        stellar: &StellarParameters,
        uncertainties: &Uncertainties,
    ) -> Result<VariantFit, VsiniError> {
        let params = stellar.perturbed(perturbation, uncertainties);
        debug!(
            star,
            variant = perturbation.label(),
            teff = params.effective_temperature,
            feh = params.metallicity,
            "fitting variant"
        );
        let (trial, vmac) = self.fit_once(&self.workdir(perturbation), star, observed, intervals, &params)?;
        Ok(VariantFit {
            perturbation,
            trial,
            vmac,
        })
    }

    /// Nominal fit plus the four perturbed fits for one star.
    ///
    /// Any failing run aborts the whole estimate.
    pub fn fit_with_error_propagation(
        &self,
        star: &str,
        spectrum: &Spectrum,
        stellar: &StellarParameters,
        uncertainties: &Uncertainties,
        intervals: &[Interval],
    ) -> Result<PropagatedEstimate, VsiniError> {
        let observed = prepare_observed(spectrum, intervals)?;
        info!(star, points = observed.len(), "observed line regions prepared");

        let runs: Vec<VariantFit> = if self.config.parallel {
            Perturbation::ALL
                .par_iter()
                .map(|&p| self.run_variant(p, star, &observed, intervals, stellar, uncertainties))
                .collect::<Result<_, _>>()?
        } else {
            Perturbation::ALL
                .iter()
                .map(|&p| self.run_variant(p, star, &observed, intervals, stellar, uncertainties))
                .collect::<Result<_, _>>()?
        };

        let vrot_of = |p: Perturbation| {
            runs.iter()
                .find(|r| r.perturbation == p)
                .map(|r| r.trial.rotational_velocity)
                .unwrap_or(f64::NAN)
        };
        let nominal = runs[0];
        let total = total_error(
            nominal.trial.rotational_velocity,
            vrot_of(Perturbation::TempMinus),
            vrot_of(Perturbation::TempPlus),
            vrot_of(Perturbation::FehMinus),
            vrot_of(Perturbation::FehPlus),
            nominal.trial.uncertainty,
        );

        info!(
            star,
            vrot = nominal.trial.rotational_velocity,
            vrot_error = nominal.trial.uncertainty,
            total_error = total,
            status = nominal.trial.status.code(),
            "vsini estimated"
        );

        Ok(PropagatedEstimate {
            vrot: nominal.trial.rotational_velocity,
            vrot_error: nominal.trial.uncertainty,
            vmac: nominal.vmac,
            status: nominal.trial.status,
            total_error: total,
            runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{CannedEngine, PlaceholderAtmosphere};

    fn intervals() -> Vec<Interval> {
        vec![
            Interval::new(5000.0, 5002.0, 5000.5, 5000.6).unwrap(),
            Interval::new(5003.0, 5005.0, 5004.0, 5004.05).unwrap(),
        ]
    }

    fn stellar() -> StellarParameters {
        StellarParameters {
            effective_temperature: 5777.0,
            surface_gravity: 4.44,
            metallicity: 0.0,
            microturbulence: 1.0,
            limb_darkening_coefficient: 0.6,
            instrumental_broadening: 0.05,
        }
    }

    fn config(run_dir: &Path, parallel: bool) -> PipelineConfig {
        let mut config = PipelineConfig {
            parallel,
            ..PipelineConfig::default()
        };
        config.engine.run_dir = run_dir.to_path_buf();
        config
    }

    /// Line depth depends on vrot and, weakly, on Teff and [Fe/H].
    fn sensitive_engine() -> CannedEngine {
        CannedEngine::new(|x, req| {
            let depth = 0.3 + 1e-4 * (req.stellar.effective_temperature - 5777.0) + 0.2 * req.stellar.metallicity;
            let width2 = 0.001 + (req.vrot * 0.004).powi(2);
            let centre = if x < 5002.0 { 5000.55 } else { 5004.025 };
            1.0 - depth * (-(x - centre).powi(2) / (2.0 * width2)).exp()
        })
    }

    #[test]
    fn formula_uses_signed_differences() {
        // Sensitivities of 0.4 and 0.1 combined with an internal error of 0.2.
        let t = total_error(5.0, 5.2, 4.8, 5.05, 4.95, 0.2);
        assert!((t - (0.16f64 + 0.01 + 0.04).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn flat_spectrum_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let engine = CannedEngine::flat(1.0);
        let driver = ErrorPropagation::new(&engine, &PlaceholderAtmosphere, &config);
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![1.0; 700]);

        let est = driver
            .fit_with_error_propagation("flat", &spectrum, &stellar(), &Uncertainties::default(), &intervals())
            .unwrap();

        assert!((1..=5).contains(&est.status.code()), "{est:?}");
        assert!(est.nominal().reduced_chi_square.abs() < 1e-12);
        assert!(est.vrot >= 0.1 && est.vrot <= 60.0);
        assert_eq!(est.runs.len(), 5);
        assert_eq!(est.vmac, 3.21);
        assert!(dir.path().join("flat.atm").exists());
    }

    #[test]
    fn zero_uncertainties_leave_only_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let engine = sensitive_engine();
        let driver = ErrorPropagation::new(&engine, &PlaceholderAtmosphere, &config);

        // Observed spectrum is the engine's own output at vrot = 4.
        let reference = SynthesisRequest {
            star: "obs".into(),
            stellar: stellar(),
            vrot: 4.0,
            vmac: 3.21,
            lambda_start: 4999.0,
            lambda_end: 5006.0,
            delta_lambda: 0.01,
        };
        let observed = engine.synthesize(dir.path(), &reference).unwrap();
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, observed.flux);

        let est = driver
            .fit_with_error_propagation("sun", &spectrum, &stellar(), &Uncertainties::default(), &intervals())
            .unwrap();

        assert_eq!(est.total_error, est.vrot_error);
        assert!((est.vrot - 4.0).abs() < 0.1, "{est:?}");
    }

    #[test]
    fn descending_interval_table_fits_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        let engine = sensitive_engine();
        let driver = ErrorPropagation::new(&engine, &PlaceholderAtmosphere, &config);
        let reference = SynthesisRequest {
            star: "obs".into(),
            stellar: stellar(),
            vrot: 4.0,
            vmac: 3.21,
            lambda_start: 4999.0,
            lambda_end: 5006.0,
            delta_lambda: 0.01,
        };
        let observed = engine.synthesize(dir.path(), &reference).unwrap();
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, observed.flux);
        let mut reversed = intervals();
        reversed.reverse();

        let est = driver
            .fit_with_error_propagation("rev", &spectrum, &stellar(), &Uncertainties::default(), &reversed)
            .unwrap();

        assert!((1..=4).contains(&est.status.code()), "{est:?}");
        assert!((est.vrot - 4.0).abs() < 0.1, "{est:?}");
    }

    #[test]
    fn parallel_runs_use_isolated_workdirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), true);
        let engine = sensitive_engine();
        let driver = ErrorPropagation::new(&engine, &PlaceholderAtmosphere, &config);
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![1.0; 700]);
        let unc = Uncertainties {
            temperature: 100.0,
            metallicity: 0.1,
        };

        let est = driver
            .fit_with_error_propagation("hd", &spectrum, &stellar(), &unc, &intervals())
            .unwrap();

        for p in Perturbation::ALL {
            assert!(dir.path().join(p.label()).join("hd.atm").exists());
        }
        let order: Vec<Perturbation> = est.runs.iter().map(|r| r.perturbation).collect();
        assert_eq!(order, Perturbation::ALL.to_vec());
        assert!(est.total_error >= est.vrot_error);
    }

    #[test]
    fn synthesis_failure_aborts_the_star() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), false);
        // Engine grid one point short of the observed windows.
        let engine = CannedEngine::new(|_, _| 1.0);
        let short = SyntheticRangeTrim(engine);
        let driver = ErrorPropagation::new(&short, &PlaceholderAtmosphere, &config);
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![1.0; 700]);

        let err = driver
            .fit_with_error_propagation("x", &spectrum, &stellar(), &Uncertainties::default(), &intervals())
            .unwrap_err();
        assert!(matches!(err, VsiniError::Alignment { .. }));
    }

    /// Drops the last synthetic point of every range.
    struct SyntheticRangeTrim(CannedEngine);

    impl SynthesisEngine for SyntheticRangeTrim {
        fn synthesize(
            &self,
            workdir: &Path,
            request: &SynthesisRequest,
        ) -> Result<crate::synth::SyntheticSpectrum, VsiniError> {
            let mut out = self.0.synthesize(workdir, request)?;
            out.wavelength.pop();
            out.flux.pop();
            Ok(out)
        }
    }
}

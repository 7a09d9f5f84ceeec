//! Residual evaluation between observed and synthetic line regions.
//!
//! The synthetic spectrum covers whole engine ranges; only its points inside
//! the iron-line windows are kept, in interval-table order, so that they pair
//! one-to-one with the observed series built by `prepare_observed`.

use std::path::PathBuf;

use tracing::trace;

use crate::domain::Interval;
use crate::error::VsiniError;
use crate::fit::lm::Objective;
use crate::fit::observed::ObservedSeries;
use crate::synth::{SynthesisEngine, SynthesisRequest, SyntheticSpectrum, synthesize_segments};

/// Nominal flux uncertainty; spectra carry no per-pixel errors.
pub const DEFAULT_FLUX_ERROR: f64 = 0.01;

/// Flux of the points of `(wavelength, flux)` that fall inside each small window.
pub fn select_line_regions(wavelength: &[f64], flux: &[f64], intervals: &[Interval]) -> Vec<f64> {
    let mut out = Vec::new();
    for interval in intervals {
        out.extend(
            wavelength
                .iter()
                .zip(flux)
                .filter(|(x, _)| interval.in_small(**x))
                .map(|(_, f)| *f),
        );
    }
    out
}

/// `(observed - synthetic) / flux_error` over the iron-line windows.
pub fn residuals(
    observed: &ObservedSeries,
    synthetic: &SyntheticSpectrum,
    intervals: &[Interval],
    flux_error: f64,
) -> Result<Vec<f64>, VsiniError> {
    let selected = select_line_regions(&synthetic.wavelength, &synthetic.flux, intervals);
    if selected.len() != observed.flux.len() {
        return Err(VsiniError::Alignment {
            observed: observed.flux.len(),
            synthetic: selected.len(),
        });
    }
    Ok(observed
        .flux
        .iter()
        .zip(&selected)
        .map(|(o, s)| (o - s) / flux_error)
        .collect())
}

/// Residuals as a function of the trial rotational velocity.
///
/// Every evaluation runs the engine over all segments of the observed span.
pub struct SynthesisObjective<'a, E: SynthesisEngine + ?Sized> {
    pub engine: &'a E,
    pub workdir: PathBuf,
    /// Request with everything but `vrot` and the wavelength range filled in.
    pub template: SynthesisRequest,
    pub observed: &'a ObservedSeries,
    pub intervals: &'a [Interval],
    pub flux_error: f64,
}

impl<E: SynthesisEngine + ?Sized> Objective for SynthesisObjective<'_, E> {
    fn residuals(&mut self, vrot: f64) -> Result<Vec<f64>, VsiniError> {
        let template = SynthesisRequest {
            vrot,
            ..self.template.clone()
        };
        let synthetic = synthesize_segments(self.engine, &self.workdir, &template, &self.observed.wavelength)?;
        let r = residuals(self.observed, &synthetic, self.intervals, self.flux_error)?;
        trace!(vrot, n = r.len(), "residuals evaluated");
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervals() -> Vec<Interval> {
        vec![
            Interval::new(10.0, 20.0, 12.0, 13.0).unwrap(),
            Interval::new(0.0, 9.0, 2.0, 3.0).unwrap(),
        ]
    }

    fn observed(flux: Vec<f64>) -> ObservedSeries {
        let wavelength = (0..flux.len()).map(|i| i as f64).collect();
        ObservedSeries {
            wavelength,
            flux,
            delta_lambda: 0.5,
        }
    }

    #[test]
    fn selection_follows_table_order() {
        let wl = [2.0, 2.5, 3.0, 12.0, 12.5, 13.0, 14.0];
        let fl = [0.1, 0.2, 0.3, 1.1, 1.2, 1.3, 9.9];
        let picked = select_line_regions(&wl, &fl, &intervals());
        assert_eq!(picked, vec![1.1, 1.2, 1.3, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn residuals_are_scaled_by_flux_error() {
        let synth = SyntheticSpectrum {
            wavelength: vec![2.0, 12.0],
            flux: vec![0.98, 0.95],
        };
        let obs = observed(vec![0.96, 0.99]);
        let r = residuals(&obs, &synth, &intervals(), DEFAULT_FLUX_ERROR).unwrap();
        // First pair is the 12.0 point (table order), then 2.0.
        assert!((r[0] - 1.0).abs() < 1e-9);
        assert!((r[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_is_an_alignment_error() {
        let wavelength: Vec<f64> = (0..9).map(|i| 2.0 + i as f64 * 0.1).collect();
        let synth = SyntheticSpectrum {
            flux: vec![1.0; wavelength.len()],
            wavelength,
        };
        let obs = observed(vec![1.0; 10]);
        let err = residuals(&obs, &synth, &intervals(), DEFAULT_FLUX_ERROR).unwrap_err();
        assert!(matches!(
            err,
            VsiniError::Alignment {
                observed: 10,
                synthetic: 9
            }
        ));
    }
}

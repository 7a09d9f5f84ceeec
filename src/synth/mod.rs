//! Spectral synthesis boundary.
//!
//! Responsibilities:
//!
//! - the [`SynthesisEngine`] contract (one synthetic spectrum per wavelength range)
//! - splitting the observed span into engine-sized chunks ([`segment_ranges`])
//! - the atmosphere-model contract consumed by the engine ([`AtmosphereBuilder`])
//!
//! Implementations: [`MoogEngine`] drives the external program through files in
//! a working directory; [`CannedEngine`] evaluates a closure and is used
//! wherever the real engine is not available.

use std::path::Path;

use tracing::debug;

use crate::domain::StellarParameters;
use crate::error::VsiniError;
use crate::math::round_to;

pub mod atmosphere;
pub mod canned;
pub mod moog;

pub use atmosphere::*;
pub use canned::*;
pub use moog::*;

/// Span (in wavelength units) up to which one engine call is enough.
pub const SINGLE_RANGE_SPAN: f64 = 450.0;
/// Span up to which two engine calls are enough; wider spans use three.
pub const DOUBLE_RANGE_SPAN: f64 = 900.0;

/// Everything one engine call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Star identifier; names the atmosphere model `<star>.atm`.
    pub star: String,
    pub stellar: StellarParameters,
    pub vrot: f64,
    pub vmac: f64,
    pub lambda_start: f64,
    pub lambda_end: f64,
    pub delta_lambda: f64,
}

/// Synthetic flux sampled on the engine's own wavelength grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticSpectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
}

impl SyntheticSpectrum {
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    pub fn extend(&mut self, other: SyntheticSpectrum) {
        self.wavelength.extend(other.wavelength);
        self.flux.extend(other.flux);
    }
}

/// Produces a synthetic spectrum for one wavelength range.
///
/// `workdir` is owned by the calling fit session for the duration of the call;
/// implementations may create and overwrite files in it.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize(&self, workdir: &Path, request: &SynthesisRequest) -> Result<SyntheticSpectrum, VsiniError>;
}

/// Split the observed line-region wavelengths into 1, 2 or 3 engine ranges.
///
/// The split is by sample index over `obs_lambda` sorted by wavelength, so the
/// ranges ascend and partition the observed points whatever the interval table
/// order: halves end at `n/2 - 1` and restart at `n/2`, thirds likewise at
/// `n/3` and `2n/3`. Limits are rounded to 3 decimals.
pub fn segment_ranges(obs_lambda: &[f64]) -> Vec<(f64, f64)> {
    let n = obs_lambda.len();
    if n == 0 {
        return Vec::new();
    }
    let mut sorted = obs_lambda.to_vec();
    sorted.sort_by(f64::total_cmp);
    let obs_lambda = sorted.as_slice();
    let first = obs_lambda[0];
    let last = obs_lambda[n - 1];
    let span = last - first;

    let chunks = if span <= SINGLE_RANGE_SPAN || n < 2 {
        1
    } else if span <= DOUBLE_RANGE_SPAN || n < 3 {
        2
    } else {
        3
    };

    let cuts: Vec<usize> = match chunks {
        1 => vec![],
        2 => vec![n / 2],
        _ => vec![n / 3, n * 2 / 3],
    };

    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0usize;
    for cut in cuts.into_iter().chain(std::iter::once(n)) {
        ranges.push((round_to(obs_lambda[start], 3), round_to(obs_lambda[cut - 1], 3)));
        start = cut;
    }
    ranges
}

/// Synthesize every segment of `obs_lambda` and concatenate the results.
pub fn synthesize_segments<E: SynthesisEngine + ?Sized>(
    engine: &E,
    workdir: &Path,
    template: &SynthesisRequest,
    obs_lambda: &[f64],
) -> Result<SyntheticSpectrum, VsiniError> {
    let mut out = SyntheticSpectrum::default();
    for (lambda_start, lambda_end) in segment_ranges(obs_lambda) {
        let request = SynthesisRequest {
            lambda_start,
            lambda_end,
            ..template.clone()
        };
        debug!(
            star = %request.star,
            vrot = request.vrot,
            lambda_start,
            lambda_end,
            "synthesizing range"
        );
        out.extend(engine.synthesize(workdir, &request)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    fn assert_partition(obs: &[f64], ranges: &[(f64, f64)]) {
        for &x in obs {
            let hits = ranges.iter().filter(|(a, b)| x >= *a && x <= *b).count();
            assert_eq!(hits, 1, "point {x} covered {hits} times by {ranges:?}");
        }
        assert_eq!(ranges[0].0, obs[0]);
        assert_eq!(ranges[ranges.len() - 1].1, obs[obs.len() - 1]);
    }

    #[test]
    fn span_of_exactly_450_is_one_range() {
        let obs = points(&[5000.0, 5100.0, 5300.0, 5450.0]);
        let ranges = segment_ranges(&obs);
        assert_eq!(ranges, vec![(5000.0, 5450.0)]);
    }

    #[test]
    fn span_just_over_450_splits_at_midpoint() {
        let obs = points(&[5000.0, 5100.0, 5200.0, 5450.001]);
        let ranges = segment_ranges(&obs);
        assert_eq!(ranges, vec![(5000.0, 5100.0), (5200.0, 5450.001)]);
        assert_partition(&obs, &ranges);
    }

    #[test]
    fn span_just_over_900_splits_in_thirds() {
        let obs: Vec<f64> = (0..9).map(|i| 5000.0 + i as f64 * 100.0).chain([5900.001]).collect();
        let ranges = segment_ranges(&obs);
        assert_eq!(ranges.len(), 3);
        // n = 10: cuts at 3 and 6.
        assert_eq!(ranges[0], (5000.0, 5200.0));
        assert_eq!(ranges[1], (5300.0, 5500.0));
        assert_eq!(ranges[2], (5600.0, 5900.001));
        assert_partition(&obs, &ranges);
    }

    #[test]
    fn descending_table_order_still_yields_ascending_ranges() {
        // Second table window lies blue of the first.
        let obs = points(&[5004.0, 5004.01, 5004.02, 5000.5, 5000.55, 5000.6]);
        let ranges = segment_ranges(&obs);
        assert_eq!(ranges, vec![(5000.5, 5004.02)]);
        assert!(obs.iter().all(|x| *x >= ranges[0].0 && *x <= ranges[0].1));

        let wide = points(&[5600.0, 5600.5, 5000.0, 5000.5]);
        assert_eq!(segment_ranges(&wide), vec![(5000.0, 5000.5), (5600.0, 5600.5)]);
    }

    #[test]
    fn empty_observation_has_no_ranges() {
        assert!(segment_ranges(&[]).is_empty());
    }

    #[test]
    fn segments_are_concatenated_in_order() {
        let engine = CannedEngine::new(|lambda, _req| lambda / 10_000.0);
        let obs: Vec<f64> = vec![5000.0, 5000.5, 5600.0, 5600.5];
        let template = SynthesisRequest {
            star: "S".into(),
            stellar: StellarParameters {
                effective_temperature: 5777.0,
                surface_gravity: 4.44,
                metallicity: 0.0,
                microturbulence: 1.0,
                limb_darkening_coefficient: 0.6,
                instrumental_broadening: 0.05,
            },
            vrot: 2.0,
            vmac: 3.0,
            lambda_start: 0.0,
            lambda_end: 0.0,
            delta_lambda: 0.5,
        };
        let synth = synthesize_segments(&engine, Path::new("."), &template, &obs).unwrap();
        assert_eq!(engine.calls(), 2);
        assert_eq!(synth.wavelength, obs);
        assert!((synth.flux[3] - 0.56005).abs() < 1e-12);
    }
}

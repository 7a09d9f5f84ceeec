//! Observed line-region series.
//!
//! The observed spectrum is resampled onto the same rounded grid the engine
//! produces, each normalization window is divided by its clipped continuum
//! level, and the iron-line windows are concatenated in table order.

use crate::domain::{Interval, Spectrum};
use crate::error::VsiniError;
use crate::math::{arange, interp_linear, normalize_level, round_to};

/// Continuum-normalized flux inside the iron-line windows.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSeries {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    /// Wavelength step of the source spectrum (passed on to the engine).
    pub delta_lambda: f64,
}

impl ObservedSeries {
    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

/// Resample `spectrum` onto the interval grid and normalize each window.
pub fn prepare_observed(spectrum: &Spectrum, intervals: &[Interval]) -> Result<ObservedSeries, VsiniError> {
    let step = round_to(spectrum.step, 3);
    if !(step > 0.0) || intervals.is_empty() {
        return Err(VsiniError::Coverage {
            wavelength: f64::NAN,
            min: spectrum.wavelength.first().copied().unwrap_or(f64::NAN),
            max: spectrum.wavelength.last().copied().unwrap_or(f64::NAN),
        });
    }

    let start = intervals.iter().map(|i| i.large_start).fold(f64::INFINITY, f64::min);
    let end = intervals.iter().map(|i| i.large_end).fold(f64::NEG_INFINITY, f64::max);

    let grid: Vec<f64> = arange(start, end + step, step)
        .into_iter()
        .map(|x| round_to(x, 3))
        .collect();
    let flux = grid
        .iter()
        .map(|&x| {
            interp_linear(x, &spectrum.wavelength, &spectrum.flux).ok_or(VsiniError::Coverage {
                wavelength: x,
                min: spectrum.wavelength.first().copied().unwrap_or(f64::NAN),
                max: spectrum.wavelength.last().copied().unwrap_or(f64::NAN),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let mut out = ObservedSeries {
        wavelength: Vec::new(),
        flux: Vec::new(),
        delta_lambda: spectrum.step,
    };

    for interval in intervals {
        let large: Vec<f64> = grid
            .iter()
            .zip(&flux)
            .filter(|(x, _)| interval.in_large(**x))
            .map(|(_, f)| *f)
            .collect();
        let level = normalize_level(&large);
        if !(level.is_finite() && level > 0.0) {
            return Err(VsiniError::Continuum {
                start: interval.large_start,
                end: interval.large_end,
            });
        }

        for (x, f) in grid.iter().zip(&flux) {
            if interval.in_small(*x) {
                out.wavelength.push(*x);
                out.flux.push(f / level);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervals() -> Vec<Interval> {
        vec![
            Interval::new(5000.0, 5002.0, 5000.5, 5000.6).unwrap(),
            Interval::new(5003.0, 5005.0, 5004.0, 5004.05).unwrap(),
        ]
    }

    #[test]
    fn windows_are_normalized_and_concatenated() {
        // Continuum 2.0 everywhere.
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![2.0; 700]);
        let obs = prepare_observed(&spectrum, &intervals()).unwrap();

        // 5000.50..=5000.60 -> 11 points, 5004.00..=5004.05 -> 6 points.
        assert_eq!(obs.len(), 17);
        assert_eq!(obs.wavelength[0], 5000.5);
        assert_eq!(obs.wavelength[11], 5004.0);
        assert!(obs.flux.iter().all(|f| (f - 1.0).abs() < 1e-12));
        assert_eq!(obs.delta_lambda, 0.01);
    }

    #[test]
    fn table_order_is_preserved() {
        let mut reversed = intervals();
        reversed.reverse();
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![1.0; 700]);
        let obs = prepare_observed(&spectrum, &reversed).unwrap();
        assert_eq!(obs.wavelength[0], 5004.0);
        assert_eq!(obs.wavelength[6], 5000.5);
    }

    #[test]
    fn uncovered_grid_is_an_error() {
        let spectrum = Spectrum::from_calibration(5001.0, 0.01, vec![1.0; 700]);
        let err = prepare_observed(&spectrum, &intervals()).unwrap_err();
        assert!(matches!(err, VsiniError::Coverage { .. }));
    }

    #[test]
    fn zero_continuum_is_an_error() {
        let spectrum = Spectrum::from_calibration(4999.0, 0.01, vec![0.0; 700]);
        let err = prepare_observed(&spectrum, &intervals()).unwrap_err();
        assert!(matches!(err, VsiniError::Continuum { .. }));
    }
}

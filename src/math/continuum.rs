//! Continuum level estimation by asymmetric sigma clipping.
//!
//! Absorption lines pull flux below the continuum, so points more than `1σ`
//! below the running mean are discarded while only points `2σ` above it are
//! treated as spikes. The mean of the surviving points is the continuum level
//! used to rescale each normalization window.

/// Maximum number of clipping passes.
pub const MAX_CLIP_ITERATIONS: usize = 15;

const LOWER_SIGMA: f64 = 1.0;
const UPPER_SIGMA: f64 = 2.0;

/// Population mean and standard deviation. `None` for an empty slice.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Iteratively clipped mean of `values`.
///
/// Each pass drops points outside `[m - σ, m + 2σ]` and recomputes `m, σ`
/// from the survivors. Stops after [`MAX_CLIP_ITERATIONS`] passes, when a pass
/// removes nothing, or when a pass would remove every point; in the last
/// case the previous mean is returned. Returns NaN for an empty input.
pub fn normalize_level(values: &[f64]) -> f64 {
    let Some((mut mean, mut sigma)) = mean_std(values) else {
        return f64::NAN;
    };
    let mut kept: Vec<f64> = values.to_vec();

    for _ in 0..MAX_CLIP_ITERATIONS {
        let lo = mean - LOWER_SIGMA * sigma;
        let hi = mean + UPPER_SIGMA * sigma;
        let before = kept.len();
        let survivors: Vec<f64> = kept.iter().copied().filter(|&v| v >= lo && v <= hi).collect();

        if survivors.len() == before {
            break;
        }
        let Some((m, s)) = mean_std(&survivors) else {
            break;
        };
        kept = survivors;
        mean = m;
        sigma = s;
    }

    mean
}

//! Grid construction and interpolation helpers.
//!
//! Wavelength grids handed to the synthesis engine are rounded to 3 decimals,
//! so every helper here is deterministic for a given input.

/// Round to `decimals` places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Evenly spaced values in `[start, stop)` with spacing `step`.
///
/// Follows the half-open convention of `numpy.arange`: the count is
/// `ceil((stop - start) / step)`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(start.is_finite() && stop.is_finite() && step.is_finite()) || step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be strictly increasing. Returns `None` when `x` lies outside
/// `[xp[0], xp[last]]`.
pub fn interp_linear(x: f64, xp: &[f64], fp: &[f64]) -> Option<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 || !(x >= xp[0] && x <= xp[n - 1]) {
        return None;
    }
    if n == 1 {
        return Some(fp[0]);
    }
    // Index of the first node strictly greater than x, clamped to the last segment.
    let hi = xp[..n].partition_point(|&v| v <= x).clamp(1, n - 1);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return Some(fp[lo]);
    }
    let t = (x - xp[lo]) / span;
    Some(fp[lo] + t * (fp[hi] - fp[lo]))
}

/// Regularly spaced axis: `start + i * step` for `i in 0..count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub start: f64,
    pub step: f64,
    pub count: usize,
}

impl Axis {
    pub fn end(&self) -> f64 {
        self.start + (self.count.saturating_sub(1)) as f64 * self.step
    }

    pub fn contains(&self, x: f64) -> bool {
        // Tolerance absorbs the representation error of the node values.
        let eps = self.step.abs() * 1e-9;
        x >= self.start - eps && x <= self.end() + eps
    }

    /// Lower node index and fractional offset of `x`. Caller checks `contains`.
    fn locate(&self, x: f64) -> (usize, f64) {
        if self.count < 2 {
            return (0, 0.0);
        }
        let pos = ((x - self.start) / self.step).clamp(0.0, (self.count - 1) as f64);
        let i = (pos.floor() as usize).min(self.count - 2);
        (i, pos - i as f64)
    }
}

/// Trilinear interpolation on a row-major `(a, b, c)` grid.
///
/// `values[(i * b.count + j) * c.count + k]` is the node at `(a_i, b_j, c_k)`.
/// Returns `None` if any coordinate falls outside its axis.
pub fn trilinear(axes: [&Axis; 3], values: &[f64], point: [f64; 3]) -> Option<f64> {
    let [a, b, c] = axes;
    if values.len() != a.count * b.count * c.count {
        return None;
    }
    if !(a.contains(point[0]) && b.contains(point[1]) && c.contains(point[2])) {
        return None;
    }

    let (i, ta) = a.locate(point[0]);
    let (j, tb) = b.locate(point[1]);
    let (k, tc) = c.locate(point[2]);
    let at = |di: usize, dj: usize, dk: usize| -> f64 {
        let ii = (i + di).min(a.count - 1);
        let jj = (j + dj).min(b.count - 1);
        let kk = (k + dk).min(c.count - 1);
        values[(ii * b.count + jj) * c.count + kk]
    };

    let lerp = |v0: f64, v1: f64, t: f64| v0 + t * (v1 - v0);
    let c00 = lerp(at(0, 0, 0), at(0, 0, 1), tc);
    let c01 = lerp(at(0, 1, 0), at(0, 1, 1), tc);
    let c10 = lerp(at(1, 0, 0), at(1, 0, 1), tc);
    let c11 = lerp(at(1, 1, 0), at(1, 1, 1), tc);
    let c0 = lerp(c00, c01, tb);
    let c1 = lerp(c10, c11, tb);
    Some(lerp(c0, c1, ta))
}

//! Macroturbulence calibration.
//!
//! Macroturbulent broadening is not fitted; it is fixed from `(Teff, log g)`
//! using the Doyle et al. (2014) relation inside its calibrated range and
//! constant values outside it.

use crate::math::round_to;

const SOLAR_TEFF: f64 = 5777.0;
const SOLAR_LOGG: f64 = 4.44;

/// Macroturbulent velocity (km/s), rounded to 3 decimals.
pub fn macroturbulence(teff: f64, logg: f64) -> f64 {
    let vmac = if teff <= 5000.0 {
        2.0
    } else if teff < 6500.0 {
        let dt = teff - SOLAR_TEFF;
        3.21 + 2.33e-3 * dt + 2.00e-6 * dt * dt - 2.00 * (logg - SOLAR_LOGG)
    } else {
        5.5
    };
    round_to(vmac, 3)
}

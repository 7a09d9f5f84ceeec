//! Radial-velocity correction.
//!
//! The wavelength axis is shifted to the stellar rest frame,
//! `λ' = λ / (1 + rv/c)`, and the flux is resampled onto a uniform grid with
//! the original step so the result is again a linearly calibrated spectrum.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::VsiniError;
use crate::io::{SpectrumStore, StoredSpectrum};
use crate::math::{arange, interp_linear};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT: f64 = 299_792.458;

const CORRECTION_COMMENT: &str = "Corrected for radial velocity.";

/// Rest-frame copy of `input`, with the calibration header updated.
pub fn correct_radial_velocity(input: &StoredSpectrum, path: &Path, rv: f64) -> Result<StoredSpectrum, VsiniError> {
    let spectrum = input.to_spectrum(path)?;
    let step = spectrum.step;

    let shifted: Vec<f64> = spectrum
        .wavelength
        .iter()
        .map(|w| w / (1.0 + rv / SPEED_OF_LIGHT))
        .collect();
    let (first, last) = match (shifted.first(), shifted.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => {
            return Err(VsiniError::SpectrumLoad {
                path: path.to_path_buf(),
                reason: "empty spectrum".to_string(),
            });
        }
    };

    let grid = arange(first, last, step);
    let flux = grid
        .iter()
        .map(|&x| {
            interp_linear(x, &shifted, &spectrum.flux).ok_or(VsiniError::Coverage {
                wavelength: x,
                min: first,
                max: last,
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let mut header = input.header.clone();
    header.reference_wavelength = first;
    header.wavelength_step = step;
    header.sample_count = flux.len();
    header.radial_velocity = Some(rv);
    header.comments.push(CORRECTION_COMMENT.to_string());

    Ok(StoredSpectrum { header, flux })
}

/// `<dir>/<stem>_rv.<ext>` for an input spectrum path.
pub fn corrected_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("spectrum");
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_rv.{ext}"),
        None => format!("{stem}_rv"),
    };
    output_dir.join(name)
}

/// Read, correct and write one spectrum; returns the written path.
pub fn correct_file<S: SpectrumStore + ?Sized>(
    store: &S,
    input: &Path,
    rv: f64,
    output_dir: &Path,
) -> Result<PathBuf, VsiniError> {
    let stored = store.read(input)?;
    let corrected = correct_radial_velocity(&stored, input, rv)?;

    std::fs::create_dir_all(output_dir)?;
    let out = corrected_path(input, output_dir);
    store.write(&out, &corrected)?;
    info!(
        input = %input.display(),
        output = %out.display(),
        rv,
        samples = corrected.flux.len(),
        "radial velocity corrected"
    );
    Ok(out)
}

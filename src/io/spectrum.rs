//! Spectrum store: calibrated 1-D flux arrays with their header.
//!
//! The pipeline only needs three calibration keywords (`CRVAL1`, `CDELT1`,
//! `NAXIS1`) plus the flux samples, so storage sits behind [`SpectrumStore`].
//! The bundled [`JsonSpectrumStore`] keeps the header and flux in one JSON
//! document:
//!
//! ```text
//! { "header": { "CRVAL1": 5000.0, "CDELT1": 0.01, "NAXIS1": 3 },
//!   "flux":   [0.98, 0.97, 1.01] }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Spectrum, SpectrumHeader};
use crate::error::VsiniError;

/// Header + flux exactly as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSpectrum {
    pub header: SpectrumHeader,
    pub flux: Vec<f64>,
}

impl StoredSpectrum {
    /// Validate the calibration and expand the wavelength axis.
    pub fn to_spectrum(&self, path: &Path) -> Result<Spectrum, VsiniError> {
        let fail = |reason: String| VsiniError::SpectrumLoad {
            path: path.to_path_buf(),
            reason,
        };
        let h = &self.header;
        if !h.reference_wavelength.is_finite() {
            return Err(fail(format!("CRVAL1 is not finite ({})", h.reference_wavelength)));
        }
        if !(h.wavelength_step.is_finite() && h.wavelength_step > 0.0) {
            return Err(fail(format!("CDELT1 must be positive, got {}", h.wavelength_step)));
        }
        if h.sample_count != self.flux.len() {
            return Err(fail(format!(
                "NAXIS1={} but {} flux samples present",
                h.sample_count,
                self.flux.len()
            )));
        }
        if self.flux.len() < 2 {
            return Err(fail("need at least two flux samples".to_string()));
        }
        Ok(Spectrum::from_calibration(
            h.reference_wavelength,
            h.wavelength_step,
            self.flux.clone(),
        ))
    }
}

/// Read/write access to calibrated spectra.
pub trait SpectrumStore {
    fn read(&self, path: &Path) -> Result<StoredSpectrum, VsiniError>;
    fn write(&self, path: &Path, spectrum: &StoredSpectrum) -> Result<(), VsiniError>;

    /// Read and validate in one step.
    fn load(&self, path: &Path) -> Result<Spectrum, VsiniError> {
        self.read(path)?.to_spectrum(path)
    }
}

/// JSON-backed store (one document per spectrum).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpectrumStore;

impl SpectrumStore for JsonSpectrumStore {
    fn read(&self, path: &Path) -> Result<StoredSpectrum, VsiniError> {
        let file = File::open(path).map_err(|e| VsiniError::SpectrumLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| VsiniError::SpectrumLoad {
            path: path.to_path_buf(),
            reason: format!("malformed spectrum document: {e}"),
        })
    }

    fn write(&self, path: &Path, spectrum: &StoredSpectrum) -> Result<(), VsiniError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), spectrum)
            .map_err(|e| VsiniError::Io(std::io::Error::other(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(n: usize) -> SpectrumHeader {
        SpectrumHeader {
            reference_wavelength: 6000.0,
            wavelength_step: 0.02,
            sample_count: n,
            radial_velocity: None,
            comments: Vec::new(),
        }
    }

    #[test]
    fn write_then_load_expands_axis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("star.json");
        let stored = StoredSpectrum {
            header: header(4),
            flux: vec![1.0, 0.9, 0.8, 1.0],
        };
        JsonSpectrumStore.write(&path, &stored).unwrap();

        let spectrum = JsonSpectrumStore.load(&path).unwrap();
        assert_eq!(spectrum.len(), 4);
        assert!((spectrum.wavelength[3] - 6000.06).abs() < 1e-9);
        assert_eq!(spectrum.step, 0.02);
    }

    #[test]
    fn header_keywords_use_calibration_names() {
        let json = serde_json::to_string(&header(2)).unwrap();
        assert!(json.contains("\"CRVAL1\""));
        assert!(json.contains("\"CDELT1\""));
        assert!(json.contains("\"NAXIS1\""));
        assert!(!json.contains("RV"));
    }

    #[test]
    fn sample_count_mismatch_is_a_load_error() {
        let stored = StoredSpectrum {
            header: header(5),
            flux: vec![1.0, 1.0],
        };
        let err = stored.to_spectrum(Path::new("x.json")).unwrap_err();
        assert!(matches!(err, VsiniError::SpectrumLoad { .. }));
    }

    #[test]
    fn missing_calibration_key_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"header": {"CRVAL1": 5000.0, "NAXIS1": 2}, "flux": [1.0, 1.0]}"#).unwrap();
        let err = JsonSpectrumStore.load(&path).unwrap_err();
        assert!(matches!(err, VsiniError::SpectrumLoad { .. }));
    }
}

//! Limb-darkening coefficient grid.
//!
//! Coefficients are precomputed on a regular `(Teff, log g, [Fe/H])` grid and
//! stored as a single CSV column `Limbo`, metallicity varying fastest.
//! Queries are trilinear and never extrapolate.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::VsiniError;
use crate::math::{Axis, trilinear};

pub const TEMPERATURE_AXIS: Axis = Axis { start: 3500.0, step: 100.0, count: 35 };
pub const GRAVITY_AXIS: Axis = Axis { start: 3.0, step: 0.1, count: 20 };
pub const METALLICITY_AXIS: Axis = Axis { start: -0.5, step: 0.1, count: 11 };

#[derive(Debug, Deserialize)]
struct LimbRow {
    #[serde(rename = "Limbo")]
    value: f64,
}

/// Lookup of limb-darkening coefficients.
pub trait LimbDarkening {
    fn coefficient(&self, teff: f64, logg: f64, feh: f64) -> Result<f64, VsiniError>;
}

#[derive(Debug, Clone)]
pub struct LimbDarkeningTable {
    axes: [Axis; 3],
    values: Vec<f64>,
}

impl LimbDarkeningTable {
    pub fn new(axes: [Axis; 3], values: Vec<f64>) -> Result<Self, VsiniError> {
        let expected = axes.iter().map(|a| a.count).product::<usize>();
        if values.len() != expected {
            return Err(VsiniError::Catalog(format!(
                "limb-darkening grid needs {expected} values, found {}",
                values.len()
            )));
        }
        Ok(Self { axes, values })
    }

    pub fn load(path: &Path) -> Result<Self, VsiniError> {
        let file = File::open(path).map_err(|e| {
            VsiniError::Catalog(format!("cannot open limb-darkening table '{}': {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    /// Read the default-axis grid from CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, VsiniError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let values = reader
            .deserialize::<LimbRow>()
            .map(|row| row.map(|r| r.value))
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| VsiniError::Catalog(format!("invalid limb-darkening row: {e}")))?;
        Self::new([TEMPERATURE_AXIS, GRAVITY_AXIS, METALLICITY_AXIS], values)
    }
}

impl LimbDarkening for LimbDarkeningTable {
    fn coefficient(&self, teff: f64, logg: f64, feh: f64) -> Result<f64, VsiniError> {
        let names = ["teff", "logg", "feh"];
        let point = [teff, logg, feh];
        for ((axis, name), value) in self.axes.iter().zip(names).zip(point) {
            if !axis.contains(value) {
                return Err(VsiniError::LimbDarkeningRange {
                    axis: name,
                    value,
                    min: axis.start,
                    max: axis.end(),
                });
            }
        }
        let [a, b, c] = &self.axes;
        trilinear([a, b, c], &self.values, point).ok_or(VsiniError::LimbDarkeningRange {
            axis: "grid",
            value: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        })
    }
}

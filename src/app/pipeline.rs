//! Batch driver: one vsini estimate per catalog star.
//!
//! Per star: limb-darkening lookup -> spectrum load -> five-run fit. A failing
//! star is logged with its name and skipped; the batch always runs to the end.

use std::path::Path;

use tracing::{error, info};

use crate::domain::{Interval, PipelineConfig, StarEstimate, StarRecord};
use crate::error::VsiniError;
use crate::fit::{ErrorPropagation, PropagatedEstimate};
use crate::io::{LimbDarkening, SpectrumStore};
use crate::synth::{AtmosphereBuilder, SynthesisEngine};

/// A star whose estimate could not be produced.
#[derive(Debug, Clone)]
pub struct StarFailure {
    pub name: String,
    pub message: String,
}

/// All outputs of one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub estimates: Vec<StarEstimate>,
    /// Full per-variant detail, parallel to `estimates`.
    pub details: Vec<PropagatedEstimate>,
    pub failures: Vec<StarFailure>,
}

/// Collaborators shared by every star of a batch.
pub struct Batch<'a, E: ?Sized, A: ?Sized, S: ?Sized, L: ?Sized> {
    pub engine: &'a E,
    pub atmosphere: &'a A,
    pub store: &'a S,
    pub limb: &'a L,
    pub config: &'a PipelineConfig,
}

impl<E, A, S, L> Batch<'_, E, A, S, L>
where
    E: SynthesisEngine + ?Sized,
    A: AtmosphereBuilder + ?Sized,
    S: SpectrumStore + ?Sized,
    L: LimbDarkening + ?Sized,
{
    fn estimate_star(&self, star: &StarRecord, intervals: &[Interval]) -> Result<PropagatedEstimate, VsiniError> {
        let ldc = self.limb.coefficient(star.teff, star.logg, star.feh)?;
        let path = spectrum_path(&self.config.spectra_dir, &star.spectrum_file);
        let spectrum = self.store.load(&path)?;
        info!(star = %star.name, path = %path.display(), ldc, samples = spectrum.len(), "spectrum loaded");

        ErrorPropagation::new(self.engine, self.atmosphere, self.config).fit_with_error_propagation(
            &star.name,
            &spectrum,
            &star.stellar_parameters(ldc),
            &star.uncertainties(),
            intervals,
        )
    }

    /// Estimate every star; failures are collected, never propagated.
    pub fn run(&self, stars: &[StarRecord], intervals: &[Interval]) -> BatchOutput {
        let mut out = BatchOutput::default();
        for (i, star) in stars.iter().enumerate() {
            info!(star = %star.name, index = i + 1, total = stars.len(), "starting star");
            match self.estimate_star(star, intervals) {
                Ok(estimate) => {
                    out.estimates.push(crate::report::star_estimate(star, &estimate));
                    out.details.push(estimate);
                }
                Err(err) => {
                    error!(star = %star.name, error = %err, "star skipped");
                    out.failures.push(StarFailure {
                        name: star.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        out
    }
}

/// Catalog spectrum names may be bare file names or paths.
fn spectrum_path(spectra_dir: &Path, file: &str) -> std::path::PathBuf {
    let p = Path::new(file);
    if p.is_absolute() { p.to_path_buf() } else { spectra_dir.join(p) }
}

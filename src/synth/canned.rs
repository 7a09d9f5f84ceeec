//! Deterministic stand-in for the external synthesis program.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::VsiniError;
use crate::math::round_to;
use crate::synth::{SynthesisEngine, SynthesisRequest, SyntheticSpectrum};

type FluxModel = dyn Fn(f64, &SynthesisRequest) -> f64 + Send + Sync;

/// Evaluates `model(wavelength, request)` on the grid the real engine would
/// produce: `lambda_start + i * round(delta_lambda, 3)` up to and including
/// `lambda_end`, each node rounded to 3 decimals.
pub struct CannedEngine {
    model: Box<FluxModel>,
    calls: AtomicUsize,
}

impl CannedEngine {
    pub fn new<F>(model: F) -> Self
    where
        F: Fn(f64, &SynthesisRequest) -> f64 + Send + Sync + 'static,
    {
        Self {
            model: Box::new(model),
            calls: AtomicUsize::new(0),
        }
    }

    /// Flat continuum independent of every parameter.
    pub fn flat(level: f64) -> Self {
        Self::new(move |_, _| level)
    }

    /// Number of `synthesize` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CannedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CannedEngine").field("calls", &self.calls()).finish()
    }
}

impl SynthesisEngine for CannedEngine {
    fn synthesize(&self, _workdir: &Path, request: &SynthesisRequest) -> Result<SyntheticSpectrum, VsiniError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let step = round_to(request.delta_lambda, 3);
        if !(step > 0.0) || request.lambda_end < request.lambda_start {
            return Err(VsiniError::SynthesisIo(format!(
                "invalid synthesis range [{}, {}] step {}",
                request.lambda_start, request.lambda_end, request.delta_lambda
            )));
        }

        let n = ((request.lambda_end - request.lambda_start) / step + 1e-6).floor() as usize + 1;
        let mut out = SyntheticSpectrum {
            wavelength: Vec::with_capacity(n),
            flux: Vec::with_capacity(n),
        };
        for i in 0..n {
            let lambda = round_to(request.lambda_start + i as f64 * step, 3);
            out.wavelength.push(lambda);
            out.flux.push((self.model)(lambda, request));
        }
        Ok(out)
    }
}

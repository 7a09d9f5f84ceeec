//! Model-atmosphere preparation.
//!
//! The synthesis engine reads `<star>.atm` from its working directory. How
//! that file is produced is outside this crate; the [`AtmosphereBuilder`]
//! contract only guarantees the file exists before the first synthesis call.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

use crate::domain::{EngineConfig, StellarParameters};
use crate::error::VsiniError;
use crate::synth::moog::{absolutize, py_float, wait_with_timeout};

/// Produces `<star>.atm` inside `workdir`.
pub trait AtmosphereBuilder: Send + Sync {
    fn build(&self, workdir: &Path, star: &str, stellar: &StellarParameters) -> Result<(), VsiniError>;
}

/// Kurucz-grid interpolation via the `intermod.e` / `transform.e` pair.
#[derive(Debug, Clone)]
pub struct ModelInterpolator {
    models_dir: PathBuf,
    timeout: Duration,
}

impl ModelInterpolator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            models_dir: absolutize(&config.models_dir),
            timeout: config.timeout,
        }
    }

    fn run_tool(&self, workdir: &Path, tool: &str, input: &str) -> Result<(), VsiniError> {
        let program = self.models_dir.join(tool);
        let mut child = Command::new(&program)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VsiniError::SynthesisIo(format!("cannot start '{}': {e}", program.display())))?;

        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{input}")?;
        }
        wait_with_timeout(&mut child, self.timeout)
    }
}

impl AtmosphereBuilder for ModelInterpolator {
    fn build(&self, workdir: &Path, star: &str, stellar: &StellarParameters) -> Result<(), VsiniError> {
        fs::create_dir_all(workdir)?;
        let grid_point = format!(
            "{} {} {}",
            py_float(stellar.effective_temperature),
            py_float(stellar.surface_gravity),
            py_float(stellar.metallicity)
        );
        debug!(star, %grid_point, "interpolating model atmosphere");

        self.run_tool(workdir, "intermod.e", &grid_point)?;
        self.run_tool(workdir, "transform.e", &py_float(stellar.microturbulence))?;

        let produced = workdir.join("out.atm");
        fs::rename(&produced, workdir.join(format!("{star}.atm"))).map_err(|e| {
            VsiniError::SynthesisIo(format!("no model atmosphere at '{}': {e}", produced.display()))
        })?;

        // Scratch files left by the interpolator.
        for entry in fs::read_dir(workdir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if (name.starts_with("mod") || name.starts_with("for")) && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

/// Writes a placeholder `<star>.atm`; for engines that ignore the model file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderAtmosphere;

impl AtmosphereBuilder for PlaceholderAtmosphere {
    fn build(&self, workdir: &Path, star: &str, stellar: &StellarParameters) -> Result<(), VsiniError> {
        fs::create_dir_all(workdir)?;
        fs::write(
            workdir.join(format!("{star}.atm")),
            format!(
                "PLACEHOLDER teff={} logg={} feh={} vtur={}\n",
                stellar.effective_temperature, stellar.surface_gravity, stellar.metallicity, stellar.microturbulence
            ),
        )?;
        Ok(())
    }
}

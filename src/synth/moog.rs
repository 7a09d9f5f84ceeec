//! Subprocess adapter for the MOOG spectral synthesis code.
//!
//! One call writes `synth_fe.par` (the synthesis driver) and `synth_fe.txt`
//! (the keystrokes fed to the program on stdin) into the working directory,
//! runs `MOOGSILENT` there and reads back the smoothed spectrum
//! `synth_fe.asc`. Field layout and file names are fixed by the engine.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::EngineConfig;
use crate::error::VsiniError;
use crate::math::round_to;
use crate::synth::{SynthesisEngine, SynthesisRequest, SyntheticSpectrum};

pub const PAR_FILE: &str = "synth_fe.par";
pub const SCRIPT_FILE: &str = "synth_fe.txt";
pub const OUTPUT_FILE: &str = "synth_fe.asc";
const STALE_BATCH_FILE: &str = "batch.par";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct MoogEngine {
    binary: PathBuf,
    run_dir: PathBuf,
    line_list: String,
    timeout: Duration,
}

impl MoogEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            binary: absolutize(&config.moog_binary),
            run_dir: std::path::absolute(&config.run_dir).unwrap_or_else(|_| config.run_dir.clone()),
            line_list: config.line_list.clone(),
            timeout: config.timeout,
        }
    }

    fn run(&self, workdir: &Path) -> Result<(), VsiniError> {
        let script = File::open(workdir.join(SCRIPT_FILE))?;
        let mut child = Command::new(&self.binary)
            .current_dir(workdir)
            .stdin(Stdio::from(script))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VsiniError::SynthesisIo(format!("cannot start '{}': {e}", self.binary.display())))?;

        wait_with_timeout(&mut child, self.timeout)
    }

    /// The configured line list is relative to `run_dir`; any other working
    /// directory (the per-variant subdirectories) gets the resolved path.
    fn line_list_for(&self, workdir: &Path) -> String {
        let configured = Path::new(&self.line_list);
        let in_run_dir = std::path::absolute(workdir).is_ok_and(|w| w == self.run_dir);
        if configured.is_absolute() || in_run_dir {
            self.line_list.clone()
        } else {
            self.run_dir.join(configured).display().to_string()
        }
    }
}

impl SynthesisEngine for MoogEngine {
    fn synthesize(&self, workdir: &Path, request: &SynthesisRequest) -> Result<SyntheticSpectrum, VsiniError> {
        fs::create_dir_all(workdir)?;
        write_par_file(&workdir.join(PAR_FILE), request, &self.line_list_for(workdir))?;
        write_script_file(&workdir.join(SCRIPT_FILE))?;
        remove_if_present(&workdir.join(STALE_BATCH_FILE))?;
        // A leftover output from the previous call must not be mistaken for this one.
        remove_if_present(&workdir.join(OUTPUT_FILE))?;

        let started = Instant::now();
        self.run(workdir)?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "synthesis finished");

        let output = workdir.join(OUTPUT_FILE);
        let file = File::open(&output).map_err(|e| {
            VsiniError::SynthesisIo(format!("engine produced no '{}': {e}", output.display()))
        })?;
        parse_output(BufReader::new(file))
    }
}

/// Block until `child` exits, killing it once `timeout` has elapsed.
pub(crate) fn wait_with_timeout(child: &mut std::process::Child, timeout: Duration) -> Result<(), VsiniError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            // MOOG exits non-zero on some successful runs; the output file decides.
            debug!(?status, "engine exited");
            return Ok(());
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VsiniError::SynthesisTimeout {
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Render the synthesis driver file.
pub fn render_par(request: &SynthesisRequest, line_list: &str) -> String {
    let li = py_float(request.lambda_start);
    let lf = py_float(request.lambda_end);
    let s = &request.stellar;
    let mut par = String::new();
    par.push_str("synth \n");
    par.push_str(&format!("model_in       '{}.atm' \n", request.star));
    par.push_str("summary_out    'out1' \n");
    par.push_str(&format!("smoothed_out   '{OUTPUT_FILE}' \n"));
    par.push_str("standard_out   'out2' \n");
    par.push_str(&format!("lines_in       '{line_list}' \n"));
    par.push_str("abundances     1    1\n");
    par.push_str("        26     0.00 \n");
    par.push_str("plot           1 \n");
    par.push_str("synlimits \n");
    par.push_str(&format!(
        "{li}  {lf}   {}  1.0 \n",
        py_float(round_to(request.delta_lambda, 3))
    ));
    par.push_str("plotpars       1 \n");
    par.push_str(&format!("{li}   {lf}  0.80   1.05 \n"));
    par.push_str("0.0   0.0   0.0   1.0  \n");
    par.push_str(&format!(
        "r  {}  {}  {}  {}  0.0 \n",
        py_float(round_to(s.instrumental_broadening, 3)),
        py_float(round_to(request.vrot, 3)),
        py_float(round_to(s.limb_darkening_coefficient, 3)),
        py_float(round_to(request.vmac, 3)),
    ));
    for line in [
        "damping        0",
        "atmosphere     1",
        "molecules      2",
        "trudamp        1",
        "lines          1",
        "strong         0",
        "flux/int       0",
        "units          0",
        "opacit         0",
        "obspectrum     0",
    ] {
        par.push_str(line);
        par.push_str(" \n");
    }
    par
}

fn write_par_file(path: &Path, request: &SynthesisRequest, line_list: &str) -> Result<(), VsiniError> {
    let mut file = File::create(path)?;
    file.write_all(render_par(request, line_list).as_bytes())?;
    Ok(())
}

fn write_script_file(path: &Path) -> Result<(), VsiniError> {
    let mut file = File::create(path)?;
    write!(file, "{PAR_FILE} \nf \nq \n")?;
    Ok(())
}

/// Parse the smoothed spectrum: rows starting with a space carry
/// `wavelength flux`; everything else is header text.
pub fn parse_output<R: BufRead>(reader: R) -> Result<SyntheticSpectrum, VsiniError> {
    let mut out = SyntheticSpectrum::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.starts_with(' ') || line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let parsed = match (tokens.next(), tokens.next()) {
            (Some(w), Some(f)) => w.parse::<f64>().ok().zip(f.parse::<f64>().ok()),
            _ => None,
        };
        let Some((wavelength, flux)) = parsed else {
            return Err(VsiniError::SynthesisParse {
                line: idx + 1,
                content: line,
            });
        };
        out.wavelength.push(wavelength);
        out.flux.push(flux);
    }
    Ok(out)
}

/// Format a float the way the engine's input files expect (`5000.0`, `0.125`).
pub fn py_float(value: f64) -> String {
    let s = format!("{value}");
    if !value.is_finite() || s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}

pub(crate) fn remove_if_present(path: &Path) -> Result<(), VsiniError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Relative paths with a directory component are resolved against the
/// current directory, since the child runs inside the working directory.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_relative() && path.components().count() > 1 {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StellarParameters;

    fn request() -> SynthesisRequest {
        SynthesisRequest {
            star: "HD1".into(),
            stellar: StellarParameters {
                effective_temperature: 5777.0,
                surface_gravity: 4.44,
                metallicity: 0.0,
                microturbulence: 1.0,
                limb_darkening_coefficient: 0.61234,
                instrumental_broadening: 0.05,
            },
            vrot: 2.5,
            vmac: 3.2104,
            lambda_start: 5000.0,
            lambda_end: 5010.125,
            delta_lambda: 0.01000001,
        }
    }

    #[test]
    fn par_file_layout() {
        let par = render_par(&request(), "../linelist/iron_vrot_moog.list");
        let lines: Vec<&str> = par.lines().collect();
        assert_eq!(lines[0], "synth ");
        assert_eq!(lines[1], "model_in       'HD1.atm' ");
        assert_eq!(lines[3], "smoothed_out   'synth_fe.asc' ");
        assert_eq!(lines[5], "lines_in       '../linelist/iron_vrot_moog.list' ");
        assert_eq!(lines[10], "5000.0  5010.125   0.01  1.0 ");
        assert_eq!(lines[12], "5000.0   5010.125  0.80   1.05 ");
        assert_eq!(lines[14], "r  0.05  2.5  0.612  3.21  0.0 ");
        assert_eq!(lines.last(), Some(&"obspectrum     0 "));
        assert_eq!(lines.len(), 25);
    }

    #[test]
    fn output_parser_reads_data_rows_only() {
        let text = "ALL abundances NOT listed below differ\nMODEL: HD1\n  5000.000   0.9981\n  5000.010   0.9750\n";
        let synth = parse_output(text.as_bytes()).unwrap();
        assert_eq!(synth.wavelength, vec![5000.0, 5000.01]);
        assert_eq!(synth.flux, vec![0.9981, 0.975]);
    }

    #[test]
    fn output_parser_rejects_garbled_row() {
        let text = "header\n  5000.000   abc\n";
        let err = parse_output(text.as_bytes()).unwrap_err();
        assert!(matches!(err, VsiniError::SynthesisParse { line: 2, .. }));
    }

    #[test]
    fn python_style_float_formatting() {
        assert_eq!(py_float(5000.0), "5000.0");
        assert_eq!(py_float(0.125), "0.125");
        assert_eq!(py_float(-3.0), "-3.0");
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            moog_binary: PathBuf::from("true"),
            ..EngineConfig::default()
        };
        let err = MoogEngine::new(&config).synthesize(dir.path(), &request()).unwrap_err();
        assert!(matches!(err, VsiniError::SynthesisIo(_)));
        assert!(dir.path().join(PAR_FILE).exists());
        let script = fs::read_to_string(dir.path().join(SCRIPT_FILE)).unwrap();
        assert_eq!(script, "synth_fe.par \nf \nq \n");
    }

    #[test]
    fn line_list_is_resolved_outside_run_dir() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            run_dir: root.path().join("run"),
            ..EngineConfig::default()
        };
        let engine = MoogEngine::new(&config);

        assert_eq!(engine.line_list_for(&root.path().join("run")), "../linelist/iron_vrot_moog.list");
        let resolved = engine.line_list_for(&root.path().join("run").join("temp_plus"));
        assert_eq!(
            PathBuf::from(resolved),
            root.path().join("run").join("../linelist/iron_vrot_moog.list")
        );
    }

    #[cfg(unix)]
    #[test]
    fn hung_engine_times_out() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let err = wait_with_timeout(&mut child, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, VsiniError::SynthesisTimeout { .. }));
    }
}

//! Bounded Levenberg–Marquardt fit of the rotational velocity.
//!
//! A one-parameter specialization of the MINPACK `lmdif` trust-region
//! iteration (as used by `mpfit`):
//!
//! - forward/backward/central finite-difference Jacobian with a fixed step
//! - trust radius `delta` in the scaled variable `diag * x`
//! - steps clipped to the parameter bounds
//! - MINPACK status codes for every termination path
//!
//! The parameter uncertainty is `1/‖J‖` from the last Jacobian evaluated,
//! which may predate the final accepted step.

use nalgebra::DVector;
use tracing::{debug, info, warn};

use crate::domain::{FitStatus, StatusSeverity, TrialResult};
use crate::error::VsiniError;

/// Initial trust radius factor (MINPACK `factor`).
const STEP_BOUND_FACTOR: f64 = 100.0;
/// Minimum ratio of actual to predicted reduction for accepting a step.
const ACCEPT_RATIO: f64 = 1e-4;

/// Residual vector as a function of the single free parameter.
pub trait Objective {
    fn residuals(&mut self, x: f64) -> Result<Vec<f64>, VsiniError>;
}

impl<F> Objective for F
where
    F: FnMut(f64) -> Result<Vec<f64>, VsiniError>,
{
    fn residuals(&mut self, x: f64) -> Result<Vec<f64>, VsiniError> {
        self(x)
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmConfig {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub max_iterations: usize,
    /// Absolute finite-difference step.
    pub step: f64,
    pub bounds: (f64, f64),
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-5,
            xtol: 1e-5,
            gtol: 1e-5,
            max_iterations: 20,
            step: 0.001,
            bounds: (0.1, 60.0),
        }
    }
}

/// Working state of one fit; dropped when `fit_vrot` returns.
struct FitSession<'o, O: Objective + ?Sized> {
    objective: &'o mut O,
    config: LmConfig,
    x: f64,
    fvec: DVector<f64>,
    /// Euclidean norm of `fvec`.
    fnorm: f64,
    evaluations: usize,
}

impl<O: Objective + ?Sized> FitSession<'_, O> {
    fn evaluate(&mut self, x: f64) -> Result<DVector<f64>, VsiniError> {
        self.evaluations += 1;
        let r = match self.objective.residuals(x) {
            Ok(r) => r,
            Err(VsiniError::EarlyTermination { code }) => {
                let code = if (-15..=-1).contains(&code) { code } else { -1 };
                return Err(fatal(FitStatus::Terminated(code)));
            }
            Err(e) => return Err(e),
        };
        if r.iter().any(|v| !v.is_finite()) {
            return Err(fatal(FitStatus::NonFinite));
        }
        Ok(DVector::from_vec(r))
    }

    /// Finite-difference derivative of the residuals at the current point.
    fn jacobian(&mut self) -> Result<DVector<f64>, VsiniError> {
        let (lo, hi) = self.config.bounds;
        let h = self.config.step;
        let x = self.x;
        if x + h > hi {
            let back = self.evaluate(x - h)?;
            Ok((&self.fvec - back) / h)
        } else if x - h < lo {
            let fwd = self.evaluate(x + h)?;
            Ok((fwd - &self.fvec) / h)
        } else {
            let fwd = self.evaluate(x + h)?;
            let back = self.evaluate(x - h)?;
            Ok((fwd - back) / (2.0 * h))
        }
    }
}

fn fatal(status: FitStatus) -> VsiniError {
    VsiniError::OptimizerFatal {
        status: status.code(),
        message: status.description().to_string(),
    }
}

/// Fit the rotational velocity starting from `initial_guess`.
///
/// Fatal statuses (0, -16, -1..-15) are returned as `OptimizerFatal`; every
/// other status comes back in the `TrialResult` together with the last
/// accepted estimate.
pub fn fit_vrot<O: Objective + ?Sized>(
    initial_guess: f64,
    config: &LmConfig,
    objective: &mut O,
) -> Result<TrialResult, VsiniError> {
    let (lo, hi) = config.bounds;
    let valid = lo.is_finite()
        && hi.is_finite()
        && lo < hi
        && initial_guess >= lo
        && initial_guess <= hi
        && config.step > 0.0
        && config.max_iterations > 0
        && config.ftol >= 0.0
        && config.xtol >= 0.0
        && config.gtol >= 0.0;
    if !valid {
        return Err(fatal(FitStatus::BadInput));
    }

    let mut session = FitSession {
        objective,
        config: *config,
        x: initial_guess,
        fvec: DVector::zeros(0),
        fnorm: 0.0,
        evaluations: 0,
    };
    session.fvec = session.evaluate(initial_guess)?;
    let m = session.fvec.len();
    if m == 0 {
        return Err(fatal(FitStatus::BadInput));
    }
    session.fnorm = session.fvec.norm();

    let eps = f64::EPSILON;
    let mut iteration = 1usize;
    let mut delta = 0.0_f64;
    let mut diag = 0.0_f64;
    let mut xnorm = 0.0_f64;
    let mut jac_norm;

    let status = 'outer: loop {
        let jac = session.jacobian()?;
        jac_norm = jac.norm();

        if iteration == 1 {
            diag = if jac_norm == 0.0 { 1.0 } else { jac_norm };
            xnorm = diag * session.x.abs();
            delta = STEP_BOUND_FACTOR * xnorm;
            if delta == 0.0 {
                delta = STEP_BOUND_FACTOR;
            }
        } else {
            diag = diag.max(jac_norm);
        }

        let jtf = jac.dot(&session.fvec);
        let gnorm = if session.fnorm != 0.0 && jac_norm != 0.0 {
            jtf.abs() / (jac_norm * session.fnorm)
        } else {
            0.0
        };
        if gnorm <= config.gtol {
            break FitStatus::GtolReached;
        }

        loop {
            // Gauss-Newton step, shortened to the trust radius when needed.
            let jtj = jac_norm * jac_norm;
            let gauss_newton = if jtj > 0.0 { -jtf / jtj } else { 0.0 };
            let mut step = gauss_newton;
            let mut par = 0.0;
            if diag * gauss_newton.abs() > delta {
                step = gauss_newton.signum() * delta / diag;
                par = ((jtf.abs() / step.abs() - jtj) / (diag * diag)).max(0.0);
            }

            let trial = (session.x + step).clamp(lo, hi);
            let step = trial - session.x;
            let pnorm = diag * step.abs();
            if iteration == 1 {
                delta = delta.min(pnorm);
            }

            let ftrial = session.evaluate(trial)?;
            let fnorm1 = ftrial.norm();

            let actred = if 0.1 * fnorm1 < session.fnorm {
                1.0 - (fnorm1 / session.fnorm).powi(2)
            } else {
                -1.0
            };
            let temp1 = jac_norm * step.abs() / session.fnorm;
            let temp2 = par.sqrt() * pnorm / session.fnorm;
            let prered = temp1 * temp1 + temp2 * temp2 / 0.5;
            let dirder = -(temp1 * temp1 + temp2 * temp2);
            let ratio = if prered != 0.0 { actred / prered } else { 0.0 };

            if ratio <= 0.25 {
                let mut temp = if actred >= 0.0 {
                    0.5
                } else {
                    0.5 * dirder / (dirder + 0.5 * actred)
                };
                if 0.1 * fnorm1 >= session.fnorm || temp < 0.1 {
                    temp = 0.1;
                }
                delta = temp * delta.min(pnorm / 0.1);
            } else if par == 0.0 || ratio >= 0.75 {
                delta = pnorm / 0.5;
            }

            let accepted = ratio >= ACCEPT_RATIO;
            if accepted {
                session.x = trial;
                session.fvec = ftrial;
                session.fnorm = fnorm1;
                xnorm = diag * session.x.abs();
                iteration += 1;
            }
            debug!(
                iteration,
                vrot = session.x,
                chi2 = session.fnorm * session.fnorm,
                ratio,
                delta,
                accepted,
                "lm step"
            );

            let ftol_met = actred.abs() <= config.ftol && prered <= config.ftol && 0.5 * ratio <= 1.0;
            let xtol_met = delta <= config.xtol * xnorm;
            match (ftol_met, xtol_met) {
                (true, true) => break 'outer FitStatus::BothReached,
                (true, false) => break 'outer FitStatus::FtolReached,
                (false, true) => break 'outer FitStatus::XtolReached,
                (false, false) => {}
            }
            if iteration >= config.max_iterations {
                break 'outer FitStatus::MaxIterations;
            }
            if actred.abs() <= eps && prered <= eps && 0.5 * ratio <= 1.0 {
                break 'outer FitStatus::FtolTooSmall;
            }
            if delta <= eps * xnorm {
                break 'outer FitStatus::XtolTooSmall;
            }
            if gnorm <= eps {
                break 'outer FitStatus::GtolTooSmall;
            }
            if accepted {
                break;
            }
        }
    };

    let sum_of_squares = session.fnorm * session.fnorm;
    let dof = m - 1;
    let reduced_chi_square = if dof > 0 {
        sum_of_squares / dof as f64
    } else {
        f64::NAN
    };
    let uncertainty = if jac_norm > 0.0 { 1.0 / jac_norm } else { 0.0 };

    match status.severity() {
        StatusSeverity::Degenerate | StatusSeverity::Exhausted => warn!(status = status.code(), "{}", status.description()),
        _ => info!(status = status.code(), "{}", status.description()),
    }
    debug!(evaluations = session.evaluations, "fit finished");

    Ok(TrialResult {
        rotational_velocity: session.x,
        uncertainty,
        iteration_count: iteration,
        residual_norm: sum_of_squares,
        reduced_chi_square,
        status,
    })
}

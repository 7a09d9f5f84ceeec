//! Reporting: per-star result rows and terminal tables.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::{FitStatus, StarEstimate, StarRecord};
use crate::fit::PropagatedEstimate;
use crate::math::round_to;

/// Result row for one star; velocities and errors rounded to 3 decimals.
pub fn star_estimate(record: &StarRecord, estimate: &PropagatedEstimate) -> StarEstimate {
    StarEstimate {
        name: record.name.clone(),
        instrumental_broadening: record.instr_broad,
        teff: record.teff,
        logg: record.logg,
        feh: record.feh,
        vrot: round_to(estimate.vrot, 3),
        vrot_error: round_to(estimate.vrot_error, 3),
        vmac: estimate.vmac,
        status: estimate.status.code(),
        total_error: round_to(estimate.total_error, 3),
    }
}

/// Per-variant diagnostics of one star, one line per run.
pub fn format_runs(estimate: &PropagatedEstimate) -> String {
    let mut out = String::new();
    for run in &estimate.runs {
        let t = &run.trial;
        out.push_str(&format!(
            "  {:<10} vrot={:>7.3} ±{:<6.3} vmac={:.3} iter={:<2} chi2={:.4} status={}\n",
            run.perturbation.label(),
            t.rotational_velocity,
            t.uncertainty,
            run.vmac,
            t.iteration_count,
            t.reduced_chi_square,
            t.status.code(),
        ));
    }
    out
}

/// Batch summary table.
pub fn format_estimates(rows: &[StarEstimate]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>6} {:>6} {:>5} {:>6} {:>8} {:>8} {:>6} {:>8} {:<6}\n",
            "star", "teff", "logg", "feh", "instr", "vrot", "err", "vmac", "total", "status"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<6} {:-<6} {:-<5} {:-<6} {:-<8} {:-<8} {:-<6} {:-<8} {:-<6}\n",
            "", "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:<16} {:>6.0} {:>6.2} {:>5.2} {:>6.3} {:>8.3} {:>8.3} {:>6.3} {:>8.3} {:<6}\n",
                truncate(&r.name, 16),
                r.teff,
                r.logg,
                r.feh,
                r.instrumental_broadening,
                r.vrot,
                r.vrot_error,
                r.vmac,
                r.total_error,
                status_label(r.status),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Status code plus a marker for codes that need a second look.
pub fn status_label(code: i32) -> String {
    match FitStatus::from_code(code) {
        Some(FitStatus::MaxIterations) => format!("{code} (max iter)"),
        Some(FitStatus::FtolTooSmall | FitStatus::XtolTooSmall | FitStatus::GtolTooSmall) => {
            format!("{code} (tol)")
        }
        _ => code.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Perturbation, TrialResult};
    use crate::fit::VariantFit;

    fn record() -> StarRecord {
        StarRecord {
            name: "HD 10700".to_string(),
            spectrum_file: "HD10700.json".to_string(),
            spectrograph: None,
            teff: 5344.0,
            teff_err: 30.0,
            logg: 4.5,
            feh: -0.5,
            efeh: 0.02,
            vtur: 0.8,
            instr_broad: 0.05,
        }
    }

    fn estimate() -> PropagatedEstimate {
        let trial = TrialResult {
            rotational_velocity: 1.23456,
            uncertainty: 0.04449,
            iteration_count: 6,
            residual_norm: 120.0,
            reduced_chi_square: 1.2,
            status: FitStatus::FtolReached,
        };
        PropagatedEstimate {
            vrot: 1.23456,
            vrot_error: 0.04449,
            vmac: 2.607,
            status: FitStatus::FtolReached,
            total_error: 0.31234,
            runs: vec![VariantFit {
                perturbation: Perturbation::Nominal,
                trial,
                vmac: 2.607,
            }],
        }
    }

    #[test]
    fn estimate_row_is_rounded() {
        let row = star_estimate(&record(), &estimate());
        assert_eq!(row.vrot, 1.235);
        assert_eq!(row.vrot_error, 0.044);
        assert_eq!(row.total_error, 0.312);
        assert_eq!(row.status, 1);
        assert_eq!(row.instrumental_broadening, 0.05);
    }

    #[test]
    fn table_has_one_line_per_star() {
        let rows = vec![star_estimate(&record(), &estimate())];
        let table = format_estimates(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("star"));
        assert!(lines[2].starts_with("HD 10700"));
        assert!(lines[2].contains("1.235"));
    }

    #[test]
    fn run_lines_show_variants() {
        let text = format_runs(&estimate());
        assert!(text.contains("nominal"));
        assert!(text.contains("chi2=1.2000"));
    }

    #[test]
    fn labels_flag_non_converged_statuses() {
        assert_eq!(status_label(2), "2");
        assert_eq!(status_label(5), "5 (max iter)");
        assert_eq!(status_label(7), "7 (tol)");
    }
}

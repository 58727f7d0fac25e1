//! Reporting utilities: coefficient labels, magnitude prediction and the
//! terminal summary.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns.

use nalgebra::DMatrix;

use crate::domain::{ErrorEstimate, ErrorMethod, FitSummary, LeavittFit, NamedValue, Units};
use crate::error::FitError;

/// Label for the constant term in coefficient names.
pub const CONST_LABEL: &str = "const";

/// Names of the coefficient rows, band-major: `<independent>_<dependent>`.
pub fn coefficient_names(dependent_vars: &[String], independent_vars: &[String], add_const: bool) -> Vec<String> {
    let mut names = Vec::with_capacity(dependent_vars.len() * (independent_vars.len() + 1));
    for dep in dependent_vars {
        for ind in independent_vars {
            names.push(format!("{ind}_{dep}"));
        }
        if add_const {
            names.push(format!("{CONST_LABEL}_{dep}"));
        }
    }
    names
}

/// Predict apparent magnitudes from fitted band coefficients.
///
/// `m[s, b] = Σ_v slope[b, v] · x[s, v] + const[b] + μ[s]`
pub fn predict_magnitudes(
    independent: &DMatrix<f64>,
    coefficients: &[f64],
    n_bands: usize,
    add_const: bool,
    moduli: &[f64],
) -> Result<DMatrix<f64>, FitError> {
    let n_stars = independent.nrows();
    let n_predictors = independent.ncols();
    let width = n_predictors + usize::from(add_const);

    if coefficients.len() != n_bands * width {
        return Err(FitError::ShapeMismatch(format!(
            "expected {} coefficients for {n_bands} band(s), got {}",
            n_bands * width,
            coefficients.len()
        )));
    }
    if moduli.len() != n_stars {
        return Err(FitError::ShapeMismatch(format!(
            "expected {n_stars} moduli, got {}",
            moduli.len()
        )));
    }

    Ok(DMatrix::from_fn(n_stars, n_bands, |s, b| {
        let block = &coefficients[b * width..(b + 1) * width];
        let slopes: f64 = (0..n_predictors).map(|v| block[v] * independent[(s, v)]).sum();
        let constant = if add_const { block[n_predictors] } else { 0.0 };
        slopes + constant + moduli[s]
    }))
}

/// Assemble the portable summary of a fit.
pub fn build_summary(
    fit: &LeavittFit,
    estimate: Option<&ErrorEstimate>,
    names: &[String],
    units: Units,
) -> FitSummary {
    let coefficients = names
        .iter()
        .zip(fit.coefficients())
        .enumerate()
        .map(|(j, (name, &value))| NamedValue {
            name: name.clone(),
            value,
            error: estimate.map(|e| e.errors[fit.n_stars + j]),
        })
        .collect();

    FitSummary {
        tool: "leavitt".to_string(),
        units,
        converged: fit.converged,
        iterations: fit.iterations,
        n_stars: fit.n_stars,
        n_inliers: fit.n_inliers(),
        coefficients,
        error_method: if estimate.is_some() {
            ErrorMethod::MonteCarlo
        } else {
            ErrorMethod::None
        },
        error_iterations: estimate.map(|e| e.iterations),
    }
}

/// Human-readable run summary for the terminal.
pub fn format_summary(summary: &FitSummary) -> String {
    let mut out = String::new();

    out.push_str("=== leavitt - Period-Luminosity fit ===\n");
    out.push_str(&format!(
        "Stars: {} used, {} rejected | units: {}\n",
        summary.n_inliers,
        summary.n_stars - summary.n_inliers,
        summary.units.label()
    ));
    let status = if summary.converged { "converged" } else { "NOT converged" };
    out.push_str(&format!("Fits: {} ({status})\n", summary.iterations));
    if let Some(n) = summary.error_iterations {
        out.push_str(&format!("Errors: Monte Carlo, {n} resamples\n"));
    }

    out.push_str("\nCoefficients:\n");
    for c in &summary.coefficients {
        match c.error {
            Some(err) => out.push_str(&format!("  {:<20} {:>12.5} ± {:.5}\n", c.name, c.value, err)),
            None => out.push_str(&format!("  {:<20} {:>12.5}\n", c.name, c.value)),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn coefficient_names_are_band_major() {
        let got = coefficient_names(&names(&["V", "I"]), &names(&["logP"]), true);
        assert_eq!(got, names(&["logP_V", "const_V", "logP_I", "const_I"]));

        let got = coefficient_names(&names(&["V"]), &names(&["logP", "color"]), false);
        assert_eq!(got, names(&["logP_V", "color_V"]));
    }

    #[test]
    fn predicted_magnitudes_follow_the_relation() {
        let x = DMatrix::from_row_slice(2, 1, &[0.5, 1.0]);
        let coeff = [-2.5, 17.0, -3.0, 16.0];
        let m = predict_magnitudes(&x, &coeff, 2, true, &[18.5, 18.0]).unwrap();
        assert!((m[(0, 0)] - (-1.25 + 17.0 + 18.5)).abs() < 1e-12);
        assert!((m[(1, 1)] - (-3.0 + 16.0 + 18.0)).abs() < 1e-12);
    }

    #[test]
    fn prediction_checks_coefficient_count() {
        let x = DMatrix::from_row_slice(1, 1, &[0.5]);
        assert!(predict_magnitudes(&x, &[1.0, 2.0, 3.0], 2, true, &[0.0]).is_err());
    }

    #[test]
    fn summary_reports_coefficients_and_status() {
        let fit = LeavittFit {
            values: DVector::from_vec(vec![1.0, f64::NAN, -2.5, 17.0]),
            n_stars: 2,
            n_coeff: 2,
            mask: vec![true, false],
            converged: false,
            iterations: 3,
            inlier_history: vec![2, 2, 1],
        };
        let summary = build_summary(&fit, None, &names(&["logP_V", "const_V"]), Units::Modulus);
        assert_eq!(summary.n_inliers, 1);
        assert_eq!(summary.coefficients[1].value, 17.0);
        assert_eq!(summary.error_method, ErrorMethod::None);

        let text = format_summary(&summary);
        assert!(text.contains("NOT converged"));
        assert!(text.contains("logP_V"));
    }
}

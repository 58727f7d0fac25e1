//! Iterative sigma clipping around the joint fit.
//!
//! The loop is a small state machine:
//!
//! ```text
//! FITTING -> EVALUATING -> CONVERGED                 -> done (converged)
//!                       -> CONTINUE (mask shrinks)   -> FITTING ...
//!                       -> max_iter reached          -> done (not converged)
//! ```
//!
//! One iteration fits only the stars currently in the mask, converts their
//! moduli (mean modulus offset, then units), scores the converted distances
//! with the configured metric and keeps stars with `|score| < sigma`. The new
//! mask is always AND-ed with the old one, so a star that has been excluded is
//! never re-admitted.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::domain::{LeavittFit, RegressionConfig, check_shapes};
use crate::error::FitError;
use crate::fit::design::build_design;
use crate::math::{SigmaMetric, solve_least_squares};

/// One fit over a fixed mask, expanded back to the full star list.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedFit {
    /// Converted distances; NaN for stars outside the mask.
    pub distances: Vec<f64>,
    pub coefficients: Vec<f64>,
}

impl MaskedFit {
    fn into_values(self) -> Vec<f64> {
        let mut values = self.distances;
        values.extend(self.coefficients);
        values
    }
}

/// Outcome of scoring one fit.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipStep {
    /// No inlier was rejected.
    Converged,
    /// At least one inlier was rejected; carries the shrunk mask.
    Continue(Vec<bool>),
}

/// Fit the stars selected by `mask` once, without any clipping.
pub fn fit_masked(
    dependent: &DMatrix<f64>,
    independent: &DMatrix<f64>,
    mask: &[bool],
    config: &RegressionConfig,
) -> Result<MaskedFit, FitError> {
    check_shapes(dependent, independent)?;
    if mask.len() != dependent.nrows() {
        return Err(FitError::ShapeMismatch(format!(
            "mask has {} entries but there are {} stars",
            mask.len(),
            dependent.nrows()
        )));
    }

    let rows: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect();
    let dep = dependent.select_rows(rows.iter());
    let ind = independent.select_rows(rows.iter());

    let system = build_design(&dep, &ind, config.add_const, config.fit_modulus)?;
    let beta = solve_least_squares(&system.x, &system.y, config.rcond)?;
    let (moduli, coefficients) = system.split_solution(&beta);

    let mut distances = vec![f64::NAN; mask.len()];
    for (&row, mu) in rows.iter().zip(moduli) {
        distances[row] = config.units.from_modulus(mu + config.mean_modulus);
    }

    Ok(MaskedFit {
        distances,
        coefficients,
    })
}

/// Score `distances` and decide whether the mask changes.
pub fn evaluate(mask: &[bool], distances: &[f64], metric: SigmaMetric, sigma: f64) -> ClipStep {
    let scores = metric(distances);
    let next: Vec<bool> = mask
        .iter()
        .zip(&scores)
        .map(|(&inlier, &z)| inlier && z.abs() < sigma)
        .collect();

    if next.as_slice() == mask {
        ClipStep::Converged
    } else {
        ClipStep::Continue(next)
    }
}

/// Run the full point-estimate regression with optional sigma clipping.
///
/// Returns a vector of length `N + n_coeff`. The coefficient block always
/// comes from the most recent fit. Exhausting `sigma_max_iter` is not an
/// error: the last fit is returned with `converged = false`.
pub fn sigma_clip(
    dependent: &DMatrix<f64>,
    independent: &DMatrix<f64>,
    config: &RegressionConfig,
) -> Result<LeavittFit, FitError> {
    config.validate()?;
    check_shapes(dependent, independent)?;

    let n_stars = dependent.nrows();
    let mut mask = vec![true; n_stars];

    if !config.clipping_enabled() {
        let fit = fit_masked(dependent, independent, &mask, config)?;
        return Ok(assemble(fit, mask, true, 1, vec![n_stars]));
    }

    let metric = config.sigma_method.metric();
    let mut history = Vec::new();
    let mut iteration = 0usize;

    loop {
        let n_inliers = count_inliers(&mask);
        history.push(n_inliers);

        let fit = fit_masked(dependent, independent, &mask, config)?;
        iteration += 1;

        match evaluate(&mask, &fit.distances, metric, config.sigma) {
            ClipStep::Converged => {
                info!("Sigma clipping converged after {iteration} fit(s) with {n_inliers}/{n_stars} stars.");
                return Ok(assemble(fit, mask, true, iteration, history));
            }
            ClipStep::Continue(next) => {
                let kept = count_inliers(&next);
                debug!("Sigma clipping iteration {iteration}: {n_inliers} -> {kept} inliers.");

                if kept == 0 {
                    return Err(FitError::AllStarsExcluded { iteration });
                }
                if iteration >= config.sigma_max_iter {
                    warn!(
                        "Sigma clipping did not converge within {} iterations; returning last fit ({n_inliers} stars).",
                        config.sigma_max_iter
                    );
                    return Ok(assemble(fit, mask, false, iteration, history));
                }
                mask = next;
            }
        }
    }
}

fn assemble(
    fit: MaskedFit,
    mask: Vec<bool>,
    converged: bool,
    iterations: usize,
    inlier_history: Vec<usize>,
) -> LeavittFit {
    let n_stars = fit.distances.len();
    let n_coeff = fit.coefficients.len();
    LeavittFit {
        values: DVector::from_vec(fit.into_values()),
        n_stars,
        n_coeff,
        mask,
        converged,
        iterations,
        inlier_history,
    }
}

pub(crate) fn count_inliers(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

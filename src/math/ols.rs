//! Least squares solver.
//!
//! Every fit in this crate reduces to one linear system `X β = y` built by
//! `fit::design`. The joint distance/coefficient system is rank deficient by
//! construction (a common offset can move between the distances and the
//! intercepts), so we solve it with a truncated SVD:
//!
//! - singular values below `rcond × σ_max` are treated as zero
//! - the result is the minimum-norm least-squares solution
//!
//! Rank deficiency is therefore never an error. Only a failed decomposition
//! (or a non-finite result) is reported, as `FitError::SingularSystem`.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Upper bound on SVD sweeps before we give up on the decomposition.
const SVD_MAX_ITER: usize = 10_000;

/// Solve `x β = y` in the least-squares sense with relative cutoff `rcond`.
pub fn solve_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    rcond: f64,
) -> Result<DVector<f64>, FitError> {
    if x.nrows() != y.len() {
        return Err(FitError::ShapeMismatch(format!(
            "design matrix has {} rows but target has {} entries",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(FitError::ShapeMismatch("empty linear system".into()));
    }

    if !(x.iter().all(|v| v.is_finite()) && y.iter().all(|v| v.is_finite())) {
        return Err(FitError::SingularSystem("non-finite entries in linear system".into()));
    }

    let svd = x
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)
        .ok_or_else(|| FitError::SingularSystem("SVD did not converge".into()))?;

    let sigma_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = rcond * sigma_max;

    let beta = svd
        .solve(y, cutoff)
        .map_err(|e| FitError::SingularSystem(e.to_string()))?;

    if !beta.iter().all(|v| v.is_finite()) {
        return Err(FitError::SingularSystem("non-finite least-squares solution".into()));
    }
    Ok(beta)
}

//! Monte Carlo error propagation.
//!
//! 1. One noise-free sigma-clipped fit fixes the inlier mask and the point
//!    estimate of the band coefficients.
//! 2. Each resample perturbs the retained magnitudes with independent
//!    Gaussian noise scaled by the matching photometric error.
//! 3. Every resample is refit against the same predictors and the same mask
//!    (no clipping inside a resample).
//! 4. Per-element mean and standard deviation are reduced across resamples.
//!
//! Resample `k` draws from its own RNG seeded from `(seed, k)` and results are
//! collected by index, so the output depends neither on completion order nor
//! on the worker count.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::domain::{ErrorConfig, ErrorEstimate, ObservationSet, RegressionConfig};
use crate::error::FitError;
use crate::fit::sigma_clip::{fit_masked, sigma_clip};

/// Estimate per-element uncertainties by repeated perturbed refits.
pub fn monte_carlo(
    observations: &ObservationSet,
    config: &RegressionConfig,
    errors: &ErrorConfig,
) -> Result<ErrorEstimate, FitError> {
    config.validate()?;
    errors.validate()?;
    let Some(dependent_error) = observations.dependent_error() else {
        return Err(FitError::InvalidConfig(
            "Monte Carlo error estimation requires photometric errors.".into(),
        ));
    };

    let point = sigma_clip(observations.dependent(), observations.independent(), config)?;

    let rows: Vec<usize> = point
        .mask
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect();
    validate_errors(dependent_error, &rows)?;

    let dependent = observations.dependent().select_rows(rows.iter());
    let independent = observations.independent().select_rows(rows.iter());
    let scale = dependent_error.select_rows(rows.iter());

    let seed = errors.seed.unwrap_or_else(rand::random);
    info!(
        "Monte Carlo: {} resamples of {} stars on {} worker(s), seed {seed}.",
        errors.iterations,
        rows.len(),
        errors.workers
    );

    // The mask is fixed by the point fit; resamples are never clipped.
    let refit = RegressionConfig {
        sigma: 0.0,
        ..config.clone()
    };
    let all_rows = vec![true; rows.len()];
    let normal =
        Normal::new(0.0, 1.0).map_err(|e| FitError::InvalidConfig(format!("Noise distribution error: {e}")))?;

    let resample = |k: usize| -> Result<Vec<f64>, FitError> {
        let mut rng = StdRng::seed_from_u64(resample_seed(seed, k));
        let perturbed = DMatrix::from_fn(dependent.nrows(), dependent.ncols(), |i, j| {
            dependent[(i, j)] + scale[(i, j)] * normal.sample(&mut rng)
        });
        let fit = fit_masked(&perturbed, &independent, &all_rows, &refit)?;
        let mut values = fit.distances;
        values.extend(fit.coefficients);
        Ok(values)
    };

    let fits: Vec<Vec<f64>> = if errors.workers == 1 {
        (0..errors.iterations)
            .map(resample)
            .collect::<Result<Vec<_>, FitError>>()?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(errors.workers)
            .build()
            .map_err(|e| FitError::InvalidConfig(format!("Failed to start worker pool: {e}")))?;
        pool.install(|| {
            (0..errors.iterations)
                .into_par_iter()
                .map(resample)
                .collect::<Result<Vec<_>, FitError>>()
        })?
    };
    debug!("Monte Carlo: collected {} refits.", fits.len());

    let n_kept = rows.len();
    let n_coeff = point.n_coeff;
    let (mean, std) = if fits.is_empty() {
        let mut reference: Vec<f64> = rows.iter().map(|&r| point.distances()[r]).collect();
        reference.extend_from_slice(point.coefficients());
        (reference, vec![0.0; n_kept + n_coeff])
    } else {
        column_mean_std(&fits)
    };

    let n_stars = point.n_stars;
    let mut values = DVector::from_element(n_stars + n_coeff, f64::NAN);
    let mut spread = DVector::from_element(n_stars + n_coeff, f64::NAN);
    for (k, &row) in rows.iter().enumerate() {
        values[row] = mean[k];
        spread[row] = std[k];
    }
    for j in 0..n_coeff {
        values[n_stars + j] = point.coefficients()[j];
        spread[n_stars + j] = std[n_kept + j];
    }

    Ok(ErrorEstimate {
        point,
        values,
        errors: spread,
        iterations: errors.iterations,
    })
}

/// Errors on retained rows must be finite and non-negative.
fn validate_errors(dependent_error: &DMatrix<f64>, rows: &[usize]) -> Result<(), FitError> {
    for &star in rows {
        for band in 0..dependent_error.ncols() {
            let value = dependent_error[(star, band)];
            if !(value.is_finite() && value >= 0.0) {
                return Err(FitError::InvalidErrorInput { star, band, value });
            }
        }
    }
    Ok(())
}

fn resample_seed(seed: u64, k: usize) -> u64 {
    seed ^ (k as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Per-position mean and population standard deviation across fits.
///
/// Welford's update keeps identical inputs at exactly zero spread.
fn column_mean_std(fits: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let width = fits.first().map_or(0, Vec::len);
    let mut mean = vec![0.0; width];
    let mut m2 = vec![0.0; width];

    for (k, fit) in fits.iter().enumerate() {
        let count = (k + 1) as f64;
        for ((m, s), &v) in mean.iter_mut().zip(m2.iter_mut()).zip(fit) {
            let delta = v - *m;
            *m += delta / count;
            *s += delta * (v - *m);
        }
    }

    let n = fits.len().max(1) as f64;
    let std = m2.into_iter().map(|s| (s / n).sqrt()).collect();
    (mean, std)
}

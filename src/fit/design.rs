//! Joint block design matrix for the multi-band Period-Luminosity fit.
//!
//! Each star `s` has one unknown distance modulus and each band `b` has its
//! own slope(s) and optional intercept:
//!
//! ```text
//! m[s, b] = μ[s] + Σ_v slope[b, v] · x[s, v] + intercept[b]
//! ```
//!
//! Stacking the bands band-major gives one linear system. Row block `b`
//! (rows `b·N .. (b+1)·N`) carries an `N × N` identity in the distance columns
//! and the predictor tile in that band's coefficient columns; everything else
//! is zero:
//!
//! ```text
//!          μ (N)     band 0     band 1    ...
//! band 0 [  I     |  [x 1]   |   0      | ... ]
//! band 1 [  I     |   0      |  [x 1]   | ... ]
//! ```
//!
//! The matrix is filled by direct indexed assignment into a zeroed buffer.

use nalgebra::{DMatrix, DVector};

use crate::domain::check_shapes;
use crate::error::FitError;

/// Column bookkeeping for a design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignLayout {
    pub n_stars: usize,
    pub n_bands: usize,
    pub n_predictors: usize,
    pub add_const: bool,
    pub fit_modulus: bool,
}

impl DesignLayout {
    /// Columns per band block: predictors plus the optional constant.
    pub fn block_width(&self) -> usize {
        self.n_predictors + usize::from(self.add_const)
    }

    /// Number of per-band coefficients (slopes and intercepts).
    pub fn n_coeff(&self) -> usize {
        self.n_bands * self.block_width()
    }

    /// Number of leading distance columns (0 when moduli are not fitted).
    pub fn n_distance_columns(&self) -> usize {
        if self.fit_modulus { self.n_stars } else { 0 }
    }

    pub fn n_rows(&self) -> usize {
        self.n_stars * self.n_bands
    }

    pub fn n_unknowns(&self) -> usize {
        self.n_distance_columns() + self.n_coeff()
    }

    /// Column of coefficient `j` (predictor index, or `n_predictors` for the
    /// constant) in band `band`.
    pub fn coeff_column(&self, band: usize, j: usize) -> usize {
        self.n_distance_columns() + band * self.block_width() + j
    }
}

/// A stacked linear system `x β ≈ y` plus its layout.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    pub layout: DesignLayout,
}

/// Build the joint design matrix and band-major target vector.
///
/// - `dependent`: N × B magnitudes
/// - `independent`: N × V predictors
pub fn build_design(
    dependent: &DMatrix<f64>,
    independent: &DMatrix<f64>,
    add_const: bool,
    fit_modulus: bool,
) -> Result<LinearSystem, FitError> {
    check_shapes(dependent, independent)?;

    let layout = DesignLayout {
        n_stars: dependent.nrows(),
        n_bands: dependent.ncols(),
        n_predictors: independent.ncols(),
        add_const,
        fit_modulus,
    };
    let n = layout.n_stars;
    let n_dist = layout.n_distance_columns();

    let mut x = DMatrix::<f64>::zeros(layout.n_rows(), layout.n_unknowns());
    let mut y = DVector::<f64>::zeros(layout.n_rows());

    for band in 0..layout.n_bands {
        for star in 0..n {
            let row = band * n + star;
            if n_dist > 0 {
                x[(row, star)] = 1.0;
            }
            for v in 0..layout.n_predictors {
                x[(row, layout.coeff_column(band, v))] = independent[(star, v)];
            }
            if add_const {
                x[(row, layout.coeff_column(band, layout.n_predictors))] = 1.0;
            }
            y[row] = dependent[(star, band)];
        }
    }

    Ok(LinearSystem { x, y, layout })
}

impl LinearSystem {
    /// Split a solution into (per-star distance slots, coefficients).
    ///
    /// With fitted moduli the distance slots are the leading entries of `beta`.
    /// Otherwise each star's slot is its residual averaged over bands, i.e. the
    /// offset from the shared modulus that best explains that star.
    pub fn split_solution(&self, beta: &DVector<f64>) -> (Vec<f64>, Vec<f64>) {
        let layout = &self.layout;
        let n_dist = layout.n_distance_columns();
        let coefficients = beta.as_slice()[n_dist..].to_vec();

        let distances = if layout.fit_modulus {
            beta.as_slice()[..n_dist].to_vec()
        } else {
            let residuals = &self.y - &self.x * beta;
            let n = layout.n_stars;
            (0..n)
                .map(|star| {
                    let sum: f64 = (0..layout.n_bands).map(|band| residuals[band * n + star]).sum();
                    sum / layout.n_bands as f64
                })
                .collect()
        };

        (distances, coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize, offset: f64) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |i, j| offset + i as f64 + 0.1 * j as f64)
    }

    #[test]
    fn shapes_follow_layout() {
        for n in 1..5 {
            for b in 1..4 {
                for v in 1..3 {
                    for add_const in [false, true] {
                        let sys = build_design(&ramp(n, b, 10.0), &ramp(n, v, 0.0), add_const, true).unwrap();
                        let width = v + usize::from(add_const);
                        assert_eq!(sys.x.shape(), (n * b, n + b * width));
                        assert_eq!(sys.y.len(), n * b);
                        assert_eq!(sys.layout.n_coeff(), b * width);
                    }
                }
            }
        }
    }

    #[test]
    fn block_structure_is_exact() {
        let dep = DMatrix::from_row_slice(2, 2, &[10.0, 11.0, 12.0, 13.0]);
        let ind = DMatrix::from_row_slice(2, 1, &[0.5, 0.7]);
        let sys = build_design(&dep, &ind, true, true).unwrap();

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(4, 6, &[
            1.0, 0.0,  0.5, 1.0,  0.0, 0.0,
            0.0, 1.0,  0.7, 1.0,  0.0, 0.0,
            1.0, 0.0,  0.0, 0.0,  0.5, 1.0,
            0.0, 1.0,  0.0, 0.0,  0.7, 1.0,
        ]);
        assert_eq!(sys.x, expected);
        assert_eq!(sys.y.as_slice(), &[10.0, 12.0, 11.0, 13.0]);
    }

    #[test]
    fn without_fitted_modulus_only_coefficient_blocks_remain() {
        let sys = build_design(&ramp(3, 2, 10.0), &ramp(3, 1, 0.0), true, false).unwrap();
        assert_eq!(sys.x.shape(), (6, 4));
        assert_eq!(sys.layout.n_distance_columns(), 0);
    }

    #[test]
    fn mismatched_or_empty_inputs_are_rejected() {
        let err = build_design(&ramp(3, 2, 0.0), &ramp(4, 1, 0.0), false, true).unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch(_)));

        let err = build_design(&DMatrix::zeros(3, 0), &ramp(3, 1, 0.0), false, true).unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch(_)));

        let err = build_design(&ramp(3, 2, 0.0), &DMatrix::zeros(3, 0), false, true).unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch(_)));
    }

    #[test]
    fn residual_offsets_recover_shared_shift() {
        // Two stars on the same relation; star 1 is 0.4 mag fainter in both bands.
        let ind = DMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        let dep = DMatrix::from_fn(3, 2, |s, b| {
            let shift = if s == 1 { 0.4 } else { 0.0 };
            5.0 + b as f64 - 2.0 * ind[(s, 0)] + shift
        });
        let sys = build_design(&dep, &ind, true, false).unwrap();
        let beta = crate::math::solve_least_squares(&sys.x, &sys.y, 1e-12).unwrap();
        let (dist, coeff) = sys.split_solution(&beta);
        assert_eq!(coeff.len(), 4);
        // The star offsets average to zero and star 1 sits 0.4 above the others.
        assert!((dist[1] - dist[0] - 0.4).abs() < 1e-9);
        assert!((dist[1] - dist[2] - 0.4).abs() < 1e-9);
    }
}

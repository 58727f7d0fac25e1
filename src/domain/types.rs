//! Shared domain types.
//!
//! These types are kept small and explicit so that the regression core can be
//! driven from the CLI, from tests, or from another program without any
//! string-keyed option tables.

use std::str::FromStr;

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Units for the distance entries of a fit.
///
/// Fitting always happens in distance modulus; conversion is applied to the
/// distance slots only, after the mean modulus offset has been added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Distance modulus `μ` (identity).
    #[value(alias = "modulii")]
    Modulus,
    /// Parsecs: `10^(μ/5 + 1)`.
    #[value(name = "pc", alias = "parsecs")]
    #[serde(rename = "pc")]
    Parsecs,
    /// Kiloparsecs: `10^(μ/5 + 1) / 1000`.
    #[value(name = "kpc", alias = "kiloparsecs")]
    #[serde(rename = "kpc")]
    Kiloparsecs,
}

impl FromStr for Units {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modulus" | "modulii" => Ok(Units::Modulus),
            "pc" | "parsecs" => Ok(Units::Parsecs),
            "kpc" | "kiloparsecs" => Ok(Units::Kiloparsecs),
            _ => Err(FitError::UnsupportedUnit(s.to_string())),
        }
    }
}

impl Units {
    pub fn label(self) -> &'static str {
        match self {
            Units::Modulus => "modulus",
            Units::Parsecs => "pc",
            Units::Kiloparsecs => "kpc",
        }
    }
}

/// Statistic used to score distances during sigma clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SigmaMethod {
    /// `(x - mean) / std`.
    Zscore,
    /// `(x - median) / (1.4826 * MAD)`.
    Mad,
}

/// How (and whether) to estimate uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMethod {
    #[value(alias = "None")]
    None,
    #[value(alias = "Monte_Carlo")]
    MonteCarlo,
}

/// Options for a single point-estimate regression (one sigma-clipping run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Append a ones-column to the predictors (per-band intercept).
    pub add_const: bool,
    /// Solve for one distance modulus per star. When false, every star is
    /// assumed to share the mean modulus and its slot holds the band-averaged
    /// residual instead.
    pub fit_modulus: bool,
    /// Clipping threshold; `<= 0` disables sigma clipping.
    pub sigma: f64,
    pub sigma_method: SigmaMethod,
    /// Maximum number of fits performed by the clipping loop.
    pub sigma_max_iter: usize,
    /// Added to every fitted modulus before unit conversion.
    pub mean_modulus: f64,
    pub units: Units,
    /// Relative singular value cutoff for the least-squares solve.
    pub rcond: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            add_const: false,
            fit_modulus: true,
            sigma: 0.0,
            sigma_method: SigmaMethod::Zscore,
            sigma_max_iter: 20,
            mean_modulus: 0.0,
            units: Units::Modulus,
            rcond: 1e-3,
        }
    }
}

impl RegressionConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.sigma_max_iter == 0 {
            return Err(FitError::InvalidConfig("sigma_max_iter must be >= 1.".into()));
        }
        if !(self.rcond.is_finite() && self.rcond >= 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "rcond must be finite and >= 0, got {}.",
                self.rcond
            )));
        }
        if !self.sigma.is_finite() {
            return Err(FitError::InvalidConfig(format!("sigma must be finite, got {}.", self.sigma)));
        }
        if !self.mean_modulus.is_finite() {
            return Err(FitError::InvalidConfig(format!(
                "mean_modulus must be finite, got {}.",
                self.mean_modulus
            )));
        }
        Ok(())
    }

    /// True when the clipping loop should run at all.
    pub fn clipping_enabled(&self) -> bool {
        self.sigma > 0.0
    }
}

/// Options for Monte Carlo error estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    pub method: ErrorMethod,
    /// Number of perturbed refits.
    pub iterations: usize,
    /// Size of the worker pool; `1` runs a plain sequential loop.
    pub workers: usize,
    /// Base seed for the resampling RNGs. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            method: ErrorMethod::None,
            iterations: 1000,
            workers: 1,
            seed: None,
        }
    }
}

impl ErrorConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.workers == 0 {
            return Err(FitError::InvalidConfig("worker count must be >= 1.".into()));
        }
        Ok(())
    }
}

/// Photometric inputs for one fit, row-aligned by star.
///
/// - `dependent`: N stars × B bands (magnitudes)
/// - `independent`: N × V predictors (e.g. log period)
/// - `dependent_error`: optional N × B photometric errors
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    dependent: DMatrix<f64>,
    independent: DMatrix<f64>,
    dependent_error: Option<DMatrix<f64>>,
}

impl ObservationSet {
    pub fn new(
        dependent: DMatrix<f64>,
        independent: DMatrix<f64>,
        dependent_error: Option<DMatrix<f64>>,
    ) -> Result<Self, FitError> {
        check_shapes(&dependent, &independent)?;
        if let Some(err) = &dependent_error {
            if err.shape() != dependent.shape() {
                return Err(FitError::ShapeMismatch(format!(
                    "error matrix is {}x{} but dependent matrix is {}x{}",
                    err.nrows(),
                    err.ncols(),
                    dependent.nrows(),
                    dependent.ncols()
                )));
            }
        }
        Ok(Self {
            dependent,
            independent,
            dependent_error,
        })
    }

    pub fn dependent(&self) -> &DMatrix<f64> {
        &self.dependent
    }

    pub fn independent(&self) -> &DMatrix<f64> {
        &self.independent
    }

    pub fn dependent_error(&self) -> Option<&DMatrix<f64>> {
        self.dependent_error.as_ref()
    }

    pub fn n_stars(&self) -> usize {
        self.dependent.nrows()
    }

    pub fn n_bands(&self) -> usize {
        self.dependent.ncols()
    }

    pub fn n_predictors(&self) -> usize {
        self.independent.ncols()
    }
}

/// Reject inputs whose row counts disagree or which have no bands/predictors.
pub fn check_shapes(dependent: &DMatrix<f64>, independent: &DMatrix<f64>) -> Result<(), FitError> {
    if dependent.nrows() != independent.nrows() {
        return Err(FitError::ShapeMismatch(format!(
            "dependent variables have {} rows but independent variables have {}",
            dependent.nrows(),
            independent.nrows()
        )));
    }
    if dependent.ncols() == 0 {
        return Err(FitError::ShapeMismatch("no dependent variables (B = 0)".into()));
    }
    if independent.ncols() == 0 {
        return Err(FitError::ShapeMismatch("no independent variables (V = 0)".into()));
    }
    Ok(())
}

/// Result of a point-estimate regression.
///
/// `values` has length `n_stars + n_coeff`: the leading entries are the
/// converted distances (NaN for excluded stars), the trailing entries are the
/// per-band coefficients, band-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LeavittFit {
    pub values: DVector<f64>,
    pub n_stars: usize,
    pub n_coeff: usize,
    /// Inlier mask the returned values were computed with.
    pub mask: Vec<bool>,
    pub converged: bool,
    /// Number of fits performed.
    pub iterations: usize,
    /// Inlier count entering each fit, in order.
    pub inlier_history: Vec<usize>,
}

impl LeavittFit {
    pub fn distances(&self) -> &[f64] {
        &self.values.as_slice()[..self.n_stars]
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.values.as_slice()[self.n_stars..]
    }

    pub fn n_inliers(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// Monte Carlo output: values and per-element standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEstimate {
    /// Noise-free fit that fixed the mask and the coefficients.
    pub point: LeavittFit,
    /// Distances: resample mean. Coefficients: the point estimate.
    pub values: DVector<f64>,
    /// Standard deviation across resamples at every position.
    pub errors: DVector<f64>,
    pub iterations: usize,
}

/// A named output value (coefficient) with optional uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

/// Portable summary of one fit (written with `--export-json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub tool: String,
    pub units: Units,
    pub converged: bool,
    pub iterations: usize,
    pub n_stars: usize,
    pub n_inliers: usize,
    pub coefficients: Vec<NamedValue>,
    pub error_method: ErrorMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_iterations: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_parse_aliases_and_reject_unknown() {
        assert_eq!("modulii".parse::<Units>().unwrap(), Units::Modulus);
        assert_eq!("PC".parse::<Units>().unwrap(), Units::Parsecs);
        assert_eq!("kiloparsecs".parse::<Units>().unwrap(), Units::Kiloparsecs);
        let err = "au".parse::<Units>().unwrap_err();
        assert_eq!(err, FitError::UnsupportedUnit("au".into()));
    }

    #[test]
    fn observation_set_rejects_mismatched_rows() {
        let dep = DMatrix::<f64>::zeros(3, 2);
        let ind = DMatrix::<f64>::zeros(4, 1);
        assert!(matches!(
            ObservationSet::new(dep, ind, None),
            Err(FitError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn observation_set_rejects_mismatched_errors() {
        let dep = DMatrix::<f64>::zeros(3, 2);
        let ind = DMatrix::<f64>::zeros(3, 1);
        let err = DMatrix::<f64>::zeros(3, 1);
        assert!(matches!(
            ObservationSet::new(dep, ind, Some(err)),
            Err(FitError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn regression_config_validation() {
        assert!(RegressionConfig::default().validate().is_ok());
        let bad = RegressionConfig {
            sigma_max_iter: 0,
            ..RegressionConfig::default()
        };
        assert!(matches!(bad.validate(), Err(FitError::InvalidConfig(_))));
        let bad = RegressionConfig {
            rcond: f64::NAN,
            ..RegressionConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}

//! Command-line parsing for the Period-Luminosity regression tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! regression code: everything here is plain data that `app` turns into
//! `RegressionConfig` / `ErrorConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ErrorMethod, SigmaMethod, Units};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "leavitt",
    version,
    about = "Multi-band Period-Luminosity (Leavitt law) regression"
)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit distances and per-band coefficients; writes the input table plus a
    /// distance column and one row per coefficient.
    Fit(FitArgs),
    /// Predict apparent magnitudes from a fitted coefficient table.
    Predict(PredictArgs),
}

/// Table formatting shared by both subcommands.
#[derive(Debug, Args, Clone)]
pub struct FormatArgs {
    /// Input field separator (single character). Default: any whitespace.
    #[arg(long)]
    pub sep: Option<String>,

    /// Tokens read as missing values.
    #[arg(long = "na-values", num_args = 1.., default_values_t = vec!["NA".to_string()])]
    pub na_values: Vec<String>,

    /// Output field separator.
    #[arg(long = "output-sep", default_value = "\t")]
    pub output_sep: String,

    /// Token written for missing values.
    #[arg(long = "output-na-value", default_value = "NA")]
    pub output_na_value: String,

    /// Digits after the decimal point in output values.
    #[arg(long, default_value_t = 5)]
    pub precision: usize,
}

/// Options for `leavitt fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Input table; reads stdin when omitted.
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Dependent variables (apparent magnitude columns, one per band).
    #[arg(long = "dependent-vars", required = true, num_args = 1..)]
    pub dependent_vars: Vec<String>,

    /// Independent variables (e.g. log period).
    #[arg(long = "independent-vars", required = true, num_args = 1..)]
    pub independent_vars: Vec<String>,

    /// Fit a constant term per band.
    #[arg(long = "add-const")]
    pub add_const: bool,

    /// Do not fit a modulus per star; every star is assumed to sit at the
    /// mean modulus and the distance column holds its mean residual.
    #[arg(long = "fixed-modulus")]
    pub fixed_modulus: bool,

    /// Units of the distance column.
    #[arg(short = 'u', long, value_enum, default_value_t = Units::Modulus)]
    pub units: Units,

    /// Added to every fitted modulus before unit conversion.
    #[arg(short = 'm', long = "mean-modulus", default_value_t = 0.0, allow_negative_numbers = true)]
    pub mean_modulus: f64,

    /// Relative cutoff for small singular values.
    #[arg(long, default_value_t = 1e-3)]
    pub rcond: f64,

    /// Sigma clipping threshold; 0 disables clipping.
    #[arg(long, default_value_t = 0.0)]
    pub sigma: f64,

    /// Statistic used to score distances while clipping.
    #[arg(long = "sigma-method", value_enum, default_value_t = SigmaMethod::Zscore)]
    pub sigma_method: SigmaMethod,

    /// Maximum number of fits in the clipping loop.
    #[arg(long = "sigma-max-iter", default_value_t = 20)]
    pub sigma_max_iter: usize,

    /// Error estimation method.
    #[arg(long = "error-method", value_enum, default_value_t = ErrorMethod::None)]
    pub error_method: ErrorMethod,

    /// Error columns are named `<prefix><dependent><suffix>`.
    #[arg(long = "error-prefix", default_value = "")]
    pub error_prefix: String,

    #[arg(long = "error-suffix", default_value = "")]
    pub error_suffix: String,

    /// Number of Monte Carlo resamples.
    #[arg(long = "error-iterations", default_value_t = 1000)]
    pub error_iterations: usize,

    /// Worker threads used by Monte Carlo error estimation.
    #[arg(long = "error-processes", env = "LEAVITT_ERROR_PROCESSES", default_value_t = 1)]
    pub error_processes: usize,

    /// Seed for Monte Carlo resampling (random when omitted).
    #[arg(long, env = "LEAVITT_SEED")]
    pub seed: Option<u64>,

    /// Label of the distance column.
    #[arg(long = "distance-label", default_value = "dist")]
    pub distance_label: String,

    /// Write a JSON summary of the fit.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Print a human-readable summary to stderr.
    #[arg(long)]
    pub summary: bool,

    #[command(flatten)]
    pub format: FormatArgs,
}

/// Options for `leavitt predict`.
#[derive(Debug, Args, Clone)]
pub struct PredictArgs {
    /// Table with the independent variables; reads stdin when omitted.
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output table of a previous `leavitt fit` run.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub coefficients: PathBuf,

    /// Bands to predict (named as in the fit).
    #[arg(long = "dependent-vars", required = true, num_args = 1..)]
    pub dependent_vars: Vec<String>,

    #[arg(long = "independent-vars", required = true, num_args = 1..)]
    pub independent_vars: Vec<String>,

    /// The fit included a constant term per band.
    #[arg(long = "add-const")]
    pub add_const: bool,

    /// Column of the coefficient table that holds the coefficient values.
    #[arg(long = "distance-label", default_value = "dist")]
    pub distance_label: String,

    /// Per-star distance modulus column in the input table.
    #[arg(long = "modulus-column")]
    pub modulus_column: Option<String>,

    /// Modulus used for stars without a modulus column.
    #[arg(short = 'm', long = "mean-modulus", default_value_t = 0.0, allow_negative_numbers = true)]
    pub mean_modulus: f64,

    #[command(flatten)]
    pub format: FormatArgs,
}

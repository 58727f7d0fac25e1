//! Shared fit/predict workflow, independent of how results are presented.
//!
//! table -> complete rows -> observations -> sigma clip / Monte Carlo -> output columns
//!
//! `app` owns argument handling and writing; this module works on parsed
//! tables so it can be exercised directly from tests.

use log::info;
use nalgebra::DMatrix;

use crate::domain::{
    ErrorConfig, ErrorEstimate, ErrorMethod, FitSummary, LeavittFit, ObservationSet, RegressionConfig,
};
use crate::error::AppError;
use crate::fit::{monte_carlo, sigma_clip};
use crate::io::{OutputColumn, Table};
use crate::report::{build_summary, coefficient_names, predict_magnitudes};

/// Everything needed to run one fit over a table.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub dependent_vars: Vec<String>,
    pub independent_vars: Vec<String>,
    /// Error column names, one per dependent variable. Required for Monte Carlo.
    pub error_vars: Option<Vec<String>>,
    pub regression: RegressionConfig,
    pub errors: ErrorConfig,
    pub distance_label: String,
    /// Label of the error column written alongside the distances.
    pub error_label: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FitOutcome {
    Point(LeavittFit),
    MonteCarlo(ErrorEstimate),
}

impl FitOutcome {
    /// The noise-free fit behind the outcome.
    pub fn fit(&self) -> &LeavittFit {
        match self {
            FitOutcome::Point(fit) => fit,
            FitOutcome::MonteCarlo(estimate) => &estimate.point,
        }
    }
}

/// All computed outputs of a single `leavitt fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub outcome: FitOutcome,
    /// Table rows that entered the fit.
    pub rows: Vec<usize>,
    pub coefficient_names: Vec<String>,
    /// Output columns over `table rows + coefficient rows`.
    pub columns: Vec<OutputColumn>,
    pub summary: FitSummary,
}

/// Run the regression described by `job` on `table`.
pub fn run_fit(table: &Table, job: &FitJob) -> Result<FitRun, AppError> {
    let dependent = table.matrix(&job.dependent_vars)?;
    let independent = table.matrix(&job.independent_vars)?;
    let dependent_error = match (&job.errors.method, &job.error_vars) {
        (ErrorMethod::MonteCarlo, Some(names)) => Some(table.matrix(names)?),
        (ErrorMethod::MonteCarlo, None) => {
            return Err(AppError::new(2, "Monte Carlo error estimation needs error columns."));
        }
        (ErrorMethod::None, _) => None,
    };

    let rows = complete_rows(&dependent, &independent, dependent_error.as_ref());
    let dropped = table.n_rows() - rows.len();
    if dropped > 0 {
        info!("Dropped {dropped} row(s) with missing values.");
    }
    if rows.is_empty() {
        return Err(AppError::new(3, "No rows without missing values remain to fit."));
    }

    let observations = ObservationSet::new(
        dependent.select_rows(rows.iter()),
        independent.select_rows(rows.iter()),
        dependent_error.map(|err| err.select_rows(rows.iter())),
    )?;

    let outcome = match job.errors.method {
        ErrorMethod::None => FitOutcome::Point(sigma_clip(
            observations.dependent(),
            observations.independent(),
            &job.regression,
        )?),
        ErrorMethod::MonteCarlo => FitOutcome::MonteCarlo(monte_carlo(&observations, &job.regression, &job.errors)?),
    };

    let names = coefficient_names(&job.dependent_vars, &job.independent_vars, job.regression.add_const);
    let n_stars = rows.len();

    let mut columns = Vec::new();
    match &outcome {
        FitOutcome::Point(fit) => {
            columns.push(expand_column(&job.distance_label, table.n_rows(), &rows, fit.values.as_slice(), n_stars));
        }
        FitOutcome::MonteCarlo(estimate) => {
            columns.push(expand_column(
                &job.distance_label,
                table.n_rows(),
                &rows,
                estimate.values.as_slice(),
                n_stars,
            ));
            if let Some(label) = &job.error_label {
                columns.push(expand_column(label, table.n_rows(), &rows, estimate.errors.as_slice(), n_stars));
            }
        }
    }

    let estimate = match &outcome {
        FitOutcome::MonteCarlo(estimate) => Some(estimate),
        FitOutcome::Point(_) => None,
    };
    let summary = build_summary(outcome.fit(), estimate, &names, job.regression.units);

    Ok(FitRun {
        outcome,
        rows,
        coefficient_names: names,
        columns,
        summary,
    })
}

/// What `leavitt predict` needs besides the two tables.
#[derive(Debug, Clone)]
pub struct PredictJob {
    pub dependent_vars: Vec<String>,
    pub independent_vars: Vec<String>,
    pub add_const: bool,
    /// Column of the coefficient table holding the fitted values.
    pub value_label: String,
    pub modulus_column: Option<String>,
    pub mean_modulus: f64,
}

/// Predict one magnitude per star and band from a fitted coefficient table.
pub fn run_predict(table: &Table, fitted: &Table, job: &PredictJob) -> Result<DMatrix<f64>, AppError> {
    let names = coefficient_names(&job.dependent_vars, &job.independent_vars, job.add_const);
    let values = fitted.column(&job.value_label)?;
    let coefficients = names
        .iter()
        .map(|name| {
            fitted
                .row_of(name)
                .map(|row| values[row])
                .ok_or_else(|| AppError::new(2, format!("Missing coefficient '{name}' in fitted table.")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let independent = table.matrix(&job.independent_vars)?;
    let moduli = match &job.modulus_column {
        Some(name) => table.column(name)?,
        None => vec![job.mean_modulus; table.n_rows()],
    };

    Ok(predict_magnitudes(
        &independent,
        &coefficients,
        job.dependent_vars.len(),
        job.add_const,
        &moduli,
    )?)
}

/// Rows where every dependent, independent and (if given) error value is present.
fn complete_rows(
    dependent: &DMatrix<f64>,
    independent: &DMatrix<f64>,
    dependent_error: Option<&DMatrix<f64>>,
) -> Vec<usize> {
    let row_ok = |m: &DMatrix<f64>, i: usize| m.row(i).iter().all(|v| !v.is_nan());
    (0..dependent.nrows())
        .filter(|&i| {
            row_ok(dependent, i) && row_ok(independent, i) && dependent_error.is_none_or(|e| row_ok(e, i))
        })
        .collect()
}

/// Spread `N + n_coeff` fitted values over the table rows and coefficient rows.
fn expand_column(label: &str, n_rows: usize, rows: &[usize], values: &[f64], n_stars: usize) -> OutputColumn {
    let n_coeff = values.len() - n_stars;
    let mut out = vec![f64::NAN; n_rows + n_coeff];
    for (k, &row) in rows.iter().enumerate() {
        out[row] = values[k];
    }
    out[n_rows..].copy_from_slice(&values[n_stars..]);
    OutputColumn {
        label: label.to_string(),
        values: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::testdata::Synthetic;
    use crate::io::{TableFormat, parse_table};

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn synthetic_table(data: &Synthetic, error: Option<f64>) -> Table {
        let dep = data.dependent();
        let mut raw = String::from("id logP V I");
        if error.is_some() {
            raw.push_str(" e_V e_I");
        }
        raw.push('\n');
        for s in 0..data.x.len() {
            raw.push_str(&format!("s{s} {:.15} {:.15} {:.15}", data.x[s], dep[(s, 0)], dep[(s, 1)]));
            if let Some(e) = error {
                raw.push_str(&format!(" {e} {e}"));
            }
            raw.push('\n');
        }
        parse_table(&raw, &TableFormat::default()).unwrap()
    }

    fn job() -> FitJob {
        FitJob {
            dependent_vars: strings(&["V", "I"]),
            independent_vars: strings(&["logP"]),
            error_vars: None,
            regression: RegressionConfig {
                add_const: true,
                rcond: 1e-10,
                ..RegressionConfig::default()
            },
            errors: ErrorConfig::default(),
            distance_label: "dist".to_string(),
            error_label: None,
        }
    }

    #[test]
    fn fit_recovers_distances_and_appends_coefficients() {
        let data = Synthetic::new(12);
        let table = synthetic_table(&data, None);
        let run = run_fit(&table, &job()).unwrap();

        assert_eq!(run.coefficient_names, strings(&["logP_V", "const_V", "logP_I", "const_I"]));
        assert_eq!(run.columns.len(), 1);
        let dist = &run.columns[0].values;
        assert_eq!(dist.len(), 12 + 4);
        for (got, want) in dist[..12].iter().zip(&data.distances) {
            assert!((got - want).abs() < 1e-8);
        }
        for (got, want) in dist[12..].iter().zip(data.coefficients()) {
            assert!((got - want).abs() < 1e-8);
        }
        assert!(run.summary.converged);
        assert_eq!(run.summary.n_inliers, 12);
    }

    #[test]
    fn rows_with_missing_values_are_skipped() {
        let data = Synthetic::new(12);
        let mut table = synthetic_table(&data, None);
        table.cells[4][1] = "NA".to_string();

        let run = run_fit(&table, &job()).unwrap();
        assert_eq!(run.rows.len(), 11);
        assert!(!run.rows.contains(&4));
        assert!(run.columns[0].values[4].is_nan());
        assert_eq!(run.summary.n_stars, 11);
    }

    #[test]
    fn table_with_no_complete_rows_is_rejected() {
        let table = parse_table("id logP V I\na NA 1 2\nb 0.5 NA 2\n", &TableFormat::default()).unwrap();
        let err = run_fit(&table, &job()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn monte_carlo_adds_error_column() {
        let data = Synthetic::new(12);
        let table = synthetic_table(&data, Some(0.02));
        let job = FitJob {
            error_vars: Some(strings(&["e_V", "e_I"])),
            errors: ErrorConfig {
                method: ErrorMethod::MonteCarlo,
                iterations: 50,
                workers: 2,
                seed: Some(11),
            },
            error_label: Some("e_dist".to_string()),
            ..job()
        };

        let run = run_fit(&table, &job).unwrap();
        assert!(matches!(run.outcome, FitOutcome::MonteCarlo(_)));
        assert_eq!(run.columns.len(), 2);
        assert_eq!(run.columns[1].label, "e_dist");
        assert!(run.columns[1].values.iter().all(|&e| e.is_finite() && e > 0.0));
        assert_eq!(run.summary.error_iterations, Some(50));
        assert!(run.summary.coefficients.iter().all(|c| c.error.is_some()));
    }

    #[test]
    fn monte_carlo_without_error_columns_is_rejected() {
        let table = synthetic_table(&Synthetic::new(12), None);
        let job = FitJob {
            errors: ErrorConfig {
                method: ErrorMethod::MonteCarlo,
                ..ErrorConfig::default()
            },
            ..job()
        };
        assert_eq!(run_fit(&table, &job).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn prediction_reproduces_fitted_magnitudes() {
        let data = Synthetic::new(12);
        let table = synthetic_table(&data, None);
        let run = run_fit(&table, &job()).unwrap();

        let mut raw = String::from("id value\n");
        for (name, v) in run.coefficient_names.iter().zip(&run.columns[0].values[12..]) {
            raw.push_str(&format!("{name} {v:.15}\n"));
        }
        let fitted = parse_table(&raw, &TableFormat::default()).unwrap();

        let mut raw = String::from("id logP mu\n");
        for s in 0..12 {
            raw.push_str(&format!("s{s} {:.15} {:.15}\n", data.x[s], run.columns[0].values[s]));
        }
        let input = parse_table(&raw, &TableFormat::default()).unwrap();

        let predict = PredictJob {
            dependent_vars: strings(&["V", "I"]),
            independent_vars: strings(&["logP"]),
            add_const: true,
            value_label: "value".to_string(),
            modulus_column: Some("mu".to_string()),
            mean_modulus: 0.0,
        };
        let m = run_predict(&input, &fitted, &predict).unwrap();
        let dep = data.dependent();
        for s in 0..12 {
            for b in 0..2 {
                assert!((m[(s, b)] - dep[(s, b)]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn prediction_reports_missing_coefficients() {
        let fitted = parse_table("id dist\nlogP_V -2.5\n", &TableFormat::default()).unwrap();
        let input = parse_table("id logP\na 0.5\n", &TableFormat::default()).unwrap();
        let predict = PredictJob {
            dependent_vars: strings(&["V"]),
            independent_vars: strings(&["logP"]),
            add_const: true,
            value_label: "dist".to_string(),
            modulus_column: None,
            mean_modulus: 18.5,
        };
        let err = run_predict(&input, &fitted, &predict).unwrap_err();
        assert!(err.to_string().contains("const_V"));
    }
}

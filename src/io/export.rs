//! Output tables and JSON summaries.
//!
//! The fit table echoes the input table, appends one computed column per
//! output (distance, and optionally its error), and appends one row per band
//! coefficient. Input cells are copied verbatim except NA tokens, which are
//! rewritten with the output NA token.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use nalgebra::DMatrix;

use crate::domain::FitSummary;
use crate::error::AppError;
use crate::io::table::Table;

/// How to render output tables.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    pub sep: u8,
    /// Digits after the decimal point.
    pub precision: usize,
    pub na_value: String,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sep: b'\t',
            precision: 5,
            na_value: "NA".to_string(),
        }
    }
}

impl OutputFormat {
    pub fn format_value(&self, value: f64) -> String {
        if value.is_nan() {
            self.na_value.clone()
        } else {
            format!("{value:.prec$}", prec = self.precision)
        }
    }
}

/// A computed column: one value per table row, then one per coefficient row.
#[derive(Debug, Clone)]
pub struct OutputColumn {
    pub label: String,
    pub values: Vec<f64>,
}

/// Write the input table plus computed columns and coefficient rows.
pub fn write_fit_table<W: Write>(
    writer: W,
    table: &Table,
    coefficient_names: &[String],
    columns: &[OutputColumn],
    format: &OutputFormat,
) -> Result<(), AppError> {
    let n_out = table.n_rows() + coefficient_names.len();
    for column in columns {
        if column.values.len() != n_out {
            return Err(AppError::new(
                4,
                format!(
                    "Output column '{}' has {} values, expected {n_out}.",
                    column.label,
                    column.values.len()
                ),
            ));
        }
    }

    // A computed column replaces an input column of the same name.
    let replaced: Vec<Option<usize>> = table
        .columns
        .iter()
        .map(|name| columns.iter().position(|c| &c.label == name))
        .collect();
    let appended: Vec<&OutputColumn> = columns
        .iter()
        .filter(|c| !table.has_column(&c.label))
        .collect();

    let mut out = csv::WriterBuilder::new()
        .delimiter(format.sep)
        .from_writer(writer);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write output table: {e}"));

    let mut header = vec![table.index_name.clone()];
    header.extend(table.columns.iter().cloned());
    header.extend(appended.iter().map(|c| c.label.clone()));
    out.write_record(&header).map_err(write_err)?;

    for (row, (id, cells)) in table.index.iter().zip(&table.cells).enumerate() {
        let mut record = vec![id.clone()];
        for (cell, slot) in cells.iter().zip(&replaced) {
            let text = match slot {
                Some(c) => format.format_value(columns[*c].values[row]),
                None if table.is_na(cell) => format.na_value.clone(),
                None => cell.clone(),
            };
            record.push(text);
        }
        record.extend(appended.iter().map(|c| format.format_value(c.values[row])));
        out.write_record(&record).map_err(write_err)?;
    }

    for (k, name) in coefficient_names.iter().enumerate() {
        let row = table.n_rows() + k;
        let mut record = vec![name.clone()];
        for slot in &replaced {
            let text = match slot {
                Some(c) => format.format_value(columns[*c].values[row]),
                None => format.na_value.clone(),
            };
            record.push(text);
        }
        record.extend(appended.iter().map(|c| format.format_value(c.values[row])));
        out.write_record(&record).map_err(write_err)?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush output table: {e}")))?;
    Ok(())
}

/// Write a plain matrix with an index column.
pub fn write_matrix_table<W: Write>(
    writer: W,
    index_name: &str,
    index: &[String],
    column_names: &[String],
    values: &DMatrix<f64>,
    format: &OutputFormat,
) -> Result<(), AppError> {
    let mut out = csv::WriterBuilder::new()
        .delimiter(format.sep)
        .from_writer(writer);
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write output table: {e}"));

    let mut header = vec![index_name.to_string()];
    header.extend(column_names.iter().cloned());
    out.write_record(&header).map_err(write_err)?;

    for (i, id) in index.iter().enumerate() {
        let mut record = vec![id.clone()];
        record.extend((0..values.ncols()).map(|j| format.format_value(values[(i, j)])));
        out.write_record(&record).map_err(write_err)?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush output table: {e}")))?;
    Ok(())
}

/// Write a fit summary as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &FitSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::table::{TableFormat, parse_table};

    #[test]
    fn fit_table_appends_column_and_coefficient_rows() {
        let table = parse_table("id x m\na 0.1 NA\nb 0.2 2.0\n", &TableFormat::default()).unwrap();
        let names = vec!["x_m".to_string(), "const_m".to_string()];
        let columns = vec![OutputColumn {
            label: "dist".to_string(),
            values: vec![f64::NAN, 1.234567, -2.5, 9.0],
        }];

        let mut buf = Vec::new();
        write_fit_table(&mut buf, &table, &names, &columns, &OutputFormat::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "id\tx\tm\tdist");
        assert_eq!(lines[1], "a\t0.1\tNA\tNA");
        assert_eq!(lines[2], "b\t0.2\t2.0\t1.23457");
        assert_eq!(lines[3], "x_m\tNA\tNA\t-2.50000");
        assert_eq!(lines[4], "const_m\tNA\tNA\t9.00000");
    }

    #[test]
    fn computed_column_replaces_existing_one() {
        let table = parse_table("id x dist\na 0.1 5\n", &TableFormat::default()).unwrap();
        let columns = vec![OutputColumn {
            label: "dist".to_string(),
            values: vec![7.0],
        }];
        let format = OutputFormat {
            sep: b',',
            precision: 1,
            na_value: "-".to_string(),
        };

        let mut buf = Vec::new();
        write_fit_table(&mut buf, &table, &[], &columns, &format).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "id,x,dist\na,0.1,7.0\n");
    }

    #[test]
    fn column_length_is_checked() {
        let table = parse_table("id x\na 0.1\n", &TableFormat::default()).unwrap();
        let columns = vec![OutputColumn {
            label: "dist".to_string(),
            values: vec![],
        }];
        let err = write_fit_table(Vec::new(), &table, &[], &columns, &OutputFormat::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn summary_json_round_trips_through_serde() {
        let summary = FitSummary {
            tool: "leavitt".to_string(),
            units: crate::domain::Units::Parsecs,
            converged: true,
            iterations: 2,
            n_stars: 10,
            n_inliers: 9,
            coefficients: vec![crate::domain::NamedValue {
                name: "logP_V".to_string(),
                value: -2.7,
                error: Some(0.05),
            }],
            error_method: crate::domain::ErrorMethod::MonteCarlo,
            error_iterations: Some(100),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.json");
        write_summary_json(&path, &summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: FitSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
        assert!(text.contains("\"pc\""));
    }
}

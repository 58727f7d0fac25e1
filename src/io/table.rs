//! Delimited table ingest.
//!
//! Input tables are whatever photometry pipelines tend to emit:
//!
//! - a header row naming the columns
//! - the first column is the row index (star id)
//! - fields separated by runs of whitespace (default) or by a single character
//! - missing values spelled with one of a configurable set of NA tokens
//!
//! Cells are kept as strings so non-numeric columns survive a round trip to
//! the output table; numeric columns are parsed on demand.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use nalgebra::DMatrix;

use crate::error::AppError;

/// How to split and interpret input fields.
#[derive(Debug, Clone)]
pub struct TableFormat {
    /// Single-byte separator, or `None` for any run of whitespace.
    pub sep: Option<u8>,
    /// Tokens read as missing values.
    pub na_values: Vec<String>,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            sep: None,
            na_values: vec!["NA".to_string()],
        }
    }
}

/// An indexed table of string cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub index_name: String,
    pub columns: Vec<String>,
    pub index: Vec<String>,
    pub cells: Vec<Vec<String>>,
    na_values: Vec<String>,
    column_map: HashMap<String, usize>,
}

impl Table {
    pub fn new(
        index_name: String,
        columns: Vec<String>,
        index: Vec<String>,
        cells: Vec<Vec<String>>,
        na_values: Vec<String>,
    ) -> Self {
        let column_map = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            index_name,
            columns,
            index,
            cells,
            na_values,
            column_map,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_map.contains_key(name)
    }

    pub fn is_na(&self, cell: &str) -> bool {
        self.na_values.iter().any(|na| na == cell)
    }

    /// Parse one column as numbers; NA tokens become NaN.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, AppError> {
        let Some(&col) = self.column_map.get(name) else {
            return Err(AppError::new(
                2,
                format!("Missing entry in input table for variable(s): {name}"),
            ));
        };

        self.cells
            .iter()
            .zip(&self.index)
            .map(|(row, id)| {
                let cell = row[col].as_str();
                if self.is_na(cell) {
                    return Ok(f64::NAN);
                }
                cell.parse::<f64>().map_err(|_| {
                    AppError::new(
                        2,
                        format!("Non-numeric value '{cell}' in column '{name}' for row '{id}'."),
                    )
                })
            })
            .collect()
    }

    /// Stack the named columns into an `n_rows × names.len()` matrix.
    pub fn matrix(&self, names: &[String]) -> Result<DMatrix<f64>, AppError> {
        let columns = names
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DMatrix::from_fn(self.n_rows(), names.len(), |i, j| columns[j][i]))
    }

    /// Row position of an index label.
    pub fn row_of(&self, label: &str) -> Option<usize> {
        self.index.iter().position(|id| id == label)
    }
}

/// Read a table from `path`, or from stdin when `path` is `None`.
pub fn read_table(path: Option<&Path>, format: &TableFormat) -> Result<Table, AppError> {
    let mut raw = String::new();
    match path {
        Some(path) => {
            File::open(path)
                .and_then(|mut f| f.read_to_string(&mut raw))
                .map_err(|e| AppError::new(2, format!("Failed to read table '{}': {e}", path.display())))?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| AppError::new(2, format!("Failed to read table from stdin: {e}")))?;
        }
    }
    parse_table(&raw, format)
}

/// Parse table text already held in memory.
pub fn parse_table(raw: &str, format: &TableFormat) -> Result<Table, AppError> {
    // The csv crate only splits on single bytes; collapse whitespace runs to
    // tabs first so "any whitespace" can share the same reader.
    let (text, delimiter) = match format.sep {
        Some(sep) => (raw.to_string(), sep),
        None => {
            let normalized: Vec<String> = raw
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join("\t"))
                .collect();
            (normalized.join("\n"), b'\t')
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read table header: {e}")))?
        .clone();
    let header: Vec<String> = headers.iter().map(normalize_header_name).collect();

    let mut index = Vec::new();
    let mut cells = Vec::new();
    let mut width = None;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and lines are 1-based.
        let line = idx + 2;
        let record: StringRecord =
            result.map_err(|e| AppError::new(2, format!("Table parse error on line {line}: {e}")))?;
        if record.is_empty() {
            continue;
        }

        let len = record.len();
        match width {
            None => width = Some(len),
            Some(w) if w != len => {
                return Err(AppError::new(
                    2,
                    format!("Table line {line} has {len} fields, expected {w}."),
                ));
            }
            Some(_) => {}
        }

        index.push(record[0].to_string());
        cells.push(record.iter().skip(1).map(str::to_string).collect::<Vec<_>>());
    }

    let width = width.unwrap_or(header.len());
    // Some writers omit the index name, leaving the header one field short.
    let (index_name, columns) = if header.len() + 1 == width {
        (String::new(), header)
    } else if header.len() == width && !header.is_empty() {
        (header[0].clone(), header[1..].to_vec())
    } else {
        return Err(AppError::new(
            2,
            format!("Table header has {} fields but rows have {width}.", header.len()),
        ));
    };

    Ok(Table::new(index_name, columns, index, cells, format.na_values.clone()))
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM some editors prepend to the first header.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id    logP   V      I      e_V   e_I
s1    0.5    16.1   15.2   0.02  0.03
s2    0.8    15.4   14.4   NA    0.02

s3    1.1    14.6   13.6   0.01  0.01
";

    #[test]
    fn whitespace_table_parses() {
        let table = parse_table(SAMPLE, &TableFormat::default()).unwrap();
        assert_eq!(table.index_name, "id");
        assert_eq!(table.columns, vec!["logP", "V", "I", "e_V", "e_I"]);
        assert_eq!(table.index, vec!["s1", "s2", "s3"]);

        let e_v = table.column("e_V").unwrap();
        assert!(e_v[1].is_nan());
        assert_eq!(e_v[2], 0.01);
    }

    #[test]
    fn matrix_stacks_requested_columns() {
        let table = parse_table(SAMPLE, &TableFormat::default()).unwrap();
        let m = table.matrix(&["V".to_string(), "I".to_string()]).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m[(1, 0)], 15.4);
        assert_eq!(m[(2, 1)], 13.6);
    }

    #[test]
    fn missing_column_is_reported() {
        let table = parse_table(SAMPLE, &TableFormat::default()).unwrap();
        let err = table.column("K").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("K"));
    }

    #[test]
    fn custom_separator_and_na_tokens() {
        let raw = "star,x,m\na,0.1,-\nb,0.2,3.5\n";
        let format = TableFormat {
            sep: Some(b','),
            na_values: vec!["-".to_string()],
        };
        let table = parse_table(raw, &format).unwrap();
        let m = table.column("m").unwrap();
        assert!(m[0].is_nan());
        assert_eq!(m[1], 3.5);
        assert_eq!(table.row_of("b"), Some(1));
    }

    #[test]
    fn header_without_index_name() {
        let raw = "x m\na 0.1 1.0\nb 0.2 2.0\n";
        let table = parse_table(raw, &TableFormat::default()).unwrap();
        assert_eq!(table.index_name, "");
        assert_eq!(table.columns, vec!["x", "m"]);
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        let raw = "id x\na abc\n";
        let table = parse_table(raw, &TableFormat::default()).unwrap();
        assert!(table.column("x").is_err());
    }
}

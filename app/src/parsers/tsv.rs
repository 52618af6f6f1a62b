// ==============================================================================
// parsers/tsv.rs - Tab-Separated Table Parser
// ==============================================================================
// Description: Headered TSV reader (plain or gzip) with ## metadata lines
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================
// Format: optional "##" metadata lines, one header line, tab-delimited rows
// Example:
//   ##ploidy=2.1
//   chrom    start    end    tcn.em
//   1        10177    24567  2
// ==============================================================================

use csv::ReaderBuilder;
use flate2::read::MultiGzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of metadata lines preceding the column header
pub const META_PREFIX: &str = "##";

/// Errors that can occur while reading or querying a table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TSV parsing error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Invalid value '{value}' for column '{column}' at row {row} in {path}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        path: PathBuf,
    },

    #[error("Table {0} has no header line")]
    EmptyTable(PathBuf),
}

/// In-memory string table, the unit every tool reads and writes
///
/// Missing values are stored as empty strings. Column order is preserved
/// so that unknown columns round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Source path (or a label for derived tables), used in error messages
    pub source: PathBuf,

    /// `##` metadata lines, without trailing newline
    pub meta: Vec<String>,

    /// Column names in file order
    pub columns: Vec<String>,

    /// Rows, each with exactly `columns.len()` fields
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(source: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            source: source.into(),
            meta: Vec::new(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Index of a column, failing fast with the column name when absent
    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
                path: self.source.clone(),
            })
    }

    /// Check that every listed column exists
    pub fn require(&self, names: &[&str]) -> Result<(), TableError> {
        for name in names {
            self.column_index(name)?;
        }
        Ok(())
    }

    /// Value of a column in a row (column must exist)
    pub fn value(&self, row: usize, column: &str) -> Result<&str, TableError> {
        let idx = self.column_index(column)?;
        Ok(self.rows[row][idx].as_str())
    }

    /// Parse a numeric cell; empty cells are `None`
    pub fn parse_f64(&self, row: usize, column: &str) -> Result<Option<f64>, TableError> {
        let raw = self.value(row, column)?.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|_| self.invalid(row, column, raw))
    }

    /// Build an `InvalidValue` error for a cell
    pub fn invalid(&self, row: usize, column: &str, value: &str) -> TableError {
        TableError::InvalidValue {
            column: column.to_string(),
            row: row + 1,
            value: value.to_string(),
            path: self.source.clone(),
        }
    }

    /// Append a column at the end
    pub fn push_column(&mut self, name: &str, values: Vec<String>) {
        self.insert_column(self.columns.len(), name, values);
    }

    /// Insert a column at a position
    pub fn insert_column(&mut self, position: usize, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.insert(position, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(position, value);
        }
    }

    /// Set a column, appending it when absent
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => self.push_column(name, values),
        }
    }

    /// Rename columns; names absent from the map are kept
    pub fn rename_columns(&mut self, old2new: &[(&str, &str)]) {
        for column in self.columns.iter_mut() {
            if let Some((_, new)) = old2new.iter().find(|(old, _)| old == column) {
                *column = new.to_string();
            }
        }
    }

    /// New table with only the listed columns, in the listed order
    pub fn select(&self, names: &[&str]) -> Result<Table, TableError> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table {
            source: self.source.clone(),
            meta: self.meta.clone(),
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Keep only rows for which the predicate holds
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// All values of a column
    pub fn column_values(&self, name: &str) -> Result<Vec<&str>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Lookup from a row key (values of `key_columns`) to row index
    ///
    /// Later duplicate keys overwrite earlier ones.
    pub fn index_by(&self, key_columns: &[&str]) -> Result<HashMap<Vec<String>, usize>, TableError> {
        let indices = key_columns
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut lookup = HashMap::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let key = indices.iter().map(|&i| row[i].clone()).collect();
            lookup.insert(key, row_idx);
        }
        Ok(lookup)
    }

    /// Stack tables vertically over the union of their columns
    ///
    /// Column order follows first appearance; cells of columns absent from
    /// a given table are left empty. Metadata comes from the first table.
    pub fn concat(tables: Vec<Table>, source: impl Into<PathBuf>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let meta = tables.first().map(|t| t.meta.clone()).unwrap_or_default();
        let mut rows = Vec::new();

        for table in tables {
            let mapping: Vec<Option<usize>> = columns
                .iter()
                .map(|c| table.columns.iter().position(|tc| tc == c))
                .collect();

            for row in table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|m| m.map(|i| row[i].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }

        Table {
            source: source.into(),
            meta,
            columns,
            rows,
        }
    }
}

/// Configurable reader for tab-separated tables
#[derive(Debug, Clone)]
pub struct TableReader {
    /// Tokens read as missing values (stored as empty strings)
    pub na_values: Vec<String>,

    /// Column names for headerless files such as BED; `None` reads a header line
    pub columns: Option<Vec<String>>,
}

impl Default for TableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableReader {
    /// Reader with a header line and no NA tokens
    pub fn new() -> Self {
        Self {
            na_values: Vec::new(),
            columns: None,
        }
    }

    /// Set tokens that mean "missing" (e.g. `-` and `.`)
    pub fn with_na_values(mut self, values: &[&str]) -> Self {
        self.na_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Read a headerless file with the given column names
    pub fn headerless(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Parse a table from disk; `.gz` files are decompressed transparently
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Table, TableError> {
        let path = path.as_ref();
        let text = read_text(path)?;
        self.parse_str(&text, path)
    }

    /// Parse a table already loaded in memory
    pub fn parse_str(&self, text: &str, source: &Path) -> Result<Table, TableError> {
        let mut meta = Vec::new();
        let mut body_start = 0;

        for line in text.split_inclusive('\n') {
            if !line.starts_with(META_PREFIX) {
                break;
            }
            meta.push(line.trim_end_matches(['\n', '\r']).to_string());
            body_start += line.len();
        }

        let body = &text[body_start..];
        let has_headers = self.columns.is_none();

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(has_headers)
            .flexible(false)
            .from_reader(body.as_bytes());

        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                let headers = reader.headers().map_err(|e| TableError::Csv {
                    path: source.to_path_buf(),
                    source: e,
                })?;
                if headers.is_empty() {
                    return Err(TableError::EmptyTable(source.to_path_buf()));
                }
                headers.iter().map(|h| h.to_string()).collect()
            }
        };

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| TableError::Csv {
                path: source.to_path_buf(),
                source: e,
            })?;

            let row: Vec<String> = record
                .iter()
                .map(|field| {
                    if self.na_values.iter().any(|na| na == field) {
                        String::new()
                    } else {
                        field.to_string()
                    }
                })
                .collect();

            if row.len() != columns.len() {
                return Err(TableError::InvalidValue {
                    column: "<row>".to_string(),
                    row: rows.len() + 1,
                    value: format!("{} fields, expected {}", row.len(), columns.len()),
                    path: source.to_path_buf(),
                });
            }

            rows.push(row);
        }

        Ok(Table {
            source: source.to_path_buf(),
            meta,
            columns,
            rows,
        })
    }
}

/// Read the `##` metadata lines of a table without parsing the body
pub fn read_meta(path: impl AsRef<Path>) -> Result<Vec<String>, TableError> {
    let text = read_text(path.as_ref())?;
    Ok(text
        .lines()
        .take_while(|line| line.starts_with(META_PREFIX))
        .map(|line| line.to_string())
        .collect())
}

fn read_text(path: &Path) -> Result<String, TableError> {
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut text = String::new();

    if is_gzip_path(path) {
        MultiGzDecoder::new(BufReader::new(file))
            .read_to_string(&mut text)
            .map_err(io_err)?;
    } else {
        BufReader::new(file).read_to_string(&mut text).map_err(io_err)?;
    }

    Ok(text)
}

/// Whether a path names a gzip-compressed file
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

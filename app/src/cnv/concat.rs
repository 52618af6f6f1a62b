// ==============================================================================
// cnv/concat.rs - Per-Pair Table Concatenation
// ==============================================================================
// Description: Merges per-pair tables into cohort tables
// Author: Matt Barham
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::cnv::ensure_barcodes;
use crate::output::{format_number, TableWriter, NA};
use crate::parsers::facets_vcf::VCF_NA_VALUES;
use crate::parsers::tsv::{Table, TableError, TableReader};
use crate::progress::{emit, ProgressEventType, ProgressObserver};

pub const COL_FILTER: &str = "FILTER";

/// Columns rendered without decimals in concatenated CNV tables
pub const NUMERIC_COLUMNS: [&str; 7] = ["chrom", "start", "end", "tcn.em", "lcn.em", "overlap", "svlen"];

/// Expand directories into the files they contain, sorted by path
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }

    files
}

/// Report progress roughly every percent of the inputs
fn report_progress(observer: &dyn ProgressObserver, done: usize, total: usize) {
    let step = (total / 100).max(1);
    if done % step == 0 || done == total {
        emit(
            observer,
            ProgressEventType::FileLoaded,
            None,
            serde_json::json!({ "processed": done, "total": total }),
        );
    }
}

/// Concatenate headered tables, skipping empty files
///
/// `-` and `.` are read as missing. The `##` lines of the first loaded
/// table are kept in the result's metadata.
pub fn concat_tables(files: &[PathBuf], observer: &dyn ProgressObserver) -> Result<Table, TableError> {
    let reader = TableReader::new().with_na_values(&VCF_NA_VALUES);
    let mut tables = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        let size = fs::metadata(file)
            .map_err(|source| TableError::Io {
                path: file.clone(),
                source,
            })?
            .len();

        if size == 0 {
            emit(
                observer,
                ProgressEventType::FileSkipped,
                Some(file.display().to_string()),
                serde_json::json!({ "reason": "file has size 0B" }),
            );
        } else {
            tables.push(reader.read(file)?);
        }

        report_progress(observer, i + 1, files.len());
    }

    Ok(Table::concat(tables, "concatenated"))
}

/// Concatenate per-pair CNV tables
///
/// Barcodes are derived from file names when a table lacks them, a
/// `FILTER` column is added when `svlen` is present, and numeric columns
/// are rendered as integers with `NA` for missing values.
pub fn concat_cnv(files: &[PathBuf], threshold_mb: f64, observer: &dyn ProgressObserver) -> Result<Table, TableError> {
    let mut tables = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        let mut table = TableReader::new().read(file)?;
        ensure_barcodes(&mut table, file)?;
        tables.push(table);
        report_progress(observer, i + 1, files.len());
    }

    let mut merged = Table::concat(tables, "concatenated");
    add_filter_column(&mut merged, threshold_mb)?;
    normalize_numeric_columns(&mut merged);

    Ok(merged)
}

/// Add `FILTER` from `svlen` unless the table already has one
pub fn add_filter_column(table: &mut Table, threshold_mb: f64) -> Result<(), TableError> {
    if !table.has_column("svlen") || table.has_column(COL_FILTER) {
        return Ok(());
    }

    let max_length = threshold_mb * 1e6;
    let failed = format!("SV > {} Mb", threshold_mb);

    let mut values = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        // Unknown lengths do not pass
        let pass = matches!(table.parse_f64(row, "svlen")?, Some(len) if len < max_length);
        values.push(if pass { "PASS".to_string() } else { failed.clone() });
    }

    let passed = values.iter().filter(|v| *v == "PASS").count();
    info!("FILTER: {}/{} segments PASS", passed, values.len());

    table.push_column(COL_FILTER, values);
    Ok(())
}

/// Render numeric columns without decimals, `NA` for missing values
pub fn normalize_numeric_columns(table: &mut Table) {
    for column in NUMERIC_COLUMNS {
        if let Ok(idx) = table.column_index(column) {
            for row in table.rows.iter_mut() {
                row[idx] = format_number(&row[idx], NA);
            }
        }
    }
}

/// concat-tables command body
pub fn concatenate_tables(
    inputs: &[PathBuf],
    output: &Path,
    keep_header: bool,
    observer: &dyn ProgressObserver,
) -> Result<()> {
    let files = collect_inputs(inputs);
    if files.is_empty() {
        bail!("No input tables found");
    }

    let table = concat_tables(&files, observer).context("Failed to concatenate tables")?;
    TableWriter::new().with_meta(keep_header).write(&table, output)?;
    Ok(())
}

/// concat-cnv command body
pub fn concatenate_cnv(
    inputs: &[PathBuf],
    output: &Path,
    threshold_mb: f64,
    observer: &dyn ProgressObserver,
) -> Result<()> {
    let files = collect_inputs(inputs);
    if files.is_empty() {
        bail!("No input CNV tables found");
    }

    let table = concat_cnv(&files, threshold_mb, observer).context("Failed to concatenate CNV tables")?;
    TableWriter::new().write(&table, output)?;
    Ok(())
}

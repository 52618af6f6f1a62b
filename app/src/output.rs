// ==============================================================================
// output.rs - Table Output Generation
// ==============================================================================
// Description: Write tab-separated tables, optionally gzip-compressed
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::parsers::tsv::{is_gzip_path, Table};

/// Token written for missing values in MAF-style outputs
pub const NA: &str = "NA";

/// Writer for [`Table`] values
#[derive(Debug, Clone, Copy, Default)]
pub struct TableWriter {
    /// Re-emit the table's `##` metadata lines before the header
    pub keep_meta: bool,
}

impl TableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preserve `##` metadata lines in the output
    pub fn with_meta(mut self, keep: bool) -> Self {
        self.keep_meta = keep;
        self
    }

    /// Write a table; paths ending in `.gz` are gzip-compressed
    pub fn write(&self, table: &Table, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;

        if is_gzip_path(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            self.write_to(table, &mut encoder)?;
            encoder
                .finish()
                .with_context(|| format!("Failed to finish gzip stream {:?}", path))?
                .flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            self.write_to(table, &mut writer)?;
            writer.flush()?;
        }

        info!("Table with {} rows saved at {:?}", table.len(), path);
        Ok(())
    }

    /// Serialize a table into any writer
    pub fn write_to<W: Write>(&self, table: &Table, mut out: W) -> Result<()> {
        if self.keep_meta {
            for line in &table.meta {
                writeln!(out, "{}", line)?;
            }
        }

        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Necessary)
            .from_writer(&mut out);

        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Render a numeric cell without trailing decimals
///
/// Numbers are truncated to integers (`4.0` -> `4`), missing values become
/// `na` and non-numeric text is kept as is.
pub fn format_number(value: &str, na: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return na.to_string();
    }

    match trimmed.parse::<f64>() {
        Ok(number) if number.is_nan() => na.to_string(),
        Ok(number) if number.is_finite() => format!("{}", number.trunc() as i64),
        _ => trimmed.to_string(),
    }
}

/// Render a float with a fixed number of decimals, empty for `None`
pub fn format_float(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::tsv::TableReader;
    use tempfile::tempdir;

    fn sample_table() -> Table {
        let mut table = Table::new("sample", vec!["a".to_string(), "b".to_string()]);
        table.meta.push("##ploidy=2".to_string());
        table.rows.push(vec!["1".to_string(), "x".to_string()]);
        table
    }

    #[test]
    fn test_write_with_meta() {
        let mut buffer = Vec::new();
        TableWriter::new()
            .with_meta(true)
            .write_to(&sample_table(), &mut buffer)
            .unwrap();

        assert_eq!(String::from_utf8(buffer).unwrap(), "##ploidy=2\na\tb\n1\tx\n");
    }

    #[test]
    fn test_write_without_meta() {
        let mut buffer = Vec::new();
        TableWriter::new().write_to(&sample_table(), &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "a\tb\n1\tx\n");
    }

    #[test]
    fn test_gzip_output_is_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("table.tsv.gz");

        TableWriter::new().with_meta(true).write(&sample_table(), &path).unwrap();

        let table = TableReader::new().read(&path).unwrap();
        assert_eq!(table.meta, vec!["##ploidy=2"]);
        assert_eq!(table.rows, vec![vec!["1", "x"]]);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number("4.0", NA), "4");
        assert_eq!(format_number("12500000", NA), "12500000");
        assert_eq!(format_number("-2.0", NA), "-2");
        assert_eq!(format_number("", NA), "NA");
        assert_eq!(format_number("nan", NA), "NA");
        assert_eq!(format_number("X", NA), "X");
        assert_eq!(format_float(Some(1.23456), 3), "1.235");
        assert_eq!(format_float(None, 3), "");
    }
}

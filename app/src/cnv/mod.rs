// ==============================================================================
// cnv/mod.rs - Copy-Number Table Tools
// ==============================================================================
// Description: Segment labelling, arm classification, gene calls and merges
// Author: Matt Barham
// Created: 2026-10-14
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod thresholds;
pub mod rules;
pub mod chr_arm;
pub mod vcf_table;
pub mod gene_calls;
pub mod filter_calls;
pub mod concat;

pub use rules::{Classification, ClassificationRule, Predicate, RuleParseError, RuleSet};
pub use thresholds::{label_copy_number, CnaLabel};

use std::path::Path;

use crate::models::{barcodes_from_path, COL_NORMAL_BARCODE, COL_TUMOR_BARCODE};
use crate::parsers::tsv::{Table, TableError};

/// Add tumor/normal barcode columns derived from the file name when the
/// table has neither
pub fn ensure_barcodes(table: &mut Table, path: &Path) -> Result<(), TableError> {
    if table.has_column(COL_TUMOR_BARCODE) || table.has_column(COL_NORMAL_BARCODE) {
        return Ok(());
    }

    let (tumor, normal) = barcodes_from_path(path).ok_or_else(|| TableError::MissingColumn {
        column: COL_TUMOR_BARCODE.to_string(),
        path: path.to_path_buf(),
    })?;

    let n = table.len();
    table.insert_column(0, COL_TUMOR_BARCODE, vec![tumor; n]);
    table.insert_column(1, COL_NORMAL_BARCODE, vec![normal; n]);
    Ok(())
}

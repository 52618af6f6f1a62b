// ==============================================================================
// cnv/vcf_table.rs - Segment VCF to Table Conversion
// ==============================================================================
// Description: Flattens a cnv_facets VCF into a labelled segment table
// Author: Matt Barham
// Created: 2026-10-14
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::cnv::thresholds::{label_copy_number, CnaLabel};
use crate::models::Gender;
use crate::output::{format_number, TableWriter};
use crate::parsers::facets_vcf::{header_value, read_facets_vcf};
use crate::parsers::tsv::{Table, TableError};

/// Columns of the segment table, in output order
pub const SEGMENT_COLUMNS: [&str; 16] = [
    "chrom",
    "seg",
    "num.mark",
    "nhet",
    "cnlr.median",
    "mafR",
    "segclust",
    "cnlr.median.clust",
    "mafR.clust",
    "start",
    "end",
    "cf.em",
    "tcn.em",
    "lcn.em",
    "svtype",
    "svlen",
];

pub const COL_COPY_NUMBER: &str = "copy_number";
pub const COL_COPY_NUMBER_MORE: &str = "copy_number_more";

/// Chromosomes present in a single copy in male samples
const MALE_HAPLOID_CHROMOSOMES: [&str; 4] = ["X", "Y", "23", "24"];

const COLUMN_RENAMES: [(&str, &str); 5] = [
    ("#chrom", "chrom"),
    ("id", "seg"),
    ("pos", "start"),
    ("maf.r", "mafR"),
    ("maf.r.clust", "mafR.clust"),
];

/// Lower-case a VCF column or INFO key and map it to its segment-table name
pub fn normalize_column_name(name: &str) -> String {
    let normalized = name.to_lowercase().replace('_', ".");
    COLUMN_RENAMES
        .iter()
        .find(|(old, _)| *old == normalized)
        .map(|(_, new)| new.to_string())
        .unwrap_or(normalized)
}

/// Ploidy of a chromosome given the sample average
pub fn chromosome_ploidy(chrom: &str, sample_ploidy: f64, gender: Gender) -> f64 {
    if gender == Gender::Male && MALE_HAPLOID_CHROMOSOMES.contains(&chrom) {
        sample_ploidy / 2.0
    } else {
        sample_ploidy
    }
}

/// Build the labelled segment table from an INFO-expanded VCF
pub fn segments_table(vcf: &Table, gender: Gender) -> Result<Table, TableError> {
    let mut table = vcf.clone();
    table.columns = table.columns.iter().map(|c| normalize_column_name(c)).collect();
    let mut table = table.select(&SEGMENT_COLUMNS)?;

    // A missing ploidy leaves only hom_del detectable
    let sample_ploidy = header_value(&table.meta, "ploidy").unwrap_or(f64::NAN);

    let mut labels: Vec<Option<CnaLabel>> = Vec::with_capacity(table.len());
    let mut summary: BTreeMap<CnaLabel, Vec<String>> = BTreeMap::new();

    for row in 0..table.len() {
        let chrom = table.value(row, "chrom")?.to_string();
        let ploidy = chromosome_ploidy(&chrom, sample_ploidy, gender);
        let label = label_copy_number(
            table.parse_f64(row, "tcn.em")?,
            table.parse_f64(row, "lcn.em")?,
            ploidy,
        );

        if let Some(label) = label {
            let chroms = summary.entry(label).or_default();
            if !chroms.contains(&chrom) {
                chroms.push(chrom);
            }
        }
        labels.push(label);
    }

    for label in CnaLabel::ALL {
        let chroms = summary.get(&label).cloned().unwrap_or_default();
        let count = labels.iter().filter(|l| **l == Some(label)).count();
        info!("Identified {} {} segments (chr {})", count, label, chroms.join(";"));
    }

    // Integer rendering without trailing decimals
    for column in ["tcn.em", "lcn.em", "svlen"] {
        let idx = table.column_index(column)?;
        for row in table.rows.iter_mut() {
            row[idx] = format_number(&row[idx], "");
        }
    }

    table.push_column(
        COL_COPY_NUMBER_MORE,
        labels
            .iter()
            .map(|l| l.map(|l| l.as_str().to_string()).unwrap_or_default())
            .collect(),
    );
    table.push_column(
        COL_COPY_NUMBER,
        labels
            .iter()
            .map(|l| {
                l.and_then(|l| l.copy_number())
                    .map(|cn| cn.to_string())
                    .unwrap_or_default()
            })
            .collect(),
    );

    Ok(table)
}

/// Convert one VCF file and write the segment table
pub fn convert_vcf(input: &Path, output: &Path, gender: Gender, keep_header: bool) -> Result<()> {
    let vcf = read_facets_vcf(input).with_context(|| format!("Failed to read VCF {:?}", input))?;
    let table = segments_table(&vcf, gender)?;

    TableWriter::new().with_meta(keep_header).write(&table, output)?;
    Ok(())
}

// ==============================================================================
// cnv/gene_calls.rs - Gene-Level Copy-Number Calls
// ==============================================================================
// Description: Intersects gene intervals with copy-number segments
// Author: Matt Barham
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Every gene yields one row per overlapping segment (half-open intervals on
// the same chromosome name), or a single row with empty segment fields and
// overlap 0 when nothing overlaps it.
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::cnv::ensure_barcodes;
use crate::cnv::vcf_table::{COL_COPY_NUMBER, COL_COPY_NUMBER_MORE};
use crate::models::{COL_NORMAL_BARCODE, COL_TUMOR_BARCODE};
use crate::output::{format_number, TableWriter};
use crate::parsers::facets_vcf::VCF_NA_VALUES;
use crate::parsers::tsv::{Table, TableError, TableReader};

/// Columns of the headerless gene BED file
pub const GENE_BED_COLUMNS: [&str; 7] = [
    "chrom_gene",
    "start_gene",
    "end_gene",
    "gene_id",
    "gene_name",
    "gene_biotype",
    "gene_source",
];

/// Segment columns carried into gene calls
pub const SEGMENT_COLUMNS: [&str; 11] = [
    "chrom",
    "start",
    "end",
    "tcn.em",
    "lcn.em",
    "svtype",
    "svlen",
    COL_COPY_NUMBER,
    COL_COPY_NUMBER_MORE,
    COL_TUMOR_BARCODE,
    COL_NORMAL_BARCODE,
];

/// Output columns, in order
pub const GENE_CALL_COLUMNS: [&str; 18] = [
    COL_TUMOR_BARCODE,
    COL_NORMAL_BARCODE,
    "chrom",
    "start",
    "end",
    "gene_id",
    "gene",
    "gene_biotype",
    "gene_source",
    "tcn.em",
    "lcn.em",
    "overlap",
    "svtype",
    "svstart",
    "svend",
    "svlen",
    COL_COPY_NUMBER,
    COL_COPY_NUMBER_MORE,
];

/// Length of the intersection of two half-open intervals
pub fn overlap_length(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> u64 {
    a_end.min(b_end).saturating_sub(a_start.max(b_start))
}

fn parse_position(table: &Table, row: usize, column: &str) -> Result<Option<u64>, TableError> {
    match table.parse_f64(row, column)? {
        Some(v) if v >= 0.0 => Ok(Some(v as u64)),
        Some(_) => Err(table.invalid(row, column, table.value(row, column)?)),
        None => Ok(None),
    }
}

struct SegmentSpan {
    row: usize,
    start: u64,
    end: u64,
}

/// Build gene-level calls from genes and segments
pub fn gene_calls(genes: &Table, segments: &Table) -> Result<Table, TableError> {
    genes.require(&GENE_BED_COLUMNS)?;
    segments.require(&SEGMENT_COLUMNS)?;

    // Segments per chromosome, file order
    let mut by_chrom: HashMap<&str, Vec<SegmentSpan>> = HashMap::new();
    let mut skipped = 0;
    for row in 0..segments.len() {
        match (
            parse_position(segments, row, "start")?,
            parse_position(segments, row, "end")?,
        ) {
            (Some(start), Some(end)) => by_chrom
                .entry(segments.value(row, "chrom")?)
                .or_default()
                .push(SegmentSpan { row, start, end }),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} segments without coordinates in {:?}", skipped, segments.source);
    }

    let mut calls = Table::new(segments.source.clone(), GENE_CALL_COLUMNS.iter().map(|c| c.to_string()).collect());
    let mut genes_without_overlap = 0;

    for gene_row in 0..genes.len() {
        let chrom = genes.value(gene_row, "chrom_gene")?;
        let gene_start = parse_position(genes, gene_row, "start_gene")?
            .ok_or_else(|| genes.invalid(gene_row, "start_gene", ""))?;
        let gene_end = parse_position(genes, gene_row, "end_gene")?
            .ok_or_else(|| genes.invalid(gene_row, "end_gene", ""))?;

        let gene_fields = [
            chrom.to_string(),
            gene_start.to_string(),
            gene_end.to_string(),
            genes.value(gene_row, "gene_id")?.to_string(),
            genes.value(gene_row, "gene_name")?.to_string(),
            genes.value(gene_row, "gene_biotype")?.to_string(),
            genes.value(gene_row, "gene_source")?.to_string(),
        ];

        let mut hits = 0;
        for span in by_chrom.get(chrom).map(|v| v.as_slice()).unwrap_or_default() {
            let overlap = overlap_length(gene_start, gene_end, span.start, span.end);
            if overlap == 0 {
                continue;
            }
            hits += 1;

            let seg = |column: &str| segments.value(span.row, column).map(|v| v.to_string());
            let [g_chrom, g_start, g_end, g_id, g_name, g_biotype, g_source] = gene_fields.clone();

            calls.rows.push(vec![
                seg(COL_TUMOR_BARCODE)?,
                seg(COL_NORMAL_BARCODE)?,
                g_chrom,
                g_start,
                g_end,
                g_id,
                g_name,
                g_biotype,
                g_source,
                format_number(segments.value(span.row, "tcn.em")?, ""),
                format_number(segments.value(span.row, "lcn.em")?, ""),
                overlap.to_string(),
                seg("svtype")?,
                span.start.to_string(),
                span.end.to_string(),
                seg("svlen")?,
                seg(COL_COPY_NUMBER)?,
                seg(COL_COPY_NUMBER_MORE)?,
            ]);
        }

        if hits == 0 {
            genes_without_overlap += 1;
            let [g_chrom, g_start, g_end, g_id, g_name, g_biotype, g_source] = gene_fields;
            let mut row = vec![
                String::new(),
                String::new(),
                g_chrom,
                g_start,
                g_end,
                g_id,
                g_name,
                g_biotype,
                g_source,
            ];
            row.extend(["", "", "0", "", "", "", "", "", ""].iter().map(|s| s.to_string()));
            calls.rows.push(row);
        }
    }

    info!(
        "{} gene calls for {} genes ({} without overlapping segment)",
        calls.len(),
        genes.len(),
        genes_without_overlap
    );

    Ok(calls)
}

/// Read segments and genes, write gene-level calls
pub fn annotate_genes(segments_path: &Path, genes_path: &Path, output: &Path) -> Result<()> {
    let mut segments = TableReader::new()
        .with_na_values(&VCF_NA_VALUES)
        .read(segments_path)
        .with_context(|| format!("Failed to read segments {:?}", segments_path))?;
    ensure_barcodes(&mut segments, segments_path)?;

    let genes = TableReader::new()
        .headerless(&GENE_BED_COLUMNS)
        .read(genes_path)
        .with_context(|| format!("Failed to read gene BED {:?}", genes_path))?;

    let calls = gene_calls(&genes, &segments)?;
    TableWriter::new().write(&calls, output)?;
    Ok(())
}

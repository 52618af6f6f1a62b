// ==============================================================================
// batch/samples.rs - Sample Table Preparation
// ==============================================================================
// Description: Builds tumor/normal pairs from a samples table and assigns
//              processing batches
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::batch::indices::{basename, COL_BATCH};
use crate::batch::packer::{BatchPacker, PackerConfig, PackingResult, BYTES_PER_GIB};
use crate::models::{SamplePair, SampleType};
use crate::output::TableWriter;
use crate::parsers::tsv::{Table, TableError, TableReader};
use crate::progress::ProgressObserver;

pub const COL_SAMPLE_ID: &str = "Sample_Id";
pub const COL_SUBJECT_ID: &str = "Subject_Id";
pub const COL_SAMPLE_TYPE: &str = "Sample_Type";
pub const COL_FILE_SIZE: &str = "File_Size";
pub const COL_INDEX_FILE_SIZE: &str = "Index_File_Size";
pub const COL_FILE_NAME_KEY: &str = "File_Name_Key";
pub const COL_INDEX_FILE_NAME_KEY: &str = "Index_File_Name_Key";
pub const COL_FILE_NAME: &str = "File_Name";
pub const COL_INDEX_FILE_NAME: &str = "Index_File_Name";
pub const COL_TOTAL_SIZE_GB: &str = "Total_Size_Gb";

/// Pair table columns
pub const PAIR_COLUMNS: [&str; 9] = [
    COL_SUBJECT_ID,
    "DNA_T",
    "DNA_N",
    "DNA_P",
    "File_Size_T",
    "File_Size_N",
    "File_Size_P",
    COL_BATCH,
    "Seeded",
];

/// One sequenced DNA sample usable for pairing
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Row in the source table
    pub row: usize,
    pub sample_id: String,
    pub subject_id: String,
    pub sample_type: SampleType,
    pub file_size: u64,
    pub index_file_size: Option<u64>,
}

fn parse_size(table: &Table, row: usize, column: &str) -> Result<Option<u64>, TableError> {
    if !table.has_column(column) {
        return Ok(None);
    }
    match table.parse_f64(row, column)? {
        Some(size) if size >= 0.0 => Ok(Some(size as u64)),
        Some(_) => Err(table.invalid(row, column, table.value(row, column)?)),
        None => Ok(None),
    }
}

/// DNA_T/DNA_N rows with every required value present
pub fn read_sample_records(table: &Table) -> Result<Vec<SampleRecord>, TableError> {
    table.require(&[COL_SAMPLE_ID, COL_SUBJECT_ID, COL_SAMPLE_TYPE, COL_FILE_SIZE])?;

    let mut records = Vec::new();
    let mut incomplete = 0;

    for row in 0..table.len() {
        let Some(sample_type) = SampleType::parse(table.value(row, COL_SAMPLE_TYPE)?) else {
            continue;
        };

        let sample_id = table.value(row, COL_SAMPLE_ID)?.trim();
        let subject_id = table.value(row, COL_SUBJECT_ID)?.trim();
        let file_size = parse_size(table, row, COL_FILE_SIZE)?;

        match (sample_id.is_empty(), subject_id.is_empty(), file_size) {
            (false, false, Some(file_size)) => records.push(SampleRecord {
                row,
                sample_id: sample_id.to_string(),
                subject_id: subject_id.to_string(),
                sample_type,
                file_size,
                index_file_size: parse_size(table, row, COL_INDEX_FILE_SIZE)?,
            }),
            _ => incomplete += 1,
        }
    }

    if incomplete > 0 {
        warn!("Dropped {} DNA samples with missing values", incomplete);
    }

    Ok(records)
}

/// Every tumor x normal combination within each subject
pub fn build_pairs(records: &[SampleRecord]) -> Vec<SamplePair> {
    let mut by_subject: BTreeMap<&str, (Vec<&SampleRecord>, Vec<&SampleRecord>)> = BTreeMap::new();
    for record in records {
        let entry = by_subject.entry(record.subject_id.as_str()).or_default();
        match record.sample_type {
            SampleType::Tumor => entry.0.push(record),
            SampleType::Normal => entry.1.push(record),
        }
    }

    let mut pairs = Vec::new();
    for (subject, (tumors, normals)) in by_subject {
        for tumor in &tumors {
            for normal in &normals {
                pairs.push(SamplePair::new(
                    tumor.sample_id.clone(),
                    normal.sample_id.clone(),
                    subject,
                    tumor.file_size + normal.file_size,
                ));
            }
        }
    }
    pairs.sort_by_key(|p| p.pair_id());
    pairs
}

fn gib(bytes: u64) -> String {
    format!("{}", bytes as f64 / BYTES_PER_GIB as f64)
}

/// Pair table with batch assignments, sorted by pair identifier
pub fn pairs_table(result: &PackingResult, records: &[SampleRecord]) -> Table {
    let sizes: HashMap<&str, u64> = records.iter().map(|r| (r.sample_id.as_str(), r.file_size)).collect();
    let size_of = |sample: &str| sizes.get(sample).copied().unwrap_or_default();

    let mut rows: Vec<Vec<String>> = result
        .batches
        .iter()
        .flat_map(|batch| {
            batch.pairs.iter().map(move |pair| {
                vec![
                    pair.subject_id.clone(),
                    pair.tumor_sample_id.clone(),
                    pair.normal_sample_id.clone(),
                    pair.pair_id(),
                    String::new(),
                    String::new(),
                    gib(pair.paired_file_size_bytes),
                    batch.index.to_string(),
                    if batch.seeded { "1" } else { "0" }.to_string(),
                ]
            })
        })
        .collect();

    for row in rows.iter_mut() {
        row[4] = gib(size_of(&row[1]));
        row[5] = gib(size_of(&row[2]));
    }
    rows.sort_by(|a, b| a[3].cmp(&b[3]));

    let mut table = Table::new("tumor_normal_pairs", PAIR_COLUMNS.iter().map(|c| c.to_string()).collect());
    table.rows = rows;
    table
}

/// Source rows of paired samples with file names, total size and batch
pub fn samples_table(
    source: &Table,
    records: &[SampleRecord],
    sample_batches: &BTreeMap<String, usize>,
) -> Result<Table, TableError> {
    let mut table = Table::new(source.source.clone(), source.columns.clone());
    let mut file_names = Vec::new();
    let mut index_names = Vec::new();
    let mut totals = Vec::new();
    let mut batches = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for record in records {
        let Some(batch) = sample_batches.get(&record.sample_id) else {
            continue;
        };
        if !seen.insert(record.sample_id.as_str()) {
            continue;
        }

        let key = |column: &str| -> Result<String, TableError> {
            if source.has_column(column) {
                Ok(basename(source.value(record.row, column)?).to_string())
            } else {
                Ok(String::new())
            }
        };

        table.rows.push(source.rows[record.row].clone());
        file_names.push(key(COL_FILE_NAME_KEY)?);
        index_names.push(key(COL_INDEX_FILE_NAME_KEY)?);
        totals.push(gib(record.file_size + record.index_file_size.unwrap_or_default()));
        batches.push(batch.to_string());
    }

    table.set_column(COL_FILE_NAME, file_names);
    table.set_column(COL_INDEX_FILE_NAME, index_names);
    table.set_column(COL_TOTAL_SIZE_GB, totals);
    table.set_column(COL_BATCH, batches);

    Ok(table)
}

/// prepare-samples command body
pub fn prepare_samples(
    input: &Path,
    samples_output: &Path,
    pairs_output: &Path,
    config: PackerConfig,
    observer: &dyn ProgressObserver,
) -> Result<()> {
    let source = TableReader::new()
        .read(input)
        .with_context(|| format!("Failed to read samples table {:?}", input))?;
    let records = read_sample_records(&source)?;
    let pairs = build_pairs(&records);

    info!(
        "{} DNA samples form {} tumor/normal pairs",
        records.len(),
        pairs.len()
    );

    let result = BatchPacker::new(config).pack(&pairs, observer)?;
    let sample_batches = result.sample_batches()?;

    let writer = TableWriter::new();
    writer.write(&samples_table(&source, &records, &sample_batches)?, samples_output)?;
    writer.write(&pairs_table(&result, &records), pairs_output)?;

    Ok(())
}

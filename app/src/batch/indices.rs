// ==============================================================================
// batch/indices.rs - Batch Index Selection
// ==============================================================================
// Description: Batch indices from VM log names, instance names and tables
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// VM startup logs are named "{prefix}{batch}{suffix}", for example
//   startup_gcloud_vm_12.log               (processed)
//   startup_gcloud_vm_first_12.log         (first failure)
//   startup_gcloud_vm_third_error12.log    (third failure)
// Instances running a batch are named "facets-tcga-{batch}".
// ==============================================================================

use std::collections::BTreeSet;

use crate::parsers::tsv::{Table, TableError};

pub const VM_LOG_PREFIX: &str = "startup_gcloud_vm_";
pub const VM_LOG_SUFFIX: &str = ".log";
pub const FIRST_FAILURE_PREFIX: &str = "startup_gcloud_vm_first_";
pub const THIRD_FAILURE_PREFIX: &str = "startup_gcloud_vm_third_error";
pub const FOURTH_FAILURE_PREFIX: &str = "startup_gcloud_vm_fourth_";
pub const DEFAULT_INSTANCE_PREFIX: &str = "facets-tcga-";

pub const COL_BATCH: &str = "Batch";

/// Last segment of a path or object URI
pub fn basename(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}

/// Batch index encoded in a log name, `None` when the name does not match
pub fn parse_batch_index(name: &str, prefix: &str, suffix: &str) -> Option<usize> {
    let rest = basename(name).strip_prefix(prefix)?;
    let index = match rest.find(suffix) {
        Some(end) if !suffix.is_empty() => &rest[..end],
        _ => rest,
    };
    index.parse().ok()
}

/// Distinct batch indices among log names
pub fn batch_indices_from_names<I, S>(names: I, prefix: &str, suffix: &str) -> BTreeSet<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| parse_batch_index(name.as_ref(), prefix, suffix))
        .collect()
}

/// Batches whose instance name carries the prefix
pub fn running_batches<I, S>(instance_names: I, prefix: &str) -> BTreeSet<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    instance_names
        .into_iter()
        .filter_map(|name| name.as_ref().trim().strip_prefix(prefix)?.parse().ok())
        .collect()
}

/// Inclusive range of batch indices, unbounded above when `max` is `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub min: usize,
    pub max: Option<usize>,
}

impl Default for BatchRange {
    fn default() -> Self {
        Self { min: 1, max: None }
    }
}

impl BatchRange {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        Self { min, max }
    }

    /// Build from command-line values where a negative max means no limit
    pub fn from_cli(min: usize, max: i64) -> Self {
        Self {
            min,
            max: usize::try_from(max).ok(),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.min && self.max.map_or(true, |max| index <= max)
    }

    pub fn filter<I>(self, indices: I) -> impl Iterator<Item = usize>
    where
        I: IntoIterator<Item = usize>,
    {
        indices.into_iter().filter(move |i| self.contains(*i))
    }
}

/// Distinct values of the `Batch` column
pub fn batches_in_table(table: &Table) -> Result<BTreeSet<usize>, TableError> {
    let idx = table.column_index(COL_BATCH)?;
    let mut batches = BTreeSet::new();

    for (row, values) in table.rows.iter().enumerate() {
        let raw = values[idx].trim();
        if raw.is_empty() {
            continue;
        }
        let batch = raw
            .parse::<f64>()
            .ok()
            .filter(|b| *b >= 0.0 && b.fract() == 0.0)
            .ok_or_else(|| table.invalid(row, COL_BATCH, raw))?;
        batches.insert(batch as usize);
    }

    Ok(batches)
}

/// Batches in range, minus those already processed or failed for good
pub fn pending_batches(
    scheduled: &BTreeSet<usize>,
    range: BatchRange,
    processed: &BTreeSet<usize>,
    failed: &[&BTreeSet<usize>],
) -> Vec<usize> {
    range
        .filter(scheduled.iter().copied())
        .filter(|b| !processed.contains(b))
        .filter(|b| failed.iter().all(|f| !f.contains(b)))
        .collect()
}

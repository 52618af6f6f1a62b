// ==============================================================================
// select_pairs.rs - Tumor/Normal Pair Selection
// ==============================================================================
// Description: Keeps the pairs whose annotated outputs are missing or stale
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info};

use cnv_processor::output::TableWriter;
use cnv_processor::parsers::tsv::TableReader;

use crate::config::join_uri;
use crate::storage::{ObjectStore, StorageError};

pub const COL_PAIR: &str = "DNA_P";

/// Bucket folders holding one `<pair>.tsv` per processed pair
pub const EXPECTED_OUTPUTS: [&str; 2] = [
    "results/annotation/somatic_cna_civic",
    "results/annotation/somatic_cna_oncokb",
];

/// Parse a `DD/MM/YYYY` date
pub fn parse_date_min(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%d/%m/%Y").map_err(|e| format!("expected DD/MM/YYYY, got '{}': {}", value, e))
}

/// Whether a pair must be (re)run
///
/// True when an expected output is missing or, given `updated_since`, when
/// one was last updated before that date.
pub async fn needs_run(
    store: &dyn ObjectStore,
    bucket: &str,
    pair: &str,
    updated_since: Option<NaiveDate>,
) -> Result<bool, StorageError> {
    let mut update_times = Vec::with_capacity(EXPECTED_OUTPUTS.len());
    for folder in EXPECTED_OUTPUTS {
        let name = format!("{}.tsv", pair);
        let uri = join_uri(bucket, &[folder, name.as_str()]);
        match store.stat(&uri).await? {
            Some(updated) => update_times.push(updated),
            None => {
                debug!("{} does not exist", uri);
                return Ok(true);
            }
        }
    }

    Ok(match updated_since {
        Some(date) => update_times.iter().any(|t| t.date_naive() < date),
        None => false,
    })
}

/// select-pairs command body, rewrites the pairs table in place
pub async fn select_pairs(
    store: &dyn ObjectStore,
    pairs_path: &Path,
    bucket: &str,
    updated_since: Option<NaiveDate>,
) -> Result<usize> {
    let mut table = TableReader::new()
        .read(pairs_path)
        .with_context(|| format!("Failed to read pairs table {:?}", pairs_path))?;

    let pairs: Vec<String> = table.column_values(COL_PAIR)?.into_iter().map(str::to_string).collect();
    let mut keep = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let run = needs_run(store, bucket, pair, updated_since)
            .await
            .with_context(|| format!("Failed to check outputs of {}", pair))?;
        debug!("{}: {}", pair, if run { "RUN" } else { "done" });
        keep.push(run);
    }

    let mut flags = keep.iter();
    table.retain_rows(|_| flags.next().copied().unwrap_or(false));
    info!("{}/{} pairs need to be run", table.len(), pairs.len());

    TableWriter::new().write(&table, pairs_path)?;
    Ok(table.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_date_min() {
        assert_eq!(parse_date_min("23/11/2022").unwrap(), NaiveDate::from_ymd_opt(2022, 11, 23).unwrap());
        assert!(parse_date_min("2022-11-23").is_err());
    }

    #[tokio::test]
    async fn test_select_pairs() {
        let store = MemoryStore::new();
        let old = Utc.with_ymd_and_hms(2022, 11, 1, 8, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2022, 11, 25, 8, 0, 0).unwrap();
        for (pair, civic, oncokb) in [("A_vs_B", Some(recent), Some(recent)), ("C_vs_D", Some(recent), Some(old)), ("E_vs_F", Some(recent), None)] {
            if let Some(t) = civic {
                store.insert(format!("gs://r/results/annotation/somatic_cna_civic/{}.tsv", pair), t);
            }
            if let Some(t) = oncokb {
                store.insert(format!("gs://r/results/annotation/somatic_cna_oncokb/{}.tsv", pair), t);
            }
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("tumor_normal_pairs.tsv");
        let text = "DNA_T\tDNA_N\tDNA_P\nA\tB\tA_vs_B\nC\tD\tC_vs_D\nE\tF\tE_vs_F\n";

        fs::write(&path, text).unwrap();
        assert_eq!(select_pairs(&store, &path, "gs://r", None).await.unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "DNA_T\tDNA_N\tDNA_P\nE\tF\tE_vs_F\n");

        fs::write(&path, text).unwrap();
        let since = parse_date_min("23/11/2022").unwrap();
        assert_eq!(select_pairs(&store, &path, "gs://r", Some(since)).await.unwrap(), 2);
        let table = TableReader::new().read(&path).unwrap();
        assert_eq!(table.column_values("DNA_P").unwrap(), vec!["C_vs_D", "E_vs_F"]);
    }
}

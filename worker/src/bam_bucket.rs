// ==============================================================================
// bam_bucket.rs - BAM Bucket Population
// ==============================================================================
// Description: Copies the BAM/BAI files of a batch into the working bucket and
//              removes them once the batch is done
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use cnv_processor::batch::indices::{basename, COL_BATCH};
use cnv_processor::batch::samples::{COL_FILE_NAME_KEY, COL_INDEX_FILE_NAME_KEY, COL_SAMPLE_ID};
use cnv_processor::parsers::tsv::{Table, TableError, TableReader};
use cnv_processor::progress::{emit, ProgressEventType, ProgressObserver};

use crate::config::join_uri;
use crate::copy_pool::{run_copy_jobs, CopyJob, CopySummary};
use crate::storage::ObjectStore;

/// Samples to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSelection {
    Batch(usize),
    Samples(Vec<String>),
}

/// Where the files of one sample come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BamLocation {
    pub sample_id: String,
    pub bam_key: String,
    pub bai_key: String,
}

impl BamLocation {
    pub fn bam_name(&self) -> String {
        format!("{}.bam", self.sample_id)
    }

    pub fn bai_name(&self) -> String {
        format!("{}.bai", self.sample_id)
    }
}

/// Distinct sample ids of a batch, in table order
pub fn samples_in_batch(table: &Table, batch: usize) -> Result<Vec<String>, TableError> {
    table.require(&[COL_SAMPLE_ID, COL_BATCH])?;

    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for row in 0..table.len() {
        if table.parse_f64(row, COL_BATCH)? != Some(batch as f64) {
            continue;
        }
        let sample = table.value(row, COL_SAMPLE_ID)?;
        if seen.insert(sample) {
            samples.push(sample.to_string());
        }
    }
    Ok(samples)
}

/// Resolve selected samples against the table
///
/// Returns the samples found, in selection order, and those missing.
pub fn resolve_samples(table: &Table, selection: &SampleSelection) -> Result<(Vec<String>, Vec<String>), TableError> {
    match selection {
        SampleSelection::Batch(batch) => Ok((samples_in_batch(table, *batch)?, Vec::new())),
        SampleSelection::Samples(requested) => {
            let known: HashSet<&str> = table.column_values(COL_SAMPLE_ID)?.into_iter().collect();
            let (found, missing): (Vec<String>, Vec<String>) =
                requested.iter().cloned().partition(|s| known.contains(s.as_str()));
            Ok((found, missing))
        }
    }
}

/// Source keys of the samples present in the table
pub fn bam_locations(table: &Table, samples: &[String]) -> Result<Vec<BamLocation>, TableError> {
    table.require(&[COL_SAMPLE_ID, COL_FILE_NAME_KEY, COL_INDEX_FILE_NAME_KEY])?;
    let index = table.index_by(&[COL_SAMPLE_ID])?;

    let mut locations = Vec::with_capacity(samples.len());
    for sample in samples {
        if let Some(&row) = index.get(&vec![sample.clone()]) {
            locations.push(BamLocation {
                sample_id: sample.clone(),
                bam_key: table.value(row, COL_FILE_NAME_KEY)?.to_string(),
                bai_key: table.value(row, COL_INDEX_FILE_NAME_KEY)?.to_string(),
            });
        }
    }
    Ok(locations)
}

/// Copy jobs placing `<sample>.bam` and `<sample>.bai` in the bucket
///
/// Files are copied under their source name, then renamed. Existing
/// destinations are left alone.
pub fn copy_jobs(bucket: &str, locations: &[BamLocation]) -> Vec<CopyJob> {
    locations
        .iter()
        .flat_map(move |loc| {
            [(&loc.bam_key, loc.bam_name()), (&loc.bai_key, loc.bai_name())]
                .into_iter()
                .map(move |(key, name)| CopyJob {
                    source: key.clone(),
                    staging: join_uri(bucket, &[basename(key)]),
                    destination: join_uri(bucket, &[name.as_str()]),
                    overwrite: false,
                })
        })
        .collect()
}

fn read_samples(path: &Path) -> Result<Table> {
    TableReader::new()
        .read(path)
        .with_context(|| format!("Failed to read samples table {:?}", path))
}

/// populate-bam command body
pub async fn populate_bam(
    store: Arc<dyn ObjectStore>,
    observer: Arc<dyn ProgressObserver>,
    samples_path: &Path,
    bucket: &str,
    selection: &SampleSelection,
    workers: usize,
) -> Result<CopySummary> {
    let table = read_samples(samples_path)?;
    let (samples, missing) = resolve_samples(&table, selection)?;

    if samples.is_empty() {
        warn!("No samples of {:?} found in {:?}", selection, samples_path);
    }
    if !missing.is_empty() {
        warn!("Samples missing from {:?}: {}", samples_path, missing.join(", "));
    }

    let jobs = copy_jobs(bucket, &bam_locations(&table, &samples)?);
    info!("Copying {} files of {} samples to {}", jobs.len(), samples.len(), bucket);

    let summary = run_copy_jobs(store, jobs, workers, observer).await;
    info!(
        "{} copied, {} already present, {} failed",
        summary.copied,
        summary.skipped,
        summary.failed.len()
    );

    if !summary.failed.is_empty() {
        bail!("{} of {} copies failed", summary.failed.len(), summary.total());
    }
    Ok(summary)
}

/// depopulate-bam command body, returns the number of objects removed
pub async fn depopulate_bam(
    store: Arc<dyn ObjectStore>,
    observer: Arc<dyn ProgressObserver>,
    samples_path: &Path,
    bucket: &str,
    selection: &SampleSelection,
) -> Result<usize> {
    let table = read_samples(samples_path)?;
    let (samples, missing) = resolve_samples(&table, selection)?;

    if !missing.is_empty() {
        warn!(
            "The following samples are missing from {:?}: {}",
            samples_path,
            missing.join(", ")
        );
    }

    let mut removed = 0;
    for sample in &samples {
        for name in [format!("{}.bam", sample), format!("{}.bai", sample)] {
            let uri = join_uri(bucket, &[name.as_str()]);
            match store.remove(&uri).await {
                Ok(()) => {
                    removed += 1;
                    emit(observer.as_ref(), ProgressEventType::ObjectRemoved, Some(uri), serde_json::json!({}));
                }
                Err(e) => emit(
                    observer.as_ref(),
                    ProgressEventType::ObjectFailed,
                    Some(uri),
                    serde_json::json!({ "error": e.to_string() }),
                ),
            }
        }
    }

    info!("Removed {} objects of {} samples from {}", removed, samples.len(), bucket);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use cnv_processor::progress::CollectingObserver;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLES: &str = "Sample_Id\tFile_Name_Key\tIndex_File_Name_Key\tFile_Name\tIndex_File_Name\tBatch\n\
        S1-T\tgs://gdc/1/a.bam\tgs://gdc/1/a.bai\ta.bam\ta.bai\t3\n\
        S1-N\tgs://gdc/2/b.bam\tgs://gdc/2/b.bai\tb.bam\tb.bai\t3\n\
        S2-T\tgs://gdc/3/c.bam\tgs://gdc/3/c.bai\tc.bam\tc.bai\t4\n";

    fn source_store() -> MemoryStore {
        MemoryStore::with_objects([
            "gs://gdc/1/a.bam",
            "gs://gdc/1/a.bai",
            "gs://gdc/2/b.bam",
            "gs://gdc/2/b.bai",
            "gs://gdc/3/c.bam",
            "gs://gdc/3/c.bai",
        ])
    }

    #[tokio::test]
    async fn test_populate_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        fs::write(&path, SAMPLES).unwrap();

        let store = Arc::new(source_store());
        store.insert("gs://bam/S1-N.bai", crate::testing::default_time());

        let summary = populate_bam(
            store.clone(),
            Arc::new(CollectingObserver::new()),
            &path,
            "gs://bam",
            &SampleSelection::Batch(3),
            2,
        )
        .await
        .unwrap();

        assert_eq!(summary.copied, 3);
        assert_eq!(summary.skipped, 1);
        for uri in ["gs://bam/S1-T.bam", "gs://bam/S1-T.bai", "gs://bam/S1-N.bam"] {
            assert!(store.contains(uri), "{} missing", uri);
        }
        assert!(!store.contains("gs://bam/S2-T.bam"));
        assert!(!store.contains("gs://bam/a.bam"));
    }

    #[tokio::test]
    async fn test_populate_reports_failed_copies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        fs::write(&path, SAMPLES).unwrap();

        let result = populate_bam(
            Arc::new(MemoryStore::new()),
            Arc::new(CollectingObserver::new()),
            &path,
            "gs://bam",
            &SampleSelection::Batch(4),
            1,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_depopulate_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        fs::write(&path, SAMPLES).unwrap();

        let store = Arc::new(MemoryStore::with_objects(["gs://bam/S1-T.bam", "gs://bam/S1-T.bai", "gs://bam/S2-T.bam"]));
        let observer = Arc::new(CollectingObserver::new());

        let removed = depopulate_bam(
            store.clone(),
            observer.clone(),
            &path,
            "gs://bam",
            &SampleSelection::Samples(vec!["S1-T".to_string(), "S9-X".to_string()]),
        )
        .await
        .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.uris(), vec!["gs://bam/S2-T.bam"]);
        assert_eq!(observer.count(&ProgressEventType::ObjectRemoved), 2);
    }

    #[test]
    fn test_copy_jobs() {
        let locations = vec![BamLocation {
            sample_id: "S1-T".to_string(),
            bam_key: "gs://gdc/1/a.bam".to_string(),
            bai_key: "gs://gdc/1/a.bai".to_string(),
        }];
        let jobs = copy_jobs("gs://bam/", &locations);

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].staging, "gs://bam/a.bam");
        assert_eq!(jobs[0].destination, "gs://bam/S1-T.bam");
        assert_eq!(jobs[1].destination, "gs://bam/S1-T.bai");
        assert!(!jobs[0].overwrite);
    }
}

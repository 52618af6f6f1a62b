// ==============================================================================
// batch_selection.rs - Batch Index Listing
// ==============================================================================
// Description: Pending batches from the samples table and VM logs, and batch
//              indices found in a log folder
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

use cnv_processor::batch::indices::{
    basename, batch_indices_from_names, batches_in_table, pending_batches, running_batches, BatchRange,
    FOURTH_FAILURE_PREFIX, THIRD_FAILURE_PREFIX, VM_LOG_PREFIX, VM_LOG_SUFFIX,
};
use cnv_processor::parsers::tsv::TableReader;

use crate::compute::ComputeInventory;
use crate::storage::ObjectStore;

/// Base names of the objects in a log folder
pub async fn log_names(store: &dyn ObjectStore, folder: &str) -> Result<Vec<String>> {
    let uris = store
        .list(folder)
        .await
        .with_context(|| format!("Failed to list {}", folder))?;
    Ok(uris.iter().map(|uri| basename(uri).to_string()).collect())
}

/// Batches of the samples table in range that neither succeeded nor failed
/// for the third or fourth time
pub async fn generate_batch_indices(
    store: &dyn ObjectStore,
    samples_path: &Path,
    logs_uri: &str,
    logs_failed_uri: &str,
    range: BatchRange,
) -> Result<Vec<usize>> {
    let samples = TableReader::new()
        .read(samples_path)
        .with_context(|| format!("Failed to read samples table {:?}", samples_path))?;
    let scheduled = batches_in_table(&samples)?;

    let processed = batch_indices_from_names(log_names(store, logs_uri).await?, VM_LOG_PREFIX, VM_LOG_SUFFIX);

    let failed_logs = log_names(store, logs_failed_uri).await?;
    let failed_third = batch_indices_from_names(&failed_logs, THIRD_FAILURE_PREFIX, VM_LOG_SUFFIX);
    let failed_fourth = batch_indices_from_names(&failed_logs, FOURTH_FAILURE_PREFIX, VM_LOG_SUFFIX);

    let pending = pending_batches(&scheduled, range, &processed, &[&failed_third, &failed_fourth]);
    info!(
        "{} batches scheduled, {} processed, {} failed for good, {} pending",
        scheduled.len(),
        processed.len(),
        failed_third.len() + failed_fourth.len(),
        pending.len()
    );

    Ok(pending)
}

/// Write one batch index per line
pub fn write_batch_indices(path: &Path, batches: &[usize]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    let contents: String = batches.iter().map(|b| format!("{}\n", b)).collect();
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    info!("{} batch indices saved at {:?}", batches.len(), path);
    Ok(())
}

/// Batch indices of the logs carrying `prefix`, in range
///
/// With a compute inventory, batches whose instance is still running are
/// left out.
pub async fn list_batch_indices(
    store: &dyn ObjectStore,
    compute: Option<&dyn ComputeInventory>,
    logs_uri: &str,
    prefix: &str,
    instance_prefix: &str,
    range: BatchRange,
) -> Result<Vec<usize>> {
    let mut batches = batch_indices_from_names(log_names(store, logs_uri).await?, prefix, VM_LOG_SUFFIX);

    if let Some(compute) = compute {
        let running: BTreeSet<usize> = running_batches(
            compute
                .running_instances()
                .await
                .context("Failed to list running instances")?,
            instance_prefix,
        );
        batches.retain(|b| !running.contains(b));
    }

    Ok(range.filter(batches).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompute, MemoryStore};
    use tempfile::tempdir;

    fn log_store() -> MemoryStore {
        MemoryStore::with_objects([
            "gs://r/logs/gcloud/startup_gcloud_vm_2.log",
            "gs://r/logs/gcloud/startup_gcloud_vm_3.log",
            "gs://r/logs/gcloud_failed/startup_gcloud_vm_first_4.log",
            "gs://r/logs/gcloud_failed/startup_gcloud_vm_first_5.log",
            "gs://r/logs/gcloud_failed/startup_gcloud_vm_third_error5.log",
            "gs://r/logs/gcloud_failed/startup_gcloud_vm_fourth_6.log",
            "gs://r/logs/gcloud_failed/startup_gcloud_vm_first_8.log",
        ])
    }

    #[tokio::test]
    async fn test_generate_batch_indices() {
        let dir = tempdir().unwrap();
        let samples = dir.path().join("samples.tsv");
        let rows: String = (0..10).map(|b| format!("S{}\t{}\n", b, b)).collect();
        fs::write(&samples, format!("Sample_Id\tBatch\n{}", rows)).unwrap();

        let pending = generate_batch_indices(
            &log_store(),
            &samples,
            "gs://r/logs/gcloud",
            "gs://r/logs/gcloud_failed",
            BatchRange::from_cli(1, 8),
        )
        .await
        .unwrap();
        assert_eq!(pending, vec![1, 4, 7, 8]);

        let output = dir.path().join("gcloud").join("batch_indices.txt");
        write_batch_indices(&output, &pending).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "1\n4\n7\n8\n");
    }

    #[tokio::test]
    async fn test_list_batch_indices_ignoring_running() {
        let store = log_store();
        let compute = FakeCompute {
            running: vec!["facets-tcga-5".to_string(), "other-vm".to_string()],
            operations: Vec::new(),
        };

        let all = list_batch_indices(
            &store,
            None,
            "gs://r/logs/gcloud_failed",
            "startup_gcloud_vm_first_",
            "facets-tcga-",
            BatchRange::default(),
        )
        .await
        .unwrap();
        assert_eq!(all, vec![4, 5, 8]);

        let idle = list_batch_indices(
            &store,
            Some(&compute),
            "gs://r/logs/gcloud_failed",
            "startup_gcloud_vm_first_",
            "facets-tcga-",
            BatchRange::from_cli(1, 7),
        )
        .await
        .unwrap();
        assert_eq!(idle, vec![4]);
    }
}

// ==============================================================================
// copy_pool.rs - Bounded Object Copy Pool
// ==============================================================================
// Description: Runs object copies concurrently with a fixed number of workers
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use cnv_processor::progress::{emit, ProgressEventType, ProgressObserver};

use crate::storage::{ObjectStore, StorageError};

/// One object to place in a bucket
///
/// The source is copied to `staging`, then moved to `destination` when the
/// two differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub source: String,
    pub staging: String,
    pub destination: String,

    /// Copy even when the destination already exists
    pub overwrite: bool,
}

impl CopyJob {
    /// Copy straight to the destination, replacing it
    pub fn upload(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let destination = destination.into();
        Self {
            source: source.into(),
            staging: destination.clone(),
            destination,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Copied,
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopySummary {
    pub copied: usize,
    pub skipped: usize,

    /// Destination and error message of each failed copy
    pub failed: Vec<(String, String)>,
}

impl CopySummary {
    pub fn total(&self) -> usize {
        self.copied + self.skipped + self.failed.len()
    }
}

async fn run_job(store: &dyn ObjectStore, job: &CopyJob) -> Result<Outcome, StorageError> {
    if !job.overwrite && store.exists(&job.destination).await? {
        return Ok(Outcome::Skipped);
    }

    store.copy(&job.source, &job.staging).await?;
    if job.staging != job.destination {
        store.move_object(&job.staging, &job.destination).await?;
    }
    Ok(Outcome::Copied)
}

/// Run every job with at most `workers` copies in flight
///
/// Jobs complete in no particular order. A failed job is reported and the
/// others keep going.
pub async fn run_copy_jobs(
    store: Arc<dyn ObjectStore>,
    jobs: Vec<CopyJob>,
    workers: usize,
    observer: Arc<dyn ProgressObserver>,
) -> CopySummary {
    let total = jobs.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let done = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        let done = Arc::clone(&done);
        let observer = Arc::clone(&observer);

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => run_job(store.as_ref(), &job).await,
                Err(e) => Err(StorageError::InvalidOutput {
                    command: "copy pool".to_string(),
                    detail: e.to_string(),
                }),
            };

            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            let resource = Some(job.destination.clone());
            match &result {
                Ok(Outcome::Copied) => emit(
                    observer.as_ref(),
                    ProgressEventType::ObjectCopied,
                    resource,
                    serde_json::json!({ "source": job.source, "done": finished, "total": total }),
                ),
                Ok(Outcome::Skipped) => emit(
                    observer.as_ref(),
                    ProgressEventType::ObjectExists,
                    resource,
                    serde_json::json!({ "done": finished, "total": total }),
                ),
                Err(e) => emit(
                    observer.as_ref(),
                    ProgressEventType::ObjectFailed,
                    resource,
                    serde_json::json!({ "source": job.source, "error": e.to_string() }),
                ),
            }

            (job.destination, result)
        });
    }

    let mut summary = CopySummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(Outcome::Copied))) => summary.copied += 1,
            Ok((_, Ok(Outcome::Skipped))) => summary.skipped += 1,
            Ok((destination, Err(e))) => summary.failed.push((destination, e.to_string())),
            Err(e) => summary.failed.push(("<task>".to_string(), e.to_string())),
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use cnv_processor::progress::CollectingObserver;

    fn staged(source: &str, staging: &str, destination: &str) -> CopyJob {
        CopyJob {
            source: source.to_string(),
            staging: staging.to_string(),
            destination: destination.to_string(),
            overwrite: false,
        }
    }

    #[tokio::test]
    async fn test_copy_then_rename() {
        let store = Arc::new(MemoryStore::with_objects(["gs://src/x/a.bam"]));
        let observer = Arc::new(CollectingObserver::new());

        let summary = run_copy_jobs(
            store.clone(),
            vec![staged("gs://src/x/a.bam", "gs://bam/a.bam", "gs://bam/S1.bam")],
            2,
            observer.clone(),
        )
        .await;

        assert_eq!(summary.copied, 1);
        assert!(store.contains("gs://bam/S1.bam"));
        assert!(!store.contains("gs://bam/a.bam"));
        assert_eq!(
            store.calls(),
            vec!["cp gs://src/x/a.bam gs://bam/a.bam", "mv gs://bam/a.bam gs://bam/S1.bam"]
        );
        assert_eq!(observer.count(&ProgressEventType::ObjectCopied), 1);
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped() {
        let store = Arc::new(MemoryStore::with_objects(["gs://src/a.bam", "gs://bam/S1.bam"]));
        let observer = Arc::new(CollectingObserver::new());

        let summary = run_copy_jobs(
            store.clone(),
            vec![staged("gs://src/a.bam", "gs://bam/a.bam", "gs://bam/S1.bam")],
            1,
            observer.clone(),
        )
        .await;

        assert_eq!(summary.skipped, 1);
        assert!(store.calls().is_empty());
        assert_eq!(observer.count(&ProgressEventType::ObjectExists), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_jobs() {
        let sources: Vec<String> = (0..20).map(|i| format!("gs://src/{}.bam", i)).collect();
        let store = Arc::new(MemoryStore::with_objects(sources.clone()));

        let mut jobs: Vec<CopyJob> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| CopyJob::upload(s.clone(), format!("gs://bam/{}.bam", i)))
            .collect();
        jobs.push(CopyJob::upload("gs://src/missing.bam", "gs://bam/missing.bam"));

        let summary = run_copy_jobs(store.clone(), jobs, 4, Arc::new(CollectingObserver::new())).await;

        assert_eq!(summary.copied, 20);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "gs://bam/missing.bam");
        assert_eq!(summary.total(), 21);
    }
}

// ==============================================================================
// results_bucket.rs - Results Upload
// ==============================================================================
// Description: Uploads pipeline results, logs, benchmarks and the VM startup
//              log of a batch to the results bucket
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use cnv_processor::batch::indices::VM_LOG_PREFIX;
use cnv_processor::progress::ProgressObserver;

use crate::config::join_uri;
use crate::copy_pool::{run_copy_jobs, CopyJob, CopySummary};
use crate::storage::ObjectStore;

/// Local folders and the bucket folder each one is uploaded to
pub const UPLOAD_ROOTS: [(&str, &str); 3] = [
    ("results", "results"),
    ("workflow/logs", "logs"),
    ("workflow/benchmarks", "benchmarks"),
];

pub const STAGES: [&str; 2] = ["calling", "annotation"];

pub const RESULT_RULES: [&str; 7] = [
    "somatic_cnv_chr_arm",
    "somatic_cnv_sum",
    "somatic_cnv_table",
    "somatic_cnv_gene_calls_unfiltered",
    "somatic_cnv_gene_calls_filtered",
    "somatic_cna_civic",
    "somatic_cna_oncokb",
];

pub const FACETS_RULE: &str = "somatic_cnv_facets";

/// Starting rules of runs that produced facets outputs
pub const RULES_BEFORE_FACETS: [&str; 3] = ["download_bam", "get_snp_pileup", FACETS_RULE];

/// Bucket folder of VM startup logs
pub const VM_LOG_FOLDER: &str = "logs/gcloud";

/// Rule folders to upload for a run started at `start_from`
pub fn result_rules(start_from: &str) -> Vec<&'static str> {
    let mut rules = Vec::with_capacity(RESULT_RULES.len() + 1);
    if RULES_BEFORE_FACETS.contains(&start_from) {
        rules.push(FACETS_RULE);
    }
    rules.extend(RESULT_RULES);
    rules
}

/// Files directly inside a folder, sorted
fn files_in(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Upload jobs for `{root}/{stage}/{rule}/*` under `workdir`
pub fn upload_jobs(workdir: &Path, bucket: &str, start_from: &str) -> Vec<CopyJob> {
    let rules = result_rules(start_from);
    let mut jobs = Vec::new();

    for (local_root, bucket_root) in UPLOAD_ROOTS {
        for stage in STAGES {
            for rule in &rules {
                let folder = workdir.join(local_root).join(stage).join(rule);
                if !folder.is_dir() {
                    continue;
                }

                for file in files_in(&folder) {
                    let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                    let destination = join_uri(bucket, &[bucket_root, stage, *rule, name.as_str()]);
                    debug!("Planned upload {:?} -> {}", file, destination);
                    jobs.push(CopyJob::upload(file.display().to_string(), destination));
                }
            }
        }
    }

    jobs
}

/// Upload job for the first startup log found in `vm_log_dir`
pub fn vm_log_job(vm_log_dir: &Path, bucket: &str) -> Option<CopyJob> {
    files_in(vm_log_dir).into_iter().find_map(|file| {
        let name = file.file_name()?.to_string_lossy().to_string();
        name.starts_with(VM_LOG_PREFIX).then(|| {
            CopyJob::upload(file.display().to_string(), join_uri(bucket, &[VM_LOG_FOLDER, name.as_str()]))
        })
    })
}

/// populate-results command body
pub async fn populate_results(
    store: Arc<dyn ObjectStore>,
    observer: Arc<dyn ProgressObserver>,
    workdir: &Path,
    bucket: &str,
    start_from: &str,
    vm_log_dir: Option<&Path>,
    workers: usize,
) -> Result<CopySummary> {
    if !workdir.is_dir() {
        bail!("Working directory {:?} does not exist", workdir);
    }

    let mut jobs = upload_jobs(workdir, bucket, start_from);

    if let Some(dir) = vm_log_dir {
        let job = vm_log_job(dir, bucket)
            .with_context(|| format!("No {}* log found in {:?}", VM_LOG_PREFIX, dir))?;
        jobs.push(job);
    }

    if jobs.is_empty() {
        warn!("Nothing to upload from {:?}", workdir);
    }
    info!("Uploading {} files to {}", jobs.len(), bucket);

    let summary = run_copy_jobs(store, jobs, workers, observer).await;
    if !summary.failed.is_empty() {
        bail!("{} of {} uploads failed", summary.failed.len(), summary.total());
    }

    info!("Uploaded {} files", summary.copied);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use cnv_processor::progress::CollectingObserver;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_result_rules() {
        assert_eq!(result_rules("download_bam")[0], FACETS_RULE);
        assert_eq!(result_rules("download_bam").len(), 8);
        assert!(!result_rules("somatic_cnv_table").contains(&FACETS_RULE));
    }

    #[tokio::test]
    async fn test_populate_results() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        touch(&work.join("results/calling/somatic_cnv_facets/P1.vcf.gz"));
        touch(&work.join("results/annotation/somatic_cna_civic/P1.tsv"));
        touch(&work.join("workflow/logs/calling/somatic_cnv_table/P1.log"));
        touch(&work.join("workflow/benchmarks/annotation/somatic_cna_oncokb/P1.tsv"));
        touch(&work.join("results/calling/unlisted_rule/P1.tsv"));

        let home = dir.path().join("home");
        touch(&home.join("notes.txt"));
        touch(&home.join("startup_gcloud_vm_12.log"));

        let store = Arc::new(MemoryStore::new());
        let summary = populate_results(
            store.clone(),
            Arc::new(CollectingObserver::new()),
            &work,
            "gs://results",
            "somatic_cnv_table",
            Some(home.as_path()),
            3,
        )
        .await
        .unwrap();

        assert_eq!(summary.copied, 4);
        assert_eq!(
            store.uris(),
            vec![
                "gs://results/benchmarks/annotation/somatic_cna_oncokb/P1.tsv",
                "gs://results/logs/calling/somatic_cnv_table/P1.log",
                "gs://results/logs/gcloud/startup_gcloud_vm_12.log",
                "gs://results/results/annotation/somatic_cna_civic/P1.tsv",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_vm_log_fails() {
        let dir = tempdir().unwrap();
        let result = populate_results(
            Arc::new(MemoryStore::new()),
            Arc::new(CollectingObserver::new()),
            dir.path(),
            "gs://results",
            "download_bam",
            Some(dir.path()),
            1,
        )
        .await;
        assert!(result.is_err());
    }
}

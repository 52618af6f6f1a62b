// ==============================================================================
// config.rs - Cloud Locations and Tool Configuration
// ==============================================================================
// Description: Bucket URIs, zone and CLI binaries, from flags or environment
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use clap::Args;

/// Cloud settings shared by every worker command
///
/// Each value can be given on the command line or through the environment
/// (a `.env` file is loaded at startup).
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// Bucket holding renamed BAM/BAI files
    #[arg(long, env = "BAM_BUCKET_URI", default_value = "gs://tcga_wxs_bam", global = true)]
    pub bam_bucket_uri: String,

    /// Bucket receiving pipeline results
    #[arg(long, env = "RESULTS_BUCKET_URI", default_value = "gs://facets_tcga_results", global = true)]
    pub results_bucket_uri: String,

    /// Folder of startup logs of processed batches
    #[arg(
        long,
        env = "VM_LOGS_URI",
        default_value = "gs://facets_tcga_results/logs/gcloud",
        global = true
    )]
    pub vm_logs_uri: String,

    /// Folder of startup logs of failed batches
    #[arg(
        long,
        env = "VM_LOGS_FAILED_URI",
        default_value = "gs://facets_tcga_results/logs/gcloud_failed",
        global = true
    )]
    pub vm_logs_failed_uri: String,

    #[arg(long, env = "GCLOUD_ZONE", default_value = "us-central1-a", global = true)]
    pub gcloud_zone: String,

    /// Prefix of batch VM names, followed by the batch index
    #[arg(long, env = "INSTANCE_PREFIX", default_value = "facets-tcga-", global = true)]
    pub instance_prefix: String,

    #[arg(long, env = "GSUTIL_BIN", default_value = "gsutil", global = true)]
    pub gsutil_bin: String,

    #[arg(long, env = "GCLOUD_BIN", default_value = "gcloud", global = true)]
    pub gcloud_bin: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            bam_bucket_uri: "gs://tcga_wxs_bam".to_string(),
            results_bucket_uri: "gs://facets_tcga_results".to_string(),
            vm_logs_uri: "gs://facets_tcga_results/logs/gcloud".to_string(),
            vm_logs_failed_uri: "gs://facets_tcga_results/logs/gcloud_failed".to_string(),
            gcloud_zone: "us-central1-a".to_string(),
            instance_prefix: "facets-tcga-".to_string(),
            gsutil_bin: "gsutil".to_string(),
            gcloud_bin: "gcloud".to_string(),
        }
    }
}

/// Join URI segments with single slashes
pub fn join_uri(base: &str, parts: &[&str]) -> String {
    let mut uri = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if !part.is_empty() {
            uri.push('/');
            uri.push_str(part);
        }
    }
    uri
}

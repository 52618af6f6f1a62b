// ==============================================================================
// storage.rs - Object Storage Access
// ==============================================================================
// Description: Object store interface and its gsutil implementation
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Messages printed by gsutil when a URI matches nothing
const NO_MATCH_MARKERS: [&str; 2] = ["No URLs matched", "matched no objects"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Unexpected output from {command}: {detail}")]
    InvalidOutput { command: String, detail: String },
}

/// Bucket operations used by the batch tools
///
/// Failures are returned as is; callers decide whether to skip or abort.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, uri: &str) -> Result<bool, StorageError>;

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError>;

    async fn move_object(&self, source: &str, destination: &str) -> Result<(), StorageError>;

    async fn remove(&self, uri: &str) -> Result<(), StorageError>;

    /// URIs directly under a folder, empty when nothing matches
    async fn list(&self, folder: &str) -> Result<Vec<String>, StorageError>;

    /// Last update time, `None` when the object does not exist
    async fn stat(&self, uri: &str) -> Result<Option<DateTime<Utc>>, StorageError>;
}

/// Run an external command and capture its output
pub async fn run_command(bin: &str, args: &[&str]) -> Result<Output, StorageError> {
    let command = format!("{} {}", bin, args.join(" "));
    debug!("Running {}", command);

    Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|source| StorageError::Spawn { command, source })
}

/// Fail unless the command exited successfully
pub fn check_status(bin: &str, args: &[&str], output: &Output) -> Result<(), StorageError> {
    if output.status.success() {
        return Ok(());
    }

    Err(StorageError::CommandFailed {
        command: format!("{} {}", bin, args.join(" ")),
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn is_no_match(output: &Output) -> bool {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    NO_MATCH_MARKERS
        .iter()
        .any(|marker| stdout.contains(marker) || stderr.contains(marker))
}

/// Update time reported by `gsutil stat`
///
/// The relevant line reads `Update time:  Tue, 22 Nov 2022 10:11:12 GMT`.
pub fn parse_update_time(stat_output: &str) -> Option<DateTime<Utc>> {
    stat_output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Update time:"))
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .map(|time| time.with_timezone(&Utc))
}

/// `ObjectStore` backed by the gsutil command-line tool
#[derive(Debug, Clone)]
pub struct GsutilStore {
    bin: String,
}

impl GsutilStore {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output, StorageError> {
        let output = run_command(&self.bin, args).await?;
        check_status(&self.bin, args, &output)?;
        Ok(output)
    }
}

#[async_trait]
impl ObjectStore for GsutilStore {
    async fn exists(&self, uri: &str) -> Result<bool, StorageError> {
        let args = ["ls", uri];
        let output = run_command(&self.bin, &args).await?;

        if !output.status.success() && is_no_match(&output) {
            return Ok(false);
        }
        check_status(&self.bin, &args, &output)?;
        Ok(true)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        self.run_checked(&["cp", source, destination]).await.map(|_| ())
    }

    async fn move_object(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        self.run_checked(&["mv", source, destination]).await.map(|_| ())
    }

    async fn remove(&self, uri: &str) -> Result<(), StorageError> {
        self.run_checked(&["rm", uri]).await.map(|_| ())
    }

    async fn list(&self, folder: &str) -> Result<Vec<String>, StorageError> {
        let args = ["ls", folder];
        let output = run_command(&self.bin, &args).await?;

        if !output.status.success() {
            if is_no_match(&output) {
                return Ok(Vec::new());
            }
            check_status(&self.bin, &args, &output)?;
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(|uri| uri.to_string())
            .collect())
    }

    async fn stat(&self, uri: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let args = ["stat", uri];
        let output = run_command(&self.bin, &args).await?;

        if is_no_match(&output) {
            return Ok(None);
        }
        check_status(&self.bin, &args, &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_update_time(&stdout)
            .map(Some)
            .ok_or_else(|| StorageError::InvalidOutput {
                command: format!("{} stat {}", self.bin, uri),
                detail: "no parsable 'Update time' line".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    /// Write an executable shell script standing in for gsutil
    fn fake_gsutil(dir: &Path, stderr: &str, code: i32) -> String {
        let path = dir.join("gsutil");
        fs::write(&path, format!("#!/bin/sh\necho \"{}\" >&2\nexit {}\n", stderr, code)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_parse_update_time() {
        let output = "gs://bucket/results/a.tsv:\n    Creation time:    Mon, 21 Nov 2022 09:00:00 GMT\n    Update time:      Tue, 22 Nov 2022 10:11:12 GMT\n    Storage class:    STANDARD\n";
        assert_eq!(
            parse_update_time(output),
            Some(Utc.with_ymd_and_hms(2022, 11, 22, 10, 11, 12).unwrap())
        );
        assert_eq!(parse_update_time("Creation time: Mon, 21 Nov 2022 09:00:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let store = GsutilStore::new("/nonexistent/gsutil");
        let err = store.remove("gs://bucket/a.bam").await.unwrap_err();
        assert!(matches!(err, StorageError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exists_propagates_gsutil_failure() {
        let dir = tempdir().unwrap();
        let store = GsutilStore::new(fake_gsutil(dir.path(), "ServiceException: 401 Anonymous caller", 1));

        let err = store.exists("gs://bucket/a.bam").await.unwrap_err();
        assert!(matches!(err, StorageError::CommandFailed { status: 1, .. }));
        assert!(store.list("gs://bucket").await.is_err());
    }

    #[tokio::test]
    async fn test_exists_no_match_is_absent() {
        let dir = tempdir().unwrap();
        let store = GsutilStore::new(fake_gsutil(dir.path(), "CommandException: One or more URLs matched no objects.", 1));

        assert!(!store.exists("gs://bucket/a.bam").await.unwrap());
        assert!(store.list("gs://bucket").await.unwrap().is_empty());
        assert_eq!(store.stat("gs://bucket/a.bam").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exists_when_listed() {
        let dir = tempdir().unwrap();
        let store = GsutilStore::new(fake_gsutil(dir.path(), "", 0));
        assert!(store.exists("gs://bucket/a.bam").await.unwrap());
    }
}

// ==============================================================================
// compute.rs - Compute Engine Inventory
// ==============================================================================
// Description: Running batch instances and instance operations via gcloud
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cnv_processor::batch::indices::basename;

use crate::storage::{check_status, run_command, StorageError};

/// One compute operation on an instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub operation_type: String,

    /// Full link to the instance
    pub target_link: String,

    /// Changes every time an instance of the same name is created
    #[serde(default)]
    pub target_id: String,

    #[serde(default)]
    pub status: String,

    #[serde(rename = "insertTime")]
    pub timestamp: DateTime<Utc>,
}

impl Operation {
    /// Instance name, e.g. `facets-tcga-12`
    pub fn target_name(&self) -> &str {
        basename(&self.target_link)
    }
}

/// Parse the JSON listing of `gcloud compute operations list`
pub fn parse_operations(json: &str) -> Result<Vec<Operation>, serde_json::Error> {
    serde_json::from_str(json)
}

#[async_trait]
pub trait ComputeInventory: Send + Sync {
    /// Names of running batch instances
    async fn running_instances(&self) -> Result<Vec<String>, StorageError>;

    /// Operations of a type (insert, delete, preempted, start) on batch instances
    async fn operations(&self, operation_type: &str) -> Result<Vec<Operation>, StorageError>;
}

/// `ComputeInventory` backed by the gcloud command-line tool
#[derive(Debug, Clone)]
pub struct GcloudCompute {
    bin: String,
    zone: String,
    instance_prefix: String,
}

impl GcloudCompute {
    pub fn new(bin: impl Into<String>, zone: impl Into<String>, instance_prefix: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            zone: zone.into(),
            instance_prefix: instance_prefix.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, StorageError> {
        let output = run_command(&self.bin, args).await?;
        check_status(&self.bin, args, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ComputeInventory for GcloudCompute {
    async fn running_instances(&self) -> Result<Vec<String>, StorageError> {
        let zones = format!("--zones={}", self.zone);
        let filter = format!("--filter=name~{}[\\d]+ AND status=RUNNING", self.instance_prefix);
        let stdout = self
            .run(&["compute", "instances", "list", &zones, &filter, "--format=value(NAME)"])
            .await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn operations(&self, operation_type: &str) -> Result<Vec<Operation>, StorageError> {
        let filter = format!(
            "--filter=operationType~{} AND targetLink~instances/{}[\\d]+",
            operation_type, self.instance_prefix
        );
        let stdout = self
            .run(&["compute", "operations", "list", &filter, "--format=json"])
            .await?;

        parse_operations(&stdout).map_err(|e| StorageError::InvalidOutput {
            command: format!("{} compute operations list", self.bin),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_operations() {
        let json = r#"[
            {
                "name": "operation-1665000000000-abc",
                "operationType": "insert",
                "targetLink": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/instances/facets-tcga-12",
                "targetId": "4242",
                "status": "DONE",
                "insertTime": "2022-10-15T03:02:01.123-07:00",
                "user": "someone@example.com"
            }
        ]"#;

        let operations = parse_operations(json).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].target_name(), "facets-tcga-12");
        assert_eq!(operations[0].target_id, "4242");
        assert_eq!(
            operations[0].timestamp,
            Utc.with_ymd_and_hms(2022, 10, 15, 10, 2, 1).unwrap() + chrono::Duration::milliseconds(123)
        );
    }

    #[test]
    fn test_empty_listing() {
        assert!(parse_operations("[]").unwrap().is_empty());
    }
}

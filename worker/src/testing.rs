// ==============================================================================
// testing.rs - In-Memory Cloud Fakes
// ==============================================================================
// Description: Object store and compute inventory kept in memory for tests
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::compute::{ComputeInventory, Operation};
use crate::storage::{ObjectStore, StorageError};

/// Bucket objects keyed by URI, with their update time
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, DateTime<Utc>>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for uri in uris {
            store.insert(uri, default_time());
        }
        store
    }

    pub fn insert(&self, uri: impl Into<String>, updated: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(uri.into(), updated);
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.objects.lock().unwrap().contains_key(uri)
    }

    pub fn uris(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Mutating calls, e.g. `cp a b`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn missing(uri: &str) -> StorageError {
        StorageError::CommandFailed {
            command: format!("fake {}", uri),
            status: 1,
            stderr: "CommandException: No URLs matched".to_string(),
        }
    }
}

pub fn default_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 11, 1, 12, 0, 0).unwrap()
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, uri: &str) -> Result<bool, StorageError> {
        Ok(self.contains(uri))
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        // Local files are always readable
        if source.starts_with("gs://") && !self.contains(source) {
            return Err(Self::missing(source));
        }
        self.calls.lock().unwrap().push(format!("cp {} {}", source, destination));
        self.insert(destination, Utc::now());
        Ok(())
    }

    async fn move_object(&self, source: &str, destination: &str) -> Result<(), StorageError> {
        let updated = self
            .objects
            .lock()
            .unwrap()
            .remove(source)
            .ok_or_else(|| Self::missing(source))?;
        self.calls.lock().unwrap().push(format!("mv {} {}", source, destination));
        self.insert(destination, updated);
        Ok(())
    }

    async fn remove(&self, uri: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(uri)
            .ok_or_else(|| Self::missing(uri))?;
        self.calls.lock().unwrap().push(format!("rm {}", uri));
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        Ok(self
            .uris()
            .into_iter()
            .filter(|uri| uri.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .collect())
    }

    async fn stat(&self, uri: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.objects.lock().unwrap().get(uri).copied())
    }
}

/// Fixed instances and operations
#[derive(Debug, Default)]
pub struct FakeCompute {
    pub running: Vec<String>,
    pub operations: Vec<Operation>,
}

impl FakeCompute {
    pub fn operation(operation_type: &str, instance: &str, target_id: &str, timestamp: DateTime<Utc>) -> Operation {
        Operation {
            name: format!("operation-{}-{}", operation_type, timestamp.timestamp()),
            operation_type: operation_type.to_string(),
            target_link: format!("https://compute/projects/p/zones/z/instances/{}", instance),
            target_id: target_id.to_string(),
            status: "DONE".to_string(),
            timestamp,
        }
    }
}

#[async_trait]
impl ComputeInventory for FakeCompute {
    async fn running_instances(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.running.clone())
    }

    async fn operations(&self, operation_type: &str) -> Result<Vec<Operation>, StorageError> {
        Ok(self
            .operations
            .iter()
            .filter(|op| op.operation_type == operation_type)
            .cloned()
            .collect())
    }
}

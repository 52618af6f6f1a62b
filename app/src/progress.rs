// ==============================================================================
// progress.rs - Progress Reporting for Batch and Table Operations
// ==============================================================================
// Description: Observer interface replacing print-as-you-go progress output
// Author: Matt Barham
// Created: 2026-10-13
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    // Batch packing
    BatchSeeded,
    BatchOpened,
    SubjectAssigned,
    BatchOverDiskSize,

    // Table operations
    FileLoaded,
    FileSkipped,
    RowsDropped,

    // Object storage
    ObjectCopied,
    ObjectExists,
    ObjectRemoved,
    ObjectFailed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: ProgressEventType,
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: Severity,
}

impl ProgressEvent {
    pub fn new(
        event_type: ProgressEventType,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            ProgressEventType::BatchOverDiskSize
            | ProgressEventType::FileSkipped
            | ProgressEventType::ObjectFailed => Severity::Warning,

            ProgressEventType::SubjectAssigned | ProgressEventType::ObjectExists => Severity::Debug,

            _ => Severity::Info,
        };

        Self {
            timestamp: Utc::now(),
            event_type,
            resource,
            details,
            severity,
        }
    }
}

/// Sink for progress events
///
/// Takes `&self` so that one observer can be shared by concurrent copy tasks.
pub trait ProgressObserver: Send + Sync {
    fn record(&self, event: ProgressEvent);
}

/// Convenience for emitting an event through an observer
pub fn emit(
    observer: &dyn ProgressObserver,
    event_type: ProgressEventType,
    resource: Option<String>,
    details: serde_json::Value,
) {
    observer.record(ProgressEvent::new(event_type, resource, details));
}

/// Forwards events to `tracing` at a level matching their severity
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn record(&self, event: ProgressEvent) {
        let resource = event.resource.as_deref().unwrap_or("-");
        match event.severity {
            Severity::Debug => debug!(event = ?event.event_type, resource, details = %event.details),
            Severity::Info => info!(event = ?event.event_type, resource, details = %event.details),
            Severity::Warning => warn!(event = ?event.event_type, resource, details = %event.details),
        }
    }
}

/// Keeps every event in memory (tests, summaries)
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, event_type: &ProgressEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| &e.event_type == event_type)
            .count()
    }
}

impl ProgressObserver for CollectingObserver {
    fn record(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

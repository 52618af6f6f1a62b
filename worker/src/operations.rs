// ==============================================================================
// operations.rs - VM Operations Cost Summary
// ==============================================================================
// Description: One row per batch instance with runtime, disk size and
//              estimated standard and preemptible costs
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use cnv_processor::batch::indices::COL_BATCH;
use cnv_processor::batch::samples::COL_TOTAL_SIZE_GB;
use cnv_processor::output::{format_float, TableWriter};
use cnv_processor::parsers::tsv::{Table, TableError, TableReader};

use crate::compute::{ComputeInventory, Operation};

pub const OP_INSERT: &str = "insert";
pub const OP_PREEMPTED: &str = "preempted";
pub const OP_START: &str = "start";
pub const OP_DELETE: &str = "delete";

/// Extra disk given to every batch VM, in GB
pub const DISK_MARGIN_GB: f64 = 50.0;

/// Monthly prices spread over 30.5 days
pub const BASE_HOURLY_COST: f64 = 391.35 / (24.0 * 30.5);
pub const DISK_HOURLY_COST_PER_GB: f64 = 0.1 / (24.0 * 30.5);

pub const PREEMPTIBLE_DISCOUNTS: [f64; 2] = [0.60, 0.91];

/// Earlier batches ran before the pipeline was tuned and are left out of
/// projected totals
pub const LAST_UNOPTIMIZED_BATCH: usize = 5;

const DECIMALS: usize = 3;

/// Lifetime of the latest instance created under one name
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRun {
    pub target: String,
    pub target_name: String,
    pub target_id: String,
    pub batch: Option<usize>,
    pub insert: DateTime<Utc>,
    pub preempted: Vec<DateTime<Utc>>,
    pub restarts: Vec<DateTime<Utc>>,
    pub delete: Option<DateTime<Utc>>,
}

impl InstanceRun {
    /// Hours between creation and deletion, minus time spent preempted
    pub fn runtime_hours(&self) -> Option<f64> {
        let delete = self.delete?;
        let mut seconds = (delete - self.insert).num_seconds();

        for (stopped, restarted) in self.preempted.iter().zip(&self.restarts) {
            seconds -= (*restarted - *stopped).num_seconds();
        }

        Some(seconds as f64 / 3600.0)
    }
}

/// Build one run per instance name from its operations
///
/// Only the latest `insert` of a name is kept; other operations are matched
/// to it through the instance id.
pub fn instance_runs(
    inserts: &[Operation],
    preempted: &[Operation],
    starts: &[Operation],
    deletes: &[Operation],
    instance_prefix: &str,
) -> Vec<InstanceRun> {
    let mut latest: BTreeMap<&str, &Operation> = BTreeMap::new();
    for op in inserts {
        latest
            .entry(op.target_name())
            .and_modify(|current| {
                if op.timestamp >= current.timestamp {
                    *current = op;
                }
            })
            .or_insert(op);
    }

    let times_of = |ops: &[Operation], insert: &Operation| -> Vec<DateTime<Utc>> {
        let mut times: Vec<DateTime<Utc>> = ops
            .iter()
            .filter(|op| op.target_link == insert.target_link && op.target_id == insert.target_id)
            .map(|op| op.timestamp)
            .collect();
        times.sort();
        times
    };

    latest
        .into_iter()
        .map(|(name, insert)| InstanceRun {
            target: insert.target_link.clone(),
            target_name: name.to_string(),
            target_id: insert.target_id.clone(),
            batch: name.strip_prefix(instance_prefix).and_then(|b| b.parse().ok()),
            insert: insert.timestamp,
            preempted: times_of(preempted, insert),
            restarts: times_of(starts, insert),
            delete: times_of(deletes, insert).last().copied(),
        })
        .collect()
}

/// Disk size of each batch VM: sum of `Total_Size_Gb` plus the margin
pub fn disk_sizes(samples: &Table) -> Result<BTreeMap<usize, u64>, TableError> {
    samples.require(&[COL_BATCH, COL_TOTAL_SIZE_GB])?;

    let mut totals: BTreeMap<usize, f64> = BTreeMap::new();
    for row in 0..samples.len() {
        let Some(batch) = samples.parse_f64(row, COL_BATCH)? else {
            continue;
        };
        let size = samples.parse_f64(row, COL_TOTAL_SIZE_GB)?.unwrap_or(0.0);
        *totals.entry(batch as usize).or_default() += size;
    }

    Ok(totals
        .into_iter()
        .map(|(batch, total)| (batch, (total + DISK_MARGIN_GB) as u64))
        .collect())
}

/// Runtime and cost estimate of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceCost {
    pub run: InstanceRun,
    pub runtime_hours: Option<f64>,
    pub disk_size_gb: Option<u64>,
}

impl InstanceCost {
    pub fn new(run: InstanceRun, disk_sizes: &BTreeMap<usize, u64>) -> Self {
        let disk_size_gb = run.batch.and_then(|b| disk_sizes.get(&b).copied());
        Self {
            runtime_hours: run.runtime_hours(),
            run,
            disk_size_gb,
        }
    }

    /// Machine plus disk cost at on-demand prices
    pub fn cost_standard(&self) -> Option<f64> {
        let hours = self.runtime_hours?;
        let disk = self.disk_size_gb? as f64;
        Some(hours * (BASE_HOURLY_COST + DISK_HOURLY_COST_PER_GB * disk))
    }

    pub fn cost_preemptible(&self, discount: f64) -> Option<f64> {
        self.cost_standard().map(|cost| (1.0 - discount) * cost)
    }
}

fn discount_column(discount: f64) -> String {
    format!("COST_PREEMPTIBLE_{}PCT_DISCOUNT", (discount * 100.0).round() as u32)
}

/// Operations table, sorted by batch
pub fn operations_table(costs: &[InstanceCost]) -> Table {
    let n_preempted = costs.iter().map(|c| c.run.preempted.len()).max().unwrap_or(0);
    let n_restarts = costs.iter().map(|c| c.run.restarts.len()).max().unwrap_or(0);

    let mut columns: Vec<String> = ["TARGET", "TARGET_NAME", "TARGET_ID", "TIMESTAMP_INSERT"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend((1..=n_preempted).map(|i| format!("TIMESTAMP_PREEMPTED_{}", i)));
    columns.extend((1..=n_restarts).map(|i| format!("TIMESTAMP_RESTART_{}", i)));
    columns.extend(
        ["TIMESTAMP_DELETE", "RUNTIME_HOUR", "BATCH", "DISK_SIZE", "COST_STANDARD"]
            .iter()
            .map(|c| c.to_string()),
    );
    columns.extend(PREEMPTIBLE_DISCOUNTS.iter().map(|d| discount_column(*d)));

    let mut sorted: Vec<&InstanceCost> = costs.iter().collect();
    sorted.sort_by_key(|c| (c.run.batch.is_none(), c.run.batch, c.run.target_name.clone()));

    let timestamps = |times: &[DateTime<Utc>], n: usize| -> Vec<String> {
        (0..n)
            .map(|i| times.get(i).map(|t| t.to_rfc3339()).unwrap_or_default())
            .collect()
    };

    let mut table = Table::new("gcloud_operations", columns);
    for cost in sorted {
        let run = &cost.run;
        let mut row = vec![
            run.target.clone(),
            run.target_name.clone(),
            run.target_id.clone(),
            run.insert.to_rfc3339(),
        ];
        row.extend(timestamps(&run.preempted, n_preempted));
        row.extend(timestamps(&run.restarts, n_restarts));
        row.push(run.delete.map(|t| t.to_rfc3339()).unwrap_or_default());
        row.push(format_float(cost.runtime_hours, DECIMALS));
        row.push(run.batch.map(|b| b.to_string()).unwrap_or_default());
        row.push(cost.disk_size_gb.map(|d| d.to_string()).unwrap_or_default());
        row.push(format_float(cost.cost_standard(), DECIMALS));
        for discount in PREEMPTIBLE_DISCOUNTS {
            row.push(format_float(cost.cost_preemptible(discount), DECIMALS));
        }
        table.rows.push(row);
    }

    table
}

/// Projected cost of processing every batch
#[derive(Debug, Clone, PartialEq)]
pub struct CostSummary {
    /// Batches in the samples table
    pub n_batches: usize,

    /// Average standard cost of a tuned batch
    pub avg_standard: Option<f64>,
}

impl CostSummary {
    pub fn from_costs(costs: &[InstanceCost], n_batches: usize) -> Self {
        let tuned: Vec<f64> = costs
            .iter()
            .filter(|c| c.run.batch.is_some_and(|b| b > LAST_UNOPTIMIZED_BATCH))
            .filter_map(|c| c.cost_standard())
            .collect();

        let avg_standard = if tuned.is_empty() {
            None
        } else {
            Some(tuned.iter().sum::<f64>() / tuned.len() as f64)
        };

        Self { n_batches, avg_standard }
    }

    pub fn avg_preemptible(&self, discount: f64) -> Option<f64> {
        self.avg_standard.map(|avg| (1.0 - discount) * avg)
    }

    pub fn total_standard(&self) -> Option<f64> {
        self.avg_standard.map(|avg| avg * self.n_batches as f64)
    }

    pub fn total_preemptible(&self, discount: f64) -> Option<f64> {
        self.avg_preemptible(discount).map(|avg| avg * self.n_batches as f64)
    }

    pub fn log(&self) {
        let (Some(avg), Some(total)) = (self.avg_standard, self.total_standard()) else {
            warn!("No finished batch above {} to project costs from", LAST_UNOPTIMIZED_BATCH);
            return;
        };

        info!("Possible costs over {} batches:", self.n_batches);
        info!("  standard: ${:.2} (avg cost/batch ${:.3})", total, avg);
        for discount in PREEMPTIBLE_DISCOUNTS {
            if let (Some(avg), Some(total)) = (self.avg_preemptible(discount), self.total_preemptible(discount)) {
                info!(
                    "  preemptible {}% discount: ${:.2} (avg cost/batch ${:.3})",
                    (discount * 100.0).round(),
                    total,
                    avg
                );
            }
        }
    }
}

async fn list_operations(compute: &dyn ComputeInventory, operation_type: &str) -> Result<Vec<Operation>> {
    let operations = compute
        .operations(operation_type)
        .await
        .with_context(|| format!("Failed to list {} operations", operation_type))?;
    info!("{} {} operations", operations.len(), operation_type);
    Ok(operations)
}

/// summarize-operations command body
pub async fn summarize_operations(
    compute: &dyn ComputeInventory,
    samples_path: &Path,
    output: &Path,
    instance_prefix: &str,
) -> Result<CostSummary> {
    let samples = TableReader::new()
        .read(samples_path)
        .with_context(|| format!("Failed to read samples table {:?}", samples_path))?;
    let disk = disk_sizes(&samples)?;

    let inserts = list_operations(compute, OP_INSERT).await?;
    let preempted = list_operations(compute, OP_PREEMPTED).await?;
    let starts = list_operations(compute, OP_START).await?;
    let deletes = list_operations(compute, OP_DELETE).await?;
    let runs = instance_runs(&inserts, &preempted, &starts, &deletes, instance_prefix);

    let costs: Vec<InstanceCost> = runs.into_iter().map(|run| InstanceCost::new(run, &disk)).collect();
    TableWriter::new().write(&operations_table(&costs), output)?;

    let summary = CostSummary::from_costs(&costs, disk.len());
    summary.log();
    Ok(summary)
}

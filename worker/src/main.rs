// ==============================================================================
// main.rs - Gcloud Worker Entry Point
// ==============================================================================
// Description: Cloud-facing batch tools: BAM and results buckets, batch
//              indices, pair selection and VM cost summary
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

mod bam_bucket;
mod batch_selection;
mod compute;
mod config;
mod copy_pool;
mod operations;
mod results_bucket;
mod select_pairs;
mod storage;

#[cfg(test)]
mod testing;

use bam_bucket::SampleSelection;
use cnv_processor::batch::indices::BatchRange;
use cnv_processor::progress::{ProgressObserver, TracingObserver};
use compute::{ComputeInventory, GcloudCompute};
use config::CloudConfig;
use storage::{GsutilStore, ObjectStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    cloud: CloudConfig,

    #[command(subcommand)]
    command: Command,
}

/// Batch or explicit samples
#[derive(Args, Debug)]
struct SelectionArgs {
    /// Index of the batch
    #[arg(long, conflicts_with = "samples")]
    batch_index: Option<usize>,

    /// Sample ids
    #[arg(long, num_args = 1..)]
    samples: Vec<String>,
}

impl SelectionArgs {
    fn selection(self) -> Result<SampleSelection> {
        match (self.batch_index, self.samples.is_empty()) {
            (Some(batch), _) => Ok(SampleSelection::Batch(batch)),
            (None, false) => Ok(SampleSelection::Samples(self.samples)),
            (None, true) => bail!("Either --batch-index or --samples is required"),
        }
    }
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Smallest batch index
    #[arg(long, default_value_t = 1)]
    batch_min: usize,

    /// Largest batch index, -1 for no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    batch_max: i64,
}

impl RangeArgs {
    fn range(&self) -> BatchRange {
        BatchRange::from_cli(self.batch_min, self.batch_max)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy the BAM/BAI files of a batch into the BAM bucket
    PopulateBam {
        #[arg(long, default_value = "config/samples.all.tsv")]
        samples_table: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Concurrent copies
        #[arg(long, default_value_t = 4)]
        jobs: usize,
    },

    /// Remove BAM/BAI files from the BAM bucket
    DepopulateBam {
        #[arg(long, default_value = "config/samples.tsv")]
        samples_table: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Upload results, logs and benchmarks to the results bucket
    PopulateResults {
        /// Pipeline working directory
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Rule the pipeline started from
        #[arg(long, default_value = "download_bam")]
        start_from: String,

        /// Folder holding the VM startup log to upload
        #[arg(long)]
        vm_log_dir: Option<PathBuf>,

        #[arg(long, default_value_t = 4)]
        jobs: usize,
    },

    /// Save the batch indices still to be processed
    BatchIndices {
        #[arg(long, default_value = "config/samples.all.tsv")]
        samples_table: PathBuf,

        #[command(flatten)]
        range: RangeArgs,

        #[arg(long, default_value = "gcloud/batch_indices.txt")]
        output: PathBuf,
    },

    /// Print batch indices of the logs in a folder
    PrintBatchIndices {
        /// Log folder, defaults to the failed VM logs
        #[arg(long)]
        logs_uri: Option<String>,

        #[arg(long, default_value = "startup_gcloud_vm_first_")]
        prefix: String,

        #[command(flatten)]
        range: RangeArgs,

        /// Leave out batches whose instance is running
        #[arg(long)]
        ignore_running: bool,
    },

    /// Keep only the pairs whose outputs are missing or stale
    SelectPairs {
        #[arg(long, default_value = "config/tumor_normal_pairs.tsv")]
        pairs_table: PathBuf,

        /// Outputs updated before this date (DD/MM/YYYY) are rerun
        #[arg(long, value_parser = select_pairs::parse_date_min)]
        update_date_min: Option<chrono::NaiveDate>,
    },

    /// Tabulate batch VM runtimes and costs
    SummarizeOperations {
        #[arg(long, default_value = "config/samples.all.tsv")]
        samples_table: PathBuf,

        #[arg(long, default_value = "workflow/logs/gcloud_operations.tsv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cloud = cli.cloud;

    let store: Arc<dyn ObjectStore> = Arc::new(GsutilStore::new(&cloud.gsutil_bin));
    let compute = GcloudCompute::new(&cloud.gcloud_bin, &cloud.gcloud_zone, &cloud.instance_prefix);
    let observer: Arc<dyn ProgressObserver> = Arc::new(TracingObserver);

    match cli.command {
        Command::PopulateBam {
            samples_table,
            selection,
            jobs,
        } => {
            bam_bucket::populate_bam(
                store,
                observer,
                &samples_table,
                &cloud.bam_bucket_uri,
                &selection.selection()?,
                jobs,
            )
            .await?;
        }
        Command::DepopulateBam {
            samples_table,
            selection,
        } => {
            bam_bucket::depopulate_bam(
                store,
                observer,
                &samples_table,
                &cloud.bam_bucket_uri,
                &selection.selection()?,
            )
            .await?;
        }
        Command::PopulateResults {
            workdir,
            start_from,
            vm_log_dir,
            jobs,
        } => {
            results_bucket::populate_results(
                store,
                observer,
                &workdir,
                &cloud.results_bucket_uri,
                &start_from,
                vm_log_dir.as_deref(),
                jobs,
            )
            .await?;
        }
        Command::BatchIndices {
            samples_table,
            range,
            output,
        } => {
            let pending = batch_selection::generate_batch_indices(
                store.as_ref(),
                &samples_table,
                &cloud.vm_logs_uri,
                &cloud.vm_logs_failed_uri,
                range.range(),
            )
            .await?;
            batch_selection::write_batch_indices(&output, &pending)?;
        }
        Command::PrintBatchIndices {
            logs_uri,
            prefix,
            range,
            ignore_running,
        } => {
            let logs_uri = logs_uri.unwrap_or_else(|| cloud.vm_logs_failed_uri.clone());
            let inventory: Option<&dyn ComputeInventory> = if ignore_running { Some(&compute) } else { None };
            let batches = batch_selection::list_batch_indices(
                store.as_ref(),
                inventory,
                &logs_uri,
                &prefix,
                &cloud.instance_prefix,
                range.range(),
            )
            .await?;

            for batch in batches {
                println!("{}", batch);
            }
        }
        Command::SelectPairs {
            pairs_table,
            update_date_min,
        } => {
            select_pairs::select_pairs(store.as_ref(), &pairs_table, &cloud.results_bucket_uri, update_date_min)
                .await?;
        }
        Command::SummarizeOperations {
            samples_table,
            output,
        } => {
            operations::summarize_operations(&compute, &samples_table, &output, &cloud.instance_prefix).await?;
        }
    }

    info!("Done");
    Ok(())
}

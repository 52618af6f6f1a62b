// ==============================================================================
// main.rs - CNV Processor Entry Point
// ==============================================================================
// Description: Command-line entry point for batch packing and CNV table tools
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cnv_processor::batch::packer::BYTES_PER_GIB;
use cnv_processor::batch::{prepare_samples, DiskSizePolicy, PackerConfig};
use cnv_processor::cnv::{chr_arm, concat, filter_calls, gene_calls, vcf_table};
use cnv_processor::models::Gender;
use cnv_processor::progress::TracingObserver;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair DNA samples per subject and assign processing batches
    PrepareSamples {
        /// Samples table (Sample_Id, Subject_Id, Sample_Type, File_Size, ...)
        #[arg(long)]
        input: PathBuf,

        /// Output samples table restricted to paired samples
        #[arg(long)]
        samples: PathBuf,

        /// Output tumor/normal pairs table
        #[arg(long)]
        pairs: PathBuf,

        /// Maximum disk size of a batch, in GiB
        #[arg(long, default_value_t = 190)]
        max_disk_size: u64,

        /// Maximum number of pairs in a batch
        #[arg(long, default_value_t = 4)]
        max_batch_size: usize,

        /// Close batches that would exceed --max-disk-size
        #[arg(long)]
        enforce_disk_size: bool,

        /// Pair ids pinned to batch 0
        #[arg(long, value_delimiter = ',')]
        seed_batch_0: Vec<String>,

        /// Pair ids pinned to batch 1
        #[arg(long, value_delimiter = ',')]
        seed_batch_1: Vec<String>,
    },

    /// Convert a facets VCF into a labelled segment table
    VcfToTable {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Sample gender (male or female)
        #[arg(long, value_parser = parse_gender)]
        gender: Gender,

        /// Re-emit the ## header lines
        #[arg(long)]
        keep_header: bool,
    },

    /// Intersect a gene BED with CNV segments
    GeneCalls {
        /// CNV segments (BED-like, no header)
        #[arg(long)]
        segments: PathBuf,

        /// Gene annotation BED
        #[arg(long)]
        genes: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },

    /// Keep focal gene-level calls, one row per gene and chromosome
    FilterCalls {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Segments of this many Mb or more are dropped
        #[arg(long, default_value_t = filter_calls::DEFAULT_MAX_SEGMENT_MB)]
        threshold: f64,
    },

    /// Concatenate per-pair CNV tables
    ConcatCnv {
        /// Tables or directories of tables
        #[arg(long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        output: PathBuf,

        /// Segments of this many Mb or more do not PASS
        #[arg(long, default_value_t = filter_calls::DEFAULT_MAX_SEGMENT_MB)]
        threshold: f64,
    },

    /// Concatenate headered tables
    ConcatTables {
        /// Tables or directories of tables
        #[arg(long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        output: PathBuf,

        /// Keep the ## header lines of the first table
        #[arg(long)]
        keep_header: bool,
    },

    /// Classify chromosome-arm events with a rules table
    ChrArm {
        /// Chromosome-arm tables, one per pair
        #[arg(long, num_args = 1.., required = true)]
        arms: Vec<PathBuf>,

        /// CNV summary tables, in the same order as --arms
        #[arg(long, num_args = 1.., required = true)]
        summaries: Vec<PathBuf>,

        /// Clinical table (DNA_T, DNA_N, Gender)
        #[arg(long)]
        clinical: PathBuf,

        /// Rules table (WGD, X_Male, Ratio_To_Ploidy, TCN, LCN, State, State_More)
        #[arg(long)]
        rules: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
}

fn parse_gender(value: &str) -> Result<Gender, String> {
    Gender::parse(value).ok_or_else(|| format!("gender must be male or female, got '{}'", value))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cnv_processor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let observer = TracingObserver;

    match args.command {
        Command::PrepareSamples {
            input,
            samples,
            pairs,
            max_disk_size,
            max_batch_size,
            enforce_disk_size,
            seed_batch_0,
            seed_batch_1,
        } => {
            let config = PackerConfig {
                max_disk_size_bytes: max_disk_size * BYTES_PER_GIB,
                max_batch_size,
                disk_size_policy: if enforce_disk_size {
                    DiskSizePolicy::Enforced
                } else {
                    DiskSizePolicy::Advisory
                },
                seeded_batches: vec![seed_batch_0, seed_batch_1],
            };
            prepare_samples(&input, &samples, &pairs, config, &observer)?;
        }
        Command::VcfToTable {
            input,
            output,
            gender,
            keep_header,
        } => vcf_table::convert_vcf(&input, &output, gender, keep_header)?,
        Command::GeneCalls {
            segments,
            genes,
            output,
        } => gene_calls::annotate_genes(&segments, &genes, &output)?,
        Command::FilterCalls {
            input,
            output,
            threshold,
        } => filter_calls::filter_calls_file(&input, &output, threshold, &observer)?,
        Command::ConcatCnv {
            inputs,
            output,
            threshold,
        } => concat::concatenate_cnv(&inputs, &output, threshold, &observer)?,
        Command::ConcatTables {
            inputs,
            output,
            keep_header,
        } => concat::concatenate_tables(&inputs, &output, keep_header, &observer)?,
        Command::ChrArm {
            arms,
            summaries,
            clinical,
            rules,
            output,
        } => chr_arm::classify_arm_files(&arms, &summaries, &clinical, &rules, &output)?,
    }

    info!("Done");
    Ok(())
}

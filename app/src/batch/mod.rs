// ==============================================================================
// batch/mod.rs - Batch Assignment
// ==============================================================================
// Description: Batch packing of tumor/normal pairs and batch index selection
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod packer;
pub mod indices;
pub mod samples;

pub use packer::{
    Batch, BatchPacker, BatchState, ConsistencyError, DiskSizePolicy, PackError, PackerConfig,
    PackingResult,
};
pub use indices::{pending_batches, BatchRange};
pub use samples::prepare_samples;

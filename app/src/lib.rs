// ==============================================================================
// lib.rs - CNV Processor Library
// ==============================================================================
// Description: Library interface for batch packing and CNV table modules
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod parsers;
pub mod models;
pub mod output;
pub mod progress;
pub mod batch;
pub mod cnv;

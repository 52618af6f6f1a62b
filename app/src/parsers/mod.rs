// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for tab-separated tables and copy-number VCFs
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod tsv;
pub mod facets_vcf;

pub use tsv::{Table, TableError, TableReader};
pub use facets_vcf::{read_facets_vcf, header_value};

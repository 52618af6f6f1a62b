// ==============================================================================
// models.rs - Sample Pair and Copy-Number Data Models
// ==============================================================================
// Description: Data structures shared by the batch packer and CNV classifier
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Column holding the tumor sample barcode in per-pair CNV tables
pub const COL_TUMOR_BARCODE: &str = "Tumor_Sample_Barcode";

/// Column holding the matched normal sample barcode in per-pair CNV tables
pub const COL_NORMAL_BARCODE: &str = "Matched_Norm_Sample_Barcode";

/// Separator between tumor and normal ids in a pair identifier
pub const PAIR_SEPARATOR: &str = "_vs_";

/// Type of a sequenced DNA sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    #[serde(rename = "DNA_T")]
    Tumor,
    #[serde(rename = "DNA_N")]
    Normal,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Tumor => "DNA_T",
            SampleType::Normal => "DNA_N",
        }
    }

    /// Parse the `Sample_Type` column; anything but DNA_T/DNA_N is not sequenced DNA
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "DNA_T" => Some(SampleType::Tumor),
            "DNA_N" => Some(SampleType::Normal),
            _ => None,
        }
    }
}

/// Gender as recorded in clinical tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Case-insensitive parse; `None` for unknown values
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// A tumor/normal pair processed together on one VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePair {
    /// Tumor aliquot barcode (DNA_T)
    pub tumor_sample_id: String,

    /// Matched normal aliquot barcode (DNA_N)
    pub normal_sample_id: String,

    /// Patient identifier; all pairs of a subject share a batch
    pub subject_id: String,

    /// Size of tumor + normal BAM files, in bytes
    pub paired_file_size_bytes: u64,
}

impl SamplePair {
    pub fn new(
        tumor_sample_id: impl Into<String>,
        normal_sample_id: impl Into<String>,
        subject_id: impl Into<String>,
        paired_file_size_bytes: u64,
    ) -> Self {
        Self {
            tumor_sample_id: tumor_sample_id.into(),
            normal_sample_id: normal_sample_id.into(),
            subject_id: subject_id.into(),
            paired_file_size_bytes,
        }
    }

    /// Pair identifier, e.g. `TCGA-02-0003-01A_vs_TCGA-02-0003-10A`
    pub fn pair_id(&self) -> String {
        pair_id(&self.tumor_sample_id, &self.normal_sample_id)
    }
}

impl fmt::Display for SamplePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.tumor_sample_id, PAIR_SEPARATOR, self.normal_sample_id)
    }
}

/// Build the `DNA_P` identifier of a tumor/normal pair
pub fn pair_id(tumor: &str, normal: &str) -> String {
    format!("{}{}{}", tumor, PAIR_SEPARATOR, normal)
}

/// Extract (tumor, normal) barcodes from a per-pair file name
///
/// Files are named `<tumor>_vs_<normal>.tsv`, `<tumor>_vs_<normal>.bed` or
/// any compressed variant of those. Returns `None` when the name does not
/// follow that convention.
pub fn barcodes_from_path(path: &Path) -> Option<(String, String)> {
    let basename = path.file_name()?.to_string_lossy().to_string();
    let (tumor, rest) = basename.split_once(PAIR_SEPARATOR)?;

    let normal = if let Some(idx) = rest.find(".bed") {
        &rest[..idx]
    } else if let Some(idx) = rest.find(".tsv") {
        &rest[..idx]
    } else {
        return None;
    };

    if tumor.is_empty() || normal.is_empty() {
        return None;
    }

    Some((tumor.to_string(), normal.to_string()))
}

/// Copy-number segment (or chromosome arm) ready for classification
#[derive(Debug, Clone, PartialEq)]
pub struct CnaSegment {
    /// Chromosome, or arm label such as `23p` for arm-level tables
    pub chromosome: String,

    /// Segment start, when the table is segment-level
    pub start: Option<u64>,

    /// Segment end, when the table is segment-level
    pub end: Option<u64>,

    /// Total copy number (NA when the caller could not estimate it)
    pub tcn: Option<f64>,

    /// Minor copy number (NA when the caller could not estimate it)
    pub lcn: Option<f64>,

    /// Sample average ploidy, already adjusted for male sex chromosomes
    pub ploidy: f64,

    /// Arm of chromosome X in a male sample
    pub is_male_x_arm: bool,

    /// Whole-genome doubling status of the tumor
    pub whole_genome_doubled: bool,
}

impl CnaSegment {
    /// tcn / ploidy
    pub fn tcn_ratio(&self) -> Option<f64> {
        self.tcn.map(|tcn| tcn / self.ploidy)
    }

    /// lcn / ploidy
    pub fn lcn_ratio(&self) -> Option<f64> {
        self.lcn.map(|lcn| lcn / self.ploidy)
    }
}

/// Parse a 0/1/true/false style flag column
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" => Some(true),
        "0" | "0.0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_pair_id() {
        let pair = SamplePair::new("T1", "N1", "S1", 10);
        assert_eq!(pair.pair_id(), "T1_vs_N1");
        assert_eq!(pair.to_string(), "T1_vs_N1");
    }

    #[test]
    fn test_barcodes_from_path() {
        let path = PathBuf::from("results/calling/TCGA-A-01A_vs_TCGA-A-10A.tsv.gz");
        assert_eq!(
            barcodes_from_path(&path),
            Some(("TCGA-A-01A".to_string(), "TCGA-A-10A".to_string()))
        );

        let bed = PathBuf::from("T_vs_N.bed");
        assert_eq!(barcodes_from_path(&bed), Some(("T".to_string(), "N".to_string())));

        assert_eq!(barcodes_from_path(&PathBuf::from("no_pair.tsv")), None);
        assert_eq!(barcodes_from_path(&PathBuf::from("T_vs_N.txt")), None);
    }

    #[test]
    fn test_ratios() {
        let segment = CnaSegment {
            chromosome: "1".to_string(),
            start: Some(100),
            end: Some(200),
            tcn: Some(4.0),
            lcn: None,
            ploidy: 2.0,
            is_male_x_arm: false,
            whole_genome_doubled: false,
        };
        assert_eq!(segment.tcn_ratio(), Some(2.0));
        assert_eq!(segment.lcn_ratio(), None);
    }

    #[test]
    fn test_parse_flag_and_gender() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(Gender::parse("MALE"), Some(Gender::Male));
        assert_eq!(Gender::parse("unknown"), None);
        assert_eq!(SampleType::parse("DNA_T"), Some(SampleType::Tumor));
        assert_eq!(SampleType::parse("RNA_T"), None);
    }
}

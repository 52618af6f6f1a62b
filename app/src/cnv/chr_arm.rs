// ==============================================================================
// cnv/chr_arm.rs - Chromosome-Arm Event Classification
// ==============================================================================
// Description: Joins arm-level copy numbers with ploidy/WGD/gender and
//              applies the rule table
// Author: Matt Barham
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::cnv::ensure_barcodes;
use crate::cnv::rules::{Classification, RuleParseError, RuleSet};
use crate::models::{parse_flag, CnaSegment, Gender, COL_NORMAL_BARCODE, COL_TUMOR_BARCODE};
use crate::output::TableWriter;
use crate::parsers::tsv::{Table, TableError, TableReader};

/// Arm labels of chromosome X
pub const X_ARMS: [&str; 2] = ["23p", "23q"];

pub const COL_ARM: &str = "arm";
pub const COL_PLOIDY: &str = "Ploidy";
pub const COL_WGD: &str = "WGD";
pub const COL_GENDER: &str = "Gender";

#[derive(Error, Debug)]
pub enum ChrArmError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Rules(#[from] RuleParseError),

    #[error("{arms} chromosome-arm tables but {summaries} CNV summary tables")]
    InputCountMismatch { arms: usize, summaries: usize },
}

/// Concatenate arm tables (adding barcodes from file names) and summaries
pub fn load_arm_tables(arm_files: &[PathBuf], summary_files: &[PathBuf]) -> Result<(Table, Table), ChrArmError> {
    if arm_files.len() != summary_files.len() {
        return Err(ChrArmError::InputCountMismatch {
            arms: arm_files.len(),
            summaries: summary_files.len(),
        });
    }

    let reader = TableReader::new();
    let mut arms = Vec::with_capacity(arm_files.len());
    let mut summaries = Vec::with_capacity(summary_files.len());

    for (arm_file, summary_file) in arm_files.iter().zip(summary_files) {
        let mut arm = reader.read(arm_file)?;
        ensure_barcodes(&mut arm, arm_file)?;
        arms.push(arm);
        summaries.push(reader.read(summary_file)?);
    }

    Ok((
        Table::concat(arms, "chr_arm"),
        Table::concat(summaries, "cnv_summary"),
    ))
}

/// Classify every arm and append Ploidy, WGD, State and State_More
///
/// Pairs absent from the summaries get empty Ploidy/WGD and stay neutral;
/// pairs absent from the clinical table are treated as non-male.
pub fn classify_arms(
    arms: &Table,
    summaries: &Table,
    clinical: &Table,
    rules: &RuleSet,
) -> Result<Table, ChrArmError> {
    arms.require(&[COL_TUMOR_BARCODE, COL_NORMAL_BARCODE, COL_ARM, "tcn", "lcn"])?;
    summaries.require(&[COL_TUMOR_BARCODE, COL_NORMAL_BARCODE, COL_PLOIDY, COL_WGD])?;

    let mut clinical = clinical.clone();
    clinical.rename_columns(&[("DNA_T", COL_TUMOR_BARCODE), ("DNA_N", COL_NORMAL_BARCODE)]);
    clinical.require(&[COL_TUMOR_BARCODE, COL_NORMAL_BARCODE, COL_GENDER])?;

    let pair_key = [COL_TUMOR_BARCODE, COL_NORMAL_BARCODE];
    let summary_index = summaries.index_by(&pair_key)?;
    let clinical_index = clinical.index_by(&pair_key)?;

    let mut output = arms.clone();
    let mut ploidy_col = Vec::with_capacity(arms.len());
    let mut wgd_col = Vec::with_capacity(arms.len());
    let mut state_col = Vec::with_capacity(arms.len());
    let mut state_more_col = Vec::with_capacity(arms.len());
    let mut counts: HashMap<String, usize> = HashMap::new();

    for row in 0..arms.len() {
        let key = vec![
            arms.value(row, COL_TUMOR_BARCODE)?.to_string(),
            arms.value(row, COL_NORMAL_BARCODE)?.to_string(),
        ];

        let (ploidy_raw, wgd_raw) = match summary_index.get(&key) {
            Some(&s) => (
                summaries.value(s, COL_PLOIDY)?.to_string(),
                summaries.value(s, COL_WGD)?.to_string(),
            ),
            None => (String::new(), String::new()),
        };

        let male = clinical_index
            .get(&key)
            .map(|&c| clinical.value(c, COL_GENDER))
            .transpose()?
            .and_then(Gender::parse)
            == Some(Gender::Male);

        let arm = arms.value(row, COL_ARM)?;

        let classification = match parse_flag(&wgd_raw) {
            Some(wgd) => {
                let ploidy = match ploidy_raw.trim() {
                    "" => f64::NAN,
                    raw => raw
                        .parse::<f64>()
                        .map_err(|_| summaries.invalid(summary_index[&key], COL_PLOIDY, raw))?,
                };

                let segment = CnaSegment {
                    chromosome: arm.to_string(),
                    start: None,
                    end: None,
                    tcn: arms.parse_f64(row, "tcn")?,
                    lcn: arms.parse_f64(row, "lcn")?,
                    ploidy,
                    is_male_x_arm: male && X_ARMS.contains(&arm),
                    whole_genome_doubled: wgd,
                };
                rules.classify(&segment)
            }
            // Unknown WGD status matches no rule
            None => Classification::neutral(),
        };

        *counts.entry(classification.state_more.clone()).or_default() += 1;

        ploidy_col.push(ploidy_raw);
        wgd_col.push(wgd_raw);
        state_col.push(classification.state.to_string());
        state_more_col.push(classification.state_more);
    }

    let missing = wgd_col.iter().filter(|w| w.is_empty()).count();
    if missing > 0 {
        warn!("{} arms without WGD status were left neutral", missing);
    }

    let mut summary: Vec<_> = counts.into_iter().collect();
    summary.sort();
    for (label, count) in summary {
        info!("{}: {} arms", label, count);
    }

    output.push_column(COL_PLOIDY, ploidy_col);
    output.push_column(COL_WGD, wgd_col);
    output.push_column("State", state_col);
    output.push_column("State_More", state_more_col);

    Ok(output)
}

/// chr-arm command body
pub fn classify_arm_files(
    arm_files: &[PathBuf],
    summary_files: &[PathBuf],
    clinical_path: &Path,
    rules_path: &Path,
    output: &Path,
) -> Result<()> {
    let (arms, summaries) = load_arm_tables(arm_files, summary_files)?;
    let clinical = TableReader::new()
        .read(clinical_path)
        .with_context(|| format!("Failed to read clinical table {:?}", clinical_path))?;
    let rules = RuleSet::from_path(rules_path)
        .with_context(|| format!("Failed to load rules {:?}", rules_path))?;

    let classified = classify_arms(&arms, &summaries, &clinical, &rules)?;
    TableWriter::new().write(&classified, output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const RULES: &str = "WGD\tX_Male\tRatio_To_Ploidy\tTCN\tLCN\tState\tState_More\n\
        0\t0\t1\t>=2,<3\tNA\t1\tML_amp\n\
        0\t0\t1\t0\t0\t-2\thom_del\n\
        0\t1\t1\t0\tNA\t-2\thom_del\n\
        1\t0\t0\t>=8\tNA\t2\tHL_amp\n";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_classify_arm_files() {
        let dir = tempdir().unwrap();
        let arms_a = write(dir.path(), "TA_vs_NT.tsv", "arm\ttcn\tlcn\n1p\t4\t1\n23p\t0\t\n");
        let arms_b = write(dir.path(), "TB_vs_NB.tsv", "arm\ttcn\tlcn\n1p\t0\t0\n2q\t8\t4\n");
        let sum_a = write(
            dir.path(),
            "sum_a.tsv",
            "Tumor_Sample_Barcode\tMatched_Norm_Sample_Barcode\tPloidy\tWGD\nTA\tNT\t2\t0\n",
        );
        let sum_b = write(
            dir.path(),
            "sum_b.tsv",
            "Tumor_Sample_Barcode\tMatched_Norm_Sample_Barcode\tPloidy\tWGD\nTB\tNB\t3.8\t1\n",
        );
        let clinical = write(dir.path(), "cln.tsv", "DNA_T\tDNA_N\tGender\nTA\tNT\tMale\nTB\tNB\tFemale\n");
        let rules = write(dir.path(), "rules.tsv", RULES);
        let output = dir.path().join("arms.tsv");

        classify_arm_files(&[arms_a, arms_b], &[sum_a, sum_b], &clinical, &rules, &output).unwrap();
        let table = TableReader::new().read(&output).unwrap();

        assert_eq!(
            table.columns,
            vec![
                "Tumor_Sample_Barcode",
                "Matched_Norm_Sample_Barcode",
                "arm",
                "tcn",
                "lcn",
                "Ploidy",
                "WGD",
                "State",
                "State_More"
            ]
        );

        // tcn 4 / ploidy 2 = 2.0
        assert_eq!(table.value(0, "State_More").unwrap(), "ML_amp");
        assert_eq!(table.value(0, "State").unwrap(), "1");
        // Male X arm uses the X_Male rules
        assert_eq!(table.value(1, "State_More").unwrap(), "hom_del");
        // WGD sample: no hom_del rule, absolute tcn 8 is HL_amp
        assert_eq!(table.value(2, "State_More").unwrap(), "NEUTR");
        assert_eq!(table.value(2, "State").unwrap(), "0");
        assert_eq!(table.value(3, "State_More").unwrap(), "HL_amp");
        assert_eq!(table.value(3, "Ploidy").unwrap(), "3.8");
    }

    #[test]
    fn test_missing_summary_is_neutral() {
        let mut arms = Table::new(
            "arms",
            ["Tumor_Sample_Barcode", "Matched_Norm_Sample_Barcode", "arm", "tcn", "lcn"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        arms.rows.push(vec!["T".into(), "N".into(), "1p".into(), "0".into(), "0".into()]);
        let summaries = Table::new(
            "sum",
            ["Tumor_Sample_Barcode", "Matched_Norm_Sample_Barcode", "Ploidy", "WGD"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        let clinical = Table::new(
            "cln",
            ["DNA_T", "DNA_N", "Gender"].iter().map(|c| c.to_string()).collect(),
        );
        let rules = TableReader::new()
            .parse_str(RULES, Path::new("rules.tsv"))
            .unwrap();
        let rules = RuleSet::from_table(&rules).unwrap();

        let classified = classify_arms(&arms, &summaries, &clinical, &rules).unwrap();
        assert_eq!(classified.value(0, "State_More").unwrap(), "NEUTR");
        assert_eq!(classified.value(0, "WGD").unwrap(), "");
    }

    #[test]
    fn test_input_count_mismatch() {
        let err = load_arm_tables(&[PathBuf::from("a.tsv")], &[]).unwrap_err();
        assert!(matches!(err, ChrArmError::InputCountMismatch { arms: 1, summaries: 0 }));
    }
}

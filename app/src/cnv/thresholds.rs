// ==============================================================================
// cnv/thresholds.rs - Fixed Copy-Number Pre-Labeling
// ==============================================================================
// Description: Gain/loss labels from total and minor copy number vs ploidy
// Author: Matt Barham
// Created: 2026-10-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Gains (tcn / ploidy):
//   HL_gain  > 3
//   ML_gain  > 2
//   LL_gain  > 1.4
// Losses:
//   hom_del  tcn = 0 and lcn = 0
//   LOH      lcn = 0 and tcn / ploidy < 0.6
//   cnLOH    lcn = 0 and 0.6 < tcn / ploidy < 1.4
// ==============================================================================

use std::fmt;

use crate::models::CnaSegment;

pub const HIGH_LEVEL_GAIN_RATIO: f64 = 3.0;
pub const MID_LEVEL_GAIN_RATIO: f64 = 2.0;
pub const LOW_LEVEL_GAIN_RATIO: f64 = 1.4;
pub const LOH_RATIO: f64 = 0.6;
pub const CNLOH_UPPER_RATIO: f64 = 1.4;

/// Segment label written to `copy_number_more`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CnaLabel {
    HighLevelGain,
    MidLevelGain,
    LowLevelGain,
    HomozygousDeletion,
    LossOfHeterozygosity,
    CopyNeutralLoh,
}

impl CnaLabel {
    pub const ALL: [CnaLabel; 6] = [
        CnaLabel::HighLevelGain,
        CnaLabel::MidLevelGain,
        CnaLabel::LowLevelGain,
        CnaLabel::HomozygousDeletion,
        CnaLabel::LossOfHeterozygosity,
        CnaLabel::CopyNeutralLoh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CnaLabel::HighLevelGain => "HL_gain",
            CnaLabel::MidLevelGain => "ML_gain",
            CnaLabel::LowLevelGain => "LL_gain",
            CnaLabel::HomozygousDeletion => "hom_del",
            CnaLabel::LossOfHeterozygosity => "LOH",
            CnaLabel::CopyNeutralLoh => "cnLOH",
        }
    }

    /// Value of the `copy_number` column; only amplifications and deep deletions carry one
    pub fn copy_number(&self) -> Option<i32> {
        match self {
            CnaLabel::HighLevelGain => Some(2),
            CnaLabel::HomozygousDeletion => Some(-2),
            _ => None,
        }
    }
}

impl fmt::Display for CnaLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label a segment from its copy numbers and the ploidy of its chromosome
///
/// Gains and losses are mutually exclusive ranges of the ratio, so at most
/// one label applies. A NaN ploidy disables every ratio-based label.
pub fn label_copy_number(tcn: Option<f64>, lcn: Option<f64>, ploidy: f64) -> Option<CnaLabel> {
    let tcn = tcn?;
    let ratio = tcn / ploidy;

    if ratio > HIGH_LEVEL_GAIN_RATIO {
        return Some(CnaLabel::HighLevelGain);
    }
    if ratio > MID_LEVEL_GAIN_RATIO {
        return Some(CnaLabel::MidLevelGain);
    }
    if ratio > LOW_LEVEL_GAIN_RATIO {
        return Some(CnaLabel::LowLevelGain);
    }

    if lcn? != 0.0 {
        return None;
    }

    if tcn == 0.0 {
        Some(CnaLabel::HomozygousDeletion)
    } else if ratio < LOH_RATIO {
        Some(CnaLabel::LossOfHeterozygosity)
    } else if ratio > LOH_RATIO && ratio < CNLOH_UPPER_RATIO {
        Some(CnaLabel::CopyNeutralLoh)
    } else {
        None
    }
}

/// Label a parsed segment
pub fn label_segment(segment: &CnaSegment) -> Option<CnaLabel> {
    label_copy_number(segment.tcn, segment.lcn, segment.ploidy)
}

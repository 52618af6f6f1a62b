// ==============================================================================
// cnv/rules.rs - Chromosome-Arm Rule Classifier
// ==============================================================================
// Description: Typed rule table evaluated against copy-number segments
// Author: Matt Barham
// Created: 2026-10-14
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================
// Rules table columns:
//   WGD  X_Male  Ratio_To_Ploidy  TCN  LCN  State  State_More
// TCN/LCN cells:
//   NA (or empty)   any value
//   2               equal to 2
//   >=2  <1.5 ...   one inequality
//   >=2,<3          both inequalities (range)
// ==============================================================================

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{parse_flag, CnaSegment};
use crate::parsers::tsv::{Table, TableError, TableReader};

pub const COL_WGD: &str = "WGD";
pub const COL_X_MALE: &str = "X_Male";
pub const COL_RATIO_TO_PLOIDY: &str = "Ratio_To_Ploidy";
pub const COL_TCN: &str = "TCN";
pub const COL_LCN: &str = "LCN";
pub const COL_STATE: &str = "State";
pub const COL_STATE_MORE: &str = "State_More";

/// State assigned when no rule matches
pub const NEUTRAL_STATE: i32 = 0;

/// Label assigned when no rule matches
pub const NEUTRAL_LABEL: &str = "NEUTR";

/// Errors raised while loading a rules table
#[derive(Error, Debug)]
pub enum RuleParseError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Invalid predicate '{value}' in column {column} of rule {row}")]
    InvalidPredicate {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid flag '{value}' in column {column} of rule {row}")]
    InvalidFlag {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid state '{value}' in rule {row}")]
    InvalidState { row: usize, value: String },

    #[error("Rules disagree on Ratio_To_Ploidy for WGD={wgd}, X_Male={x_male}")]
    ConflictingRatioMode { wgd: bool, x_male: bool },
}

/// Comparison of a copy-number key against a constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    Eq(f64),
    Lt { value: f64, inclusive: bool },
    Gt { value: f64, inclusive: bool },
    /// Lower and upper bound; each side may be inclusive
    Range {
        low: f64,
        low_inclusive: bool,
        high: f64,
        high_inclusive: bool,
    },
}

impl Predicate {
    /// Parse a rule cell; `Ok(None)` is a wildcard
    pub fn parse(text: &str) -> Result<Option<Predicate>, String> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("NA") {
            return Ok(None);
        }

        if let Some((first, second)) = text.split_once(',') {
            let first = Self::parse_comparison(first).ok_or_else(|| text.to_string())?;
            let second = Self::parse_comparison(second).ok_or_else(|| text.to_string())?;

            return match (first, second) {
                (Predicate::Gt { value: low, inclusive: li }, Predicate::Lt { value: high, inclusive: hi })
                | (Predicate::Lt { value: high, inclusive: hi }, Predicate::Gt { value: low, inclusive: li }) => {
                    Ok(Some(Predicate::Range {
                        low,
                        low_inclusive: li,
                        high,
                        high_inclusive: hi,
                    }))
                }
                _ => Err(text.to_string()),
            };
        }

        if let Ok(value) = text.parse::<f64>() {
            return Ok(Some(Predicate::Eq(value)));
        }

        Self::parse_comparison(text)
            .map(Some)
            .ok_or_else(|| text.to_string())
    }

    fn parse_comparison(text: &str) -> Option<Predicate> {
        let text = text.trim();

        // Two-character operators first so that "<=" is not read as "<"
        let (op, rest) = ["<=", ">=", "==", "<", ">"]
            .iter()
            .find_map(|op| text.strip_prefix(op).map(|rest| (*op, rest)))?;
        let value = rest.trim().parse::<f64>().ok()?;

        Some(match op {
            "<" => Predicate::Lt { value, inclusive: false },
            "<=" => Predicate::Lt { value, inclusive: true },
            ">" => Predicate::Gt { value, inclusive: false },
            ">=" => Predicate::Gt { value, inclusive: true },
            _ => Predicate::Eq(value),
        })
    }

    /// Whether a key satisfies the predicate; NaN never does
    pub fn matches(&self, key: f64) -> bool {
        match *self {
            Predicate::Eq(value) => key == value,
            Predicate::Lt { value, inclusive } => {
                if inclusive {
                    key <= value
                } else {
                    key < value
                }
            }
            Predicate::Gt { value, inclusive } => {
                if inclusive {
                    key >= value
                } else {
                    key > value
                }
            }
            Predicate::Range {
                low,
                low_inclusive,
                high,
                high_inclusive,
            } => {
                Predicate::Gt { value: low, inclusive: low_inclusive }.matches(key)
                    && Predicate::Lt { value: high, inclusive: high_inclusive }.matches(key)
            }
        }
    }
}

/// One row of the rules table
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRule {
    pub whole_genome_doubled: bool,
    pub is_male_x_arm: bool,
    /// `None` matches any total copy number, including a missing one
    pub tcn: Option<Predicate>,
    /// `None` matches any minor copy number, including a missing one
    pub lcn: Option<Predicate>,
    pub state: i32,
    pub state_label: String,
}

impl ClassificationRule {
    fn matches(&self, wgd: bool, x_male: bool, tcn_key: Option<f64>, lcn_key: Option<f64>) -> bool {
        if self.whole_genome_doubled != wgd || self.is_male_x_arm != x_male {
            return false;
        }

        let satisfied = |predicate: &Option<Predicate>, key: Option<f64>| match (predicate, key) {
            (None, _) => true,
            (Some(p), Some(k)) => p.matches(k),
            (Some(_), None) => false,
        };

        satisfied(&self.tcn, tcn_key) && satisfied(&self.lcn, lcn_key)
    }
}

/// Outcome of classifying one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: i32,
    pub state_more: String,
}

impl Classification {
    pub fn neutral() -> Self {
        Self {
            state: NEUTRAL_STATE,
            state_more: NEUTRAL_LABEL.to_string(),
        }
    }
}

/// Ordered rules plus the key mode of each (WGD, X_Male) combination
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
    ratio_modes: HashMap<(bool, bool), bool>,
}

impl RuleSet {
    /// Load rules from a tab-separated file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleParseError> {
        let table = TableReader::new().read(path.as_ref())?;
        let rules = Self::from_table(&table)?;
        info!("Loaded {} classification rules from {:?}", rules.len(), path.as_ref());
        Ok(rules)
    }

    /// Parse and validate every rule up front
    pub fn from_table(table: &Table) -> Result<Self, RuleParseError> {
        table.require(&[
            COL_WGD,
            COL_X_MALE,
            COL_RATIO_TO_PLOIDY,
            COL_TCN,
            COL_LCN,
            COL_STATE,
            COL_STATE_MORE,
        ])?;

        let mut set = RuleSet::default();

        for row in 0..table.len() {
            // Rows are numbered as in a spreadsheet, header excluded
            let rule_number = row + 1;

            let flag = |column: &str| -> Result<bool, RuleParseError> {
                let value = table.value(row, column)?;
                parse_flag(value).ok_or_else(|| RuleParseError::InvalidFlag {
                    row: rule_number,
                    column: column.to_string(),
                    value: value.to_string(),
                })
            };
            let predicate = |column: &str| -> Result<Option<Predicate>, RuleParseError> {
                let value = table.value(row, column)?;
                Predicate::parse(value).map_err(|_| RuleParseError::InvalidPredicate {
                    row: rule_number,
                    column: column.to_string(),
                    value: value.to_string(),
                })
            };

            let wgd = flag(COL_WGD)?;
            let x_male = flag(COL_X_MALE)?;

            let ratio_cell = table.value(row, COL_RATIO_TO_PLOIDY)?.trim();
            let ratio_mode = if ratio_cell.is_empty() || ratio_cell.eq_ignore_ascii_case("NA") {
                false
            } else {
                flag(COL_RATIO_TO_PLOIDY)?
            };

            let existing = *set.ratio_modes.entry((wgd, x_male)).or_insert(ratio_mode);
            if existing != ratio_mode {
                return Err(RuleParseError::ConflictingRatioMode { wgd, x_male });
            }

            let state_cell = table.value(row, COL_STATE)?;
            let state = state_cell
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|s| s.fract() == 0.0)
                .map(|s| s as i32)
                .ok_or_else(|| RuleParseError::InvalidState {
                    row: rule_number,
                    value: state_cell.to_string(),
                })?;

            set.rules.push(ClassificationRule {
                whole_genome_doubled: wgd,
                is_male_x_arm: x_male,
                tcn: predicate(COL_TCN)?,
                lcn: predicate(COL_LCN)?,
                state,
                state_label: table.value(row, COL_STATE_MORE)?.to_string(),
            });
        }

        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Whether keys are divided by ploidy for this combination
    pub fn uses_ratio(&self, wgd: bool, x_male: bool) -> bool {
        self.ratio_modes.get(&(wgd, x_male)).copied().unwrap_or(false)
    }

    /// Classify a segment; when several rules match, the last one wins
    pub fn classify(&self, segment: &CnaSegment) -> Classification {
        let wgd = segment.whole_genome_doubled;
        let x_male = segment.is_male_x_arm;

        let (tcn_key, lcn_key) = if self.uses_ratio(wgd, x_male) {
            (segment.tcn_ratio(), segment.lcn_ratio())
        } else {
            (segment.tcn, segment.lcn)
        };

        match self
            .rules
            .iter()
            .rev()
            .find(|rule| rule.matches(wgd, x_male, tcn_key, lcn_key))
        {
            Some(rule) => {
                debug!(
                    "{}: tcn key {:?}, lcn key {:?} -> {}",
                    segment.chromosome, tcn_key, lcn_key, rule.state_label
                );
                Classification {
                    state: rule.state,
                    state_more: rule.state_label.clone(),
                }
            }
            None => Classification::neutral(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const RULES: &str = "WGD\tX_Male\tRatio_To_Ploidy\tTCN\tLCN\tState\tState_More\n\
        0\t0\t1\t>=2,<3\tNA\t1\tML_amp\n\
        0\t0\t1\t>=3\tNA\t2\tHL_amp\n\
        0\t0\t1\t0\t0\t-2\thom_del\n\
        0\t0\t1\t>0,<0.6\t0\t-1\tLOH\n\
        1\t0\t0\t>=8\tNA\t2\tHL_amp\n\
        0\t1\t0\t0\tNA\t-2\thom_del\n";

    fn rules() -> RuleSet {
        let table = TableReader::new()
            .parse_str(RULES, &PathBuf::from("rules.tsv"))
            .unwrap();
        RuleSet::from_table(&table).unwrap()
    }

    fn segment(tcn: Option<f64>, lcn: Option<f64>, ploidy: f64, wgd: bool, x_male: bool) -> CnaSegment {
        CnaSegment {
            chromosome: "1p".to_string(),
            start: None,
            end: None,
            tcn,
            lcn,
            ploidy,
            is_male_x_arm: x_male,
            whole_genome_doubled: wgd,
        }
    }

    #[test]
    fn test_parse_predicates() {
        assert_eq!(Predicate::parse("NA").unwrap(), None);
        assert_eq!(Predicate::parse("").unwrap(), None);
        assert_eq!(Predicate::parse("2").unwrap(), Some(Predicate::Eq(2.0)));
        assert_eq!(Predicate::parse("==1").unwrap(), Some(Predicate::Eq(1.0)));
        assert_eq!(
            Predicate::parse("<= 1.5").unwrap(),
            Some(Predicate::Lt { value: 1.5, inclusive: true })
        );
        assert_eq!(
            Predicate::parse("<3,>=2").unwrap(),
            Some(Predicate::Range {
                low: 2.0,
                low_inclusive: true,
                high: 3.0,
                high_inclusive: false,
            })
        );
    }

    #[test]
    fn test_reject_malformed_predicates() {
        assert!(Predicate::parse("!=2").is_err());
        assert!(Predicate::parse(">2,>3").is_err());
        assert!(Predicate::parse("abc").is_err());
        assert!(Predicate::parse(">=2,<3,<4").is_err());
    }

    #[test]
    fn test_predicate_matches() {
        let range = Predicate::parse(">=2,<3").unwrap().unwrap();
        assert!(range.matches(2.0));
        assert!(range.matches(2.9));
        assert!(!range.matches(3.0));
        assert!(!range.matches(f64::NAN));
        assert!(Predicate::Gt { value: 1.0, inclusive: false }.matches(1.5));
        assert!(!Predicate::Gt { value: 1.0, inclusive: false }.matches(1.0));
    }

    #[test]
    fn test_ratio_key_mid_level_amp() {
        // tcn 4 / ploidy 2 = 2.0 falls in [2, 3)
        let result = rules().classify(&segment(Some(4.0), Some(1.0), 2.0, false, false));
        assert_eq!(result.state, 1);
        assert_eq!(result.state_more, "ML_amp");
    }

    #[test]
    fn test_homozygous_deletion() {
        let result = rules().classify(&segment(Some(0.0), Some(0.0), 2.0, false, false));
        assert_eq!(result.state, -2);
        assert_eq!(result.state_more, "hom_del");
    }

    #[test]
    fn test_unmatched_is_neutral() {
        let result = rules().classify(&segment(Some(2.0), Some(1.0), 2.0, false, false));
        assert_eq!(result, Classification::neutral());
        assert_eq!(result.state_more, "NEUTR");

        // No rule for WGD + male X
        let result = rules().classify(&segment(Some(0.0), Some(0.0), 2.0, true, true));
        assert_eq!(result, Classification::neutral());
    }

    #[test]
    fn test_absolute_key_mode() {
        let set = rules();
        assert!(!set.uses_ratio(true, false));
        // Raw tcn 8 on a WGD genome, ratio would only be 2
        let result = set.classify(&segment(Some(8.0), Some(2.0), 4.0, true, false));
        assert_eq!(result.state_more, "HL_amp");
    }

    #[test]
    fn test_missing_value_never_satisfies() {
        let result = rules().classify(&segment(None, Some(0.0), 2.0, false, false));
        assert_eq!(result, Classification::neutral());

        // Wildcard LCN tolerates a missing lcn
        let result = rules().classify(&segment(Some(7.0), None, 2.0, false, false));
        assert_eq!(result.state_more, "HL_amp");
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let text = "WGD\tX_Male\tRatio_To_Ploidy\tTCN\tLCN\tState\tState_More\n\
            0\t0\t0\t>1\tNA\t1\tGAIN\n\
            0\t0\t0\t>3\tNA\t2\tAMP\n";
        let table = TableReader::new().parse_str(text, &PathBuf::from("r.tsv")).unwrap();
        let set = RuleSet::from_table(&table).unwrap();

        assert_eq!(set.classify(&segment(Some(5.0), None, 2.0, false, false)).state_more, "AMP");
        assert_eq!(set.classify(&segment(Some(2.0), None, 2.0, false, false)).state_more, "GAIN");
    }

    #[test]
    fn test_invalid_predicate_names_row() {
        let text = "WGD\tX_Male\tRatio_To_Ploidy\tTCN\tLCN\tState\tState_More\n\
            0\t0\t1\t>=2\tNA\t1\tGAIN\n\
            0\t0\t1\t!=2\tNA\t1\tGAIN\n";
        let table = TableReader::new().parse_str(text, &PathBuf::from("r.tsv")).unwrap();

        match RuleSet::from_table(&table).unwrap_err() {
            RuleParseError::InvalidPredicate { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "TCN");
                assert_eq!(value, "!=2");
            }
            other => panic!("Expected InvalidPredicate, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_ratio_mode() {
        let text = "WGD\tX_Male\tRatio_To_Ploidy\tTCN\tLCN\tState\tState_More\n\
            0\t0\t1\t>=2\tNA\t1\tGAIN\n\
            0\t0\t0\t>=5\tNA\t2\tAMP\n";
        let table = TableReader::new().parse_str(text, &PathBuf::from("r.tsv")).unwrap();

        assert!(matches!(
            RuleSet::from_table(&table).unwrap_err(),
            RuleParseError::ConflictingRatioMode { wgd: false, x_male: false }
        ));
    }

    #[test]
    fn test_missing_rule_column() {
        let table = TableReader::new()
            .parse_str("WGD\tX_Male\n0\t0\n", &PathBuf::from("r.tsv"))
            .unwrap();
        assert!(matches!(
            RuleSet::from_table(&table).unwrap_err(),
            RuleParseError::Table(TableError::MissingColumn { .. })
        ));
    }
}

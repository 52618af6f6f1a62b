// ==============================================================================
// parsers/facets_vcf.rs - FACETS Copy-Number VCF Parser
// ==============================================================================
// Description: Reads segment VCFs and expands INFO fields into columns
// Author: Matt Barham
// Created: 2026-10-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Format: VCF 4.x written by cnv_facets
// Example:
//   ##ploidy=2.1
//   #CHROM  POS    ID  REF  ALT    QUAL  FILTER  INFO
//   1       69424  .   N    <DUP>  .     PASS    SVTYPE=DUP;END=8516339;TCN_EM=3;LCN_EM=1
// ==============================================================================

use std::path::Path;
use tracing::{debug, warn};

use super::tsv::{Table, TableError, TableReader};

/// Tokens cnv_facets writes for missing values
pub const VCF_NA_VALUES: [&str; 2] = ["-", "."];

pub const COL_INFO: &str = "INFO";

/// Read a segment VCF as a table with INFO expanded into columns
///
/// INFO keys become columns in order of first appearance; a key absent
/// from a record leaves the cell empty. The `##` header is kept in
/// [`Table::meta`].
pub fn read_facets_vcf(path: impl AsRef<Path>) -> Result<Table, TableError> {
    let table = TableReader::new()
        .with_na_values(&VCF_NA_VALUES)
        .read(path.as_ref())?;
    expand_info(table)
}

/// Append one column per INFO key
pub fn expand_info(mut table: Table) -> Result<Table, TableError> {
    let info_idx = table.column_index(COL_INFO)?;

    let mut keys: Vec<String> = Vec::new();
    let mut parsed: Vec<Vec<(String, String)>> = Vec::with_capacity(table.len());

    for row in &table.rows {
        let fields: Vec<(String, String)> = row[info_idx]
            .split(';')
            .filter(|field| !field.is_empty())
            .map(|field| match field.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                // Flag fields carry no value
                None => (field.to_string(), String::new()),
            })
            .collect();

        for (key, _) in &fields {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        parsed.push(fields);
    }

    debug!("Expanding {} INFO keys over {} records", keys.len(), table.len());

    for key in &keys {
        if table.has_column(key) {
            warn!("INFO key {} shadows an existing column in {:?}", key, table.source);
        }
    }

    for (row, fields) in table.rows.iter_mut().zip(parsed) {
        for key in &keys {
            let value = fields
                .iter()
                .find(|(k, v)| k == key && !VCF_NA_VALUES.contains(&v.as_str()))
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            row.push(value);
        }
    }
    table.columns.extend(keys);

    Ok(table)
}

/// Numeric value of a `##field=value` header line
///
/// Returns `None` (with a warning) when the field is absent, repeated or
/// not a number.
pub fn header_value(meta: &[String], field: &str) -> Option<f64> {
    let prefix = format!("##{}=", field);
    let matches: Vec<&str> = meta
        .iter()
        .filter_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .collect();

    match matches.as_slice() {
        [] => {
            warn!("Header field {} not found", prefix);
            None
        }
        [value] => match value.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Header field {} has a non-numeric value '{}'", prefix, value);
                None
            }
        },
        _ => {
            warn!("Header field {} found {} times", prefix, matches.len());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FACETS_VCF: &str = "##fileformat=VCFv4.2\n\
        ##purity=0.45\n\
        ##ploidy=2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
        1\t69424\t1\tN\t<DUP>\t.\tPASS\tSVTYPE=DUP;SVLEN=8446915;END=8516339;NUM_MARK=1200;NHET=80;CNLR_MEDIAN=0.6;MAF_R=0.2;SEGCLUST=3;CNLR_MEDIAN_CLUST=0.6;MAF_R_CLUST=0.2;CF_EM=0.4;TCN_EM=7;LCN_EM=1\n\
        X\t100\t2\tN\t<LOH>\t.\tPASS\tSVTYPE=LOH;SVLEN=5000;END=5100;NUM_MARK=50;NHET=2;CNLR_MEDIAN=-0.2;MAF_R=1.1;SEGCLUST=5;CNLR_MEDIAN_CLUST=-0.2;MAF_R_CLUST=1.1;CF_EM=0.9;TCN_EM=1;LCN_EM=0\n\
        2\t500\t3\tN\t<NEUTRAL>\t.\tPASS\tSVTYPE=NEUTRAL;SVLEN=1000;END=1500;NUM_MARK=10;NHET=1;CNLR_MEDIAN=0;MAF_R=0;SEGCLUST=1;CNLR_MEDIAN_CLUST=0;MAF_R_CLUST=0;CF_EM=.;TCN_EM=2;LCN_EM=.\n";

    #[test]
    fn test_expand_info() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FACETS_VCF.as_bytes()).unwrap();

        let table = read_facets_vcf(file.path()).unwrap();
        assert_eq!(table.meta.len(), 3);
        assert!(table.has_column("TCN_EM"));
        assert!(table.has_column("MAF_R_CLUST"));
        assert_eq!(table.value(0, "END").unwrap(), "8516339");
        assert_eq!(table.value(1, "SVTYPE").unwrap(), "LOH");
        assert_eq!(table.value(2, "LCN_EM").unwrap(), "");
        assert_eq!(table.value(2, "QUAL").unwrap(), "");
    }

    #[test]
    fn test_header_value() {
        let meta = vec!["##purity=0.45".to_string(), "##ploidy=2.5".to_string()];
        assert_eq!(header_value(&meta, "ploidy"), Some(2.5));
        assert_eq!(header_value(&meta, "dipLogR"), None);

        let repeated = vec!["##ploidy=2".to_string(), "##ploidy=3".to_string()];
        assert_eq!(header_value(&repeated, "ploidy"), None);
    }

    #[test]
    fn test_missing_info_column() {
        let table = Table::new("x.vcf", vec!["#CHROM".to_string()]);
        assert!(matches!(expand_info(table), Err(TableError::MissingColumn { .. })));
    }
}

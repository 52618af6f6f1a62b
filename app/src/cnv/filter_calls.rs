// ==============================================================================
// cnv/filter_calls.rs - Gene-Level Call Filtering
// ==============================================================================
// Description: Keeps focal calls and reshapes them into MAF-style columns
// Author: Matt Barham
// Created: 2026-10-15
// Modified: 2026-10-20
// Version: 1.0.0
// ==============================================================================

use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::cnv::vcf_table::{COL_COPY_NUMBER, COL_COPY_NUMBER_MORE};
use crate::models::{barcodes_from_path, COL_NORMAL_BARCODE, COL_TUMOR_BARCODE};
use crate::output::{format_number, TableWriter, NA};
use crate::parsers::tsv::{Table, TableError, TableReader};
use crate::progress::{emit, ProgressEventType, ProgressObserver};

/// Segments at least this long (in Mb) are dropped by default
pub const DEFAULT_MAX_SEGMENT_MB: f64 = 10.0;

pub const COL_TCN_LCN: &str = "TCN_EM:LCN_EM";

/// Columns joined with ';' within a (gene, chromosome) group
pub const AGGREGATED_COLUMNS: [&str; 8] = [
    "Copy_Number",
    "Copy_Number_More",
    COL_TCN_LCN,
    "svtype",
    "svlen",
    "svstart",
    "svend",
    "overlap",
];

const REQUIRED_COLUMNS: [&str; 11] = [
    "gene",
    "chrom",
    "overlap",
    "svlen",
    "svstart",
    "svend",
    "svtype",
    "tcn.em",
    "lcn.em",
    COL_COPY_NUMBER,
    COL_COPY_NUMBER_MORE,
];

fn report_dropped(observer: &dyn ProgressObserver, source: &Path, reason: &str, dropped: usize, total: usize) {
    emit(
        observer,
        ProgressEventType::RowsDropped,
        Some(source.display().to_string()),
        serde_json::json!({ "reason": reason, "dropped": dropped, "total": total }),
    );
}

/// Filter gene calls of one tumor/normal pair
///
/// 1. Drop genes without overlapping segment
/// 2. Drop segments of `threshold_mb` Mb or more (and segments of unknown length)
/// 3. Keep the smallest segment per gene
/// 4. Group by (Hugo_Symbol, Chromosome), joining values with ';'
pub fn filter_calls(
    calls: &Table,
    threshold_mb: f64,
    barcodes: (&str, &str),
    observer: &dyn ProgressObserver,
) -> Result<Table, TableError> {
    calls.require(&REQUIRED_COLUMNS)?;

    let total = calls.len();
    let mut kept: Vec<(usize, Option<f64>)> = Vec::new();
    for row in 0..total {
        if calls.parse_f64(row, "overlap")? != Some(0.0) {
            kept.push((row, calls.parse_f64(row, "svlen")?));
        }
    }
    report_dropped(observer, &calls.source, "no overlapping segment", total - kept.len(), total);

    let before = kept.len();
    let max_length = threshold_mb * 1e6;
    kept.retain(|(_, svlen)| matches!(svlen, Some(len) if *len < max_length));
    report_dropped(
        observer,
        &calls.source,
        &format!("SV longer than {} Mb", threshold_mb),
        before - kept.len(),
        before,
    );

    // Smallest segment first within a gene; stable so ties keep file order
    let gene_idx = calls.column_index("gene")?;
    kept.sort_by(|(a, a_len), (b, b_len)| {
        calls.rows[*a][gene_idx]
            .cmp(&calls.rows[*b][gene_idx])
            .then(a_len.partial_cmp(b_len).unwrap_or(Ordering::Equal))
    });

    let before = kept.len();
    let mut seen: HashSet<&str> = HashSet::new();
    kept.retain(|(row, _)| seen.insert(calls.rows[*row][gene_idx].as_str()));
    report_dropped(observer, &calls.source, "gene overlapping multiple SV", before - kept.len(), before);

    let mut groups: BTreeMap<(String, String), Vec<Vec<String>>> = BTreeMap::new();
    for (row, _) in kept {
        let cell = |column: &str| calls.value(row, column).map(|v| format_number(v, NA));

        let values = vec![
            cell(COL_COPY_NUMBER)?,
            cell(COL_COPY_NUMBER_MORE)?,
            format!("{}:{}", cell("tcn.em")?, cell("lcn.em")?),
            cell("svtype")?,
            cell("svlen")?,
            cell("svstart")?,
            cell("svend")?,
            cell("overlap")?,
        ];

        groups
            .entry((calls.value(row, "gene")?.to_string(), calls.value(row, "chrom")?.to_string()))
            .or_default()
            .push(values);
    }

    let mut columns = vec![
        COL_TUMOR_BARCODE.to_string(),
        COL_NORMAL_BARCODE.to_string(),
        "Hugo_Symbol".to_string(),
        "Chromosome".to_string(),
    ];
    columns.extend(AGGREGATED_COLUMNS.iter().map(|c| c.to_string()));

    let mut filtered = Table::new(calls.source.clone(), columns);
    for ((gene, chrom), members) in groups {
        let mut row = vec![barcodes.0.to_string(), barcodes.1.to_string(), gene, chrom];
        for i in 0..AGGREGATED_COLUMNS.len() {
            row.push(
                members
                    .iter()
                    .map(|values| values[i].as_str())
                    .collect::<Vec<_>>()
                    .join(";"),
            );
        }
        filtered.rows.push(row);
    }

    Ok(filtered)
}

/// Filter one gene-call file; barcodes come from its name
pub fn filter_calls_file(
    input: &Path,
    output: &Path,
    threshold_mb: f64,
    observer: &dyn ProgressObserver,
) -> Result<()> {
    let calls = TableReader::new().read(input)?;
    let (tumor, normal) = barcodes_from_path(input)
        .ok_or_else(|| anyhow!("Cannot derive tumor/normal barcodes from {:?}", input))?;

    let filtered = filter_calls(&calls, threshold_mb, (&tumor, &normal), observer)?;
    TableWriter::new().write(&filtered, output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectingObserver;
    use std::fs;
    use tempfile::tempdir;

    const CALLS: &str = "Tumor_Sample_Barcode\tMatched_Norm_Sample_Barcode\tchrom\tstart\tend\tgene_id\tgene\tgene_biotype\tgene_source\ttcn.em\tlcn.em\toverlap\tsvtype\tsvstart\tsvend\tsvlen\tcopy_number\tcopy_number_more\n\
        T\tN\t1\t150\t250\tE1\tGENE1\tpc\tens\t7\t1\t50\tDUP\t100\t200\t100\t2\tHL_gain\n\
        T\tN\t1\t150\t250\tE1\tGENE1\tpc\tens\t2\t1\t50\tNEUTRAL\t200\t1000\t800\t\t\n\
        \t\t2\t60\t80\tE2\tGENE2\tlnc\tens\t\t\t0\t\t\t\t\t\t\n\
        T\tN\t3\t10\t20\tE3\tABC\tpc\tens\t0\t0\t10\tDEL\t0\t20000000\t20000000\t-2\thom_del\n\
        T\tN\t3\t10\t20\tE4\tAAA\tpc\tens\t1.0\t0\t10\tLOH\t5\t15\t10\t\tLOH\n";

    #[test]
    fn test_filter_calls_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("T_vs_N.tsv");
        let output = dir.path().join("filtered.tsv");
        fs::write(&input, CALLS).unwrap();

        filter_calls_file(&input, &output, DEFAULT_MAX_SEGMENT_MB, &CollectingObserver::new()).unwrap();
        let table = TableReader::new().read(&output).unwrap();

        // GENE2 has no overlap, ABC spans 20 Mb
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns[2], "Hugo_Symbol");
        assert_eq!(table.columns[6], COL_TCN_LCN);

        // Groups sorted by gene name
        assert_eq!(table.value(0, "Hugo_Symbol").unwrap(), "AAA");
        assert_eq!(table.value(0, "Copy_Number").unwrap(), "NA");
        assert_eq!(table.value(0, "Copy_Number_More").unwrap(), "LOH");
        assert_eq!(table.value(0, COL_TCN_LCN).unwrap(), "1:0");

        // Smallest segment kept for GENE1
        assert_eq!(table.value(1, "Hugo_Symbol").unwrap(), "GENE1");
        assert_eq!(table.value(1, "Chromosome").unwrap(), "1");
        assert_eq!(table.value(1, "svlen").unwrap(), "100");
        assert_eq!(table.value(1, "Copy_Number").unwrap(), "2");
        assert_eq!(table.value(1, "Tumor_Sample_Barcode").unwrap(), "T");
        assert_eq!(table.value(1, "Matched_Norm_Sample_Barcode").unwrap(), "N");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("T_vs_N.tsv");
        fs::write(&input, CALLS).unwrap();
        let calls = TableReader::new().read(&input).unwrap();

        let filtered = filter_calls(&calls, 20.0, ("T", "N"), &CollectingObserver::new()).unwrap();
        assert_eq!(filtered.len(), 2);

        let filtered = filter_calls(&calls, 20.000001, ("T", "N"), &CollectingObserver::new()).unwrap();
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn test_empty_input_keeps_columns() {
        let calls = Table::new(
            "T_vs_N.tsv",
            REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        );
        let filtered = filter_calls(&calls, DEFAULT_MAX_SEGMENT_MB, ("T", "N"), &CollectingObserver::new()).unwrap();
        assert!(filtered.is_empty());
        assert_eq!(filtered.columns.len(), 4 + AGGREGATED_COLUMNS.len());
    }

    #[test]
    fn test_dropped_rows_are_reported() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("T_vs_N.tsv");
        fs::write(&input, CALLS).unwrap();
        let calls = TableReader::new().read(&input).unwrap();

        let observer = CollectingObserver::new();
        filter_calls(&calls, DEFAULT_MAX_SEGMENT_MB, ("T", "N"), &observer).unwrap();

        let dropped: Vec<(String, u64)> = observer
            .events()
            .iter()
            .filter(|e| e.event_type == ProgressEventType::RowsDropped)
            .map(|e| (e.details["reason"].as_str().unwrap().to_string(), e.details["dropped"].as_u64().unwrap()))
            .collect();
        assert_eq!(
            dropped,
            vec![
                ("no overlapping segment".to_string(), 1),
                ("SV longer than 10 Mb".to_string(), 1),
                ("gene overlapping multiple SV".to_string(), 1),
            ]
        );
    }
}

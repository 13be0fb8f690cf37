//! Annotated CSV export of a (filtered) ledger.
//!
//! `export_annotated_csv` writes every movement with its outlier verdicts
//! appended. Movements that were skipped for a missing quantity get empty
//! annotation cells. `export_flagged_csv` writes only flagged movements,
//! highest Z-score first.

use std::collections::HashMap;
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::dataset::MovementDataset;
use crate::error::EngineResult;
use crate::outlier_classifier::OutlierReport;
use crate::types::Movement;

#[derive(Serialize)]
struct AnnotatedRow<'a> {
    id: u64,
    timestamp: NaiveDate,
    material: &'a str,
    quantity: Option<f64>,
    operation_type: String,
    site: &'a str,
    operator: &'a str,
    running_balance: Option<u64>,
    unit_of_measure: Option<&'a str>,
    lot: Option<&'a str>,
    zscore: Option<f64>,
    is_outlier_zscore: Option<bool>,
    is_outlier_iqr: Option<bool>,
}

/// Write `dataset` as CSV with `zscore`, `is_outlier_zscore` and
/// `is_outlier_iqr` columns taken from `report`. Returns the row count.
pub fn export_annotated_csv<W: Write>(
    writer: W,
    dataset: &MovementDataset,
    report: &OutlierReport,
) -> EngineResult<usize> {
    write_rows(writer, dataset.records().iter(), report)
}

/// Write only the movements `report` flags, in `ranked_by_zscore` order,
/// with the same columns as `export_annotated_csv`.
pub fn export_flagged_csv<W: Write>(
    writer: W,
    dataset: &MovementDataset,
    report: &OutlierReport,
) -> EngineResult<usize> {
    let by_id: HashMap<u64, &Movement> = dataset.records().iter().map(|r| (r.id, r)).collect();
    let flagged = report
        .flagged_by_zscore()
        .into_iter()
        .filter_map(|a| by_id.get(&a.id).copied());
    write_rows(writer, flagged, report)
}

fn write_rows<'a, W: Write>(
    writer: W,
    movements: impl Iterator<Item = &'a Movement>,
    report: &OutlierReport,
) -> EngineResult<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut rows = 0;
    for movement in movements {
        let annotation = report.annotation(movement.id);
        csv_writer.serialize(AnnotatedRow {
            id: movement.id,
            timestamp: movement.timestamp,
            material: &movement.material,
            quantity: movement.quantity,
            operation_type: movement.operation_type.to_string(),
            site: &movement.site,
            operator: &movement.operator,
            running_balance: movement.running_balance,
            unit_of_measure: movement.unit_of_measure.as_deref(),
            lot: movement.lot.as_deref(),
            zscore: annotation.map(|a| a.zscore),
            is_outlier_zscore: annotation.map(|a| a.is_outlier_zscore),
            is_outlier_iqr: annotation.map(|a| a.is_outlier_iqr),
        })?;
        rows += 1;
    }
    csv_writer.flush()?;

    log::debug!("exported {} annotated rows", rows);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutlierConfig;
    use crate::ledger_loader::load_ledger;
    use crate::outlier_classifier::classify_outliers;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn rows_carry_annotations() {
        let mut records: Vec<Movement> = (1..=9)
            .map(|i| Movement::new(i, day(i as u32), "Gaze", Some(10.0)))
            .collect();
        records.push(Movement::new(10, day(10), "Gaze", Some(100.0)));
        records.push(Movement::new(11, day(11), "Gaze", None));
        let dataset = MovementDataset::from_records(records).unwrap();
        let report = classify_outliers(&dataset, &OutlierConfig::default()).unwrap();

        let mut buf = Vec::new();
        let rows = export_annotated_csv(&mut buf, &dataset, &report).unwrap();
        assert_eq!(rows, 11);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,timestamp,material,quantity,operation_type,site,operator,running_balance,\
             unit_of_measure,lot,zscore,is_outlier_zscore,is_outlier_iqr"
        );
        assert_eq!(lines.len(), 12);
        // z(100) = 3.0 exactly, which is not above the threshold.
        assert!(lines[10].starts_with("10,2025-06-10,Gaze,100.0,Adjustment,,,,,,3.0,false,true"));
        assert!(lines[11].ends_with(",,,"));
    }

    #[test]
    fn export_reloads_through_the_loader() {
        let dataset = MovementDataset::from_records(vec![
            Movement::new(1, day(1), "Gaze", Some(3.0)).with_balance(3),
            Movement::new(2, day(2), "Gaze", Some(-1.0)).with_balance(2),
        ])
        .unwrap();
        let report = classify_outliers(&dataset, &OutlierConfig::default()).unwrap();
        let mut buf = Vec::new();
        export_annotated_csv(&mut buf, &dataset, &report).unwrap();

        let reloaded = load_ledger(buf.as_slice()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.records()[1].quantity, Some(-1.0));
        assert_eq!(reloaded.records()[1].running_balance, Some(2));
    }

    #[test]
    fn flagged_export_is_ranked_by_zscore() {
        let mut records: Vec<Movement> = (1..=18)
            .map(|i| Movement::new(i, day(i as u32), "Gaze", Some(10.0)))
            .collect();
        records.insert(2, Movement::new(30, day(19), "Gaze", Some(60.0)));
        records.push(Movement::new(31, day(20), "Gaze", Some(200.0)));
        records.push(Movement::new(32, day(21), "Gaze", None));
        let dataset = MovementDataset::from_records(records).unwrap();
        let report = classify_outliers(&dataset, &OutlierConfig::default()).unwrap();

        let mut buf = Vec::new();
        let rows = export_flagged_csv(&mut buf, &dataset, &report).unwrap();
        assert_eq!(rows, 2);

        let reloaded = load_ledger(buf.as_slice()).unwrap();
        let ids: Vec<u64> = reloaded.records().iter().map(|r| r.id).collect();
        // Id 30 comes first in the ledger but has the smaller Z-score.
        assert_eq!(ids, vec![31, 30]);
    }

    #[test]
    fn flagged_export_with_nothing_flagged_writes_nothing() {
        let dataset = MovementDataset::from_records(
            (1..=4)
                .map(|i| Movement::new(i, day(i as u32), "Gaze", Some(5.0)))
                .collect(),
        )
        .unwrap();
        let report = classify_outliers(&dataset, &OutlierConfig::default()).unwrap();
        let mut buf = Vec::new();
        assert_eq!(export_flagged_csv(&mut buf, &dataset, &report).unwrap(), 0);
        // The header is written with the first record.
        assert!(buf.is_empty());
    }
}

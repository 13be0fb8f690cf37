//! Latest-movement deviation alerts.
//!
//! For each material the mean and population stddev are taken over every
//! numeric movement in the (filtered) dataset, and the latest movement is
//! compared against them: an alert fires when
//! `|latest| > mean + limite_desvio * stddev`.
//!
//! "Latest" follows `AlertConfig::latest`. With `LatestRecord::DatasetOrder`
//! it is the last numeric movement in the order the dataset was given,
//! not the newest timestamp; callers that need recency either pre-sort or
//! choose `LatestRecord::Timestamp`.
//!
//! This module never sends anything. See `notification` for the payload
//! handed to a dispatcher.

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{AlertConfig, LatestRecord};
use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult, GroupDiagnostic};
use crate::stats;
use crate::thresholds::MIN_POINTS_FOR_SPREAD;
use crate::types::{AlertDirection, AlertEvent, Movement};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AlertReport {
    /// One event per material over its threshold, material ascending.
    pub alerts: Vec<AlertEvent>,
    /// Materials with enough data to be evaluated.
    pub evaluated: usize,
    pub diagnostics: Vec<GroupDiagnostic>,
}

impl AlertReport {
    /// Newline-joined `material: value (mean ± stddev)` lines.
    pub fn summary(&self) -> String {
        self.alerts
            .iter()
            .map(AlertEvent::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Evaluate the latest movement of every material against its distribution.
pub fn detect_deviations(
    dataset: &MovementDataset,
    config: &AlertConfig,
) -> EngineResult<AlertReport> {
    config.validate()?;

    let ordered;
    let source = match config.latest {
        LatestRecord::DatasetOrder => dataset,
        LatestRecord::Timestamp => {
            ordered = dataset.sorted_by_timestamp();
            &ordered
        }
    };

    let groups: Vec<(&str, Vec<&Movement>)> = source.group_by_material().into_iter().collect();
    let outcomes: Vec<(&str, EngineResult<Option<AlertEvent>>)> = groups
        .par_iter()
        .map(|(material, records)| (*material, evaluate_material(material, records, config)))
        .collect();

    let mut report = AlertReport::default();
    for (material, outcome) in outcomes {
        match outcome {
            Ok(alert) => {
                report.evaluated += 1;
                report.alerts.extend(alert);
            }
            Err(err) => {
                log::debug!("not evaluating '{}' for deviation: {}", material, err);
                if let Some(diag) = GroupDiagnostic::from_error(material, &err) {
                    report.diagnostics.push(diag);
                }
            }
        }
    }

    log::debug!(
        "deviation check (limite_desvio={}): {} alerts across {} materials",
        config.limite_desvio,
        report.alerts.len(),
        report.evaluated
    );
    Ok(report)
}

fn evaluate_material(
    material: &str,
    records: &[&Movement],
    config: &AlertConfig,
) -> EngineResult<Option<AlertEvent>> {
    let numeric: Vec<(u64, f64)> = records
        .iter()
        .filter_map(|r| r.quantity.map(|q| (r.id, q)))
        .collect();

    let insufficient = || EngineError::InsufficientData {
        scope: format!("material '{}'", material),
        required: MIN_POINTS_FOR_SPREAD,
        got: numeric.len(),
    };
    if numeric.len() < MIN_POINTS_FOR_SPREAD {
        return Err(insufficient());
    }

    let values: Vec<f64> = numeric.iter().map(|&(_, q)| q).collect();
    let moments = stats::moments(&values).ok_or_else(insufficient)?;
    let (movement_id, latest_value) = *numeric.last().ok_or_else(insufficient)?;

    // No variance, no deviation.
    if moments.stddev == 0.0 {
        return Ok(None);
    }

    let threshold = moments.mean + config.limite_desvio * moments.stddev;
    if latest_value.abs() <= threshold {
        return Ok(None);
    }

    Ok(Some(AlertEvent {
        material: material.to_string(),
        movement_id,
        latest_value,
        historical_mean: moments.mean,
        historical_stddev: moments.stddev,
        direction: if latest_value > 0.0 {
            AlertDirection::High
        } else {
            AlertDirection::Low
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn series(material: &str, quantities: &[i64], first_id: u64) -> Vec<Movement> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, q)| Movement::new(first_id + i as u64, day(i as u32 + 1), material, Some(*q as f64)))
            .collect()
    }

    fn detect(records: Vec<Movement>, limite_desvio: f64) -> AlertReport {
        let dataset = MovementDataset::from_records(records).unwrap();
        let config = AlertConfig {
            limite_desvio,
            ..AlertConfig::default()
        };
        detect_deviations(&dataset, &config).unwrap()
    }

    #[test]
    fn latest_within_band_does_not_alert() {
        // mean 12, stddev ~14.01, threshold ~40.03
        let report = detect(series("X", &[5, 6, 4, 5, 40], 1), 2.0);
        assert!(report.alerts.is_empty());
        assert_eq!(report.evaluated, 1);
    }

    #[test]
    fn inbound_spike_alerts_high() {
        // mean 14.5, stddev 28.5, threshold 71.5
        let report = detect(series("Kit PCR", &[5, 5, 5, 5, 5, 5, 5, 5, 5, 100], 1), 2.0);
        assert_eq!(report.alerts.len(), 1);
        let alert = &report.alerts[0];
        assert_eq!(alert.material, "Kit PCR");
        assert_eq!(alert.latest_value, 100.0);
        assert_eq!(alert.movement_id, 10);
        assert_eq!(alert.direction, AlertDirection::High);
        assert!((alert.historical_mean - 14.5).abs() < 1e-9);
        assert!((alert.historical_stddev - 28.5).abs() < 1e-9);
    }

    #[test]
    fn outbound_spike_alerts_low() {
        let report = detect(series("Soro", &[-2, -2, -2, -2, -2, -2, -2, -2, -2, -100], 1), 2.0);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].direction, AlertDirection::Low);
    }

    #[test]
    fn zero_variance_never_alerts() {
        let report = detect(series("Touca", &[3, 3, 3, 3], 1), 0.1);
        assert!(report.alerts.is_empty());
        assert_eq!(report.evaluated, 1);
    }

    #[test]
    fn singleton_material_gets_insufficient_data() {
        let mut records = series("Solo", &[99], 1);
        records.extend(series("Pair", &[1, 2], 2));
        let report = detect(records, 2.0);
        assert!(report.alerts.is_empty());
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].scope, "Solo");
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::InsufficientData);
    }

    #[test]
    fn dataset_order_decides_latest_unless_timestamp_requested() {
        // The spike is the newest by date but not the last row.
        let mut records = series("Bisturi", &[4, 4, 4, 4, 4, 4, 4, 4, 4], 1);
        records.insert(0, Movement::new(100, day(28), "Bisturi", Some(90.0)));
        let dataset = MovementDataset::from_records(records).unwrap();

        let by_order = detect_deviations(&dataset, &AlertConfig::default()).unwrap();
        assert!(by_order.alerts.is_empty());

        let by_time = detect_deviations(
            &dataset,
            &AlertConfig {
                latest: LatestRecord::Timestamp,
                ..AlertConfig::default()
            },
        )
        .unwrap();
        assert_eq!(by_time.alerts.len(), 1);
        assert_eq!(by_time.alerts[0].movement_id, 100);
    }

    #[test]
    fn latest_skips_missing_quantities() {
        let mut records = series("Fio", &[5, 5, 5, 5, 5, 5, 5, 5, 5, 100], 1);
        records.push(Movement::new(50, day(20), "Fio", None));
        let report = detect(records, 2.0);
        assert_eq!(report.alerts[0].movement_id, 10);
    }

    #[test]
    fn non_positive_limite_desvio_fails_fast() {
        let dataset = MovementDataset::from_records(series("A", &[1, 2], 1)).unwrap();
        for limite_desvio in [0.0, -1.0] {
            let err = detect_deviations(
                &dataset,
                &AlertConfig {
                    limite_desvio,
                    ..AlertConfig::default()
                },
            )
            .unwrap_err();
            assert!(matches!(err, EngineError::InvalidParameter { .. }));
        }
    }

    #[test]
    fn summary_joins_alert_lines() {
        let mut records = series("B", &[5, 5, 5, 5, 5, 5, 5, 5, 5, 100], 1);
        records.extend(series("A", &[-2, -2, -2, -2, -2, -2, -2, -2, -2, -100], 20));
        let report = detect(records, 2.0);
        let summary = report.summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("A: -100 ("));
        assert!(lines[1].starts_with("B: 100 (14.50 \u{00b1} 28.50)"));
    }
}

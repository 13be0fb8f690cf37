//! Per-record outlier classification.
//!
//! Two independent verdicts are attached to each movement with a numeric
//! quantity:
//! - Z-score: `|q - mean| / stddev` (population), flagged above the threshold.
//!   With zero spread every score is 0 and nothing is flagged.
//! - IQR: Tukey fences `[Q1 - k*IQR, Q3 + k*IQR]` on linearly interpolated
//!   quartiles, flagged outside the fences.
//!
//! The verdicts are never merged. Movements with a missing quantity are
//! skipped and counted.

use std::cmp::Ordering;

use serde::Serialize;

use crate::config::OutlierConfig;
use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult};
use crate::stats;
use crate::thresholds::MIN_POINTS_FOR_SPREAD;
use crate::types::OutlierAnnotation;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutlierReport {
    /// One annotation per numeric movement, in dataset order.
    pub annotations: Vec<OutlierAnnotation>,
    pub mean: f64,
    pub stddev: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
    /// Movements left out because their quantity is missing.
    pub skipped: usize,
}

/// Headline counts for a classified dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OutlierSummary {
    pub total_records: usize,
    pub zscore_outliers: usize,
    pub iqr_outliers: usize,
    pub any_outliers: usize,
}

impl OutlierReport {
    pub fn summary(&self) -> OutlierSummary {
        OutlierSummary {
            total_records: self.annotations.len() + self.skipped,
            zscore_outliers: self.annotations.iter().filter(|a| a.is_outlier_zscore).count(),
            iqr_outliers: self.annotations.iter().filter(|a| a.is_outlier_iqr).count(),
            any_outliers: self.annotations.iter().filter(|a| a.is_flagged()).count(),
        }
    }

    /// Annotations flagged by at least one method.
    pub fn outliers_only(&self) -> Vec<&OutlierAnnotation> {
        self.annotations.iter().filter(|a| a.is_flagged()).collect()
    }

    /// Annotations ordered by descending Z-score, ties by ascending id.
    pub fn ranked_by_zscore(&self) -> Vec<&OutlierAnnotation> {
        let mut ranked: Vec<&OutlierAnnotation> = self.annotations.iter().collect();
        ranked.sort_by(|a, b| {
            b.zscore
                .partial_cmp(&a.zscore)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }

    /// Flagged annotations only, in `ranked_by_zscore` order.
    pub fn flagged_by_zscore(&self) -> Vec<&OutlierAnnotation> {
        self.ranked_by_zscore()
            .into_iter()
            .filter(|a| a.is_flagged())
            .collect()
    }

    pub fn annotation(&self, id: u64) -> Option<&OutlierAnnotation> {
        self.annotations.iter().find(|a| a.id == id)
    }
}

/// Classify every numeric movement of the (filtered) dataset.
///
/// Fails with `InsufficientData` when fewer than two numeric quantities are
/// present, and with `InvalidParameter` for a bad configuration.
pub fn classify_outliers(
    dataset: &MovementDataset,
    config: &OutlierConfig,
) -> EngineResult<OutlierReport> {
    config.validate()?;

    let numeric: Vec<(u64, f64)> = dataset
        .records()
        .iter()
        .filter_map(|r| r.quantity.map(|q| (r.id, q)))
        .collect();
    let skipped = dataset.len() - numeric.len();

    if numeric.len() < MIN_POINTS_FOR_SPREAD {
        return Err(EngineError::InsufficientData {
            scope: "quantity".to_string(),
            required: MIN_POINTS_FOR_SPREAD,
            got: numeric.len(),
        });
    }

    let values: Vec<f64> = numeric.iter().map(|&(_, q)| q).collect();
    let moments = stats::moments(&values).ok_or(EngineError::InsufficientData {
        scope: "quantity".to_string(),
        required: MIN_POINTS_FOR_SPREAD,
        got: 0,
    })?;

    let sorted = stats::sorted_copy(&values);
    let (q1, q3) = match (
        stats::quantile_sorted(&sorted, 0.25),
        stats::quantile_sorted(&sorted, 0.75),
    ) {
        (Some(q1), Some(q3)) => (q1, q3),
        _ => {
            return Err(EngineError::InsufficientData {
                scope: "quantity".to_string(),
                required: MIN_POINTS_FOR_SPREAD,
                got: sorted.len(),
            })
        }
    };
    let iqr = q3 - q1;
    let lower_fence = q1 - config.iqr_multiplier * iqr;
    let upper_fence = q3 + config.iqr_multiplier * iqr;

    let annotations: Vec<OutlierAnnotation> = numeric
        .iter()
        .map(|&(id, quantity)| {
            let zscore = if moments.stddev > 0.0 {
                (quantity - moments.mean).abs() / moments.stddev
            } else {
                0.0
            };
            OutlierAnnotation {
                id,
                quantity,
                zscore,
                is_outlier_zscore: zscore > config.zscore_threshold,
                is_outlier_iqr: quantity < lower_fence || quantity > upper_fence,
            }
        })
        .collect();

    let report = OutlierReport {
        annotations,
        mean: moments.mean,
        stddev: moments.stddev,
        q1,
        q3,
        iqr,
        lower_fence,
        upper_fence,
        skipped,
    };

    let summary = report.summary();
    log::debug!(
        "classified {} movements: {} z-score outliers, {} IQR outliers, {} skipped",
        report.annotations.len(),
        summary.zscore_outliers,
        summary.iqr_outliers,
        skipped
    );
    if skipped > 0 {
        log::warn!("{} movements without a numeric quantity were skipped", skipped);
    }

    Ok(report)
}

//! One pass over a ledger: filter once, then run the four computations on
//! the filtered view.
//!
//! A dataset too small for outlier classification does not stop the other
//! computations. The classifier's `InsufficientData` becomes a diagnostic and
//! `outliers` is left empty.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::dataset::MovementDataset;
use crate::deviation_alerter::{detect_deviations, AlertReport};
use crate::error::{EngineResult, GroupDiagnostic};
use crate::gap_estimator::estimate_reporting_gaps;
use crate::outlier_classifier::{classify_outliers, OutlierReport, OutlierSummary};
use crate::types::ImpactEstimate;
use crate::variability_ranker::{rank_variability, VariabilityRanking};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// The view every computation ran on.
    #[serde(skip)]
    pub filtered: MovementDataset,
    pub records_analyzed: usize,
    pub records_filtered_out: usize,
    pub outliers: Option<OutlierReport>,
    pub outlier_summary: Option<OutlierSummary>,
    pub ranking: VariabilityRanking,
    pub alerts: AlertReport,
    pub impact: ImpactEstimate,
    /// Dataset-level conditions that emptied a whole section.
    pub diagnostics: Vec<GroupDiagnostic>,
}

impl AnalysisReport {
    /// Every diagnostic in the report, dataset-level first.
    pub fn all_diagnostics(&self) -> Vec<&GroupDiagnostic> {
        self.diagnostics
            .iter()
            .chain(&self.ranking.diagnostics)
            .chain(&self.alerts.diagnostics)
            .chain(&self.impact.diagnostics)
            .collect()
    }
}

/// Validate `config`, filter `dataset` and run every computation.
///
/// Pure: the same inputs always give the same report.
pub fn run_analysis(
    dataset: &MovementDataset,
    config: &EngineConfig,
) -> EngineResult<AnalysisReport> {
    config.validate()?;

    let filtered = config.filter.apply(dataset)?;
    let view = filtered.kept;

    let mut diagnostics = Vec::new();
    let outliers = match classify_outliers(&view, &config.outliers) {
        Ok(report) => Some(report),
        Err(err) => match GroupDiagnostic::from_error("dataset", &err) {
            Some(diag) => {
                log::warn!("outlier classification skipped: {}", err);
                diagnostics.push(diag);
                None
            }
            None => return Err(err),
        },
    };

    let ranking = rank_variability(&view, &config.ranking)?;
    let alerts = detect_deviations(&view, &config.alerts)?;
    let impact = estimate_reporting_gaps(&view, &config.gaps)?;

    log::info!(
        "analyzed {} movements ({} filtered out): {} outliers, {} alerts, ${:.2} exposure",
        view.len(),
        filtered.removed,
        outliers
            .as_ref()
            .map_or(0, |o| o.summary().any_outliers),
        alerts.alerts.len(),
        impact.total_cost
    );

    Ok(AnalysisReport {
        records_analyzed: view.len(),
        records_filtered_out: filtered.removed,
        outlier_summary: outliers.as_ref().map(OutlierReport::summary),
        outliers,
        ranking,
        alerts,
        impact,
        diagnostics,
        filtered: view,
    })
}

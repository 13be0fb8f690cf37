//! Ranks materials by how unstable their movements are.
//!
//! The coefficient of variation is `stddev / |mean| * 100`, so it is never
//! negative and a single-movement material (stddev 0, CV 0) always sits at
//! the bottom. A zero mean makes CV undefined: that material is excluded
//! with a `DegenerateMean` diagnostic instead of producing inf or NaN.

use rayon::prelude::*;
use serde::Serialize;

use crate::config::RankingConfig;
use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult, GroupDiagnostic};
use crate::selector::{Selector, TopNSelector};
use crate::stats;
use crate::types::VariabilityEntry;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VariabilityRanking {
    /// Top-N entries, CV descending, ties by material ascending.
    pub entries: Vec<VariabilityEntry>,
    /// Materials that had a defined CV, before truncation.
    pub ranked_materials: usize,
    /// Materials excluded from ranking and why.
    pub diagnostics: Vec<GroupDiagnostic>,
}

/// Compute mean, stddev and CV per material and keep the most variable.
pub fn rank_variability(
    dataset: &MovementDataset,
    config: &RankingConfig,
) -> EngineResult<VariabilityRanking> {
    config.validate()?;

    let groups: Vec<(&str, Vec<f64>)> = dataset
        .group_by_material()
        .into_iter()
        .map(|(material, records)| {
            let values = records
                .iter()
                .filter_map(|r| r.quantity)
                .collect();
            (material, values)
        })
        .collect();

    // Groups are independent; collect keeps material order.
    let outcomes: Vec<(&str, EngineResult<VariabilityEntry>)> = groups
        .par_iter()
        .map(|(material, values)| (*material, material_variability(material, values)))
        .collect();

    let mut entries = Vec::with_capacity(outcomes.len());
    let mut diagnostics = Vec::new();
    for (material, outcome) in outcomes {
        match outcome {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                log::warn!("excluding '{}' from variability ranking: {}", material, err);
                if let Some(diag) = GroupDiagnostic::from_error(material, &err) {
                    diagnostics.push(diag);
                }
            }
        }
    }

    let ranked_materials = entries.len();
    let selector = TopNSelector { n: config.top_n };
    let entries = selector.select(entries);
    log::debug!(
        "{} kept {} of {} ranked materials ({} excluded)",
        Selector::<VariabilityEntry>::name(&selector),
        entries.len(),
        ranked_materials,
        diagnostics.len()
    );

    Ok(VariabilityRanking {
        entries,
        ranked_materials,
        diagnostics,
    })
}

fn material_variability(material: &str, values: &[f64]) -> EngineResult<VariabilityEntry> {
    let moments = stats::moments(values).ok_or_else(|| EngineError::InsufficientData {
        scope: format!("material '{}'", material),
        required: 1,
        got: 0,
    })?;

    let degenerate = || EngineError::DegenerateMean {
        material: material.to_string(),
    };
    if moments.mean == 0.0 {
        return Err(degenerate());
    }
    let cv = moments.stddev / moments.mean.abs() * 100.0;
    if !cv.is_finite() {
        return Err(degenerate());
    }

    Ok(VariabilityEntry {
        material: material.to_string(),
        count: moments.count,
        mean: moments.mean,
        stddev: moments.stddev,
        coefficient_of_variation: cv,
    })
}

//! Financial exposure from missing or inconsistent reporting.
//!
//! Two sources of exposure are priced:
//! - Reporting gaps: calendar days inside the observed span with no movement
//!   for any material. Each costs `downtime_hours_per_gap` hours.
//! - Registration failures: movements with zero quantity on a positive
//!   running balance, read as an unrecorded transaction. Each costs
//!   `registration_failure_hours` hours.
//!
//! Both are priced at `downtime_cost_per_hour`. A dataset spanning zero or
//! one day has no gaps by construction.

use chrono::NaiveDate;

use crate::config::GapConfig;
use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult, GroupDiagnostic};
use crate::types::{ImpactEstimate, Movement};

/// Price reporting gaps and suspected registration failures.
pub fn estimate_reporting_gaps(
    dataset: &MovementDataset,
    config: &GapConfig,
) -> EngineResult<ImpactEstimate> {
    config.validate()?;

    let missing_days = missing_days(dataset);
    let downtime_cost =
        missing_days.len() as f64 * config.downtime_hours_per_gap * config.downtime_cost_per_hour;

    let mut diagnostics = Vec::new();
    let (registration_failures, registration_failures_computed) = if dataset.has_running_balance()
    {
        (registration_failures(dataset), true)
    } else {
        let err = EngineError::MissingColumn("running_balance".to_string());
        log::warn!("registration failures not computed: {}", err);
        diagnostics.extend(GroupDiagnostic::from_error("dataset", &err));
        (Vec::new(), false)
    };
    let registration_failure_cost = registration_failures.len() as f64
        * config.downtime_cost_per_hour
        * config.registration_failure_hours;

    let estimate = ImpactEstimate {
        total_cost: downtime_cost + registration_failure_cost,
        missing_days,
        downtime_cost,
        registration_failures,
        registration_failure_cost,
        registration_failures_computed,
        diagnostics,
    };

    log::debug!(
        "reporting gaps: {} missing days (${:.2}), {} registration failures (${:.2})",
        estimate.missing_days.len(),
        estimate.downtime_cost,
        estimate.registration_failures.len(),
        estimate.registration_failure_cost
    );
    Ok(estimate)
}

/// Days between the first and last movement (inclusive) with no movement.
pub fn missing_days(dataset: &MovementDataset) -> Vec<NaiveDate> {
    let present = dataset.distinct_dates();
    let Some((first, last)) = dataset.date_span() else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| !present.contains(d))
        .collect()
}

/// Ids of movements with zero net change on a positive balance.
pub fn registration_failures(dataset: &MovementDataset) -> Vec<u64> {
    dataset
        .records()
        .iter()
        .filter(|m| is_registration_failure(m))
        .map(|m| m.id)
        .collect()
}

fn is_registration_failure(movement: &Movement) -> bool {
    movement.quantity == Some(0.0) && movement.running_balance.map_or(false, |b| b > 0)
}

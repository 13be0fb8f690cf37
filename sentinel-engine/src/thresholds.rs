//! Default detection thresholds.
//!
//! These are heuristics carried over from the lab stock dashboards. Each one
//! is only a default: the matching field in `config` overrides it.

/// Absolute Z-score above which a movement is an outlier.
pub const ZSCORE_THRESHOLD: f64 = 3.0;

/// Tukey fence multiplier applied to the interquartile range.
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Number of materials kept by the variability ranking.
pub const TOP_N_VARIABLE: usize = 10;

/// Standard deviations above the mean that trip a deviation alert.
pub const LIMITE_DESVIO: f64 = 2.0;

/// Hourly cost of a unit being unable to operate on a day with no movements.
pub const DOWNTIME_COST_PER_HOUR: f64 = 150.0;

/// Hours of downtime assumed for each missing reporting day.
pub const DOWNTIME_HOURS_PER_GAP: f64 = 8.0;

/// Hours of downtime assumed for each suspected registration failure.
pub const REGISTRATION_FAILURE_HOURS: f64 = 4.0;

/// Minimum numeric values for a defined standard deviation.
pub const MIN_POINTS_FOR_SPREAD: usize = 2;

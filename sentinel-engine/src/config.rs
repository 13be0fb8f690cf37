//! Engine configuration.
//!
//! Every section rejects unknown fields and falls back to the defaults in
//! `thresholds` for fields it omits. `validate` runs before any computation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::filter::MovementFilter;
use crate::thresholds;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub filter: MovementFilter,
    pub outliers: OutlierConfig,
    pub ranking: RankingConfig,
    pub alerts: AlertConfig,
    pub gaps: GapConfig,
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.filter.validate()?;
        self.outliers.validate()?;
        self.ranking.validate()?;
        self.alerts.validate()?;
        self.gaps.validate()
    }
}

fn require_positive(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::invalid_parameter(
            name,
            format!("must be a finite number > 0, got {}", value),
        ))
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutlierConfig {
    pub zscore_threshold: f64,
    pub iqr_multiplier: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: thresholds::ZSCORE_THRESHOLD,
            iqr_multiplier: thresholds::IQR_MULTIPLIER,
        }
    }
}

impl OutlierConfig {
    pub fn validate(&self) -> EngineResult<()> {
        require_positive("outliers.zscore_threshold", self.zscore_threshold)?;
        require_positive("outliers.iqr_multiplier", self.iqr_multiplier)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    pub top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: thresholds::TOP_N_VARIABLE,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.top_n == 0 {
            return Err(EngineError::invalid_parameter(
                "ranking.top_n",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// How the deviation alerter picks each material's latest movement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatestRecord {
    /// Last movement in dataset order. Callers wanting true recency must
    /// sort by timestamp before filtering.
    #[default]
    DatasetOrder,
    /// Last movement after a stable sort by timestamp.
    Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    /// Deviation multiplier applied to each material's standard deviation.
    pub limite_desvio: f64,
    pub latest: LatestRecord,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            limite_desvio: thresholds::LIMITE_DESVIO,
            latest: LatestRecord::default(),
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> EngineResult<()> {
        require_positive("alerts.limite_desvio", self.limite_desvio)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GapConfig {
    pub downtime_cost_per_hour: f64,
    pub downtime_hours_per_gap: f64,
    pub registration_failure_hours: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            downtime_cost_per_hour: thresholds::DOWNTIME_COST_PER_HOUR,
            downtime_hours_per_gap: thresholds::DOWNTIME_HOURS_PER_GAP,
            registration_failure_hours: thresholds::REGISTRATION_FAILURE_HOURS,
        }
    }
}

impl GapConfig {
    pub fn validate(&self) -> EngineResult<()> {
        require_positive("gaps.downtime_cost_per_hour", self.downtime_cost_per_hour)?;
        require_positive("gaps.downtime_hours_per_gap", self.downtime_hours_per_gap)?;
        require_positive(
            "gaps.registration_failure_hours",
            self.registration_failure_hours,
        )
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::GroupDiagnostic;

// ---------------------------------------------------------------------------
// Ledger types
// ---------------------------------------------------------------------------

/// Categorical tag for a movement. Informational only: no computation
/// branches on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Purchase,
    Consumption,
    Transfer,
    Adjustment,
    Donation,
    Other(String),
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Purchase => write!(f, "Purchase"),
            OperationType::Consumption => write!(f, "Consumption"),
            OperationType::Transfer => write!(f, "Transfer"),
            OperationType::Adjustment => write!(f, "Adjustment"),
            OperationType::Donation => write!(f, "Donation"),
            OperationType::Other(tag) => write!(f, "{}", tag),
        }
    }
}

impl From<&str> for OperationType {
    /// Accepts English tags and the Portuguese tags used by the lab ledgers.
    /// Unknown tags are kept verbatim rather than rejected.
    fn from(s: &str) -> Self {
        let tag = s.trim();
        match tag.to_lowercase().as_str() {
            "purchase" | "compra" => OperationType::Purchase,
            "consumption" | "consumo" => OperationType::Consumption,
            "transfer" | "transferência" | "transferencia" => OperationType::Transfer,
            "adjustment" | "ajuste" => OperationType::Adjustment,
            "donation" | "doação" | "doacao" => OperationType::Donation,
            _ => OperationType::Other(tag.to_string()),
        }
    }
}

impl FromStr for OperationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(OperationType::from(s))
    }
}

/// One ledger entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Movement {
    pub id: u64,
    pub timestamp: NaiveDate,
    pub material: String,
    /// Signed quantity; positive is inbound, negative outbound, zero a no-op.
    /// Fractional values are kept as-is. `None` when the source value could
    /// not be coerced to a finite number.
    pub quantity: Option<f64>,
    pub operation_type: OperationType,
    pub site: String,
    pub operator: String,
    /// On-hand quantity for the material right after this movement.
    pub running_balance: Option<u64>,
    pub unit_of_measure: Option<String>,
    pub lot: Option<String>,
}

impl Movement {
    pub fn new(id: u64, timestamp: NaiveDate, material: &str, quantity: Option<f64>) -> Self {
        Self {
            id,
            timestamp,
            material: material.to_string(),
            quantity,
            operation_type: OperationType::Adjustment,
            site: String::new(),
            operator: String::new(),
            running_balance: None,
            unit_of_measure: None,
            lot: None,
        }
    }

    pub fn with_site(mut self, site: &str) -> Self {
        self.site = site.to_string();
        self
    }

    pub fn with_operator(mut self, operator: &str) -> Self {
        self.operator = operator.to_string();
        self
    }

    pub fn with_operation(mut self, operation_type: OperationType) -> Self {
        self.operation_type = operation_type;
        self
    }

    pub fn with_balance(mut self, balance: u64) -> Self {
        self.running_balance = Some(balance);
        self
    }
}

// ---------------------------------------------------------------------------
// Derived types
// ---------------------------------------------------------------------------

/// Per-record outlier annotation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutlierAnnotation {
    pub id: u64,
    pub quantity: f64,
    pub zscore: f64,
    pub is_outlier_zscore: bool,
    pub is_outlier_iqr: bool,
}

impl OutlierAnnotation {
    pub fn is_flagged(&self) -> bool {
        self.is_outlier_zscore || self.is_outlier_iqr
    }
}

/// Per-material consumption variability.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariabilityEntry {
    pub material: String,
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
    /// `stddev / |mean| * 100`, so never negative even for materials whose
    /// movements are mostly outbound.
    pub coefficient_of_variation: f64,
}

/// Which side of the distribution the latest movement fell on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AlertDirection {
    High,
    Low,
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDirection::High => write!(f, "\u{2191} High"),
            AlertDirection::Low => write!(f, "\u{2193} Low"),
        }
    }
}

/// A latest movement that tripped its material's deviation threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub material: String,
    /// Id of the movement treated as the latest one.
    pub movement_id: u64,
    pub latest_value: f64,
    pub historical_mean: f64,
    pub historical_stddev: f64,
    pub direction: AlertDirection,
}

impl AlertEvent {
    /// One line of the notification body: `material: value (mean ± stddev)`.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} ({:.2} \u{00b1} {:.2})",
            self.material, self.latest_value, self.historical_mean, self.historical_stddev
        )
    }
}

/// Monetary exposure from reporting gaps and suspected registration failures.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImpactEstimate {
    pub missing_days: Vec<NaiveDate>,
    pub downtime_cost: f64,
    /// Ids of records with zero quantity on a positive balance.
    pub registration_failures: Vec<u64>,
    pub registration_failure_cost: f64,
    /// False when the dataset carries no running balance, in which case
    /// `registration_failure_cost` is zero because it was not computed.
    pub registration_failures_computed: bool,
    pub total_cost: f64,
    pub diagnostics: Vec<GroupDiagnostic>,
}

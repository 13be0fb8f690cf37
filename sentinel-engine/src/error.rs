//! Engine error types.
//!
//! Every failure mode has a named variant. Per-group conditions
//! (`InsufficientData`, `DegenerateMean`, `MissingColumn`) are collected as
//! diagnostics on a computation's report; caller contract violations
//! (`InvalidParameter`) are returned before any work starts.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient data for {scope}: required {required}, got {got}")]
    InsufficientData {
        scope: String,
        required: usize,
        got: usize,
    },

    #[error("Degenerate mean for material '{material}': coefficient of variation is undefined")]
    DegenerateMean { material: String },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Duplicate movement id: {0}")]
    DuplicateId(u64),

    #[error("Invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl EngineError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A non-fatal condition attached to one grouping (a material, or the
/// dataset as a whole) while the rest of the computation carries on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupDiagnostic {
    pub scope: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    InsufficientData,
    DegenerateMean,
    MissingColumn,
}

impl GroupDiagnostic {
    /// Convert a per-group error into a diagnostic. Returns `None` for
    /// errors that must never be downgraded (parameter or I/O failures).
    pub fn from_error(scope: &str, err: &EngineError) -> Option<Self> {
        let kind = match err {
            EngineError::InsufficientData { .. } => DiagnosticKind::InsufficientData,
            EngineError::DegenerateMean { .. } => DiagnosticKind::DegenerateMean,
            EngineError::MissingColumn(_) => DiagnosticKind::MissingColumn,
            _ => return None,
        };
        Some(Self {
            scope: scope.to_string(),
            kind,
            message: err.to_string(),
        })
    }
}

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod deviation_alerter;
pub mod error;
pub mod export;
pub mod filter;
pub mod gap_estimator;
pub mod ledger_loader;
pub mod notification;
pub mod outlier_classifier;
pub mod selector;
pub mod stats;
pub mod thresholds;
pub mod types;
pub mod util;
pub mod variability_ranker;

pub use analysis::{run_analysis, AnalysisReport};
pub use config::{AlertConfig, EngineConfig, GapConfig, LatestRecord, OutlierConfig, RankingConfig};
pub use dataset::MovementDataset;
pub use deviation_alerter::{detect_deviations, AlertReport};
pub use error::{DiagnosticKind, EngineError, EngineResult, GroupDiagnostic};
pub use export::{export_annotated_csv, export_flagged_csv};
pub use filter::{DateRange, FilterResult, MovementFilter, Selection};
pub use gap_estimator::estimate_reporting_gaps;
pub use ledger_loader::{load_ledger, load_ledger_file};
pub use notification::{
    build_notification, dispatch_alerts, AlertNotification, LogDispatcher, NotificationDispatcher,
};
pub use outlier_classifier::{classify_outliers, OutlierReport, OutlierSummary};
pub use types::{
    AlertDirection, AlertEvent, ImpactEstimate, Movement, OperationType, OutlierAnnotation,
    VariabilityEntry,
};
pub use variability_ranker::{rank_variability, VariabilityRanking};

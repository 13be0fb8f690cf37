use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use sentinel_engine::analysis::{run_analysis, AnalysisReport};
use sentinel_engine::config::{EngineConfig, LatestRecord};
use sentinel_engine::error::{EngineResult, GroupDiagnostic};
use sentinel_engine::export::{export_annotated_csv, export_flagged_csv};
use sentinel_engine::filter::{DateRange, Selection};
use sentinel_engine::ledger_loader::load_ledger_file;
use sentinel_engine::notification::{dispatch_alerts, LogDispatcher};
use sentinel_engine::outlier_classifier::OutlierReport;
use sentinel_engine::types::{AlertEvent, Movement, OutlierAnnotation, VariabilityEntry};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "sentinel-server")]
#[command(about = "Anomaly digest for inventory movement ledgers", long_about = None)]
struct Cli {
    /// Movement ledger CSV
    ledger: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Materials to analyze (comma-separated, default all)
    #[arg(long, value_delimiter = ',')]
    material: Vec<String>,

    /// Sites to analyze (comma-separated, default all)
    #[arg(long, value_delimiter = ',')]
    site: Vec<String>,

    /// Operators to analyze (comma-separated, default all)
    #[arg(long, value_delimiter = ',')]
    operator: Vec<String>,

    /// First day to analyze (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day to analyze (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Number of most variable materials to list
    #[arg(long)]
    top: Option<usize>,

    /// Deviation multiplier for latest-movement alerts
    #[arg(long)]
    limite_desvio: Option<f64>,

    /// How each material's latest movement is chosen
    #[arg(long, value_enum)]
    latest: Option<LatestArg>,

    /// Downtime cost per hour
    #[arg(long)]
    cost_per_hour: Option<f64>,

    /// Downtime hours charged per missing day
    #[arg(long)]
    hours_per_gap: Option<f64>,

    /// Only list (and export) records flagged as outliers
    #[arg(long)]
    outliers_only: bool,

    /// Write the filtered rows with outlier columns to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Dispatch deviation alerts to this recipient
    #[arg(long, env = "SENTINEL_NOTIFY_TO")]
    notify: Option<String>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LatestArg {
    DatasetOrder,
    Timestamp,
}

impl From<LatestArg> for LatestRecord {
    fn from(arg: LatestArg) -> Self {
        match arg {
            LatestArg::DatasetOrder => LatestRecord::DatasetOrder,
            LatestArg::Timestamp => LatestRecord::Timestamp,
        }
    }
}

fn selection(values: &[String]) -> Option<Selection> {
    if values.is_empty() {
        None
    } else {
        Some(Selection::only(values.iter().map(|v| v.trim().to_string())))
    }
}

fn base_config(cli: &Cli) -> EngineResult<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Layer command-line overrides on top of the file (or default) config.
fn build_config(
    cli: &Cli,
    mut config: EngineConfig,
    span: Option<(NaiveDate, NaiveDate)>,
) -> EngineResult<EngineConfig> {

    if let Some(material) = selection(&cli.material) {
        config.filter.material = material;
    }
    if let Some(site) = selection(&cli.site) {
        config.filter.site = site;
    }
    if let Some(operator) = selection(&cli.operator) {
        config.filter.operator = operator;
    }
    if cli.from.is_some() || cli.to.is_some() {
        // An open end keeps the configured bound, else takes the ledger's own.
        let (first, last) = config
            .filter
            .date_range
            .map(|range| (range.start, range.end))
            .or(span)
            .unwrap_or((NaiveDate::MIN, NaiveDate::MAX));
        config.filter.date_range = Some(DateRange {
            start: cli.from.unwrap_or(first),
            end: cli.to.unwrap_or(last),
        });
    }
    if let Some(top) = cli.top {
        config.ranking.top_n = top;
    }
    if let Some(limite_desvio) = cli.limite_desvio {
        config.alerts.limite_desvio = limite_desvio;
    }
    if let Some(latest) = cli.latest {
        config.alerts.latest = latest.into();
    }
    if let Some(cost) = cli.cost_per_hour {
        config.gaps.downtime_cost_per_hour = cost;
    }
    if let Some(hours) = cli.hours_per_gap {
        config.gaps.downtime_hours_per_gap = hours;
    }

    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// JSON output contract
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DigestJson<'a> {
    generated_at: String,
    ledger: String,
    analysis_ms: u128,
    outliers: Vec<OutlierJson<'a>>,
    variability: &'a [VariabilityEntry],
    alerts: &'a [AlertEvent],
    impact: ImpactJson,
    diagnostics: Vec<&'a GroupDiagnostic>,
    summary: SummaryJson,
}

#[derive(Serialize)]
struct OutlierJson<'a> {
    id: u64,
    timestamp: Option<NaiveDate>,
    material: Option<&'a str>,
    quantity: f64,
    zscore: f64,
    is_outlier_zscore: bool,
    is_outlier_iqr: bool,
}

#[derive(Serialize)]
struct ImpactJson {
    missing_days: Vec<String>,
    downtime_cost: f64,
    registration_failures: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_failure_cost: Option<f64>,
    total_cost: f64,
}

#[derive(Serialize)]
struct SummaryJson {
    records_analyzed: usize,
    records_filtered_out: usize,
    zscore_outliers: usize,
    iqr_outliers: usize,
    materials_ranked: usize,
    alerts: usize,
    total_exposure: f64,
}

/// Annotations to list, highest Z-score first.
fn listed_annotations(report: &AnalysisReport, outliers_only: bool) -> Vec<&OutlierAnnotation> {
    match &report.outliers {
        Some(outliers) if outliers_only => outliers.flagged_by_zscore(),
        Some(outliers) => outliers.ranked_by_zscore(),
        None => Vec::new(),
    }
}

fn export_rows<W: Write>(
    writer: W,
    report: &AnalysisReport,
    outliers: &OutlierReport,
    outliers_only: bool,
) -> EngineResult<usize> {
    if outliers_only {
        export_flagged_csv(writer, &report.filtered, outliers)
    } else {
        export_annotated_csv(writer, &report.filtered, outliers)
    }
}

fn build_json<'a>(
    report: &'a AnalysisReport,
    record_index: &HashMap<u64, &'a Movement>,
    ledger: &str,
    outliers_only: bool,
    analysis_ms: u128,
) -> DigestJson<'a> {
    let summary = report.outlier_summary;
    DigestJson {
        generated_at: Utc::now().to_rfc3339(),
        ledger: ledger.to_string(),
        analysis_ms,
        outliers: listed_annotations(report, outliers_only)
            .into_iter()
            .map(|a| {
                let record = record_index.get(&a.id).copied();
                OutlierJson {
                    id: a.id,
                    timestamp: record.map(|r| r.timestamp),
                    material: record.map(|r| r.material.as_str()),
                    quantity: a.quantity,
                    zscore: a.zscore,
                    is_outlier_zscore: a.is_outlier_zscore,
                    is_outlier_iqr: a.is_outlier_iqr,
                }
            })
            .collect(),
        variability: &report.ranking.entries,
        alerts: &report.alerts.alerts,
        impact: ImpactJson {
            missing_days: report
                .impact
                .missing_days
                .iter()
                .map(|d| d.to_string())
                .collect(),
            downtime_cost: report.impact.downtime_cost,
            registration_failures: report.impact.registration_failures.clone(),
            registration_failure_cost: report
                .impact
                .registration_failures_computed
                .then_some(report.impact.registration_failure_cost),
            total_cost: report.impact.total_cost,
        },
        diagnostics: report.all_diagnostics(),
        summary: SummaryJson {
            records_analyzed: report.records_analyzed,
            records_filtered_out: report.records_filtered_out,
            zscore_outliers: summary.map_or(0, |s| s.zscore_outliers),
            iqr_outliers: summary.map_or(0, |s| s.iqr_outliers),
            materials_ranked: report.ranking.ranked_materials,
            alerts: report.alerts.alerts.len(),
            total_exposure: report.impact.total_cost,
        },
    }
}

// ---------------------------------------------------------------------------
// Human-readable output
// ---------------------------------------------------------------------------

/// Format a number with comma thousands separators.
fn format_dollars(amount: f64) -> String {
    let whole = amount.abs().round() as u64;
    let sign = if amount < 0.0 { "-" } else { "" };

    if whole < 1_000 {
        return format!("{}{}", sign, whole);
    }

    let s = whole.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    format!("{}{}", sign, result.chars().rev().collect::<String>())
}

fn print_human(
    report: &AnalysisReport,
    record_index: &HashMap<u64, &Movement>,
    outliers_only: bool,
    load_ms: u128,
    analysis_ms: u128,
) {
    let rule = "\u{2550}".repeat(62);
    println!();
    println!("  \u{2554}{}\u{2557}", rule);
    println!("  \u{2551}       STOCK SENTINEL \u{2014} Movement Anomaly Digest              \u{2551}");
    println!("  \u{255a}{}\u{255d}", rule);
    println!();

    println!(
        "  {} movements analyzed ({} filtered out)  \u{00b7}  ${} exposure",
        report.records_analyzed,
        report.records_filtered_out,
        format_dollars(report.impact.total_cost)
    );
    println!(
        "  {} materials  \u{00b7}  {} sites  \u{00b7}  {} operators",
        report.filtered.materials().len(),
        report.filtered.sites().len(),
        report.filtered.operators().len()
    );
    println!();

    // Outliers
    println!("  {:\u{2500}<64}", "Outliers ");
    match (&report.outliers, report.outlier_summary) {
        (Some(outliers), Some(summary)) => {
            println!(
                "  {} records  \u{00b7}  {} by Z-score  \u{00b7}  {} by IQR  \u{00b7}  fences [{:.1}, {:.1}]",
                summary.total_records,
                summary.zscore_outliers,
                summary.iqr_outliers,
                outliers.lower_fence,
                outliers.upper_fence
            );
            let listed = listed_annotations(report, outliers_only);
            let limit = if outliers_only { listed.len() } else { 10 };
            for a in listed.into_iter().take(limit) {
                let (date, material) = record_index
                    .get(&a.id)
                    .map(|r| (r.timestamp.to_string(), r.material.as_str()))
                    .unwrap_or_default();
                let flags = match (a.is_outlier_zscore, a.is_outlier_iqr) {
                    (true, true) => "Z+IQR",
                    (true, false) => "Z",
                    (false, true) => "IQR",
                    (false, false) => "",
                };
                println!(
                    "    #{:<5} {:10} {:24} {:>8}  z {:>5.2}  {}",
                    a.id, date, material, a.quantity, a.zscore, flags
                );
            }
        }
        _ => println!("  Not enough numeric movements to classify."),
    }
    println!();

    // Variability
    println!("  {:\u{2500}<64}", "Most variable materials ");
    if report.ranking.entries.is_empty() {
        println!("  No material has a defined coefficient of variation.");
    }
    for (i, e) in report.ranking.entries.iter().enumerate() {
        println!(
            "  {:>2}. {:28} CV {:>7.1}%  mean {:>8.2}  sd {:>8.2}  n={}",
            i + 1,
            e.material,
            e.coefficient_of_variation,
            e.mean,
            e.stddev,
            e.count
        );
    }
    println!();

    // Alerts
    println!("  {:\u{2500}<64}", "Deviation alerts ");
    if report.alerts.alerts.is_empty() {
        println!("  No latest movement outside its expected range. All clear!");
    }
    for alert in &report.alerts.alerts {
        println!("  {:8} {}", alert.direction.to_string(), alert.summary_line());
    }
    println!();

    // Reporting gaps
    let impact = &report.impact;
    println!("  {:\u{2500}<64}", "Reporting gaps ");
    let days: Vec<String> = impact.missing_days.iter().map(|d| d.to_string()).collect();
    println!(
        "  {} missing day{}  \u{00b7}  ${} downtime{}",
        days.len(),
        if days.len() == 1 { "" } else { "s" },
        format_dollars(impact.downtime_cost),
        if days.is_empty() {
            String::new()
        } else {
            format!("  ({})", days.join(", "))
        }
    );
    if impact.registration_failures_computed {
        println!(
            "  {} suspected registration failure{}  \u{00b7}  ${}",
            impact.registration_failures.len(),
            if impact.registration_failures.len() == 1 { "" } else { "s" },
            format_dollars(impact.registration_failure_cost)
        );
    } else {
        println!("  Registration failures not computed (no running balance column).");
    }
    println!("  Total exposure: ${}", format_dollars(impact.total_cost));

    let diagnostics = report.all_diagnostics();
    if !diagnostics.is_empty() {
        println!();
        println!("  {:\u{2500}<64}", "Notes ");
        for d in diagnostics {
            println!("  {:?} [{}]: {}", d.kind, d.scope, d.message);
        }
    }

    println!();
    println!(
        "  \u{23f1}  CSV loaded in {}ms \u{00b7} Analysis ran in {}ms \u{00b7} Total {}ms",
        load_ms,
        analysis_ms,
        load_ms + analysis_ms
    );
    println!();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

async fn run(cli: Cli) -> EngineResult<()> {
    let load_start = Instant::now();
    let ledger = load_ledger_file(&cli.ledger)?;
    let load_ms = load_start.elapsed().as_millis();
    log::info!("loaded {} movements from {}", ledger.len(), cli.ledger.display());

    let config = build_config(&cli, base_config(&cli)?, ledger.date_span())?;

    let analysis_start = Instant::now();
    let report = run_analysis(&ledger, &config)?;
    let analysis_ms = analysis_start.elapsed().as_millis();

    if let Some(path) = &cli.export {
        match &report.outliers {
            Some(outliers) => {
                let writer = BufWriter::new(File::create(path)?);
                let rows = export_rows(writer, &report, outliers, cli.outliers_only)?;
                log::info!("exported {} rows to {}", rows, path.display());
            }
            None => log::warn!("nothing classified, skipping export to {}", path.display()),
        }
    }

    let record_index: HashMap<u64, &Movement> =
        report.filtered.records().iter().map(|r| (r.id, r)).collect();

    if cli.json {
        let digest = build_json(
            &report,
            &record_index,
            &cli.ledger.display().to_string(),
            cli.outliers_only,
            analysis_ms,
        );
        match serde_json::to_string_pretty(&digest) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing digest: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_human(&report, &record_index, cli.outliers_only, load_ms, analysis_ms);
    }

    if let Some(recipient) = &cli.notify {
        dispatch_alerts(&LogDispatcher, &report.alerts, recipient).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

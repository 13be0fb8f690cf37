//! CSV movement ledger loader.
//!
//! Parses ledger CSV files into a `MovementDataset`. Expected columns:
//!   id, timestamp, material, quantity, operation_type, site, operator
//! plus the optional columns running_balance, unit_of_measure, lot.
//!
//! The Portuguese headers written by the lab exports are accepted as well:
//!   ID, Data, Material, Quantidade, Tipo, Local, Responsável, Saldo,
//!   Unidade, Lote
//!
//! Dates may be `YYYY-MM-DD` (a trailing time part is ignored) or
//! `DD/MM/YYYY`. Quantities may be fractional. A quantity that cannot be
//! read as a finite number becomes missing, not zero.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult};
use crate::types::{Movement, OperationType};

const BALANCE_HEADERS: [&str; 2] = ["running_balance", "Saldo"];

/// A ledger row as it appears in the file, before coercion.
#[derive(Debug, Deserialize)]
struct LedgerRow {
    #[serde(alias = "ID")]
    id: u64,
    #[serde(alias = "Data", alias = "date")]
    timestamp: String,
    #[serde(alias = "Material")]
    material: String,
    #[serde(alias = "Quantidade", default)]
    quantity: String,
    #[serde(alias = "Tipo", default)]
    operation_type: String,
    #[serde(alias = "Local", default)]
    site: String,
    #[serde(alias = "Responsável", alias = "Responsavel", default)]
    operator: String,
    #[serde(alias = "Saldo", default)]
    running_balance: Option<String>,
    #[serde(alias = "Unidade", default)]
    unit_of_measure: Option<String>,
    #[serde(alias = "Lote", default)]
    lot: Option<String>,
}

impl LedgerRow {
    fn into_movement(self, line: usize) -> EngineResult<Movement> {
        let invalid = |reason: String| EngineError::InvalidRecord { line, reason };

        let timestamp = parse_date(&self.timestamp)
            .ok_or_else(|| invalid(format!("unparseable date '{}'", self.timestamp)))?;

        let material = self.material.trim().to_string();
        if material.is_empty() {
            return Err(invalid("material is blank".to_string()));
        }

        let quantity = coerce_quantity(&self.quantity);
        if quantity.is_none() {
            log::warn!(
                "line {}: quantity '{}' is not numeric, treating as missing",
                line,
                self.quantity
            );
        }

        let running_balance = match self.running_balance.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let balance = coerce_balance(raw).ok_or_else(|| {
                    invalid(format!(
                        "running balance '{}' is not a whole non-negative number",
                        raw
                    ))
                })?;
                Some(balance)
            }
        };

        Ok(Movement {
            id: self.id,
            timestamp,
            material,
            quantity,
            operation_type: OperationType::from(self.operation_type.as_str()),
            site: self.site,
            operator: self.operator,
            running_balance,
            unit_of_measure: self.unit_of_measure.filter(|s| !s.is_empty()),
            lot: self.lot.filter(|s| !s.is_empty()),
        })
    }
}

/// Load a movement ledger from a CSV reader.
pub fn load_ledger<R: Read>(reader: R) -> EngineResult<MovementDataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let has_running_balance = csv_reader
        .headers()?
        .iter()
        .any(|h| BALANCE_HEADERS.contains(&h));

    let mut records = Vec::new();
    for (line_num, result) in csv_reader.deserialize::<LedgerRow>().enumerate() {
        let line = line_num + 2;
        let row = result.map_err(|e| EngineError::InvalidRecord {
            line,
            reason: e.to_string(),
        })?;
        records.push(row.into_movement(line)?);
    }

    log::debug!(
        "loaded {} movements (running balance column: {})",
        records.len(),
        has_running_balance
    );
    MovementDataset::new(records, has_running_balance)
}

/// Load a movement ledger from a CSV file path.
pub fn load_ledger_file(path: impl AsRef<Path>) -> EngineResult<MovementDataset> {
    let file = std::fs::File::open(path)?;
    load_ledger(file)
}

/// Parse `YYYY-MM-DD[...]` or `DD/MM/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
        .or_else(|| {
            raw.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

/// Read a quantity as a signed number. `NaN`, infinities and anything that
/// does not parse are missing.
pub fn coerce_quantity(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|q| q.is_finite())
}

/// Read an on-hand balance. It must be whole and non-negative; `"12.0"` is
/// accepted.
fn coerce_balance(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(balance) = raw.parse::<u64>() {
        return Some(balance);
    }
    let value = coerce_quantity(raw)?;
    let whole = value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64;
    whole.then_some(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutlierConfig;
    use crate::outlier_classifier::classify_outliers;
    use std::io::Write;

    const SAMPLE_CSV: &str = "\
id,timestamp,material,quantity,operation_type,site,operator,running_balance
1,2025-01-01,Seringa 10mL,50,Purchase,Lab SP,Maria Souza,150
2,2025-01-02,Seringa 10mL,-12,Consumption,Lab SP,João Silva,138
3,2025-01-02,Máscara N95,abc,Transfer,Lab RJ,Ana Costa,
4,2025-01-04,Máscara N95,0,Adjustment,Lab RJ,Ana Costa,80
";

    const PORTUGUESE_CSV: &str = "\
ID,Data,Material,Quantidade,Saldo,Tipo,Unidade,Responsável,Local,Lote
1,05/03/2025,Luvas Latex M,25,125,Compra,caixas,Fernanda Lima,Lab POA,LOTE-202311
2,06/03/2025,Luvas Latex M,-7,118,Consumo,caixas,Lucas Pereira,Lab POA,LOTE-202377
";

    #[test]
    fn load_sample_csv() {
        let dataset = load_ledger(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 4);
        assert!(dataset.has_running_balance());
        let first = &dataset.records()[0];
        assert_eq!(first.material, "Seringa 10mL");
        assert_eq!(first.quantity, Some(50.0));
        assert_eq!(first.operation_type, OperationType::Purchase);
        assert_eq!(first.running_balance, Some(150));
        assert_eq!(first.timestamp, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn non_numeric_quantity_becomes_missing() {
        let dataset = load_ledger(SAMPLE_CSV.as_bytes()).unwrap();
        let third = &dataset.records()[2];
        assert_eq!(third.quantity, None);
        assert_eq!(third.running_balance, None);
        assert_eq!(dataset.quantities().len(), 3);
    }

    #[test]
    fn portuguese_export_is_accepted() {
        let dataset = load_ledger(PORTUGUESE_CSV.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.has_running_balance());
        let first = &dataset.records()[0];
        assert_eq!(first.timestamp, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(first.operator, "Fernanda Lima");
        assert_eq!(first.site, "Lab POA");
        assert_eq!(first.operation_type, OperationType::Purchase);
        assert_eq!(first.unit_of_measure.as_deref(), Some("caixas"));
        assert_eq!(first.lot.as_deref(), Some("LOTE-202311"));
    }

    #[test]
    fn missing_balance_column_is_recorded() {
        let csv_data = "\
id,timestamp,material,quantity,operation_type,site,operator
1,2025-01-01,Gaze Estéril,5,Purchase,Lab BH,Carlos Oliveira
";
        let dataset = load_ledger(csv_data.as_bytes()).unwrap();
        assert!(!dataset.has_running_balance());
    }

    #[test]
    fn negative_balance_is_rejected() {
        let csv_data = "\
id,timestamp,material,quantity,operation_type,site,operator,running_balance
1,2025-01-01,Gaze Estéril,5,Purchase,Lab BH,Carlos Oliveira,-3
";
        let err = load_ledger(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn bad_date_reports_line() {
        let csv_data = "\
id,timestamp,material,quantity,operation_type,site,operator
1,2025-01-01,Gaze,5,Purchase,Lab BH,Carlos
2,yesterday,Gaze,5,Purchase,Lab BH,Carlos
";
        let err = load_ledger(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { line: 3, .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv_data = "\
id,timestamp,material,quantity,operation_type,site,operator
7,2025-01-01,Gaze,5,Purchase,Lab BH,Carlos
7,2025-01-02,Gaze,5,Purchase,Lab BH,Carlos
";
        assert!(matches!(
            load_ledger(csv_data.as_bytes()),
            Err(EngineError::DuplicateId(7))
        ));
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        assert_eq!(parse_date("2024-11-30"), Some(expected));
        assert_eq!(parse_date("30/11/2024"), Some(expected));
        assert_eq!(parse_date("2024-11-30T08:15:00"), Some(expected));
        assert_eq!(parse_date("11/30/2024"), None);
    }

    #[test]
    fn quantity_coercion() {
        assert_eq!(coerce_quantity(" -12 "), Some(-12.0));
        assert_eq!(coerce_quantity("40.0"), Some(40.0));
        assert_eq!(coerce_quantity("4.5"), Some(4.5));
        assert_eq!(coerce_quantity("-0.25"), Some(-0.25));
        assert_eq!(coerce_quantity(""), None);
        assert_eq!(coerce_quantity("NaN"), None);
        assert_eq!(coerce_quantity("inf"), None);
    }

    #[test]
    fn balance_coercion() {
        assert_eq!(coerce_balance("150"), Some(150));
        assert_eq!(coerce_balance("80.0"), Some(80));
        assert_eq!(coerce_balance("2.5"), None);
        assert_eq!(coerce_balance("-3"), None);
    }

    #[test]
    fn fractional_quantities_reach_the_classifier() {
        let csv_data = "\
id,timestamp,material,quantity,operation_type,site,operator
1,2025-01-01,Álcool 70%,4.5,Consumption,Lab BH,Carlos
2,2025-01-02,Álcool 70%,10,Purchase,Lab BH,Carlos
3,2025-01-03,Álcool 70%,12,Purchase,Lab BH,Carlos
";
        let dataset = load_ledger(csv_data.as_bytes()).unwrap();
        assert_eq!(dataset.records()[0].quantity, Some(4.5));
        assert_eq!(dataset.quantities(), vec![4.5, 10.0, 12.0]);

        let report = classify_outliers(&dataset, &OutlierConfig::default()).unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.annotations.len(), 3);
        assert_eq!(report.annotations[0].quantity, 4.5);
        assert!((report.mean - 26.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CSV.as_bytes()).unwrap();
        let dataset = load_ledger_file(file.path()).unwrap();
        assert_eq!(dataset.len(), 4);
    }
}

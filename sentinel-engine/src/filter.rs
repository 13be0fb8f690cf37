use std::collections::BTreeSet;
use std::convert::TryFrom;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::MovementDataset;
use crate::error::{EngineError, EngineResult};
use crate::types::Movement;

/// A filter dimension: either every value, or an explicit set.
///
/// Serialized as the string `"all"` or a list of values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum Selection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl Selection {
    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Only(values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(values) => values.contains(value),
        }
    }

    fn validate(&self, name: &str) -> EngineResult<()> {
        match self {
            Selection::Only(values) if values.is_empty() => Err(EngineError::invalid_parameter(
                name,
                "selection must name at least one value or be \"all\"",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Keyword(String),
    Values(BTreeSet<String>),
}

impl TryFrom<SelectionRepr> for Selection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(Selection::All),
            SelectionRepr::Keyword(k) => Err(format!(
                "expected \"all\" or a list of values, got \"{}\"",
                k
            )),
            SelectionRepr::Values(values) => Ok(Selection::Only(values)),
        }
    }
}

impl From<Selection> for SelectionRepr {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::All => SelectionRepr::Keyword("all".to_string()),
            Selection::Only(values) => SelectionRepr::Values(values),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Result of a filter operation: the kept view plus how many records
/// were excluded.
pub struct FilterResult {
    pub kept: MovementDataset,
    pub removed: usize,
}

/// Caller-supplied narrowing of the ledger before any computation runs.
/// `date_range: None` means every date.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MovementFilter {
    pub material: Selection,
    pub site: Selection,
    pub operator: Selection,
    pub date_range: Option<DateRange>,
}

impl MovementFilter {
    pub fn validate(&self) -> EngineResult<()> {
        self.material.validate("filter.material")?;
        self.site.validate("filter.site")?;
        self.operator.validate("filter.operator")?;
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(EngineError::invalid_parameter(
                    "filter.date_range",
                    format!("start {} is after end {}", range.start, range.end),
                ));
            }
        }
        Ok(())
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == MovementFilter::default()
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        self.material.matches(&movement.material)
            && self.site.matches(&movement.site)
            && self.operator.matches(&movement.operator)
            && self
                .date_range
                .map_or(true, |range| range.contains(movement.timestamp))
    }

    /// Partition the dataset into the kept view and a removed count.
    /// Dataset order is preserved.
    pub fn apply(&self, dataset: &MovementDataset) -> EngineResult<FilterResult> {
        self.validate()?;
        if self.is_unrestricted() {
            return Ok(FilterResult {
                kept: dataset.clone(),
                removed: 0,
            });
        }
        let kept: Vec<Movement> = dataset
            .records()
            .iter()
            .filter(|m| self.matches(m))
            .cloned()
            .collect();
        let removed = dataset.len() - kept.len();
        log::debug!("filter kept {} of {} movements", kept.len(), dataset.len());
        Ok(FilterResult {
            kept: MovementDataset::subset(kept, dataset.has_running_balance()),
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn sample() -> MovementDataset {
        MovementDataset::new(
            vec![
                Movement::new(1, day(1), "Máscara N95", Some(5.0))
                    .with_site("Lab SP")
                    .with_operator("Ana Costa"),
                Movement::new(2, day(2), "Swab Nasal", Some(-3.0))
                    .with_site("Lab RJ")
                    .with_operator("João Silva"),
                Movement::new(3, day(5), "Máscara N95", Some(-1.0))
                    .with_site("Lab RJ")
                    .with_operator("Ana Costa"),
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn default_filter_keeps_everything() {
        let result = MovementFilter::default().apply(&sample()).unwrap();
        assert_eq!(result.kept.len(), 3);
        assert_eq!(result.removed, 0);
        assert!(result.kept.has_running_balance());
    }

    #[test]
    fn any_narrowed_dimension_is_restricted() {
        assert!(MovementFilter::default().is_unrestricted());
        let by_operator = MovementFilter {
            operator: Selection::only(["Ana Costa"]),
            ..MovementFilter::default()
        };
        assert!(!by_operator.is_unrestricted());
        let result = by_operator.apply(&sample()).unwrap();
        assert_eq!(result.kept.operators(), vec!["Ana Costa".to_string()]);
        assert_eq!(result.removed, 1);
    }

    #[test]
    fn dimensions_combine_conjunctively() {
        let filter = MovementFilter {
            material: Selection::only(["Máscara N95"]),
            site: Selection::only(["Lab RJ"]),
            ..MovementFilter::default()
        };
        let result = filter.apply(&sample()).unwrap();
        let ids: Vec<u64> = result.kept.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(result.removed, 2);
    }

    #[test]
    fn date_range_is_inclusive() {
        let filter = MovementFilter {
            date_range: Some(DateRange {
                start: day(2),
                end: day(5),
            }),
            ..MovementFilter::default()
        };
        let result = filter.apply(&sample()).unwrap();
        assert_eq!(result.kept.len(), 2);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let filter = MovementFilter {
            date_range: Some(DateRange {
                start: day(5),
                end: day(1),
            }),
            ..MovementFilter::default()
        };
        assert!(matches!(
            filter.apply(&sample()),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn selection_deserializes_keyword_and_list() {
        let filter: MovementFilter = serde_json::from_str(
            r#"{"material": "all", "site": ["Lab SP", "Lab BH"], "date_range": {"start": "2025-01-01", "end": "2025-01-31"}}"#,
        )
        .unwrap();
        assert_eq!(filter.material, Selection::All);
        assert!(filter.site.matches("Lab BH"));
        assert!(!filter.site.matches("Lab RJ"));
        assert_eq!(filter.operator, Selection::All);
    }

    #[test]
    fn unknown_filter_fields_are_rejected() {
        let result: Result<MovementFilter, _> = serde_json::from_str(r#"{"warehouse": "all"}"#);
        assert!(result.is_err());
        let result: Result<MovementFilter, _> = serde_json::from_str(r#"{"site": "everything"}"#);
        assert!(result.is_err());
    }
}

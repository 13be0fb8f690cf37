//! The canonical in-memory table of movements.
//!
//! A dataset is read-only input: every computation borrows it and returns a
//! fresh side-table. Filtering produces a new dataset that keeps the source
//! order and the running-balance column flag.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};
use crate::types::Movement;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MovementDataset {
    records: Vec<Movement>,
    /// Whether the source carried a running-balance column at all.
    has_running_balance: bool,
}

impl MovementDataset {
    /// Build a dataset, rejecting duplicate ids.
    pub fn new(records: Vec<Movement>, has_running_balance: bool) -> EngineResult<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id) {
                return Err(EngineError::DuplicateId(record.id));
            }
        }
        Ok(Self {
            records,
            has_running_balance,
        })
    }

    /// Build a dataset and infer the running-balance flag from the records:
    /// the column counts as present when any record carries a balance.
    pub fn from_records(records: Vec<Movement>) -> EngineResult<Self> {
        let has_running_balance = records.iter().any(|r| r.running_balance.is_some());
        Self::new(records, has_running_balance)
    }

    /// Subset constructor for filtered views. Ids are already unique.
    pub(crate) fn subset(records: Vec<Movement>, has_running_balance: bool) -> Self {
        Self {
            records,
            has_running_balance,
        }
    }

    pub fn records(&self) -> &[Movement] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_running_balance(&self) -> bool {
        self.has_running_balance
    }

    /// Numeric quantities in dataset order. Missing values are excluded,
    /// never read as zero.
    pub fn quantities(&self) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.quantity)
            .collect()
    }

    /// Group records by material. Materials iterate in name order and each
    /// group keeps dataset order.
    pub fn group_by_material(&self) -> BTreeMap<&str, Vec<&Movement>> {
        let mut groups: BTreeMap<&str, Vec<&Movement>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.material.as_str()).or_default().push(record);
        }
        groups
    }

    pub fn distinct_dates(&self) -> BTreeSet<NaiveDate> {
        self.records.iter().map(|r| r.timestamp).collect()
    }

    /// Earliest and latest movement date, if any.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let dates = self.distinct_dates();
        let first = *dates.iter().next()?;
        let last = *dates.iter().next_back()?;
        Some((first, last))
    }

    /// Copy of the dataset ordered by timestamp. The sort is stable, so
    /// movements on the same day keep their dataset order.
    pub fn sorted_by_timestamp(&self) -> Self {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.timestamp);
        Self::subset(records, self.has_running_balance)
    }

    pub fn materials(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.material.as_str()))
    }

    pub fn sites(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.site.as_str()))
    }

    pub fn operators(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.operator.as_str()))
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

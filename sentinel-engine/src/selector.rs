use std::cmp::Ordering;

use crate::types::VariabilityEntry;
use crate::util;

/// Selectors sort and truncate a list of scored entries.
pub trait Selector<C>: Send + Sync {
    /// Default selection: sort and truncate based on provided configs.
    fn select(&self, candidates: Vec<C>) -> Vec<C> {
        let mut sorted = self.sort(candidates);
        if let Some(limit) = self.size() {
            sorted.truncate(limit);
        }
        sorted
    }

    /// Extract the score from a candidate to use for sorting.
    fn score(&self, candidate: &C) -> f64;

    /// Order applied between candidates with equal scores. Defaults to
    /// keeping their input order.
    fn tie_break(&self, _a: &C, _b: &C) -> Ordering {
        Ordering::Equal
    }

    /// Sort candidates by their scores in descending order.
    ///
    /// NaN scores are pushed to the end of the list so they never appear
    /// as top candidates.
    fn sort(&self, candidates: Vec<C>) -> Vec<C> {
        let mut sorted = candidates;
        sorted.sort_by(|a, b| {
            let sa = self.score(a);
            let sb = self.score(b);
            let by_score = match (sa.is_nan(), sb.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => sb.partial_cmp(&sa).unwrap_or(Ordering::Equal),
            };
            by_score.then_with(|| self.tie_break(a, b))
        });
        sorted
    }

    /// Optionally provide a maximum number of candidates to select.
    fn size(&self) -> Option<usize> {
        None
    }

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}

/// Selects the N most variable materials by coefficient of variation,
/// ties broken by material name ascending.
pub struct TopNSelector {
    pub n: usize,
}

impl Default for TopNSelector {
    fn default() -> Self {
        Self {
            n: crate::thresholds::TOP_N_VARIABLE,
        }
    }
}

impl Selector<VariabilityEntry> for TopNSelector {
    fn score(&self, candidate: &VariabilityEntry) -> f64 {
        candidate.coefficient_of_variation
    }

    fn tie_break(&self, a: &VariabilityEntry, b: &VariabilityEntry) -> Ordering {
        a.material.cmp(&b.material)
    }

    fn size(&self) -> Option<usize> {
        Some(self.n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(material: &str, cv: f64) -> VariabilityEntry {
        VariabilityEntry {
            material: material.into(),
            count: 3,
            mean: 1.0,
            stddev: cv / 100.0,
            coefficient_of_variation: cv,
        }
    }

    #[test]
    fn sorts_descending_and_truncates() {
        let selector = TopNSelector { n: 2 };
        let picked = selector.select(vec![entry("a", 10.0), entry("b", 90.0), entry("c", 50.0)]);
        let names: Vec<&str> = picked.iter().map(|e| e.material.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn ties_break_by_material_name() {
        let selector = TopNSelector { n: 10 };
        let picked = selector.select(vec![entry("zeta", 40.0), entry("alfa", 40.0), entry("mid", 40.0)]);
        let names: Vec<&str> = picked.iter().map(|e| e.material.as_str()).collect();
        assert_eq!(names, vec!["alfa", "mid", "zeta"]);
    }

    #[test]
    fn nan_scores_sink_to_the_bottom() {
        let selector = TopNSelector { n: 10 };
        let picked = selector.select(vec![entry("nan", f64::NAN), entry("low", 1.0)]);
        assert_eq!(picked[0].material, "low");
    }

    #[test]
    fn name_is_short_type_name() {
        assert_eq!(Selector::<VariabilityEntry>::name(&TopNSelector::default()), "TopNSelector");
    }
}

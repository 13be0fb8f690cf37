//! Descriptive statistics shared by the classifiers.
//!
//! Standard deviation is the population form (divide by `n`). Empty input
//! yields `None` rather than NaN.

use serde::Serialize;

/// Count, mean and population standard deviation of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn population_stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sq_diff: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((sq_diff / values.len() as f64).sqrt())
}

pub fn moments(values: &[f64]) -> Option<Moments> {
    Some(Moments {
        count: values.len(),
        mean: mean(values)?,
        stddev: population_stddev(values)?,
    })
}

/// Quantile with linear interpolation between closest ranks
/// (`h = (n - 1) * p`). `sorted` must be ascending.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Sort a copy ascending with a total order so NaN can never panic the sort.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_formula_not_sample() {
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];
        let m = moments(&values).unwrap();
        assert!((m.mean - 28.0).abs() < 1e-12);
        assert!((m.stddev - 36.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_has_no_moments() {
        assert!(moments(&[]).is_none());
        assert!(quantile_sorted(&[], 0.5).is_none());
    }

    #[test]
    fn single_value_has_zero_stddev() {
        let m = moments(&[42.0]).unwrap();
        assert_eq!(m.stddev, 0.0);
    }

    #[test]
    fn quantiles_interpolate_between_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&sorted, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.75).unwrap() - 3.25).abs() < 1e-12);
        assert_eq!(quantile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile_sorted(&sorted, 1.0), Some(4.0));
    }

    #[test]
    fn sorted_copy_orders_ascending() {
        assert_eq!(sorted_copy(&[3.0, -1.0, 2.0]), vec![-1.0, 2.0, 3.0]);
    }
}

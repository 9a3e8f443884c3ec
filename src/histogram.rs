//! Rate histogram buckets.
//!
//! Boundaries are fractions of one CPU (`0.25` = 25%). A rate falls into the
//! first bucket whose upper bound is strictly greater than the rate, so every
//! bucket is `[lower, upper)`. Rates at or above the last bound land in the
//! overflow bucket, labelled `>=` that bound.

use std::collections::BTreeMap;

/// Default upper bounds: 10%, 25%, 50%, 75%, 100%.
pub const DEFAULT_BUCKETS: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 1.00];

/// Ordered bucket boundaries with their display labels.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBuckets {
    bounds: Vec<f64>,
    labels: Vec<String>,
}

impl HistogramBuckets {
    /// Builds buckets from upper bounds. Non-finite or non-positive bounds are
    /// dropped and the rest sorted and deduplicated.
    pub fn new(bounds: &[f64]) -> Self {
        let mut bounds: Vec<f64> = bounds
            .iter()
            .copied()
            .filter(|b| b.is_finite() && *b > 0.0)
            .collect();
        bounds.sort_by(|a, b| a.total_cmp(b));
        bounds.dedup();

        let mut labels = Vec::with_capacity(bounds.len() + 1);
        let mut lower = 0.0;
        for upper in &bounds {
            labels.push(format!("{}-{}%", percent(lower), percent(*upper)));
            lower = *upper;
        }
        labels.push(format!(">={}%", percent(lower)));

        Self { bounds, labels }
    }

    /// Index of the bucket a rate belongs to. Negative rates count as zero.
    pub fn index_for(&self, rate: f64) -> usize {
        let rate = rate.max(0.0);
        self.bounds
            .iter()
            .position(|upper| rate < *upper)
            .unwrap_or(self.bounds.len())
    }

    /// Number of buckets including the overflow bucket.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Pairs per-bucket counts with their labels.
    pub fn to_map(&self, counts: &[u64]) -> BTreeMap<String, u64> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), counts.get(i).copied().unwrap_or(0)))
            .collect()
    }
}

impl Default for HistogramBuckets {
    fn default() -> Self {
        Self::new(&DEFAULT_BUCKETS)
    }
}

fn percent(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{}", pct.round() as i64)
    } else {
        format!("{:.1}", pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels() {
        let buckets = HistogramBuckets::default();
        assert_eq!(
            buckets.labels(),
            &["0-10%", "10-25%", "25-50%", "50-75%", "75-100%", ">=100%"]
        );
    }

    #[test]
    fn test_index_for_boundaries() {
        let buckets = HistogramBuckets::default();
        assert_eq!(buckets.index_for(0.0), 0);
        assert_eq!(buckets.index_for(0.099), 0);
        assert_eq!(buckets.index_for(0.10), 1);
        assert_eq!(buckets.index_for(0.4), 2);
        assert_eq!(buckets.index_for(0.5), 3);
        assert_eq!(buckets.index_for(1.0), 5);
        assert_eq!(buckets.index_for(3.7), 5);
        assert_eq!(buckets.index_for(-0.2), 0);
    }

    #[test]
    fn test_full_core_lands_in_overflow_label() {
        let buckets = HistogramBuckets::default();
        assert_eq!(buckets.labels()[buckets.index_for(1.0)], ">=100%");
        assert_eq!(buckets.labels()[buckets.index_for(0.999)], "75-100%");
    }

    #[test]
    fn test_bounds_are_normalized() {
        let buckets = HistogramBuckets::new(&[0.5, f64::NAN, 0.125, -1.0, 0.5]);
        assert_eq!(buckets.labels(), &["0-12.5%", "12.5-50%", ">=50%"]);
    }

    #[test]
    fn test_to_map_fills_missing_counts() {
        let buckets = HistogramBuckets::new(&[0.5]);
        let map = buckets.to_map(&[4]);
        assert_eq!(map.get("0-50%"), Some(&4));
        assert_eq!(map.get(">=50%"), Some(&0));
    }
}

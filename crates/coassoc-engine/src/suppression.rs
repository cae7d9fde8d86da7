//! Estimation of privacy-suppressed counts.
//!
//! Upstream replaces every count in the range `1..=10` with a marker value
//! of one. Before counts are summed, rebinned or compared, each marker is
//! replaced with a fixed estimate of the hidden value.

use serde::{Deserialize, Serialize};

/// Maximum share of a concept's total that may come from estimated bins
/// before its age distribution is considered unreliable.
pub const MAX_SUPPRESSED_FRACTION: f64 = 0.05;

/// How suppressed counts are recognized and estimated.
///
/// # Examples
///
/// ```
/// use coassoc_engine::suppression::SuppressionPolicy;
///
/// let policy = SuppressionPolicy::default();
/// let estimated = policy.estimate(&[10, 1, 20, 30]);
/// assert_eq!(estimated.counts, vec![10, 5, 20, 30]);
/// assert_eq!(estimated.suppressed_bins, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionPolicy {
    /// Count value that marks a suppressed bin.
    pub marker: u64,
    /// Value substituted for each suppressed bin.
    pub estimate: u64,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            marker: 1,
            estimate: 5,
        }
    }
}

/// Counts with suppressed bins replaced by their estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedCounts {
    pub counts: Vec<u64>,
    pub suppressed_bins: usize,
}

impl SuppressionPolicy {
    #[must_use]
    pub fn is_suppressed(&self, count: u64) -> bool {
        count == self.marker
    }

    /// Returns `count`, or the estimate when `count` is the marker.
    #[must_use]
    pub fn estimate_value(&self, count: u64) -> u64 {
        if self.is_suppressed(count) {
            self.estimate
        } else {
            count
        }
    }

    #[must_use]
    pub fn estimate(&self, counts: &[u64]) -> EstimatedCounts {
        let suppressed_bins = counts.iter().filter(|&&c| self.is_suppressed(c)).count();
        let counts = counts.iter().map(|&c| self.estimate_value(c)).collect();
        EstimatedCounts {
            counts,
            suppressed_bins,
        }
    }

    /// Share of `total` that consists of estimated values.
    ///
    /// A zero total yields `0.0` when nothing is suppressed and `+∞` otherwise.
    ///
    /// ```
    /// use coassoc_engine::suppression::SuppressionPolicy;
    ///
    /// let policy = SuppressionPolicy::default();
    /// let fraction = policy.suppressed_fraction(&[10, 1, 20, 30], 65);
    /// assert!((fraction - 5.0 / 65.0).abs() < 1e-12);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn suppressed_fraction(&self, counts: &[u64], total: u64) -> f64 {
        let suppressed = counts.iter().filter(|&&c| self.is_suppressed(c)).count() as u64;
        let estimated = (suppressed * self.estimate) as f64;
        if total == 0 {
            return if suppressed == 0 { 0.0 } else { f64::INFINITY };
        }
        estimated / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_replaces_only_markers() {
        let policy = SuppressionPolicy::default();
        let estimated = policy.estimate(&[0, 1, 2, 1, 11]);
        assert_eq!(estimated.counts, vec![0, 5, 2, 5, 11]);
        assert_eq!(estimated.suppressed_bins, 2);
    }

    #[test]
    fn test_unsuppressed_counts_are_unchanged() {
        let policy = SuppressionPolicy::default();
        let counts = [12, 40, 0, 33];
        let estimated = policy.estimate(&counts);
        assert_eq!(estimated.counts, counts);
        assert_eq!(estimated.suppressed_bins, 0);
        assert_eq!(policy.suppressed_fraction(&counts, 85), 0.0);
    }

    #[test]
    fn test_suppressed_fraction_fails_quality_gate() {
        let policy = SuppressionPolicy::default();
        let fraction = policy.suppressed_fraction(&[10, 1, 20, 30], 65);
        assert!(fraction > MAX_SUPPRESSED_FRACTION);
    }

    #[test]
    fn test_suppressed_fraction_with_zero_total() {
        let policy = SuppressionPolicy::default();
        assert_eq!(policy.suppressed_fraction(&[0, 0], 0), 0.0);
        assert_eq!(policy.suppressed_fraction(&[1, 0], 0), f64::INFINITY);
    }

    #[test]
    fn test_custom_policy() {
        let policy = SuppressionPolicy {
            marker: 1,
            estimate: 3,
        };
        assert_eq!(policy.estimate(&[1, 4]).counts, vec![3, 4]);
    }
}

//! Poisson-based confidence intervals.
//!
//! Observed counts are treated as Poisson rates. The "double Poisson"
//! interval widens the plain one to cover the uncertainty of the observed
//! rate itself: the count is first bounded at a per-stage confidence, then
//! each bound is itself bounded again.

use coassoc_stats::special::poisson_quantile;
use serde::{Deserialize, Serialize};

/// A closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    #[must_use]
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Whether the two intervals share at least one point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Multiplies both bounds by `factor`.
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.lower * factor, self.upper * factor)
    }

    /// Clips both bounds into `[-limit, limit]`.
    #[must_use]
    pub fn clipped(self, limit: f64) -> Self {
        Self::new(clip(self.lower, limit), clip(self.upper, limit))
    }
}

/// Clips `value` into `[-limit, limit]`.
///
/// NaN marks a result that is undefined for its inputs, such as a ratio
/// over a concept with no patients. It is left as is and serializes as
/// `null`.
///
/// ```
/// use coassoc_engine::interval::clip;
///
/// assert_eq!(clip(f64::NEG_INFINITY, 999.0), -999.0);
/// assert_eq!(clip(1.5, 999.0), 1.5);
/// ```
#[must_use]
pub fn clip(value: f64, limit: f64) -> f64 {
    if value > limit {
        limit
    } else if value < -limit {
        -limit
    } else {
        value
    }
}

/// Confidence used by each stage of [`double_poisson_ci`] so that the
/// composition reaches `confidence` overall.
#[must_use]
pub fn stage_confidence(confidence: f64) -> f64 {
    1.0 - (1.0 - confidence).sqrt()
}

/// Equal-tailed Poisson interval for an observed rate.
///
/// Bounds are the Poisson quantiles at `(1 - c) / 2` and `(1 + c) / 2`.
/// A zero rate yields `[0, 0]`.
///
/// ```
/// use coassoc_engine::interval::poisson_ci;
///
/// let ci = poisson_ci(50.0, 0.9);
/// assert_eq!((ci.lower, ci.upper), (39.0, 62.0));
/// ```
#[must_use]
pub fn poisson_ci(freq: f64, confidence: f64) -> ConfidenceInterval {
    ConfidenceInterval::new(
        poisson_quantile((1.0 - confidence) / 2.0, freq),
        poisson_quantile((1.0 + confidence) / 2.0, freq),
    )
}

/// Two-stage Poisson interval at overall `confidence`.
///
/// Each stage runs at [`stage_confidence`]: the observed count is bounded
/// first, then the lower bound of the lower stage-one bound and the upper
/// bound of the upper one are taken.
///
/// ```
/// use coassoc_engine::interval::double_poisson_ci;
///
/// let ci = double_poisson_ci(50.0, 0.99);
/// assert_eq!((ci.lower, ci.upper), (29.0, 75.0));
/// ```
#[must_use]
pub fn double_poisson_ci(freq: f64, confidence: f64) -> ConfidenceInterval {
    let stage = stage_confidence(confidence);
    let first = poisson_ci(freq, stage);
    ConfidenceInterval::new(
        poisson_ci(first.lower, stage).lower,
        poisson_ci(first.upper, stage).upper,
    )
}

/// Double Poisson bounds of an observed count, with the lower bound of a
/// positive count floored at one.
fn observed_count_ci(freq: f64, confidence: f64) -> ConfidenceInterval {
    let ci = double_poisson_ci(freq, confidence);
    if freq > 0.0 {
        ConfidenceInterval::new(ci.lower.max(1.0), ci.upper)
    } else {
        ci
    }
}

/// Confidence interval for the natural log of an observed/expected ratio.
///
/// The double Poisson bounds of the observed count are carried through the
/// ratio: `ln(bound · e^ln_ratio / freq)`. A positive count was seen at
/// least once, so its lower bound never drops below one. A non-positive
/// `freq` gives a degenerate interval at `-∞`.
///
/// ```
/// use coassoc_engine::interval::ln_ratio_ci;
///
/// let ci = ln_ratio_ci(3.0, 1.0, 0.99);
/// assert!((ci.lower - (1.0 - 3.0_f64.ln())).abs() < 1e-12);
/// ```
#[must_use]
pub fn ln_ratio_ci(freq: f64, ln_ratio: f64, confidence: f64) -> ConfidenceInterval {
    if freq <= 0.0 {
        return ConfidenceInterval::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    }
    let bounds = observed_count_ci(freq, confidence);
    let ratio = ln_ratio.exp();
    ConfidenceInterval::new(
        (bounds.lower * ratio / freq).ln(),
        (bounds.upper * ratio / freq).ln(),
    )
}

/// Confidence interval for the relative frequency `pair / base`.
///
/// The lower bound divides the lower numerator bound by the upper
/// denominator bound and vice versa, so the interval is the widest ratio
/// consistent with both double Poisson intervals. Lower bounds of positive
/// counts are floored at one, as in [`ln_ratio_ci`].
///
/// ```
/// use coassoc_engine::interval::rel_freq_ci;
///
/// let ci = rel_freq_ci(50.0, 100.0, 0.95);
/// assert!((ci.lower - 33.0 / 125.0).abs() < 1e-12);
/// assert!((ci.upper - 68.0 / 77.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn rel_freq_ci(pair: f64, base: f64, confidence: f64) -> ConfidenceInterval {
    let numerator = observed_count_ci(pair, confidence);
    let denominator = observed_count_ci(base, confidence);
    ConfidenceInterval::new(
        numerator.lower / denominator.upper,
        numerator.upper / denominator.lower,
    )
}

/// Whether two intervals differ significantly.
///
/// Two intervals are significantly different when they do not overlap.
/// With no second interval, `ci` is tested against zero: it is significant
/// when it lies entirely on one side of zero.
///
/// ```
/// use coassoc_engine::interval::{ConfidenceInterval, ci_significance};
///
/// let a = ConfidenceInterval::new(1.0, 2.0);
/// let b = ConfidenceInterval::new(3.0, 4.0);
/// assert!(ci_significance(&a, Some(&b)));
/// assert!(ci_significance(&a, None));
/// assert!(!ci_significance(&ConfidenceInterval::new(-1.0, 1.0), None));
/// ```
#[must_use]
pub fn ci_significance(ci: &ConfidenceInterval, other: Option<&ConfidenceInterval>) -> bool {
    match other {
        Some(other) => !ci.overlaps(other),
        None => ci.lower > 0.0 || ci.upper < 0.0,
    }
}

//! The count store the engine reads from, and lookups built on it.
//!
//! Implementations only serve raw rows; shaping them into distributions,
//! reversing stored pairs and validating bin layouts happens here.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    ConceptId, ConceptPair, DatasetId,
    suppression::SuppressionPolicy,
    temporal::{AgeDistribution, ConceptSummary, DeltaBins, DeltaDistribution},
};

/// Age rows of one concept as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRows {
    pub bin_width: u32,
    pub counts: Vec<u64>,
}

/// Delta rows of one pair as stored upstream, smaller concept id first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRows {
    pub bin_width: u32,
    pub n: usize,
    pub counts: Vec<u64>,
}

/// Pre-aggregated counts for one or more datasets.
///
/// Every method returns `None` (or an empty list) for data the store does
/// not have; callers treat that as "no result", never as an error.
pub trait CountSource {
    /// Patients with `concept`.
    fn concept_count(&self, dataset: DatasetId, concept: ConceptId) -> Option<u64>;

    /// Display name of `concept`.
    fn concept_name(&self, concept: ConceptId) -> Option<&str>;

    /// Patients with both concepts, in either order.
    fn pair_count(&self, dataset: DatasetId, a: ConceptId, b: ConceptId) -> Option<u64>;

    /// Patients in the dataset.
    fn population(&self, dataset: DatasetId) -> Option<u64>;

    /// Number of concept pairs in the dataset, for multiple-testing correction.
    fn total_pairs(&self, dataset: DatasetId) -> Option<u64>;

    /// Concepts that co-occur with `concept`, in ascending id order.
    fn paired_concepts(&self, dataset: DatasetId, concept: ConceptId) -> Vec<ConceptId>;

    /// Concepts that have age rows, in ascending id order.
    fn age_concepts(&self, dataset: DatasetId) -> Vec<ConceptId>;

    fn age_rows(&self, dataset: DatasetId, concept: ConceptId) -> Option<AgeRows>;

    /// Delta rows for `(first, second)`; only served when `first < second`.
    fn delta_rows(&self, dataset: DatasetId, first: ConceptId, second: ConceptId)
    -> Option<DeltaRows>;
}

/// Builds the age distribution of `concept`.
///
/// Returns `None` when the store has no age rows or no count for the
/// concept, or when the rows are malformed.
pub fn age_distribution<S>(
    source: &S,
    dataset: DatasetId,
    concept: ConceptId,
) -> Option<AgeDistribution>
where
    S: CountSource + ?Sized,
{
    let rows = source.age_rows(dataset, concept)?;
    let count = source.concept_count(dataset, concept)?;
    let name = source.concept_name(concept).unwrap_or_default().to_owned();
    AgeDistribution::new(dataset, concept, name, count, rows.bin_width, rows.counts)
        .inspect_err(|e| warn!(%dataset, %concept, "malformed age rows: {e}"))
        .ok()
}

/// Builds the delta distribution from `pair.source` to `pair.target`.
///
/// Pairs are stored once with the smaller id first; a request in the other
/// direction is answered by reversing the stored distribution.
pub fn delta_distribution<S>(
    source: &S,
    dataset: DatasetId,
    pair: ConceptPair,
) -> Option<DeltaDistribution>
where
    S: CountSource + ?Sized,
{
    let (first, second, swapped) = pair.storage_order();
    let rows = source.delta_rows(dataset, first, second)?;
    let bins = DeltaBins::new(rows.bin_width, rows.n, rows.counts)
        .inspect_err(|e| warn!(%dataset, %first, %second, "malformed delta rows: {e}"))
        .ok()?;
    let summary = |concept| {
        Some(ConceptSummary {
            concept_id: concept,
            concept_name: source.concept_name(concept).unwrap_or_default().to_owned(),
            concept_count: source.concept_count(dataset, concept)?,
        })
    };
    let delta = DeltaDistribution::new(
        dataset,
        summary(first)?,
        summary(second)?,
        source.pair_count(dataset, first, second)?,
        bins,
    );
    Some(if swapped { delta.reverse() } else { delta })
}

/// Looks up a batch of pairs, keeping one result per request position.
///
/// `None` requests (malformed upstream input) and pairs without data both
/// produce `None` at their position.
pub fn delta_distributions<S>(
    source: &S,
    dataset: DatasetId,
    pairs: &[Option<ConceptPair>],
) -> Vec<Option<DeltaDistribution>>
where
    S: CountSource + ?Sized,
{
    pairs
        .iter()
        .map(|pair| pair.and_then(|pair| delta_distribution(source, dataset, pair)))
        .collect()
}

/// Threshold rule for "these concepts mostly occur on the same day".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SameDayRule {
    /// Fraction of the pair count the zero-day count must exceed.
    pub threshold: f64,
    /// Value assumed for a suppressed zero-day count.
    pub suppressed_assumption: u64,
}

impl SameDayRule {
    /// Rule for a standalone co-occurrence check.
    pub const GENERAL: Self = Self {
        threshold: 0.01,
        suppressed_assumption: 9,
    };

    /// Stricter rule used to exclude related concepts from similarity search.
    pub const SIMILARITY: Self = Self {
        threshold: 0.05,
        suppressed_assumption: 9,
    };

    /// Whether `zero_day` exceeds the threshold share of `pair_count`.
    ///
    /// A suppressed zero-day count is taken at the high end of the
    /// suppressed range.
    ///
    /// ```
    /// use coassoc_engine::{source::SameDayRule, suppression::SuppressionPolicy};
    ///
    /// let policy = SuppressionPolicy::default();
    /// assert!(SameDayRule::GENERAL.is_exceeded(1, 100, &policy));
    /// assert!(!SameDayRule::SIMILARITY.is_exceeded(1, 200, &policy));
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn is_exceeded(&self, zero_day: u64, pair_count: u64, policy: &SuppressionPolicy) -> bool {
        let zero_day = if policy.is_suppressed(zero_day) {
            self.suppressed_assumption
        } else {
            zero_day
        };
        zero_day as f64 > pair_count as f64 * self.threshold
    }
}

impl Default for SameDayRule {
    fn default() -> Self {
        Self::GENERAL
    }
}

/// Whether two concepts frequently occur on the same day.
///
/// Uses `pair_count` when the caller already has it, otherwise looks it up.
/// Missing pair counts or delta rows mean the concepts are not considered
/// to co-occur.
pub fn concepts_cooccur<S>(
    source: &S,
    dataset: DatasetId,
    a: ConceptId,
    b: ConceptId,
    pair_count: Option<u64>,
    rule: &SameDayRule,
    policy: &SuppressionPolicy,
) -> bool
where
    S: CountSource + ?Sized,
{
    let (first, second, _) = ConceptPair::new(a, b).storage_order();
    let Some(pair_count) = pair_count.or_else(|| source.pair_count(dataset, first, second)) else {
        return false;
    };
    let Some(rows) = source.delta_rows(dataset, first, second) else {
        return false;
    };
    rows.counts
        .get(rows.n)
        .is_some_and(|&zero_day| rule.is_exceeded(zero_day, pair_count, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCounts;

    const DATASET: DatasetId = DatasetId(4);

    fn sample_counts() -> InMemoryCounts {
        let mut counts = InMemoryCounts::new();
        counts.insert_concept(DATASET, ConceptId(1), "Influenza", 300);
        counts.insert_concept(DATASET, ConceptId(2), "Oseltamivir", 120);
        counts.insert_concept(DATASET, ConceptId(3), "Fracture", 90);
        counts.insert_pair(DATASET, ConceptId(1), ConceptId(2), 100);
        counts.insert_pair(DATASET, ConceptId(1), ConceptId(3), 200);
        counts.insert_delta_rows(DATASET, ConceptId(1), ConceptId(2), 1, 2, vec![3, 6, 80, 10, 1]);
        counts.insert_delta_rows(DATASET, ConceptId(1), ConceptId(3), 1, 1, vec![60, 1, 70]);
        counts.insert_age_rows(DATASET, ConceptId(1), 5, vec![10, 1, 20]);
        counts
    }

    #[test]
    fn test_age_distribution_lookup() {
        let counts = sample_counts();
        let age = age_distribution(&counts, DATASET, ConceptId(1)).unwrap();
        assert_eq!(age.concept_name, "Influenza");
        assert_eq!(age.concept_count, 300);
        assert_eq!(age.bin_width(), 5);
        assert!(age_distribution(&counts, DATASET, ConceptId(2)).is_none());
        assert!(age_distribution(&counts, DatasetId(1), ConceptId(1)).is_none());
    }

    #[test]
    fn test_delta_lookup_reverses_when_source_is_larger() {
        let counts = sample_counts();
        let forward =
            delta_distribution(&counts, DATASET, ConceptPair::new(ConceptId(1), ConceptId(2)))
                .unwrap();
        let backward =
            delta_distribution(&counts, DATASET, ConceptPair::new(ConceptId(2), ConceptId(1)))
                .unwrap();
        assert_eq!(forward.source.concept_name, "Influenza");
        assert_eq!(forward.concept_pair_count, 100);
        assert_eq!(backward.source.concept_id, ConceptId(2));
        assert_eq!(backward.counts(), &[1, 10, 80, 6, 3]);
        assert_eq!(backward.reverse(), forward);
    }

    #[test]
    fn test_batch_lookup_keeps_positions() {
        let counts = sample_counts();
        let pairs = [
            Some(ConceptPair::new(ConceptId(2), ConceptId(1))),
            None,
            Some(ConceptPair::new(ConceptId(2), ConceptId(3))),
            Some(ConceptPair::new(ConceptId(1), ConceptId(3))),
        ];
        let results = delta_distributions(&counts, DATASET, &pairs);
        assert_eq!(results.len(), 4);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        assert_eq!(results[3].as_ref().unwrap().half_width(), 1);
    }

    #[test]
    fn test_malformed_delta_rows_are_dropped() {
        let mut counts = sample_counts();
        counts.insert_delta_rows(DATASET, ConceptId(2), ConceptId(3), 1, 2, vec![1, 2, 3]);
        counts.insert_pair(DATASET, ConceptId(2), ConceptId(3), 10);
        let pair = ConceptPair::new(ConceptId(2), ConceptId(3));
        assert!(delta_distribution(&counts, DATASET, pair).is_none());
    }

    #[test]
    fn test_concepts_cooccur() {
        let counts = sample_counts();
        let policy = SuppressionPolicy::default();
        let rule = SameDayRule::GENERAL;
        // 80 same-day out of 100 pairs
        assert!(concepts_cooccur(&counts, DATASET, ConceptId(2), ConceptId(1), None, &rule, &policy));
        // suppressed same-day count taken as 9, against 200 · 0.05 = 10
        assert!(!concepts_cooccur(
            &counts,
            DATASET,
            ConceptId(1),
            ConceptId(3),
            None,
            &SameDayRule::SIMILARITY,
            &policy
        ));
        assert!(concepts_cooccur(&counts, DATASET, ConceptId(1), ConceptId(3), None, &rule, &policy));
        // explicit pair count overrides the lookup
        assert!(concepts_cooccur(
            &counts,
            DATASET,
            ConceptId(1),
            ConceptId(3),
            Some(100),
            &SameDayRule::SIMILARITY,
            &policy
        ));
        assert!(!concepts_cooccur(&counts, DATASET, ConceptId(2), ConceptId(3), None, &rule, &policy));
    }
}

//! Temporal comparison of a source→target pair against similar pairs.
//!
//! The queried pair's delta distribution is compared with two comparison
//! sets built from concepts whose age distributions resemble the source or
//! the target:
//!
//! - **source-anchored**: the source paired with each concept similar to
//!   the target
//! - **target-anchored**: each concept similar to the source paired with
//!   the target
//!
//! At each bin width of [`DELTA_SCHEDULE`] with enough comparisons, a
//! bootstrap envelope is built for each set and for their union, and the
//! queried pair's per-bin intervals are tested against it.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ConceptId, ConceptPair, DatasetId,
    bootstrap::{
        NormalizationMode, PercentileEnvelope, bootstrap_delta_distribution, normalized_intervals,
    },
    config::EngineConfig,
    similarity::{SimilarAgeDistributions, SimilarityParams, find_similar_age_distributions},
    source::{CountSource, delta_distribution, delta_distributions},
    temporal::DeltaDistribution,
};

/// `(bin_width, half_width)` pairs, in days, at which pairs are compared.
pub const DELTA_SCHEDULE: [(u32, usize); 5] = [(1, 13), (2, 6), (4, 3), (8, 2), (16, 1)];

/// Parameters of [`compare_source_to_target`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceToTargetParams {
    /// Search used to find concepts similar to the source and the target.
    pub similarity: SimilarityParams,
    /// Bootstrap iterations per envelope.
    pub iterations: usize,
    /// Bin widths with fewer comparison distributions are omitted.
    pub min_comparisons: usize,
    pub mode: NormalizationMode,
}

impl Default for SourceToTargetParams {
    fn default() -> Self {
        Self {
            similarity: SimilarityParams {
                threshold: 0.7,
                limit: 100,
                exclude_related: false,
                ..SimilarityParams::default()
            },
            iterations: 1000,
            min_comparisons: 5,
            mode: NormalizationMode::RelativeSource,
        }
    }
}

/// The queried pair at one bin width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinnedDelta {
    pub bin_width: u32,
    pub delta: DeltaDistribution,
}

/// One comparison set at one bin width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonGroup {
    pub bin_width: u32,
    pub deltas: Vec<DeltaDistribution>,
    /// Age-distribution similarity behind each entry of `deltas`.
    pub similarities: Vec<f64>,
    pub distribution: PercentileEnvelope,
    pub significance: Vec<bool>,
}

/// Both comparison sets pooled at one bin width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedComparison {
    pub bin_width: u32,
    pub comparisons: usize,
    pub distribution: PercentileEnvelope,
    pub significance: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceToTargetReport {
    pub queried_pair: Vec<BinnedDelta>,
    pub source_anchored: Vec<ComparisonGroup>,
    pub target_anchored: Vec<ComparisonGroup>,
    pub combined: Vec<CombinedComparison>,
}

#[derive(Debug, Clone, Default)]
struct Collected {
    deltas: Vec<DeltaDistribution>,
    similarities: Vec<f64>,
}

/// Compares the delta distribution of `pair` with similar pairs.
///
/// Returns `None` when the pair has no delta distribution.
pub fn compare_source_to_target<S, R>(
    source: &S,
    dataset: DatasetId,
    pair: ConceptPair,
    config: &EngineConfig,
    rng: &mut R,
) -> Option<SourceToTargetReport>
where
    S: CountSource + ?Sized,
    R: Rng + ?Sized,
{
    let params = &config.source_to_target;
    let primary = delta_distribution(source, dataset, pair)?;
    let native = primary.bin_width();
    let widths: Vec<(u32, usize)> = DELTA_SCHEDULE
        .into_iter()
        .filter(|&(width, _)| width >= native && width % native == 0)
        .collect();
    if widths.is_empty() {
        debug!(bin_width = native, "no schedule width fits the queried pair");
    }

    let queried: BTreeMap<u32, DeltaDistribution> = widths
        .iter()
        .map(|&(width, n)| (width, primary.conform(width, n)))
        .collect();

    let similar_to_source = find_similar_age_distributions(
        source,
        dataset,
        pair.source,
        &params.similarity,
        &config.suppression,
    );
    let similar_to_target = find_similar_age_distributions(
        source,
        dataset,
        pair.target,
        &params.similarity,
        &config.suppression,
    );

    let source_anchored = collect_comparisons(
        source,
        dataset,
        &similar_to_target,
        |concept| ConceptPair::new(pair.source, concept),
        &widths,
    );
    let target_anchored = collect_comparisons(
        source,
        dataset,
        &similar_to_source,
        |concept| ConceptPair::new(concept, pair.target),
        &widths,
    );

    let mut envelope = |deltas: &[DeltaDistribution], width: u32| {
        if deltas.len() < params.min_comparisons {
            debug!(
                bin_width = width,
                comparisons = deltas.len(),
                "omitting bin width with too few comparisons"
            );
            return None;
        }
        let distribution = bootstrap_delta_distribution(deltas, params.mode, params.iterations, rng)?;
        let primary = normalized_intervals(&queried[&width], params.mode, config.confidence);
        let significance = distribution.significance(&primary);
        Some((distribution, significance))
    };

    let mut groups = |collected: BTreeMap<u32, Collected>| -> Vec<ComparisonGroup> {
        collected
            .into_iter()
            .filter_map(|(bin_width, c)| {
                let (distribution, significance) = envelope(&c.deltas, bin_width)?;
                Some(ComparisonGroup {
                    bin_width,
                    deltas: c.deltas,
                    similarities: c.similarities,
                    distribution,
                    significance,
                })
            })
            .collect()
    };
    let source_anchored_groups = groups(source_anchored.clone());
    let target_anchored_groups = groups(target_anchored.clone());

    let mut combined = vec![];
    for &(bin_width, _) in &widths {
        let pooled: Vec<DeltaDistribution> = [&source_anchored, &target_anchored]
            .into_iter()
            .filter_map(|collected| collected.get(&bin_width))
            .flat_map(|c| c.deltas.iter().cloned())
            .collect();
        if let Some((distribution, significance)) = envelope(&pooled, bin_width) {
            combined.push(CombinedComparison {
                bin_width,
                comparisons: pooled.len(),
                distribution,
                significance,
            });
        }
    }

    Some(SourceToTargetReport {
        queried_pair: queried
            .into_iter()
            .map(|(bin_width, delta)| BinnedDelta { bin_width, delta })
            .collect(),
        source_anchored: source_anchored_groups,
        target_anchored: target_anchored_groups,
        combined,
    })
}

/// Looks up the comparison pairs and groups them by schedule width.
///
/// A comparison enters the group at its own width, and every wider one,
/// conformed to that width's half-width.
fn collect_comparisons<S, F>(
    source: &S,
    dataset: DatasetId,
    similar: &SimilarAgeDistributions,
    make_pair: F,
    widths: &[(u32, usize)],
) -> BTreeMap<u32, Collected>
where
    S: CountSource + ?Sized,
    F: Fn(ConceptId) -> ConceptPair,
{
    let (pairs, similarities): (Vec<_>, Vec<_>) = similar
        .iter()
        .map(|(_, result)| (Some(make_pair(result.distribution.concept_id)), result.similarity))
        .unzip();
    let deltas = delta_distributions(source, dataset, &pairs);

    let mut collected: BTreeMap<u32, Collected> = BTreeMap::new();
    for (delta, similarity) in deltas.into_iter().zip(similarities) {
        let Some(delta) = delta else {
            continue;
        };
        for &(width, n) in widths {
            if width < delta.bin_width() || width % delta.bin_width() != 0 {
                continue;
            }
            let entry = collected.entry(width).or_default();
            entry.deltas.push(delta.conform(width, n));
            entry.similarities.push(similarity);
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bootstrap::BootstrapSeed, memory::InMemoryCounts};

    const DATASET: DatasetId = DatasetId(4);
    const SOURCE: ConceptId = ConceptId(1);
    const TARGET: ConceptId = ConceptId(100);

    fn counts_with_similar(similar: u64) -> InMemoryCounts {
        let mut counts = InMemoryCounts::new();
        counts.set_population(DATASET, 10_000);
        let age = vec![10, 30, 40, 20];
        counts.insert_concept(DATASET, SOURCE, "Source", 100);
        counts.insert_age_rows(DATASET, SOURCE, 1, age.clone());
        counts.insert_concept(DATASET, TARGET, "Target", 100);
        counts.insert_age_rows(DATASET, TARGET, 1, vec![40, 30, 20, 10]);

        let mut primary = vec![2; 27];
        primary[13] = 60;
        counts.insert_pair(DATASET, SOURCE, TARGET, 112);
        counts.insert_delta_rows(DATASET, SOURCE, TARGET, 1, 13, primary);

        // concepts similar to the source, paired with the target
        for i in 0..similar {
            let id = ConceptId(10 + i);
            counts.insert_concept(DATASET, id, &format!("S{i}"), 100);
            counts.insert_age_rows(DATASET, id, 1, age.clone());
            counts.insert_pair(DATASET, id, TARGET, 30);
            counts.insert_delta_rows(DATASET, id, TARGET, 1, 13, vec![1 + i; 27]);
        }
        counts
    }

    fn run(counts: &InMemoryCounts) -> Option<SourceToTargetReport> {
        let config = EngineConfig {
            source_to_target: SourceToTargetParams {
                iterations: 200,
                ..SourceToTargetParams::default()
            },
            ..EngineConfig::default()
        };
        let mut rng = BootstrapSeed::from(42).rng();
        compare_source_to_target(
            counts,
            DATASET,
            ConceptPair::new(SOURCE, TARGET),
            &config,
            &mut rng,
        )
    }

    #[test]
    fn test_missing_pair_is_none() {
        let counts = counts_with_similar(0);
        let mut rng = BootstrapSeed::from(1).rng();
        let report = compare_source_to_target(
            &counts,
            DATASET,
            ConceptPair::new(SOURCE, ConceptId(999)),
            &EngineConfig::default(),
            &mut rng,
        );
        assert!(report.is_none());
    }

    #[test]
    fn test_queried_pair_follows_schedule() {
        let report = run(&counts_with_similar(0)).unwrap();
        let shapes: Vec<_> = report
            .queried_pair
            .iter()
            .map(|b| (b.bin_width, b.delta.half_width()))
            .collect();
        assert_eq!(shapes, DELTA_SCHEDULE);
        for binned in &report.queried_pair {
            assert_eq!(binned.delta.bins().zero_bin(), 60);
        }
    }

    #[test]
    fn test_too_few_comparisons_are_omitted() {
        let report = run(&counts_with_similar(4)).unwrap();
        assert!(report.target_anchored.is_empty());
        assert!(report.source_anchored.is_empty());
        assert!(report.combined.is_empty());
    }

    #[test]
    fn test_comparison_groups() {
        let report = run(&counts_with_similar(6)).unwrap();
        assert!(report.source_anchored.is_empty());
        let widths: Vec<_> = report.target_anchored.iter().map(|g| g.bin_width).collect();
        assert_eq!(widths, [1, 2, 4, 8, 16]);
        for group in &report.target_anchored {
            assert_eq!(group.deltas.len(), 6);
            assert_eq!(group.similarities, vec![1.0; 6]);
            assert_eq!(group.distribution.bins(), group.significance.len());
            for delta in &group.deltas {
                assert_eq!(delta.target.concept_id, TARGET);
                assert_eq!(delta.bin_width(), group.bin_width);
            }
        }
        // same-day count of 60 stands far above the comparison pairs
        let narrow = &report.target_anchored[0];
        assert!(narrow.significance[13]);
        assert_eq!(report.combined.len(), 5);
        assert_eq!(report.combined[0].comparisons, 6);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let counts = counts_with_similar(6);
        assert_eq!(run(&counts), run(&counts));
    }
}

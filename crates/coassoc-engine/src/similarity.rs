//! Search for concepts whose age distribution resembles a given concept's.
//!
//! The concept of interest is coarsened to every width of
//! [`BIN_WIDTH_LADDER`] at or above its own. Each candidate is compared at
//! the wider of its own width and the concept of interest's, using Jaccard
//! similarity of the distributions normalized by concept count.

use std::collections::BTreeMap;

use coassoc_stats::similarity::jaccard;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ConceptId, DatasetId,
    association::PairCounts,
    source::{CountSource, SameDayRule, age_distribution, concepts_cooccur},
    suppression::{MAX_SUPPRESSED_FRACTION, SuppressionPolicy},
    temporal::AgeDistribution,
};

/// Age bin widths, in years, at which distributions are compared.
pub const BIN_WIDTH_LADDER: [u32; 6] = [1, 2, 4, 8, 16, 32];

/// Parameters of [`find_similar_age_distributions`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityParams {
    /// Minimum Jaccard similarity for a candidate to qualify.
    pub threshold: f64,
    /// Maximum number of results per bin width.
    pub limit: usize,
    /// Drop candidates that are associated with the concept of interest.
    pub exclude_related: bool,
    /// Candidates with a larger observed/expected ln ratio are related.
    pub ln_ratio_cutoff: f64,
    /// Same-day rule used once the ln ratio has not flagged a candidate.
    pub same_day: SameDayRule,
    /// Candidates with a larger estimated suppressed share are skipped.
    pub max_suppressed_fraction: f64,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            limit: 20,
            exclude_related: true,
            ln_ratio_cutoff: 2.0,
            same_day: SameDayRule::SIMILARITY,
            max_suppressed_fraction: MAX_SUPPRESSED_FRACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub distribution: AgeDistribution,
    pub similarity: f64,
}

/// Results of a similarity search, keyed by bin width.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarAgeDistributions {
    /// The concept of interest, coarsened to each compared width.
    pub concept_of_interest: BTreeMap<u32, AgeDistribution>,
    /// Qualifying candidates per width, most similar first.
    pub similar: BTreeMap<u32, Vec<SimilarityResult>>,
}

impl SimilarAgeDistributions {
    /// Whether the concept of interest had no usable age distribution.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concept_of_interest.is_empty()
    }

    /// All qualifying candidates as `(bin_width, result)`, narrowest width first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SimilarityResult)> + '_ {
        self.similar
            .iter()
            .flat_map(|(&width, results)| results.iter().map(move |r| (width, r)))
    }
}

/// Finds concepts with an age distribution similar to `concept`'s.
///
/// Returns an empty result when the concept has no age distribution.
pub fn find_similar_age_distributions<S>(
    source: &S,
    dataset: DatasetId,
    concept: ConceptId,
    params: &SimilarityParams,
    policy: &SuppressionPolicy,
) -> SimilarAgeDistributions
where
    S: CountSource + ?Sized,
{
    let Some(coi) = age_distribution(source, dataset, concept) else {
        debug!(%dataset, %concept, "no age distribution for concept of interest");
        return SimilarAgeDistributions::default();
    };

    let mut concept_of_interest = BTreeMap::new();
    let mut reference = BTreeMap::new();
    for width in BIN_WIDTH_LADDER {
        if width < coi.bin_width() || width % coi.bin_width() != 0 {
            continue;
        }
        let coarse = coi.rebin_with(width, None, policy);
        reference.insert(width, coarse.distribution(policy));
        concept_of_interest.insert(width, coarse);
    }

    let mut similar: BTreeMap<u32, Vec<SimilarityResult>> = BTreeMap::new();
    for candidate in source.age_concepts(dataset) {
        if candidate == concept {
            continue;
        }
        let Some(age) = age_distribution(source, dataset, candidate) else {
            continue;
        };
        if age.concept_count == 0 {
            continue;
        }
        if age.suppressed_fraction(policy) > params.max_suppressed_fraction {
            debug!(%candidate, "skipping candidate with too many suppressed bins");
            continue;
        }
        let age = if age.bin_width() < coi.bin_width() {
            if coi.bin_width() % age.bin_width() != 0 {
                debug!(%candidate, "skipping candidate with incompatible bin width");
                continue;
            }
            age.rebin_with(coi.bin_width(), None, policy)
        } else {
            age
        };
        let Some(target) = reference.get(&age.bin_width()) else {
            debug!(%candidate, bin_width = age.bin_width(), "no reference at candidate bin width");
            continue;
        };
        let distribution = age.distribution(policy);
        if distribution.len() != target.len() {
            debug!(%candidate, "skipping candidate with a different number of age bins");
            continue;
        }
        let similarity = jaccard(&distribution, target);
        if similarity >= params.threshold {
            similar.entry(age.bin_width()).or_default().push(SimilarityResult {
                distribution: age,
                similarity,
            });
        }
    }

    for results in similar.values_mut() {
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        if params.exclude_related {
            let mut unrelated = Vec::with_capacity(params.limit.min(results.len()));
            for result in results.drain(..) {
                if unrelated.len() >= params.limit {
                    break;
                }
                let partner = result.distribution.concept_id;
                if is_unrelated(source, dataset, &coi, partner, params, policy) {
                    unrelated.push(result);
                }
            }
            *results = unrelated;
        } else {
            results.truncate(params.limit);
        }
    }
    similar.retain(|_, results| !results.is_empty());

    SimilarAgeDistributions {
        concept_of_interest,
        similar,
    }
}

/// Whether `partner` shows no sign of being associated with the concept of
/// interest.
///
/// Partners without the counts needed for the ln ratio are not considered
/// unrelated.
fn is_unrelated<S>(
    source: &S,
    dataset: DatasetId,
    coi: &AgeDistribution,
    partner: ConceptId,
    params: &SimilarityParams,
    policy: &SuppressionPolicy,
) -> bool
where
    S: CountSource + ?Sized,
{
    let concept = coi.concept_id;
    let (Some(population), Some(partner_count), Some(pair)) = (
        source.population(dataset),
        source.concept_count(dataset, partner),
        source.pair_count(dataset, concept, partner),
    ) else {
        debug!(%concept, %partner, "no association data; dropping candidate");
        return false;
    };
    let counts = PairCounts {
        concept_1: coi.concept_count,
        concept_2: partner_count,
        pair,
        population,
    };
    if counts.ln_ratio() > params.ln_ratio_cutoff {
        return false;
    }
    !concepts_cooccur(
        source,
        dataset,
        concept,
        partner,
        Some(pair),
        &params.same_day,
        policy,
    )
}

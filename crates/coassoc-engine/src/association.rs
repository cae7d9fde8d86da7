//! Association statistics between two concepts.
//!
//! All measures are computed from four counts: the patients with each
//! concept, the patients with both, and the population size. Upstream
//! perturbation can make derived cells negative, so cells are carried as
//! `f64` rather than unsigned counts.

use std::cmp::Ordering;

use coassoc_stats::special::chi_squared_sf;
use serde::Serialize;
use tracing::debug;

use crate::{
    ConceptId, DatasetId,
    config::EngineConfig,
    interval::{ConfidenceInterval, clip, ln_ratio_ci, rel_freq_ci},
    source::CountSource,
};

/// The four counts every association measure is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairCounts {
    pub concept_1: u64,
    pub concept_2: u64,
    pub pair: u64,
    pub population: u64,
}

impl PairCounts {
    /// 2×2 contingency table of observed patients.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn contingency(&self) -> ContingencyTable {
        let (c1, c2, cp, n) = (
            self.concept_1 as f64,
            self.concept_2 as f64,
            self.pair as f64,
            self.population as f64,
        );
        ContingencyTable {
            neither: n - c1 - c2 + cp,
            only_1: c1 - cp,
            only_2: c2 - cp,
            both: cp,
        }
    }

    /// Contingency table expected if the two concepts were independent.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn expected_contingency(&self) -> ContingencyTable {
        let (c1, c2, n) = (
            self.concept_1 as f64,
            self.concept_2 as f64,
            self.population as f64,
        );
        ContingencyTable {
            neither: (n - c1) * (n - c2) / n,
            only_1: c1 * (n - c2) / n,
            only_2: c2 * (n - c1) / n,
            both: c1 * c2 / n,
        }
    }

    /// Natural log of observed over expected co-occurrence, unclipped.
    ///
    /// Zero when the pair occurs exactly as often as independence predicts.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn ln_ratio(&self) -> f64 {
        let (c1, c2, cp, n) = (
            self.concept_1 as f64,
            self.concept_2 as f64,
            self.pair as f64,
            self.population as f64,
        );
        (cp * n / (c1 * c2)).ln()
    }
}

/// Patient counts in the four cells of a 2×2 table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContingencyTable {
    pub neither: f64,
    pub only_1: f64,
    pub only_2: f64,
    pub both: f64,
}

impl ContingencyTable {
    #[must_use]
    pub fn cells(&self) -> [f64; 4] {
        [self.neither, self.only_1, self.only_2, self.both]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquare {
    pub observed: ContingencyTable,
    pub statistic: f64,
    pub p_value: f64,
    /// Bonferroni-adjusted p-value, equal to `p_value` when not adjusted.
    pub adjusted_p_value: f64,
}

/// One-degree-of-freedom chi-square test of independence.
///
/// When `tested_pairs` is given, the p-value is Bonferroni-adjusted as
/// `min(p · tested_pairs, 1)`.
///
/// ```
/// use coassoc_engine::association::{PairCounts, chi_square};
///
/// let counts = PairCounts { concept_1: 164, concept_2: 473, pair: 20, population: 4846 };
/// let result = chi_square(&counts, None);
/// assert!((result.p_value - 0.285).abs() < 1e-3);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn chi_square(counts: &PairCounts, tested_pairs: Option<u64>) -> ChiSquare {
    let observed = counts.contingency();
    let expected = counts.expected_contingency();
    let statistic = observed
        .cells()
        .iter()
        .zip(expected.cells())
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();
    let p_value = chi_squared_sf(statistic, 1.0);
    let adjusted_p_value = tested_pairs.map_or(p_value, |m| (p_value * m as f64).min(1.0));
    ChiSquare {
        observed,
        statistic,
        p_value,
        adjusted_p_value,
    }
}

/// Observed/expected co-occurrence.
///
/// `ln_ratio` is NaN, serialized as `null`, when a concept has no patients
/// and the ratio is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObsExpRatio {
    pub observed: u64,
    pub expected: f64,
    pub ln_ratio: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Natural log of observed over expected co-occurrence.
///
/// Non-finite results are clipped into `[-clip_limit, clip_limit]`.
///
/// ```
/// use coassoc_engine::association::{PairCounts, obs_exp_ratio};
///
/// let counts = PairCounts { concept_1: 100, concept_2: 100, pair: 0, population: 1000 };
/// let result = obs_exp_ratio(&counts, 0.99, 999.0);
/// assert_eq!(result.expected, 10.0);
/// assert_eq!(result.ln_ratio, -999.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn obs_exp_ratio(counts: &PairCounts, confidence: f64, clip_limit: f64) -> ObsExpRatio {
    let expected = counts.expected_contingency().both;
    let ln_ratio = counts.ln_ratio();
    let confidence_interval =
        ln_ratio_ci(counts.pair as f64, ln_ratio, confidence).clipped(clip_limit);
    ObsExpRatio {
        observed: counts.pair,
        expected,
        ln_ratio: clip(ln_ratio, clip_limit),
        confidence_interval,
    }
}

/// Relative frequency of a pair.
///
/// The estimate and both bounds are NaN, serialized as `null`,
/// when neither the pair nor the base concept was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeFrequency {
    pub pair: u64,
    pub base: u64,
    pub relative_frequency: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Share of the base concept's patients that also have the paired concept.
///
/// ```
/// use coassoc_engine::association::relative_frequency;
///
/// let result = relative_frequency(50, 5000, 0.99, 999.0);
/// assert_eq!(result.relative_frequency, 0.01);
/// assert!(result.confidence_interval.contains(0.01));
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn relative_frequency(
    pair: u64,
    base: u64,
    confidence: f64,
    clip_limit: f64,
) -> RelativeFrequency {
    let (cp, cb) = (pair as f64, base as f64);
    RelativeFrequency {
        pair,
        base,
        relative_frequency: clip(cp / cb, clip_limit),
        confidence_interval: rel_freq_ci(cp, cb, confidence).clipped(clip_limit),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogOdds {
    pub log_odds: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// Log odds ratio with a 95% Woolf interval.
///
/// When either off-diagonal cell is non-positive the ratio is undefined:
/// the result is zero if the pair was never observed, otherwise
/// `clip_limit` with a degenerate interval.
#[must_use]
pub fn log_odds(counts: &PairCounts, clip_limit: f64) -> LogOdds {
    let table = counts.contingency();
    let (a, b, c, d) = (table.both, table.only_1, table.only_2, table.neither);
    if b <= 0.0 || c <= 0.0 {
        let value = if a == 0.0 { 0.0 } else { clip_limit };
        return LogOdds {
            log_odds: value,
            confidence_interval: ConfidenceInterval::new(value, value),
        };
    }
    let log_odds = (a * d / (b * c)).ln();
    let half_width = 1.96 * (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    LogOdds {
        log_odds: clip(log_odds, clip_limit),
        confidence_interval: ConfidenceInterval::new(log_odds - half_width, log_odds + half_width)
            .clipped(clip_limit),
    }
}

/// Association measure used by [`query_associations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMethod {
    #[display("chi_square")]
    ChiSquare,
    #[display("obs_exp_ratio")]
    ObsExpRatio,
    #[display("relative_frequency")]
    RelativeFrequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AssociationMetric {
    ChiSquare(ChiSquare),
    ObsExpRatio(ObsExpRatio),
    RelativeFrequency(RelativeFrequency),
}

impl AssociationMetric {
    /// The value results are ranked by; larger means stronger.
    ///
    /// Chi-square strength is the test statistic; the others rank by their
    /// point estimate.
    #[must_use]
    pub fn strength(&self) -> f64 {
        match self {
            Self::ChiSquare(m) => m.statistic,
            Self::ObsExpRatio(m) => m.ln_ratio,
            Self::RelativeFrequency(m) => m.relative_frequency,
        }
    }
}

/// One association result between a concept and a partner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationRow {
    pub dataset_id: DatasetId,
    pub concept_id_1: ConceptId,
    pub concept_id_2: ConceptId,
    pub concept_2_name: String,
    #[serde(flatten)]
    pub metric: AssociationMetric,
}

/// Sorts rows by descending strength, keeping the input order on ties.
///
/// Rows whose strength is NaN sort last.
pub fn rank_by_strength(rows: &mut [AssociationRow]) {
    rows.sort_by(|a, b| compare_strength(b.metric.strength(), a.metric.strength()));
}

fn compare_strength(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.total_cmp(&b),
    }
}

/// Computes `method` between `concept` and one partner, or every concept it
/// co-occurs with, ranked by descending strength.
///
/// Partners without a concept count or pair count are skipped. A dataset
/// without a population yields no rows.
pub fn query_associations<S>(
    source: &S,
    dataset: DatasetId,
    method: AssociationMethod,
    concept: ConceptId,
    partner: Option<ConceptId>,
    config: &EngineConfig,
) -> Vec<AssociationRow>
where
    S: CountSource + ?Sized,
{
    let Some(population) = source.population(dataset) else {
        debug!(%dataset, "no population for dataset");
        return vec![];
    };
    let Some(concept_count) = source.concept_count(dataset, concept) else {
        debug!(%dataset, %concept, "no count for concept");
        return vec![];
    };
    let partners = partner.map_or_else(|| source.paired_concepts(dataset, concept), |p| vec![p]);
    let tested_pairs = if config.bonferroni {
        source.total_pairs(dataset)
    } else {
        None
    };

    let mut rows = Vec::with_capacity(partners.len());
    for partner in partners {
        let (Some(partner_count), Some(pair)) = (
            source.concept_count(dataset, partner),
            source.pair_count(dataset, concept, partner),
        ) else {
            debug!(%dataset, %concept, %partner, "skipping partner without counts");
            continue;
        };
        let counts = PairCounts {
            concept_1: concept_count,
            concept_2: partner_count,
            pair,
            population,
        };
        let metric = match method {
            AssociationMethod::ChiSquare => {
                let mut result = chi_square(&counts, tested_pairs);
                result.statistic = clip(result.statistic, config.clip_limit);
                AssociationMetric::ChiSquare(result)
            }
            AssociationMethod::ObsExpRatio => AssociationMetric::ObsExpRatio(obs_exp_ratio(
                &counts,
                config.confidence,
                config.clip_limit,
            )),
            AssociationMethod::RelativeFrequency => {
                AssociationMetric::RelativeFrequency(relative_frequency(
                    pair,
                    partner_count,
                    config.confidence,
                    config.clip_limit,
                ))
            }
        };
        rows.push(AssociationRow {
            dataset_id: dataset,
            concept_id_1: concept,
            concept_id_2: partner,
            concept_2_name: source.concept_name(partner).unwrap_or_default().to_owned(),
            metric,
        });
    }
    rank_by_strength(&mut rows);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCounts;

    const SCENARIO: PairCounts = PairCounts {
        concept_1: 164,
        concept_2: 473,
        pair: 20,
        population: 4846,
    };

    #[test]
    fn test_chi_square_scenario() {
        let result = chi_square(&SCENARIO, None);
        assert!((result.statistic - 1.142_19).abs() < 1e-4);
        assert!((result.p_value - 0.285_189).abs() < 1e-5);
        assert_eq!(result.adjusted_p_value, result.p_value);
        assert_eq!(result.observed.cells(), [4229.0, 144.0, 453.0, 20.0]);
    }

    #[test]
    fn test_chi_square_bonferroni() {
        let result = chi_square(&SCENARIO, Some(2));
        assert!((result.adjusted_p_value - 2.0 * result.p_value).abs() < 1e-12);
        let result = chi_square(&SCENARIO, Some(1_000));
        assert_eq!(result.adjusted_p_value, 1.0);
    }

    #[test]
    fn test_obs_exp_ratio() {
        let counts = PairCounts {
            concept_1: 100,
            concept_2: 200,
            pair: 50,
            population: 1000,
        };
        let result = obs_exp_ratio(&counts, 0.99, 999.0);
        assert_eq!(result.expected, 20.0);
        assert!((result.ln_ratio - 2.5_f64.ln()).abs() < 1e-12);
        assert!(result.confidence_interval.contains(result.ln_ratio));
    }

    #[test]
    fn test_undefined_ratios_serialize_as_null() {
        let counts = PairCounts {
            concept_1: 0,
            concept_2: 200,
            pair: 0,
            population: 1000,
        };
        let result = obs_exp_ratio(&counts, 0.99, 999.0);
        assert!(result.ln_ratio.is_nan());
        assert_eq!(result.confidence_interval, ConfidenceInterval::new(-999.0, -999.0));
        let json = serde_json::to_value(result).unwrap();
        assert!(json["ln_ratio"].is_null());
        assert_eq!(json["confidence_interval"]["lower"], -999.0);

        let result = relative_frequency(0, 0, 0.99, 999.0);
        assert!(result.relative_frequency.is_nan());
        let json = serde_json::to_value(result).unwrap();
        assert!(json["relative_frequency"].is_null());
        assert!(json["confidence_interval"]["lower"].is_null());
    }

    #[test]
    fn test_pair_counts_ln_ratio() {
        let independent = PairCounts {
            concept_1: 100,
            concept_2: 200,
            pair: 20,
            population: 1000,
        };
        assert_eq!(independent.ln_ratio(), 0.0);
        let never = PairCounts { pair: 0, ..independent };
        assert_eq!(never.ln_ratio(), f64::NEG_INFINITY);
        let ratio = obs_exp_ratio(&PairCounts { pair: 50, ..independent }, 0.99, 999.0);
        assert_eq!(ratio.ln_ratio, PairCounts { pair: 50, ..independent }.ln_ratio());
    }

    #[test]
    fn test_relative_frequency_of_unobserved_base_is_clipped() {
        let result = relative_frequency(3, 0, 0.99, 999.0);
        assert_eq!(result.relative_frequency, 999.0);
        assert_eq!(result.confidence_interval.upper, 999.0);
    }

    #[test]
    fn test_log_odds() {
        let result = log_odds(&SCENARIO, 999.0);
        let expected = (20.0 * 4229.0 / (144.0 * 453.0_f64)).ln();
        assert!((result.log_odds - expected).abs() < 1e-12);
        assert!(result.confidence_interval.contains(expected));
    }

    #[test]
    fn test_log_odds_degenerate_cells() {
        let never = PairCounts {
            concept_1: 0,
            concept_2: 10,
            pair: 0,
            population: 100,
        };
        assert_eq!(log_odds(&never, 999.0).log_odds, 0.0);

        let always = PairCounts {
            concept_1: 10,
            concept_2: 30,
            pair: 10,
            population: 100,
        };
        let result = log_odds(&always, 999.0);
        assert_eq!(result.log_odds, 999.0);
        assert_eq!(result.confidence_interval, ConfidenceInterval::new(999.0, 999.0));
    }

    fn sample_counts() -> (InMemoryCounts, DatasetId) {
        let dataset = DatasetId(1);
        let mut counts = InMemoryCounts::new();
        counts.set_population(dataset, 1000);
        counts.set_total_pairs(dataset, 10);
        counts.insert_concept(dataset, ConceptId(1), "Fever", 100);
        counts.insert_concept(dataset, ConceptId(2), "Cough", 200);
        counts.insert_concept(dataset, ConceptId(3), "Rash", 50);
        counts.insert_concept(dataset, ConceptId(4), "Headache", 400);
        counts.insert_pair(dataset, ConceptId(1), ConceptId(2), 60);
        counts.insert_pair(dataset, ConceptId(3), ConceptId(1), 40);
        counts.insert_pair(dataset, ConceptId(1), ConceptId(4), 40);
        (counts, dataset)
    }

    #[test]
    fn test_query_all_partners_ranked() {
        let (counts, dataset) = sample_counts();
        let config = EngineConfig::default();
        let rows = query_associations(
            &counts,
            dataset,
            AssociationMethod::ObsExpRatio,
            ConceptId(1),
            None,
            &config,
        );
        let partners: Vec<_> = rows.iter().map(|r| r.concept_id_2).collect();
        // ratios: rash 8.0, cough 3.0, headache 1.0
        assert_eq!(partners, [ConceptId(3), ConceptId(2), ConceptId(4)]);
        assert_eq!(rows[0].concept_2_name, "Rash");
    }

    #[test]
    fn test_query_single_partner() {
        let (counts, dataset) = sample_counts();
        let config = EngineConfig::default();
        let rows = query_associations(
            &counts,
            dataset,
            AssociationMethod::RelativeFrequency,
            ConceptId(2),
            Some(ConceptId(1)),
            &config,
        );
        assert_eq!(rows.len(), 1);
        let AssociationMetric::RelativeFrequency(rf) = rows[0].metric else {
            panic!("unexpected metric: {:?}", rows[0].metric);
        };
        assert_eq!(rf.relative_frequency, 0.6);
    }

    #[test]
    fn test_query_chi_square_bonferroni() {
        let (counts, dataset) = sample_counts();
        let config = EngineConfig {
            bonferroni: true,
            ..EngineConfig::default()
        };
        let rows = query_associations(
            &counts,
            dataset,
            AssociationMethod::ChiSquare,
            ConceptId(1),
            Some(ConceptId(4)),
            &config,
        );
        let AssociationMetric::ChiSquare(result) = rows[0].metric else {
            panic!("unexpected metric: {:?}", rows[0].metric);
        };
        assert!((result.adjusted_p_value - (result.p_value * 10.0).min(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_query_missing_data_is_empty() {
        let (counts, dataset) = sample_counts();
        let config = EngineConfig::default();
        let unknown = query_associations(
            &counts,
            dataset,
            AssociationMethod::ChiSquare,
            ConceptId(99),
            None,
            &config,
        );
        assert!(unknown.is_empty());
        let no_pair = query_associations(
            &counts,
            dataset,
            AssociationMethod::ChiSquare,
            ConceptId(2),
            Some(ConceptId(3)),
            &config,
        );
        assert!(no_pair.is_empty());
    }

    #[test]
    fn test_rank_is_stable_and_puts_nan_last() {
        let row = |id, value| AssociationRow {
            dataset_id: DatasetId(1),
            concept_id_1: ConceptId(0),
            concept_id_2: ConceptId(id),
            concept_2_name: String::new(),
            metric: AssociationMetric::RelativeFrequency(RelativeFrequency {
                pair: 0,
                base: 0,
                relative_frequency: value,
                confidence_interval: ConfidenceInterval::new(0.0, 0.0),
            }),
        };
        let mut rows = vec![row(1, 0.5), row(2, f64::NAN), row(3, 0.9), row(4, 0.5)];
        rank_by_strength(&mut rows);
        let order: Vec<_> = rows.iter().map(|r| r.concept_id_2.0).collect();
        assert_eq!(order, [3, 1, 4, 2]);
    }
}

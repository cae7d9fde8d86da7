//! Parametric bootstrap over a set of comparison delta distributions.
//!
//! Each iteration picks one comparison distribution uniformly at random,
//! redraws every bin from a Poisson distribution with that bin's count as
//! its rate, and normalizes the result. Percentiles are taken per bin once
//! all iterations are done, giving an envelope of what "typical" similar
//! pairs look like at each time offset.

use std::{fmt, str::FromStr};

use coassoc_stats::percentiles::Percentiles;
use rand::{
    Rng, SeedableRng as _,
    distr::{Distribution, StandardUniform},
};
use rand_distr::Poisson;
use rand_pcg::Pcg32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{interval::ConfidenceInterval, temporal::DeltaDistribution};

/// Percentile points of a [`PercentileEnvelope`], lowest first.
pub const ENVELOPE_PERCENTILES: [f64; 5] = [2.5, 25.0, 50.0, 75.0, 97.5];

/// How bootstrap samples and primary intervals are scaled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Raw counts.
    #[display("counts")]
    Counts,
    /// Divided by the source concept's count.
    #[default]
    #[display("relative_source")]
    RelativeSource,
    /// Divided by the target concept's count.
    #[display("relative_target")]
    RelativeTarget,
}

impl NormalizationMode {
    /// Value every bin of `delta` is divided by.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn denominator(self, delta: &DeltaDistribution) -> f64 {
        match self {
            Self::Counts => 1.0,
            Self::RelativeSource => delta.source.concept_count as f64,
            Self::RelativeTarget => delta.target.concept_count as f64,
        }
    }
}

/// Per-bin Poisson intervals of `delta`, normalized by `mode`.
#[must_use]
pub fn normalized_intervals(
    delta: &DeltaDistribution,
    mode: NormalizationMode,
    confidence: f64,
) -> Vec<ConfidenceInterval> {
    let factor = mode.denominator(delta).recip();
    delta
        .confidence_intervals(confidence)
        .into_iter()
        .map(|ci| ci.scale(factor))
        .collect()
}

/// Per-bin percentiles of bootstrap samples: one row per entry of
/// [`ENVELOPE_PERCENTILES`], one column per bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PercentileEnvelope {
    rows: Vec<Vec<f64>>,
}

impl PercentileEnvelope {
    #[must_use]
    pub fn bins(&self) -> usize {
        self.rows[0].len()
    }

    /// Row for `percentile`, if it is one of [`ENVELOPE_PERCENTILES`].
    #[must_use]
    pub fn row(&self, percentile: f64) -> Option<&[f64]> {
        ENVELOPE_PERCENTILES
            .iter()
            .position(|&p| (p - percentile).abs() < f64::EPSILON)
            .map(|i| self.rows[i].as_slice())
    }

    /// 2.5th percentile per bin.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.rows[0]
    }

    #[must_use]
    pub fn median(&self) -> &[f64] {
        &self.rows[2]
    }

    /// 97.5th percentile per bin.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.rows[ENVELOPE_PERCENTILES.len() - 1]
    }

    /// Marks the bins where `primary` lies entirely outside the envelope.
    ///
    /// # Panics
    ///
    /// Panics if `primary` does not have one interval per bin.
    ///
    /// # Examples
    ///
    /// ```
    /// use coassoc_engine::{
    ///     bootstrap::{NormalizationMode, bootstrap_delta_distribution},
    ///     interval::ConfidenceInterval,
    ///     ConceptId, DatasetId,
    ///     temporal::{ConceptSummary, DeltaBins, DeltaDistribution},
    /// };
    /// use rand::SeedableRng as _;
    ///
    /// let summary = |id| ConceptSummary {
    ///     concept_id: ConceptId(id),
    ///     concept_name: String::new(),
    ///     concept_count: 100,
    /// };
    /// let delta = DeltaDistribution::new(
    ///     DatasetId(4),
    ///     summary(1),
    ///     summary(2),
    ///     60,
    ///     DeltaBins::new(1, 1, vec![0, 50, 0])?,
    /// );
    /// let mut rng = rand_pcg::Pcg32::seed_from_u64(7);
    /// let envelope =
    ///     bootstrap_delta_distribution(&[delta], NormalizationMode::Counts, 200, &mut rng)
    ///         .unwrap();
    /// let primary = [
    ///     ConfidenceInterval::new(5.0, 9.0),
    ///     ConfidenceInterval::new(40.0, 60.0),
    ///     ConfidenceInterval::new(0.0, 0.0),
    /// ];
    /// assert_eq!(envelope.significance(&primary), [true, false, false]);
    /// # Ok::<(), coassoc_engine::temporal::DeltaShapeError>(())
    /// ```
    #[must_use]
    pub fn significance(&self, primary: &[ConfidenceInterval]) -> Vec<bool> {
        assert_eq!(
            primary.len(),
            self.bins(),
            "primary intervals must match the envelope bins"
        );
        primary
            .iter()
            .zip(self.lower().iter().zip(self.upper()))
            .map(|(ci, (&low, &high))| ci.lower > high || ci.upper < low)
            .collect()
    }
}

/// Bootstraps the per-bin distribution of `deltas`.
///
/// Returns `None` when there is nothing to sample from or no iterations
/// are requested.
///
/// # Panics
///
/// Panics if the distributions do not all have the same number of bins.
pub fn bootstrap_delta_distribution<R>(
    deltas: &[DeltaDistribution],
    mode: NormalizationMode,
    iterations: usize,
    rng: &mut R,
) -> Option<PercentileEnvelope>
where
    R: Rng + ?Sized,
{
    let bins = deltas.first()?.counts().len();
    if iterations == 0 {
        return None;
    }
    assert!(
        deltas.iter().all(|d| d.counts().len() == bins),
        "comparison distributions must have the same number of bins"
    );

    let mut samples = vec![Vec::with_capacity(iterations); bins];
    for _ in 0..iterations {
        let delta = &deltas[rng.random_range(0..deltas.len())];
        let denominator = mode.denominator(delta);
        for (column, &count) in samples.iter_mut().zip(delta.counts()) {
            column.push(draw_poisson(count, rng) / denominator);
        }
    }

    let mut rows = vec![Vec::with_capacity(bins); ENVELOPE_PERCENTILES.len()];
    for column in &samples {
        let percentiles = Percentiles::new(column, &ENVELOPE_PERCENTILES);
        for (row, (_, value)) in rows.iter_mut().zip(percentiles.iter()) {
            row.push(value);
        }
    }
    Some(PercentileEnvelope { rows })
}

#[expect(clippy::cast_precision_loss)]
fn draw_poisson<R>(rate: u64, rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    if rate == 0 {
        return 0.0;
    }
    let rate = rate as f64;
    // Rates beyond what the sampler supports are taken as exact
    Poisson::new(rate).map_or(rate, |poisson| poisson.sample(rng))
}

/// Seed for reproducible bootstrap runs.
///
/// A 128-bit seed for [`Pcg32`], written as 32 hex digits.
///
/// # Example
///
/// ```
/// use coassoc_engine::bootstrap::BootstrapSeed;
/// use rand::Rng as _;
///
/// let seed: BootstrapSeed = "000000000000000000000000000000ff".parse().unwrap();
/// assert_eq!(seed.to_string(), "000000000000000000000000000000ff");
///
/// let random: BootstrapSeed = rand::rng().random();
/// let mut a = random.rng();
/// let mut b = random.rng();
/// assert_eq!(a.random::<u64>(), b.random::<u64>());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSeed([u8; 16]);

impl BootstrapSeed {
    /// A generator seeded with this seed.
    #[must_use]
    pub fn rng(self) -> Pcg32 {
        Pcg32::from_seed(self.0)
    }
}

impl From<u128> for BootstrapSeed {
    fn from(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for BootstrapSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ParseSeedError {
    #[display("invalid hex: expected 32 characters, got {len}")]
    Length { len: usize },
    #[display("invalid hex: {text}")]
    Digits { text: String },
}

impl FromStr for BootstrapSeed {
    type Err = ParseSeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(ParseSeedError::Length { len: s.len() });
        }
        let num = u128::from_str_radix(s, 16).map_err(|_| ParseSeedError::Digits {
            text: s.to_owned(),
        })?;
        Ok(Self::from(num))
    }
}

impl Serialize for BootstrapSeed {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BootstrapSeed {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        hex_str.parse().map_err(serde::de::Error::custom)
    }
}

/// Allows generating random `BootstrapSeed` values with `rng.random()`.
impl Distribution<BootstrapSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BootstrapSeed {
        let mut seed = [0; 16];
        rng.fill(&mut seed);
        BootstrapSeed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ConceptId, DatasetId,
        temporal::{ConceptSummary, DeltaBins},
    };

    fn delta(source_count: u64, target_count: u64, counts: Vec<u64>) -> DeltaDistribution {
        let half_width = counts.len() / 2;
        let summary = |id, count| ConceptSummary {
            concept_id: ConceptId(id),
            concept_name: String::new(),
            concept_count: count,
        };
        DeltaDistribution::new(
            DatasetId(4),
            summary(1, source_count),
            summary(2, target_count),
            counts.iter().sum(),
            DeltaBins::new(1, half_width, counts).unwrap(),
        )
    }

    fn seed() -> BootstrapSeed {
        BootstrapSeed::from(0x0123_4567_89ab_cdef_0011_2233_4455_6677)
    }

    #[test]
    fn test_empty_input_is_none() {
        assert!(
            bootstrap_delta_distribution(&[], NormalizationMode::Counts, 100, &mut seed().rng())
                .is_none()
        );
        let deltas = [delta(10, 10, vec![1, 2, 3])];
        assert!(
            bootstrap_delta_distribution(&deltas, NormalizationMode::Counts, 0, &mut seed().rng())
                .is_none()
        );
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let deltas = [
            delta(100, 50, vec![3, 12, 40, 9, 2]),
            delta(80, 60, vec![5, 10, 25, 15, 4]),
        ];
        let a = bootstrap_delta_distribution(
            &deltas,
            NormalizationMode::RelativeSource,
            500,
            &mut seed().rng(),
        );
        let b = bootstrap_delta_distribution(
            &deltas,
            NormalizationMode::RelativeSource,
            500,
            &mut seed().rng(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_envelope_shape_and_order() {
        let deltas = [
            delta(100, 50, vec![3, 12, 40, 9, 2]),
            delta(80, 60, vec![5, 10, 25, 15, 4]),
        ];
        let envelope =
            bootstrap_delta_distribution(&deltas, NormalizationMode::Counts, 1000, &mut seed().rng())
                .unwrap();
        assert_eq!(envelope.bins(), 5);
        for percentile in ENVELOPE_PERCENTILES {
            assert_eq!(envelope.row(percentile).unwrap().len(), 5);
        }
        assert!(envelope.row(10.0).is_none());
        for bin in 0..5 {
            let column: Vec<f64> = ENVELOPE_PERCENTILES
                .iter()
                .map(|&p| envelope.row(p).unwrap()[bin])
                .collect();
            assert!(column.is_sorted(), "bin {bin}: {column:?}");
        }
        // zero-day bin rates are 25 and 40
        assert!(envelope.median()[2] > 15.0 && envelope.median()[2] < 50.0);
    }

    #[test]
    fn test_zero_counts_stay_zero() {
        let deltas = [delta(100, 100, vec![0, 20, 0])];
        let envelope =
            bootstrap_delta_distribution(&deltas, NormalizationMode::Counts, 200, &mut seed().rng())
                .unwrap();
        assert_eq!(envelope.lower()[0], 0.0);
        assert_eq!(envelope.upper()[2], 0.0);
    }

    #[test]
    fn test_normalization_modes() {
        let d = delta(200, 50, vec![10, 20, 30]);
        assert_eq!(NormalizationMode::Counts.denominator(&d), 1.0);
        assert_eq!(NormalizationMode::RelativeSource.denominator(&d), 200.0);
        assert_eq!(NormalizationMode::RelativeTarget.denominator(&d), 50.0);

        let raw = normalized_intervals(&d, NormalizationMode::Counts, 0.99);
        let scaled = normalized_intervals(&d, NormalizationMode::RelativeTarget, 0.99);
        for (r, s) in raw.iter().zip(&scaled) {
            assert_eq!(r.lower / 50.0, s.lower);
            assert_eq!(r.upper / 50.0, s.upper);
        }
    }

    #[test]
    fn test_relative_samples_are_scaled() {
        let deltas = [delta(1000, 10, vec![0, 500, 0])];
        let envelope = bootstrap_delta_distribution(
            &deltas,
            NormalizationMode::RelativeSource,
            300,
            &mut seed().rng(),
        )
        .unwrap();
        assert!(envelope.median()[1] > 0.4 && envelope.median()[1] < 0.6);
    }

    #[test]
    #[should_panic(expected = "same number of bins")]
    fn test_mismatched_bins_panic() {
        let deltas = [delta(10, 10, vec![1, 2, 3]), delta(10, 10, vec![1, 2, 3, 4, 5])];
        let _ = bootstrap_delta_distribution(&deltas, NormalizationMode::Counts, 10, &mut seed().rng());
    }

    #[test]
    fn test_seed_parsing() {
        let text = seed().to_string();
        assert_eq!(text, "0123456789abcdef0011223344556677");
        assert_eq!(text.parse::<BootstrapSeed>().unwrap(), seed());
        assert!(matches!(
            "abc".parse::<BootstrapSeed>(),
            Err(ParseSeedError::Length { len: 3 })
        ));
        assert!(matches!(
            "zz23456789abcdef0011223344556677".parse::<BootstrapSeed>(),
            Err(ParseSeedError::Digits { .. })
        ));
        let json = serde_json::to_string(&seed()).unwrap();
        assert_eq!(json, "\"0123456789abcdef0011223344556677\"");
        assert_eq!(serde_json::from_str::<BootstrapSeed>(&json).unwrap(), seed());
    }
}

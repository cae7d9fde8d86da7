use std::ops::Range;

use serde::Serialize;

use crate::{
    ConceptId, DatasetId,
    interval::{ConfidenceInterval, poisson_ci},
    suppression::SuppressionPolicy,
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AgeShapeError {
    #[display("age distribution bin width must be positive")]
    ZeroBinWidth,
    #[display("age distribution has no bins")]
    Empty,
}

/// Patients by age at first occurrence of a concept.
///
/// Bin `i` covers ages `[i · bin_width, (i + 1) · bin_width)` years. Counts
/// are kept as delivered, including suppression markers; operations that
/// do arithmetic on them work on an estimated copy.
///
/// # Examples
///
/// ```
/// use coassoc_engine::{ConceptId, DatasetId, temporal::AgeDistribution};
///
/// let age = AgeDistribution::new(
///     DatasetId(4),
///     ConceptId(10),
///     "Asthma".to_owned(),
///     70,
///     1,
///     vec![10, 1, 20, 30, 4],
/// )?;
/// let coarse = age.rebin(2);
/// assert_eq!(coarse.bin_width(), 2);
/// assert_eq!(coarse.counts(), &[15, 50, 4]);
/// # Ok::<(), coassoc_engine::temporal::AgeShapeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeDistribution {
    pub dataset_id: DatasetId,
    pub concept_id: ConceptId,
    pub concept_name: String,
    pub concept_count: u64,
    bin_width: u32,
    counts: Vec<u64>,
}

impl AgeDistribution {
    pub fn new(
        dataset_id: DatasetId,
        concept_id: ConceptId,
        concept_name: String,
        concept_count: u64,
        bin_width: u32,
        counts: Vec<u64>,
    ) -> Result<Self, AgeShapeError> {
        if bin_width == 0 {
            return Err(AgeShapeError::ZeroBinWidth);
        }
        if counts.is_empty() {
            return Err(AgeShapeError::Empty);
        }
        Ok(Self {
            dataset_id,
            concept_id,
            concept_name,
            concept_count,
            bin_width,
            counts,
        })
    }

    #[must_use]
    pub fn bin_width(&self) -> u32 {
        self.bin_width
    }

    #[must_use]
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Age range in years covered by bin `index`.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn bin_range(&self, index: usize) -> Range<u32> {
        let start = index as u32 * self.bin_width;
        start..start + self.bin_width
    }

    #[must_use]
    pub fn suppressed_fraction(&self, policy: &SuppressionPolicy) -> f64 {
        policy.suppressed_fraction(&self.counts, self.concept_count)
    }

    /// Estimated counts divided by the concept's total count.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn distribution(&self, policy: &SuppressionPolicy) -> Vec<f64> {
        let total = self.concept_count as f64;
        policy
            .estimate(&self.counts)
            .counts
            .into_iter()
            .map(|c| c as f64 / total)
            .collect()
    }

    /// Per-bin Poisson intervals of the delivered counts.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn confidence_intervals(&self, confidence: f64) -> Vec<ConfidenceInterval> {
        self.counts
            .iter()
            .map(|&c| poisson_ci(c as f64, confidence))
            .collect()
    }

    /// Coarsens to `new_width` with the default suppression policy.
    #[must_use]
    pub fn rebin(&self, new_width: u32) -> Self {
        self.rebin_with(new_width, None, &SuppressionPolicy::default())
    }

    /// Coarsens to `new_width`, optionally forcing the number of bins.
    ///
    /// Suppressed counts are estimated first. Every new bin but the last
    /// sums `new_width / bin_width` consecutive old bins; the last one
    /// absorbs everything that remains, so the estimated total is kept.
    /// Without `new_bins` the count is `ceil(bins / ratio)`.
    ///
    /// # Panics
    ///
    /// Panics if `new_width` is not a positive multiple of the current bin
    /// width, or if `new_bins` is zero.
    #[must_use]
    pub fn rebin_with(
        &self,
        new_width: u32,
        new_bins: Option<usize>,
        policy: &SuppressionPolicy,
    ) -> Self {
        assert!(
            new_width > 0 && new_width % self.bin_width == 0,
            "new bin width {new_width} must be a multiple of {}",
            self.bin_width
        );
        let ratio = (new_width / self.bin_width) as usize;
        let new_bins = new_bins.unwrap_or_else(|| self.counts.len().div_ceil(ratio));
        assert!(new_bins > 0, "rebinned distribution must have bins");

        let estimated = policy.estimate(&self.counts).counts;
        let group = |start: usize, end: usize| -> u64 {
            let len = estimated.len();
            estimated[start.min(len)..end.min(len)].iter().sum()
        };
        let mut counts: Vec<u64> = (0..new_bins - 1)
            .map(|i| group(i * ratio, (i + 1) * ratio))
            .collect();
        counts.push(group((new_bins - 1) * ratio, estimated.len()));

        Self {
            dataset_id: self.dataset_id,
            concept_id: self.concept_id,
            concept_name: self.concept_name.clone(),
            concept_count: self.concept_count,
            bin_width: new_width,
            counts,
        }
    }
}

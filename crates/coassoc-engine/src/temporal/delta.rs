use serde::Serialize;

use crate::{
    ConceptId, DatasetId,
    interval::{ConfidenceInterval, poisson_ci},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DeltaShapeError {
    #[display("delta distribution bin width must be positive")]
    ZeroBinWidth,
    #[display("delta distribution with half-width {half_width} needs {expected} bins, got {actual}")]
    BinCount {
        half_width: usize,
        expected: usize,
        actual: usize,
    },
}

/// Signed time-offset histogram with a zero bin at its center.
///
/// Holds `2n + 1` bins where `n` is the half-width: index `n + k` counts
/// target events `k` bin widths after the source event, negative `k`
/// counting target events that came first. The shape is checked on
/// construction, so the zero bin is always at index `n`.
///
/// # Examples
///
/// ```
/// use coassoc_engine::temporal::DeltaBins;
///
/// let bins = DeltaBins::new(1, 2, vec![1, 2, 30, 4, 5])?;
/// assert_eq!(bins.zero_bin(), 30);
/// assert_eq!(bins.get(-2), Some(1));
/// assert_eq!(bins.get(3), None);
/// # Ok::<(), coassoc_engine::temporal::DeltaShapeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaBins {
    bin_width: u32,
    #[serde(rename = "n")]
    half_width: usize,
    counts: Vec<u64>,
}

impl DeltaBins {
    pub fn new(bin_width: u32, half_width: usize, counts: Vec<u64>) -> Result<Self, DeltaShapeError> {
        if bin_width == 0 {
            return Err(DeltaShapeError::ZeroBinWidth);
        }
        let expected = 2 * half_width + 1;
        if counts.len() != expected {
            return Err(DeltaShapeError::BinCount {
                half_width,
                expected,
                actual: counts.len(),
            });
        }
        Ok(Self {
            bin_width,
            half_width,
            counts,
        })
    }

    #[must_use]
    pub fn bin_width(&self) -> u32 {
        self.bin_width
    }

    #[must_use]
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Same-bin count: both events within the same bin width.
    #[must_use]
    pub fn zero_bin(&self) -> u64 {
        self.counts[self.half_width]
    }

    /// Count at signed bin `offset` from the zero bin.
    #[must_use]
    pub fn get(&self, offset: isize) -> Option<u64> {
        let index = self.half_width.checked_add_signed(offset)?;
        self.counts.get(index).copied()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Bins in mirrored order, so that offset `k` becomes `-k`.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut counts = self.counts.clone();
        counts.reverse();
        Self { counts, ..*self }
    }

    /// Coarsens to `new_width`, optionally with an explicit half-width.
    ///
    /// With `ratio = new_width / bin_width` and new half-width `n'`
    /// (default `ceil(n / ratio)`):
    ///
    /// - the zero bin is carried over unchanged;
    /// - new positive bin `j` sums old offsets `j·ratio + 1 ..= (j+1)·ratio`,
    ///   and the negative side mirrors it;
    /// - when `ratio · n'` reaches past `n` the missing offsets count as zero;
    /// - when it falls short, the leftover offsets fold into the outermost
    ///   new bin on their side.
    ///
    /// # Panics
    ///
    /// Panics if `new_width` is not a positive multiple of the current bin
    /// width, or if a zero half-width is requested for a distribution that
    /// has non-zero offsets.
    ///
    /// # Examples
    ///
    /// ```
    /// use coassoc_engine::temporal::DeltaBins;
    ///
    /// let counts: Vec<u64> = (0..27).collect();
    /// let bins = DeltaBins::new(1, 13, counts)?;
    /// let coarse = bins.rebin(2, Some(6));
    /// assert_eq!(coarse.half_width(), 6);
    /// assert_eq!(coarse.zero_bin(), 13);
    /// assert_eq!(coarse.get(1), Some(14 + 15));
    /// assert_eq!(coarse.get(6), Some(24 + 25 + 26));
    /// # Ok::<(), coassoc_engine::temporal::DeltaShapeError>(())
    /// ```
    #[must_use]
    pub fn rebin(&self, new_width: u32, new_half_width: Option<usize>) -> Self {
        assert!(
            new_width > 0 && new_width % self.bin_width == 0,
            "new bin width {new_width} must be a multiple of {}",
            self.bin_width
        );
        let ratio = (new_width / self.bin_width) as usize;
        let n = self.half_width;
        let new_n = new_half_width.unwrap_or_else(|| n.div_ceil(ratio));
        assert!(
            new_n > 0 || n == 0,
            "half-width must be positive when the distribution has offsets"
        );
        if ratio == 1 && new_n == n {
            return self.clone();
        }

        let reach = ratio * new_n;
        // Index into the series after zero-padding it out to `reach` per side
        let pad = reach.saturating_sub(n);
        let center = n + pad;
        let padded = |i: usize| -> u64 {
            i.checked_sub(pad)
                .and_then(|i| self.counts.get(i))
                .copied()
                .unwrap_or(0)
        };

        let mut counts = vec![0; 2 * new_n + 1];
        counts[new_n] = self.zero_bin();
        for j in 0..new_n {
            counts[new_n + 1 + j] = (j * ratio + 1..=(j + 1) * ratio)
                .map(|k| padded(center + k))
                .sum();
            counts[j] = (0..ratio)
                .map(|r| padded(center - reach + j * ratio + r))
                .sum();
        }
        if reach < n {
            let after: u64 = self.counts[n + reach + 1..].iter().sum();
            let before: u64 = self.counts[..n - reach].iter().sum();
            counts[2 * new_n] += after;
            counts[0] += before;
        }

        Self {
            bin_width: new_width,
            half_width: new_n,
            counts,
        }
    }

    /// Per-bin Poisson intervals.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn confidence_intervals(&self, confidence: f64) -> Vec<ConfidenceInterval> {
        self.counts
            .iter()
            .map(|&c| poisson_ci(c as f64, confidence))
            .collect()
    }
}

/// Identity and total count of one side of a concept pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptSummary {
    pub concept_id: ConceptId,
    pub concept_name: String,
    pub concept_count: u64,
}

/// Days (in bins) from a source concept to a target concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaDistribution {
    pub dataset_id: DatasetId,
    pub source: ConceptSummary,
    pub target: ConceptSummary,
    pub concept_pair_count: u64,
    #[serde(flatten)]
    bins: DeltaBins,
}

impl DeltaDistribution {
    #[must_use]
    pub fn new(
        dataset_id: DatasetId,
        source: ConceptSummary,
        target: ConceptSummary,
        concept_pair_count: u64,
        bins: DeltaBins,
    ) -> Self {
        Self {
            dataset_id,
            source,
            target,
            concept_pair_count,
            bins,
        }
    }

    #[must_use]
    pub fn bins(&self) -> &DeltaBins {
        &self.bins
    }

    #[must_use]
    pub fn bin_width(&self) -> u32 {
        self.bins.bin_width
    }

    #[must_use]
    pub fn half_width(&self) -> usize {
        self.bins.half_width
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.bins.counts
    }

    /// See [`DeltaBins::rebin`].
    #[must_use]
    pub fn rebin(&self, new_width: u32, new_half_width: Option<usize>) -> Self {
        Self {
            bins: self.bins.rebin(new_width, new_half_width),
            ..self.clone()
        }
    }

    /// Rebins to exactly `(bin_width, half_width)`, cloning when already there.
    #[must_use]
    pub fn conform(&self, bin_width: u32, half_width: usize) -> Self {
        if self.bin_width() == bin_width && self.half_width() == half_width {
            self.clone()
        } else {
            self.rebin(bin_width, Some(half_width))
        }
    }

    /// The same distribution seen from the target concept.
    ///
    /// ```
    /// use coassoc_engine::{
    ///     ConceptId, DatasetId,
    ///     temporal::{ConceptSummary, DeltaBins, DeltaDistribution},
    /// };
    ///
    /// let summary = |id, count| ConceptSummary {
    ///     concept_id: ConceptId(id),
    ///     concept_name: String::new(),
    ///     concept_count: count,
    /// };
    /// let delta = DeltaDistribution::new(
    ///     DatasetId(4),
    ///     summary(1, 100),
    ///     summary(2, 80),
    ///     40,
    ///     DeltaBins::new(1, 1, vec![5, 20, 15])?,
    /// );
    /// let reversed = delta.reverse();
    /// assert_eq!(reversed.source.concept_id, ConceptId(2));
    /// assert_eq!(reversed.counts(), &[15, 20, 5]);
    /// assert_eq!(reversed.reverse(), delta);
    /// # Ok::<(), coassoc_engine::temporal::DeltaShapeError>(())
    /// ```
    #[must_use]
    pub fn reverse(&self) -> Self {
        Self {
            dataset_id: self.dataset_id,
            source: self.target.clone(),
            target: self.source.clone(),
            concept_pair_count: self.concept_pair_count,
            bins: self.bins.reversed(),
        }
    }

    #[must_use]
    pub fn confidence_intervals(&self, confidence: f64) -> Vec<ConfidenceInterval> {
        self.bins.confidence_intervals(confidence)
    }
}

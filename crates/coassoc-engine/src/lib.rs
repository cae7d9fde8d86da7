//! Co-occurrence association and temporal analytics over pre-aggregated
//! concept counts.
//!
//! The engine never sees individual records. Everything it computes is
//! derived from counts served by a [`CountSource`](source::CountSource):
//! per-concept totals, pair totals, age-at-first-occurrence histograms and
//! binned time-delta histograms between concept pairs. Counts of one are
//! treated as privacy-suppressed and estimated before use.
//!
//! # Modules
//!
//! - [`suppression`]: Estimation of privacy-suppressed counts
//! - [`interval`]: Poisson-based confidence intervals
//! - [`association`]: Chi-square, observed/expected ratio, relative frequency
//! - [`temporal`]: Age and time-delta distributions with rebinning
//! - [`source`]: The count-store abstraction and distribution lookups
//! - [`memory`]: An in-memory count store loadable from JSON
//! - [`similarity`]: Search for concepts with similar age distributions
//! - [`bootstrap`]: Parametric bootstrap over delta distributions
//! - [`source_target`]: The source-to-target temporal comparison
//! - [`config`]: Engine configuration and validation
//!
//! # Example
//!
//! ```
//! use coassoc_engine::{
//!     ConceptId, DatasetId,
//!     memory::InMemoryCounts,
//!     source::age_distribution,
//! };
//!
//! let dataset = DatasetId(4);
//! let mut counts = InMemoryCounts::new();
//! counts.insert_concept(dataset, ConceptId(10), "Asthma", 70);
//! counts.insert_age_rows(dataset, ConceptId(10), 1, vec![10, 1, 20, 30]);
//!
//! let age = age_distribution(&counts, dataset, ConceptId(10)).unwrap();
//! assert_eq!(age.rebin(2).counts(), &[15, 50]);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod association;
pub mod bootstrap;
pub mod config;
pub mod interval;
pub mod memory;
pub mod similarity;
pub mod source;
pub mod source_target;
pub mod suppression;
pub mod temporal;

/// Identifier of a clinical concept.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConceptId(pub u64);

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a count snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DatasetId(pub u32);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An ordered (source, target) concept pair.
///
/// Delta distributions describe "days from source to target", so the order
/// matters. Storage keeps each pair once with the smaller id first; see
/// [`ConceptPair::storage_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptPair {
    pub source: ConceptId,
    pub target: ConceptId,
}

impl ConceptPair {
    #[must_use]
    pub const fn new(source: ConceptId, target: ConceptId) -> Self {
        Self { source, target }
    }

    /// Returns the pair with the smaller id first, and whether that swapped it.
    ///
    /// ```
    /// use coassoc_engine::{ConceptId, ConceptPair};
    ///
    /// let pair = ConceptPair::new(ConceptId(9), ConceptId(3));
    /// assert_eq!(pair.storage_order(), (ConceptId(3), ConceptId(9), true));
    /// ```
    #[must_use]
    pub fn storage_order(self) -> (ConceptId, ConceptId, bool) {
        if self.source <= self.target {
            (self.source, self.target, false)
        } else {
            (self.target, self.source, true)
        }
    }
}

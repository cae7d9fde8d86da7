//! Binned temporal histograms.
//!
//! - [`AgeDistribution`]: counts of first occurrence by patient age
//! - [`DeltaDistribution`]: counts of target events at signed offsets from
//!   source events

pub use self::{age::*, delta::*};

mod age;
mod delta;

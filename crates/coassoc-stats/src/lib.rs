//! Numerical primitives for the coassoc engine.
//!
//! This crate provides the dependency-free math underneath the association
//! and temporal statistics:
//!
//! - **Special functions**: ln Γ, regularized incomplete gamma, Poisson CDF and
//!   quantiles, chi-square survival function
//! - **Percentiles**: Linear-interpolation percentiles for bootstrap envelopes
//! - **Similarity**: Jaccard similarity between normalized distributions
//!
//! # Modules
//!
//! - [`special`]: Special functions and discrete quantiles
//! - [`percentiles`]: Percentile computation and storage
//! - [`similarity`]: Distribution-shape similarity
//!
//! # Examples
//!
//! ## Poisson quantile interval
//!
//! ```
//! use coassoc_stats::special::poisson_quantile;
//!
//! let confidence: f64 = 0.95;
//! let lower = poisson_quantile((1.0 - confidence) / 2.0, 50.0);
//! let upper = poisson_quantile((1.0 + confidence) / 2.0, 50.0);
//! assert!(lower < 50.0 && 50.0 < upper);
//! ```
//!
//! ## Computing percentiles
//!
//! ```
//! use coassoc_stats::percentiles::Percentiles;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let percentiles = Percentiles::new(&values, &[25.0, 50.0, 75.0]);
//! assert_eq!(percentiles.get(50.0), Some(3.0));
//! ```
//!
//! ## Comparing distributions
//!
//! ```
//! use coassoc_stats::similarity::jaccard;
//!
//! let j = jaccard(&[0.1, 0.9], &[0.2, 0.8]);
//! assert!(j > 0.8);
//! ```

pub mod percentiles;
pub mod similarity;
pub mod special;

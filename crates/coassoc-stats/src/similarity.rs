//! Shape similarity between non-negative vectors.

/// Jaccard similarity `Σ min(a, b) / Σ max(a, b)` of two non-negative vectors.
///
/// The result is in `[0, 1]` and equals 1 for identical non-zero vectors.
/// When both vectors are all zero the ratio is undefined and `0.0` is
/// returned, so empty distributions never count as similar.
///
/// # Panics
///
/// Panics if the vectors have different lengths.
///
/// # Examples
///
/// ```
/// use coassoc_stats::similarity::jaccard;
///
/// assert_eq!(jaccard(&[0.2, 0.8], &[0.2, 0.8]), 1.0);
/// assert_eq!(jaccard(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(jaccard(&[0.5, 0.5], &[0.25, 0.75]), 0.75 / 1.25);
/// ```
#[must_use]
pub fn jaccard(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "distributions must have the same number of bins"
    );
    let (sum_min, sum_max) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(lo, hi), (&x, &y)| (lo + x.min(y), hi + x.max(y)));
    if sum_max > 0.0 { sum_min / sum_max } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let d = [0.1, 0.3, 0.0, 0.6];
        assert_eq!(jaccard(&d, &d), 1.0);
    }

    #[test]
    fn test_symmetric() {
        let a = [0.1, 0.4, 0.5];
        let b = [0.3, 0.3, 0.4];
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    }

    #[test]
    fn test_range() {
        let a = [0.0, 2.0, 5.0, 1.0];
        let b = [3.0, 0.5, 5.0, 0.0];
        let j = jaccard(&a, &b);
        assert!((0.0..=1.0).contains(&j));
        assert!((j - 5.5 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_zero() {
        assert_eq!(jaccard(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    #[should_panic(expected = "same number of bins")]
    fn test_length_mismatch() {
        let _ = jaccard(&[1.0], &[1.0, 2.0]);
    }
}

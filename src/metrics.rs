//! Membership-comparison metrics.
//!
//! Scores agreement between two community assignments over the same vertex
//! set — typically a recovered membership against a planted or reference
//! one. Both metrics are invariant to community relabeling.
//!
//! | Metric | Range | Best |
//! |--------|-------|------|
//! | [`nmi`] | [0, 1] | 1 |
//! | [`ari`] | [-1, 1] | 1 |
//!
//! # References
//!
//! - Strehl & Ghosh (2002). "Cluster ensembles." (NMI)
//! - Hubert & Arabie (1985). "Comparing partitions." (ARI)

use std::collections::HashMap;

/// Normalized Mutual Information between two memberships.
///
/// `2·I(U; V) / (H(U) + H(V))`, in `[0, 1]`; 1 means the memberships are
/// identical up to relabeling. Returns 1.0 when both sides carry no
/// information (e.g. both are a single community).
///
/// # Panics
///
/// Panics if the slices have different lengths.
pub fn nmi(a: &[usize], b: &[usize]) -> f64 {
    assert_eq!(a.len(), b.len(), "memberships must cover the same vertices");
    let n = a.len() as f64;
    if a.is_empty() {
        return 1.0;
    }

    let mut joint: HashMap<(usize, usize), f64> = HashMap::new();
    let mut count_a: HashMap<usize, f64> = HashMap::new();
    let mut count_b: HashMap<usize, f64> = HashMap::new();
    for (&ca, &cb) in a.iter().zip(b.iter()) {
        *joint.entry((ca, cb)).or_insert(0.0) += 1.0;
        *count_a.entry(ca).or_insert(0.0) += 1.0;
        *count_b.entry(cb).or_insert(0.0) += 1.0;
    }

    let mut mutual = 0.0;
    for (&(ca, cb), &nij) in &joint {
        let expected = count_a[&ca] * count_b[&cb] / n;
        mutual += (nij / n) * (nij / expected).ln();
    }

    let entropy = |counts: &HashMap<usize, f64>| -> f64 {
        counts.values().map(|&c| -(c / n) * (c / n).ln()).sum()
    };
    let ha = entropy(&count_a);
    let hb = entropy(&count_b);
    if ha + hb == 0.0 {
        return 1.0;
    }
    (2.0 * mutual / (ha + hb)).clamp(0.0, 1.0)
}

/// Adjusted Rand Index between two memberships.
///
/// Chance-corrected pair-counting agreement in `[-1, 1]`; 1 means identical
/// up to relabeling, 0 is the expected score of independent random
/// assignments.
///
/// # Panics
///
/// Panics if the slices have different lengths.
pub fn ari(a: &[usize], b: &[usize]) -> f64 {
    assert_eq!(a.len(), b.len(), "memberships must cover the same vertices");
    let n = a.len() as f64;
    if a.is_empty() {
        return 1.0;
    }

    let mut joint: HashMap<(usize, usize), f64> = HashMap::new();
    let mut count_a: HashMap<usize, f64> = HashMap::new();
    let mut count_b: HashMap<usize, f64> = HashMap::new();
    for (&ca, &cb) in a.iter().zip(b.iter()) {
        *joint.entry((ca, cb)).or_insert(0.0) += 1.0;
        *count_a.entry(ca).or_insert(0.0) += 1.0;
        *count_b.entry(cb).or_insert(0.0) += 1.0;
    }

    let comb2 = |x: f64| x * (x - 1.0) / 2.0;
    let sum_ij: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_a: f64 = count_a.values().map(|&c| comb2(c)).sum();
    let sum_b: f64 = count_b.values().map(|&c| comb2(c)).sum();
    let total = comb2(n);

    let expected = sum_a * sum_b / total;
    let max_index = (sum_a + sum_b) / 2.0;
    if (max_index - expected).abs() < f64::EPSILON {
        return 1.0;
    }
    (sum_ij - expected) / (max_index - expected)
}

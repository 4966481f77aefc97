//! Distinct value counting: `Cardinality` over a `KmvSketch`

use super::CombineFn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/* ===================== KmvSketch ===================== */

/// K-minimum-values sketch over pre-hashed values.
///
/// Keeps the `k` smallest distinct hashes. While fewer than `k` distinct hashes
/// have been seen the count is exact; afterwards the estimate is
/// `(k - 1) / r_k` where `r_k` is the largest kept hash scaled to `[0, 1)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmvSketch {
    k: usize,
    hashes: BTreeSet<u64>,
    saturated: bool,
}

impl KmvSketch {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(4),
            hashes: BTreeSet::new(),
            saturated: false,
        }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Distinct hashes currently held; bounded by `k`.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.hashes.len()
    }

    fn insert(&mut self, hash: u64) {
        if self.hashes.insert(hash) && self.hashes.len() > self.k {
            self.hashes.pop_last();
            self.saturated = true;
        }
    }

    /// Estimated number of distinct values.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn estimate(&self) -> u64 {
        if !self.saturated {
            return self.hashes.len() as u64;
        }
        let Some(&largest) = self.hashes.last() else {
            return 0;
        };
        let r_k = (largest as f64 + 1.0) / (u64::MAX as f64 + 1.0);
        (((self.k as f64) - 1.0) / r_k).round() as u64
    }
}

/* ===================== Cardinality ===================== */

/// Approximate distinct count of value hashes.
///
/// - Accumulator: [`KmvSketch`]
/// - Output: `u64`
#[derive(Clone, Copy, Debug)]
pub struct Cardinality {
    pub precision_threshold: usize,
}

impl Cardinality {
    #[must_use]
    pub const fn new(precision_threshold: usize) -> Self {
        Self {
            precision_threshold,
        }
    }
}

impl CombineFn<u64, KmvSketch, u64> for Cardinality {
    fn create(&self) -> KmvSketch {
        KmvSketch::new(self.precision_threshold)
    }

    fn add_input(&self, acc: &mut KmvSketch, v: u64) {
        acc.insert(v);
    }

    fn merge(&self, acc: &mut KmvSketch, other: KmvSketch) {
        if other.k < acc.k {
            acc.k = other.k;
            while acc.hashes.len() > acc.k {
                acc.hashes.pop_last();
                acc.saturated = true;
            }
        }
        acc.saturated |= other.saturated;
        for h in other.hashes {
            acc.insert(h);
        }
    }

    fn finish(&self, acc: KmvSketch) -> u64 {
        acc.estimate()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::hash::{DefaultHasher, Hash, Hasher};

    fn hash(i: u64) -> u64 {
        let mut h = DefaultHasher::new();
        i.hash(&mut h);
        h.finish()
    }

    #[test]
    fn exact_below_threshold() {
        let c = Cardinality::new(100);
        let mut acc = c.create();
        for i in 0..50 {
            c.add_input(&mut acc, hash(i % 20));
        }
        assert_eq!(c.finish(acc), 20);
    }

    #[test]
    fn estimate_is_close_above_threshold() {
        let c = Cardinality::new(1024);
        let mut acc = c.create();
        for i in 0..20_000 {
            c.add_input(&mut acc, hash(i));
        }
        assert_eq!(acc.retained(), 1024);
        let est = c.finish(acc) as f64;
        assert!((est - 20_000.0).abs() / 20_000.0 < 0.15, "estimate {est}");
    }

    #[test]
    fn merge_is_commutative() {
        let c = Cardinality::new(16);
        let mut a = c.create();
        let mut b = c.create();
        (0..40).for_each(|i| c.add_input(&mut a, hash(i)));
        (20..90).for_each(|i| c.add_input(&mut b, hash(i)));

        let mut ab = a.clone();
        c.merge(&mut ab, b.clone());
        let mut ba = b;
        c.merge(&mut ba, a);
        assert_eq!(ab, ba);
    }
}

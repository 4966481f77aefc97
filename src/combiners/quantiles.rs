//! Exact percentiles over a sorted sample.
//!
//! The sample keeps every finite value. Merging two samples yields the sorted
//! union, so the result is the same whichever side merges into which.

use super::CombineFn;
use serde::{Deserialize, Serialize};

/* ===================== SortedSample ===================== */

/// Finite values in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SortedSample {
    values: Vec<f64>,
}

impl SortedSample {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Restore ascending order after unsorted appends.
    pub fn seal(&mut self) {
        self.values.sort_by(f64::total_cmp);
    }

    /// Linear interpolation between the closest ranks; `percent` in `[0, 100]`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile(&self, percent: f64) -> Option<f64> {
        let n = self.values.len();
        if n == 0 {
            return None;
        }
        let rank = (percent.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let (a, b) = (self.values[lo], self.values[hi.min(n - 1)]);
        Some((b - a).mul_add(rank - lo as f64, a))
    }
}

/* ===================== Percentiles ===================== */

/// Percentiles of numeric values.
///
/// - Accumulator: [`SortedSample`] (sealed on merge and finish)
/// - Output: `(percent, value)` pairs in request order
#[derive(Clone, Debug)]
pub struct Percentiles {
    pub percents: Vec<f64>,
}

impl Percentiles {
    #[must_use]
    pub fn new(percents: Vec<f64>) -> Self {
        Self { percents }
    }
}

impl CombineFn<f64, SortedSample, Vec<(f64, Option<f64>)>> for Percentiles {
    fn create(&self) -> SortedSample {
        SortedSample::default()
    }

    fn add_input(&self, acc: &mut SortedSample, v: f64) {
        if v.is_finite() {
            acc.values.push(v);
        }
    }

    fn merge(&self, acc: &mut SortedSample, other: SortedSample) {
        acc.values.extend(other.values);
        acc.seal();
    }

    fn finish(&self, mut acc: SortedSample) -> Vec<(f64, Option<f64>)> {
        acc.seal();
        self.percents
            .iter()
            .map(|p| (*p, acc.percentile(*p)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(values: &[f64]) -> SortedSample {
        let p = Percentiles::new(vec![]);
        let mut acc = p.create();
        values.iter().for_each(|v| p.add_input(&mut acc, *v));
        acc.seal();
        acc
    }

    #[test]
    fn interpolates_between_ranks() {
        let s = sample(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.percentile(0.0), Some(1.0));
        assert_eq!(s.percentile(50.0), Some(2.5));
        assert_eq!(s.percentile(100.0), Some(4.0));
        assert_eq!(sample(&[]).percentile(50.0), None);
    }

    #[test]
    fn non_finite_values_are_skipped() {
        assert_eq!(sample(&[f64::NAN, 1.0, f64::INFINITY]).len(), 1);
    }

    #[test]
    fn merge_is_commutative() {
        let p = Percentiles::new(vec![50.0]);
        let (a, b) = (sample(&[5.0, 1.0]), sample(&[3.0, 9.0, 2.0]));

        let mut ab = a.clone();
        p.merge(&mut ab, b.clone());
        let mut ba = b;
        p.merge(&mut ba, a);
        assert_eq!(ab, ba);
        assert_eq!(p.finish(ab), vec![(50.0, Some(3.0))]);
    }
}

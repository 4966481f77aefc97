//! Basic combiners: ValueCount, Sum, Min, Max

use super::CombineFn;

/* ===================== ValueCount ===================== */

/// Number of values seen, of any type.
///
/// - Accumulator: `u64`
/// - Output: `u64`
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueCount;

impl<V> CombineFn<V, u64, u64> for ValueCount {
    fn create(&self) -> u64 {
        0
    }

    fn add_input(&self, acc: &mut u64, _v: V) {
        *acc += 1;
    }

    fn merge(&self, acc: &mut u64, other: u64) {
        *acc += other;
    }

    fn finish(&self, acc: u64) -> u64 {
        acc
    }
}

/* ===================== Sum ===================== */

/// Sum of numeric values. Empty input sums to `0.0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl CombineFn<f64, f64, f64> for Sum {
    fn create(&self) -> f64 {
        0.0
    }

    fn add_input(&self, acc: &mut f64, v: f64) {
        *acc += v;
    }

    fn merge(&self, acc: &mut f64, other: f64) {
        *acc += other;
    }

    fn finish(&self, acc: f64) -> f64 {
        acc
    }
}

/* ===================== Min ===================== */

/// Minimum numeric value.
///
/// - Accumulator: `Option<f64>`
/// - Output: `Option<f64>` (`None` for empty input)
#[derive(Clone, Copy, Debug, Default)]
pub struct Min;

impl CombineFn<f64, Option<f64>, Option<f64>> for Min {
    fn create(&self) -> Option<f64> {
        None
    }

    fn add_input(&self, acc: &mut Option<f64>, v: f64) {
        match acc {
            Some(cur) => {
                if v < *cur {
                    *cur = v;
                }
            }
            None => *acc = Some(v),
        }
    }

    fn merge(&self, acc: &mut Option<f64>, other: Option<f64>) {
        if let Some(b) = other {
            self.add_input(acc, b);
        }
    }

    fn finish(&self, acc: Option<f64>) -> Option<f64> {
        acc
    }
}

/* ===================== Max ===================== */

/// Maximum numeric value.
///
/// - Accumulator: `Option<f64>`
/// - Output: `Option<f64>` (`None` for empty input)
#[derive(Clone, Copy, Debug, Default)]
pub struct Max;

impl CombineFn<f64, Option<f64>, Option<f64>> for Max {
    fn create(&self) -> Option<f64> {
        None
    }

    fn add_input(&self, acc: &mut Option<f64>, v: f64) {
        match acc {
            Some(cur) => {
                if v > *cur {
                    *cur = v;
                }
            }
            None => *acc = Some(v),
        }
    }

    fn merge(&self, acc: &mut Option<f64>, other: Option<f64>) {
        if let Some(b) = other {
            self.add_input(acc, b);
        }
    }

    fn finish(&self, acc: Option<f64>) -> Option<f64> {
        acc
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fold<C, A, O>(c: &C, values: &[f64]) -> A
    where
        C: CombineFn<f64, A, O>,
    {
        let mut acc = c.create();
        for v in values {
            c.add_input(&mut acc, *v);
        }
        acc
    }

    #[test]
    fn min_max_of_empty_input_is_none() {
        assert_eq!(Min.finish(fold(&Min, &[])), None);
        assert_eq!(Max.finish(fold(&Max, &[])), None);
    }

    #[test]
    fn merge_is_order_independent() {
        let a = fold(&Min, &[5.0, 2.0]);
        let b = fold(&Min, &[8.0, 1.0]);
        let mut ab = a;
        Min.merge(&mut ab, b);
        let mut ba = b;
        Min.merge(&mut ba, a);
        assert_eq!(ab, ba);
        assert_eq!(ab, Some(1.0));

        let mut sum = fold(&Sum, &[1.0, 2.0]);
        Sum.merge(&mut sum, fold(&Sum, &[3.0]));
        assert_eq!(Sum.finish(sum), 6.0);
    }

    #[test]
    fn value_count_counts_any_input() {
        let mut acc = CombineFn::<&str, u64, u64>::create(&ValueCount);
        ValueCount.add_input(&mut acc, "a");
        ValueCount.add_input(&mut acc, "b");
        CombineFn::<&str, u64, u64>::merge(&ValueCount, &mut acc, 3);
        assert_eq!(CombineFn::<&str, u64, u64>::finish(&ValueCount, acc), 5);
    }
}

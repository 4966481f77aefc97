//! Statistical combiners: `Average`, `Stats`, `ExtendedStats`

use super::CombineFn;
use serde::{Deserialize, Serialize};

/* ===================== Average ===================== */

/// Running sum and count behind an average.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AvgAcc {
    pub sum: f64,
    pub count: u64,
}

impl AvgAcc {
    #[allow(clippy::cast_precision_loss)]
    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Average of numeric values.
///
/// - Accumulator: [`AvgAcc`]
/// - Output: `Option<f64>` (`None` for empty input)
#[derive(Clone, Copy, Debug, Default)]
pub struct Average;

impl CombineFn<f64, AvgAcc, Option<f64>> for Average {
    fn create(&self) -> AvgAcc {
        AvgAcc::default()
    }

    fn add_input(&self, acc: &mut AvgAcc, v: f64) {
        acc.sum += v;
        acc.count += 1;
    }

    fn merge(&self, acc: &mut AvgAcc, other: AvgAcc) {
        acc.sum += other.sum;
        acc.count += other.count;
    }

    fn finish(&self, acc: AvgAcc) -> Option<f64> {
        acc.mean()
    }
}

/* ===================== Stats ===================== */

/// Count, sum, min and max in one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsAcc {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Reported form of [`StatsAcc`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsValue {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: f64,
}

/// The composite `stats` statistic.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats;

impl CombineFn<f64, StatsAcc, StatsValue> for Stats {
    fn create(&self) -> StatsAcc {
        StatsAcc::default()
    }

    fn add_input(&self, acc: &mut StatsAcc, v: f64) {
        acc.count += 1;
        acc.sum += v;
        acc.min = Some(acc.min.map_or(v, |m| m.min(v)));
        acc.max = Some(acc.max.map_or(v, |m| m.max(v)));
    }

    fn merge(&self, acc: &mut StatsAcc, other: StatsAcc) {
        acc.count += other.count;
        acc.sum += other.sum;
        acc.min = match (acc.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        acc.max = match (acc.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    fn finish(&self, acc: StatsAcc) -> StatsValue {
        StatsValue {
            count: acc.count,
            min: acc.min,
            max: acc.max,
            avg: AvgAcc {
                sum: acc.sum,
                count: acc.count,
            }
            .mean(),
            sum: acc.sum,
        }
    }
}

/* ===================== ExtendedStats ===================== */

/// [`StatsAcc`] plus the sum of squares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedStatsAcc {
    pub stats: StatsAcc,
    pub sum_of_squares: f64,
}

/// Reported form of [`ExtendedStatsAcc`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtendedStatsValue {
    pub stats: StatsValue,
    pub sum_of_squares: f64,
    /// Population variance.
    pub variance: Option<f64>,
    pub std_deviation: Option<f64>,
    /// `avg + sigma * std_deviation`
    pub std_upper: Option<f64>,
    /// `avg - sigma * std_deviation`
    pub std_lower: Option<f64>,
}

/// `stats` plus variance, standard deviation and `sigma` bounds.
#[derive(Clone, Copy, Debug)]
pub struct ExtendedStats {
    pub sigma: f64,
}

impl ExtendedStats {
    #[must_use]
    pub const fn new(sigma: f64) -> Self {
        Self { sigma }
    }
}

impl CombineFn<f64, ExtendedStatsAcc, ExtendedStatsValue> for ExtendedStats {
    fn create(&self) -> ExtendedStatsAcc {
        ExtendedStatsAcc::default()
    }

    fn add_input(&self, acc: &mut ExtendedStatsAcc, v: f64) {
        Stats.add_input(&mut acc.stats, v);
        acc.sum_of_squares += v * v;
    }

    fn merge(&self, acc: &mut ExtendedStatsAcc, other: ExtendedStatsAcc) {
        Stats.merge(&mut acc.stats, other.stats);
        acc.sum_of_squares += other.sum_of_squares;
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, acc: ExtendedStatsAcc) -> ExtendedStatsValue {
        let stats = Stats.finish(acc.stats);
        let variance = stats.avg.map(|avg| {
            // Rounding can push a constant series slightly below zero.
            (acc.sum_of_squares / stats.count as f64 - avg * avg).max(0.0)
        });
        let std_deviation = variance.map(f64::sqrt);
        let bound = |sign: f64| match (stats.avg, std_deviation) {
            (Some(avg), Some(std)) => Some(avg + sign * self.sigma * std),
            _ => None,
        };
        ExtendedStatsValue {
            stats,
            sum_of_squares: acc.sum_of_squares,
            variance,
            std_deviation,
            std_upper: bound(1.0),
            std_lower: bound(-1.0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn average_of_nothing_is_none() {
        assert_eq!(Average.finish(Average.create()), None);
    }

    #[test]
    fn stats_merge_matches_single_pass() {
        let values = [4.0, -1.0, 9.5, 3.0];
        let mut whole = Stats.create();
        values.iter().for_each(|v| Stats.add_input(&mut whole, *v));

        let mut left = Stats.create();
        let mut right = Stats.create();
        values[..1].iter().for_each(|v| Stats.add_input(&mut left, *v));
        values[1..].iter().for_each(|v| Stats.add_input(&mut right, *v));
        Stats.merge(&mut right, left);

        assert_eq!(whole, right);
        let out = Stats.finish(whole);
        assert_eq!(out.min, Some(-1.0));
        assert_eq!(out.max, Some(9.5));
        assert_eq!(out.avg, Some(3.875));
    }

    #[test]
    fn extended_stats_bounds() {
        let es = ExtendedStats::new(2.0);
        let mut acc = es.create();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            es.add_input(&mut acc, v);
        }
        let out = es.finish(acc);
        assert_eq!(out.variance, Some(4.0));
        assert_eq!(out.std_deviation, Some(2.0));
        assert_eq!(out.std_upper, Some(9.0));
        assert_eq!(out.std_lower, Some(1.0));
    }
}

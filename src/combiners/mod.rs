//! Accumulators behind every statistic.
//!
//! A combiner describes how values fold into an accumulator and how two
//! accumulators merge. Computation units drive `create`/`add_input` over the
//! documents of one segment; shards and the coordinator drive `merge` over the
//! resulting partial states; `finish` turns the final state into the reported
//! value.
//!
//! - [`ValueCount`] -- number of values.
//! - [`Sum`], [`Min`], [`Max`], [`Average`] -- single-valued numeric statistics.
//! - [`Stats`] / [`ExtendedStats`] -- count, min, max, avg, sum (plus variance and
//!   sigma bounds).
//! - [`Percentiles`] -- exact percentiles over a sorted sample.
//! - [`Cardinality`] -- distinct count via a K-minimum-values sketch.
//!
//! Every `merge` is associative and commutative, so partial states may be folded
//! in any order or tree shape.
//!
//! # Examples
//! ```
//! use shardagg::combiners::{CombineFn, Stats};
//!
//! let stats = Stats;
//! let mut left = stats.create();
//! let mut right = stats.create();
//! for v in [1.0, 2.0] { stats.add_input(&mut left, v); }
//! for v in [10.0] { stats.add_input(&mut right, v); }
//! stats.merge(&mut left, right);
//!
//! let out = stats.finish(left);
//! assert_eq!(out.count, 3);
//! assert_eq!(out.max, Some(10.0));
//! ```

mod basic;
mod distinct;
mod quantiles;
mod statistical;

pub use basic::{Max, Min, Sum, ValueCount};
pub use distinct::{Cardinality, KmvSketch};
pub use quantiles::{Percentiles, SortedSample};
pub use statistical::{
    Average, AvgAcc, ExtendedStats, ExtendedStatsAcc, ExtendedStatsValue, Stats, StatsAcc,
    StatsValue,
};

/// Folds values of type `V` into an accumulator `A` and reports an `O`.
pub trait CombineFn<V, A, O>: Send + Sync + 'static {
    fn create(&self) -> A;
    fn add_input(&self, acc: &mut A, v: V);
    fn merge(&self, acc: &mut A, other: A);
    fn finish(&self, acc: A) -> O;
}

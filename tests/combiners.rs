#[macro_use]
mod macros;

use anyhow::Result;
use shardagg::combiners::*;
use shardagg::result::reduce_named;
use shardagg::{AggregationError, NamedResult, PartialResult};
use std::hash::{DefaultHasher, Hash, Hasher};

fn fold<A, O>(c: &impl CombineFn<f64, A, O>, values: &[f64]) -> A {
    let mut acc = c.create();
    values.iter().for_each(|v| c.add_input(&mut acc, *v));
    acc
}

fn hash(i: u64) -> u64 {
    let mut h = DefaultHasher::new();
    i.hash(&mut h);
    h.finish()
}

#[test]
fn sum_min_max_avg_basic() {
    let xs = [3.0, -2.0, 11.5, 7.5];
    assert_approx_eq!(Sum.finish(fold(&Sum, &xs)), 20.0);
    assert_eq!(Min.finish(fold(&Min, &xs)), Some(-2.0));
    assert_eq!(Max.finish(fold(&Max, &xs)), Some(11.5));
    assert_approx_eq!(Average.finish(fold(&Average, &xs)).unwrap_or(f64::NAN), 5.0);

    assert_eq!(Min.finish(Min.create()), None);
    assert_eq!(Average.finish(Average.create()), None);
}

#[test]
fn extended_stats_bounds_follow_sigma() {
    let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
    let out = ExtendedStats::new(2.0).finish(fold(&ExtendedStats::new(2.0), &xs));
    assert_eq!(out.stats.count, 8);
    assert_approx_eq!(out.variance.unwrap_or(f64::NAN), 4.0);
    assert_approx_eq!(out.std_deviation.unwrap_or(f64::NAN), 2.0);
    assert_approx_eq!(out.std_upper.unwrap_or(f64::NAN), 9.0);
    assert_approx_eq!(out.std_lower.unwrap_or(f64::NAN), 1.0);
}

#[test]
fn percentiles_interpolate_between_ranks() {
    let p = Percentiles::new(vec![0.0, 50.0, 100.0]);
    let xs: Vec<f64> = (1..=10).map(f64::from).rev().collect();
    let out = p.finish(fold(&p, &xs));
    assert_eq!(out[0], (0.0, Some(1.0)));
    assert_eq!(out[1], (50.0, Some(5.5)));
    assert_eq!(out[2], (100.0, Some(10.0)));
}

#[test]
fn split_merges_match_a_single_pass() {
    let xs: Vec<f64> = (0..500).map(|i| f64::from(i * 37 % 101) - 50.0).collect();
    let (left, right) = xs.split_at(173);

    let mut merged = fold(&Stats, left);
    Stats.merge(&mut merged, fold(&Stats, right));
    let whole = Stats.finish(fold(&Stats, &xs));
    let merged = Stats.finish(merged);
    assert_eq!(merged.count, whole.count);
    assert_eq!(merged.min, whole.min);
    assert_eq!(merged.max, whole.max);
    assert_approx_eq!(merged.sum, whole.sum, 1e-9);

    let p = Percentiles::new(vec![25.0, 50.0, 75.0]);
    let mut sample = fold(&p, right);
    p.merge(&mut sample, fold(&p, left));
    assert_eq!(p.finish(sample), p.finish(fold(&p, &xs)));
}

#[test]
fn cardinality_merges_overlapping_sets() {
    let c = Cardinality::new(1000);
    let mut a = c.create();
    let mut b = c.create();
    (0..300).for_each(|i| c.add_input(&mut a, hash(i)));
    (200..500).for_each(|i| c.add_input(&mut b, hash(i)));
    c.merge(&mut a, b);
    assert_eq!(c.finish(a), 500);
}

#[test]
fn partial_results_reduce_in_any_order() -> Result<()> {
    let parts = |offset: u64| -> Vec<NamedResult> {
        let p = Percentiles::new(Vec::new());
        let c = Cardinality::new(64);
        let mut sample = p.create();
        let mut sketch = c.create();
        for i in 0..10 {
            p.add_input(&mut sample, (offset * 10 + i) as f64);
            c.add_input(&mut sketch, hash(offset * 10 + i));
        }
        sample.seal();
        vec![
            NamedResult::new("max", PartialResult::Max(Some(offset as f64))),
            NamedResult::new(
                "pct",
                PartialResult::Percentiles {
                    percents: vec![50.0],
                    keyed: true,
                    sample,
                },
            ),
            NamedResult::new("hosts", PartialResult::Cardinality(sketch)),
        ]
    };

    let abc = reduce_named(reduce_named(parts(0), parts(1))?, parts(2))?;
    let cba = reduce_named(parts(2), reduce_named(parts(1), parts(0))?)?;
    assert_eq!(abc, cba);
    assert_eq!(abc[0].result.value(), Some(2.0));
    assert_eq!(abc[2].result.value(), Some(30.0));
    Ok(())
}

#[test]
fn mismatched_results_do_not_reduce() {
    let mut sum = PartialResult::Sum(1.0);
    let err = sum.reduce(PartialResult::ValueCount(3)).unwrap_err();
    assert_eq!(
        err,
        AggregationError::Reduce {
            left: "sum",
            right: "value_count"
        }
    );

    let err = reduce_named(
        vec![NamedResult::new("a", PartialResult::Sum(1.0))],
        vec![NamedResult::new("b", PartialResult::Sum(1.0))],
    )
    .unwrap_err();
    assert!(matches!(err, AggregationError::ResultShape { .. }));
}

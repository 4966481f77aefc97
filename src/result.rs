//! Shard-local partial results and how they reduce.
//!
//! A [`PartialResult`] holds a combiner accumulator rather than a finished
//! value, so results from any number of segments and shards can still be
//! merged. The reported value is only computed when rendering.

use crate::combiners::{
    Average, AvgAcc, Cardinality, CombineFn, ExtendedStats, ExtendedStatsAcc, KmvSketch, Max, Min,
    Percentiles, SortedSample, Stats, StatsAcc, StatsValue, Sum, ValueCount,
};
use crate::definition::AggregationDefinition;
use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::statistic::Statistic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Un-finished output of one aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PartialResult {
    ValueCount(u64),
    Sum(f64),
    Min(Option<f64>),
    Max(Option<f64>),
    Avg(AvgAcc),
    Stats(StatsAcc),
    ExtendedStats {
        sigma: f64,
        acc: ExtendedStatsAcc,
    },
    Percentiles {
        percents: Vec<f64>,
        keyed: bool,
        sample: SortedSample,
    },
    Cardinality(KmvSketch),
    Missing {
        doc_count: u64,
        sub_results: Vec<NamedResult>,
    },
}

/// A partial result under the name it is reported as.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedResult {
    pub name: String,
    pub result: PartialResult,
}

impl NamedResult {
    #[must_use]
    pub fn new(name: impl Into<String>, result: PartialResult) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }
}

fn number(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

impl PartialResult {
    /// Statistic tag this result belongs to.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValueCount(_) => "value_count",
            Self::Sum(_) => "sum",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::Avg(_) => "avg",
            Self::Stats(_) => "stats",
            Self::ExtendedStats { .. } => "extended_stats",
            Self::Percentiles { .. } => "percentiles",
            Self::Cardinality(_) => "cardinality",
            Self::Missing { .. } => "missing",
        }
    }

    /// Fold `other` into `self`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Reduce`] when the kinds differ, or
    /// [`AggregationError::ResultShape`] when nested results do not line up.
    pub fn reduce(&mut self, other: Self) -> Result<()> {
        match (self, other) {
            (Self::ValueCount(a), Self::ValueCount(b)) => {
                <ValueCount as CombineFn<u64, u64, u64>>::merge(&ValueCount, a, b);
            }
            (Self::Sum(a), Self::Sum(b)) => Sum.merge(a, b),
            (Self::Min(a), Self::Min(b)) => Min.merge(a, b),
            (Self::Max(a), Self::Max(b)) => Max.merge(a, b),
            (Self::Avg(a), Self::Avg(b)) => Average.merge(a, b),
            (Self::Stats(a), Self::Stats(b)) => Stats.merge(a, b),
            (Self::ExtendedStats { sigma, acc }, Self::ExtendedStats { acc: other, .. }) => {
                ExtendedStats::new(*sigma).merge(acc, other);
            }
            (Self::Percentiles { sample, .. }, Self::Percentiles { sample: other, .. }) => {
                Percentiles::new(Vec::new()).merge(sample, other);
            }
            (Self::Cardinality(a), Self::Cardinality(b)) => Cardinality::new(a.k()).merge(a, b),
            (
                Self::Missing {
                    doc_count,
                    sub_results,
                },
                Self::Missing {
                    doc_count: other_count,
                    sub_results: other_subs,
                },
            ) => {
                *doc_count += other_count;
                *sub_results = reduce_named(std::mem::take(sub_results), other_subs)?;
            }
            (left, right) => {
                return Err(AggregationError::Reduce {
                    left: left.kind(),
                    right: right.kind(),
                });
            }
        }
        Ok(())
    }

    /// Result of `def` over no documents at all.
    #[must_use]
    pub fn empty(def: &AggregationDefinition) -> Self {
        match def.statistic() {
            Statistic::ValueCount(_) => {
                Self::ValueCount(<ValueCount as CombineFn<u64, u64, u64>>::create(&ValueCount))
            }
            Statistic::Sum(_) => Self::Sum(Sum.create()),
            Statistic::Min(_) => Self::Min(Min.create()),
            Statistic::Max(_) => Self::Max(Max.create()),
            Statistic::Avg(_) => Self::Avg(Average.create()),
            Statistic::Stats(_) => Self::Stats(Stats.create()),
            Statistic::ExtendedStats(b) => Self::ExtendedStats {
                sigma: b.sigma(),
                acc: ExtendedStats::new(b.sigma()).create(),
            },
            Statistic::Percentiles(b) => Self::Percentiles {
                percents: b.percents(),
                keyed: b.is_keyed(),
                sample: SortedSample::default(),
            },
            Statistic::Cardinality(b) => {
                Self::Cardinality(Cardinality::new(b.effective_threshold()).create())
            }
            Statistic::Missing(_) => Self::Missing {
                doc_count: 0,
                sub_results: empty_results(def.sub_aggregations()),
            },
        }
    }

    /// Finished `stats` view, for the kinds that carry one.
    #[must_use]
    pub fn stats(&self) -> Option<StatsValue> {
        match self {
            Self::Stats(acc) => Some(Stats.finish(*acc)),
            Self::ExtendedStats { acc, .. } => Some(Stats.finish(acc.stats)),
            _ => None,
        }
    }

    /// Finished single value, for the kinds reporting one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::ValueCount(n) => Some(*n as f64),
            Self::Sum(s) => Some(Sum.finish(*s)),
            Self::Min(m) => Min.finish(*m),
            Self::Max(m) => Max.finish(*m),
            Self::Avg(acc) => Average.finish(*acc),
            Self::Cardinality(sketch) => Some(sketch.estimate() as f64),
            Self::Missing { doc_count, .. } => Some(*doc_count as f64),
            _ => None,
        }
    }

    fn render_body(&self, def: &AggregationDefinition, doc: &mut DocumentBuilder) -> Result<()> {
        match self {
            Self::ValueCount(n) => {
                doc.field("value", *n)?;
            }
            Self::Stats(acc) => render_stats(doc, &Stats.finish(*acc))?,
            Self::ExtendedStats { sigma, acc } => {
                let out = ExtendedStats::new(*sigma).finish(*acc);
                render_stats(doc, &out.stats)?;
                doc.field("sum_of_squares", out.sum_of_squares)?
                    .field("variance", number(out.variance))?
                    .field("std_deviation", number(out.std_deviation))?
                    .start_object_field("std_deviation_bounds")?
                    .field("upper", number(out.std_upper))?
                    .field("lower", number(out.std_lower))?
                    .end_object()?;
            }
            Self::Percentiles {
                percents,
                keyed,
                sample,
            } => {
                let values = Percentiles::new(percents.clone()).finish(sample.clone());
                // older shards cannot carry `keyed`; the request decides
                let keyed = match def.statistic() {
                    Statistic::Percentiles(p) => p.is_keyed(),
                    _ => *keyed,
                };
                if keyed {
                    doc.start_object_field("values")?;
                    for (percent, value) in values {
                        doc.field(format!("{percent:?}"), number(value))?;
                    }
                    doc.end_object()?;
                } else {
                    let list = values
                        .into_iter()
                        .map(|(key, value)| json!({"key": key, "value": number(value)}))
                        .collect::<Vec<_>>();
                    doc.field("values", list)?;
                }
            }
            Self::Cardinality(sketch) => {
                doc.field("value", Cardinality::new(sketch.k()).finish(sketch.clone()))?;
            }
            Self::Missing {
                doc_count,
                sub_results,
            } => {
                doc.field("doc_count", *doc_count)?;
                render_results(doc, def.sub_aggregations(), sub_results)?;
            }
            single => {
                doc.field("value", number(single.value()))?;
            }
        }
        Ok(())
    }
}

fn render_stats(doc: &mut DocumentBuilder, stats: &StatsValue) -> Result<()> {
    doc.field("count", stats.count)?
        .field("min", number(stats.min))?
        .field("max", number(stats.max))?
        .field("avg", number(stats.avg))?
        .field("sum", stats.sum)?;
    Ok(())
}

/// Pairwise reduce two result lists describing the same sibling aggregations.
///
/// # Errors
///
/// Returns [`AggregationError::ResultShape`] if the lists differ in length or
/// names, and propagates [`PartialResult::reduce`] errors.
pub fn reduce_named(mut left: Vec<NamedResult>, right: Vec<NamedResult>) -> Result<Vec<NamedResult>> {
    if left.len() != right.len() {
        return Err(AggregationError::ResultShape {
            reason: format!("[{}] results against [{}]", left.len(), right.len()),
        });
    }
    for (acc, other) in left.iter_mut().zip(right) {
        if acc.name != other.name {
            return Err(AggregationError::ResultShape {
                reason: format!("[{}] against [{}]", acc.name, other.name),
            });
        }
        acc.result.reduce(other.result)?;
    }
    Ok(left)
}

/// Empty results for sibling `definitions`, as reported when no shard contributed.
#[must_use]
pub fn empty_results(definitions: &[AggregationDefinition]) -> Vec<NamedResult> {
    definitions
        .iter()
        .map(|def| NamedResult::new(def.name(), PartialResult::empty(def)))
        .collect()
}

/// Render `results` under their names into an open object. `definitions` are
/// the sibling definitions the results were computed for, in the same order.
///
/// # Errors
///
/// Returns [`AggregationError::ResultShape`] if a result has no matching
/// definition, and propagates document errors.
pub fn render_results(
    doc: &mut DocumentBuilder,
    definitions: &[AggregationDefinition],
    results: &[NamedResult],
) -> Result<()> {
    if definitions.len() != results.len() {
        return Err(AggregationError::ResultShape {
            reason: format!(
                "[{}] definitions against [{}] results",
                definitions.len(),
                results.len()
            ),
        });
    }
    for (def, named) in definitions.iter().zip(results) {
        if def.name() != named.name {
            return Err(AggregationError::ResultShape {
                reason: format!("[{}] against [{}]", def.name(), named.name),
            });
        }
        doc.start_object_field(named.name.as_str())?;
        named.result.render_body(def, doc)?;
        if let Some(metadata) = def.metadata() {
            doc.field("meta", Value::Object(metadata.clone()))?;
        }
        doc.end_object()?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statistic::{PercentilesBuilder, StatsBuilder};
    use test_log::test;

    fn stats_of(values: &[f64]) -> PartialResult {
        let mut acc = Stats.create();
        values.iter().for_each(|v| Stats.add_input(&mut acc, *v));
        PartialResult::Stats(acc)
    }

    fn render(def: &AggregationDefinition, result: PartialResult) -> Value {
        let mut doc = DocumentBuilder::new();
        doc.start_object().unwrap();
        render_results(&mut doc, std::slice::from_ref(def), &[NamedResult::new(def.name(), result)])
            .unwrap();
        doc.end_object().unwrap();
        doc.finish().unwrap()
    }

    #[test]
    fn mismatched_kinds_do_not_reduce() {
        let mut left = PartialResult::Sum(1.0);
        let err = left.reduce(PartialResult::ValueCount(1)).unwrap_err();
        assert_eq!(
            err,
            AggregationError::Reduce {
                left: "sum",
                right: "value_count"
            }
        );
    }

    #[test]
    fn reduce_is_order_independent() {
        let parts = [stats_of(&[1.0, 7.0]), stats_of(&[]), stats_of(&[-2.0])];

        let mut forward = parts[0].clone();
        forward.reduce(parts[1].clone()).unwrap();
        forward.reduce(parts[2].clone()).unwrap();

        let mut backward = parts[2].clone();
        backward.reduce(parts[1].clone()).unwrap();
        backward.reduce(parts[0].clone()).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.stats().unwrap().min, Some(-2.0));
    }

    #[test]
    fn named_lists_must_line_up() {
        let left = vec![NamedResult::new("a", PartialResult::Sum(1.0))];
        let right = vec![NamedResult::new("b", PartialResult::Sum(1.0))];
        assert!(matches!(
            reduce_named(left, right),
            Err(AggregationError::ResultShape { .. })
        ));
    }

    #[test]
    fn empty_stats_render_nulls() {
        let def = AggregationDefinition::builder("latency_stats", StatsBuilder)
            .field("latency_ms")
            .finish()
            .unwrap();
        assert_eq!(
            render(&def, stats_of(&[])),
            json!({"latency_stats": {"count": 0, "min": null, "max": null, "avg": null, "sum": 0.0}})
        );
    }

    #[test]
    fn percentiles_render_keyed_or_listed() {
        let mut sample = SortedSample::default();
        let p = Percentiles::new(vec![]);
        for v in [1.0, 2.0, 3.0] {
            p.add_input(&mut sample, v);
        }
        let def = AggregationDefinition::builder("pct", PercentilesBuilder::new())
            .field("latency_ms")
            .finish()
            .unwrap();

        let keyed = PartialResult::Percentiles {
            percents: vec![50.0],
            keyed: true,
            sample: sample.clone(),
        };
        assert_eq!(render(&def, keyed), json!({"pct": {"values": {"50.0": 2.0}}}));

        let listed = AggregationDefinition::builder("pct", PercentilesBuilder::new().keyed(false))
            .field("latency_ms")
            .finish()
            .unwrap();
        let from_old_shard = PartialResult::Percentiles {
            percents: vec![50.0],
            keyed: true,
            sample,
        };
        assert_eq!(
            render(&listed, from_old_shard),
            json!({"pct": {"values": [{"key": 50.0, "value": 2.0}]}})
        );
    }
}

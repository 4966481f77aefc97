//! Pre-built datasets and definitions for common testing scenarios.

use crate::config::ShardConfig;
use crate::definition::{AggregationDefinition, DefinitionBuilder};
use crate::index::Document;
use crate::registry::StatisticRegistry;
use crate::shard::Shard;
use crate::statistic::{
    AvgBuilder, CardinalityBuilder, ExtendedStatsBuilder, MaxBuilder, MinBuilder, MissingBuilder,
    PercentilesBuilder, StatsBuilder, SumBuilder, ValueCountBuilder,
};
use crate::values::{FieldKind, FieldMapping, MissingValue};
use std::sync::Arc;

/// Mapping of the latency dataset: `latency_ms` and `size` are longs, `host`
/// is a keyword. Every other field is unmapped.
#[must_use]
pub fn latency_mapping() -> FieldMapping {
    FieldMapping::new()
        .with_field("latency_ms", FieldKind::Long)
        .with_field("size", FieldKind::Long)
        .with_field("host", FieldKind::Keyword)
}

/// Twenty request log documents.
///
/// Latencies are `10, 20, ..., 190` with every fifth document (`i % 5 == 4`)
/// lacking one; hosts cycle through `web-1`..`web-3`; sizes are `100 * i`.
///
/// # Example
///
/// ```
/// use shardagg::testing::latency_documents;
///
/// assert_eq!(latency_documents().len(), 20);
/// ```
#[must_use]
pub fn latency_documents() -> Vec<Document> {
    (0..20i64)
        .map(|i| {
            let doc = Document::new()
                .with("host", format!("web-{}", i % 3 + 1).as_str())
                .with("size", 100 * i);
            if i % 5 == 4 {
                doc
            } else {
                doc.with("latency_ms", 10 * i)
            }
        })
        .collect()
}

/// The latency dataset spread round-robin over `shards` shards, two segments each.
#[must_use]
pub fn latency_shards(shards: usize, config: &ShardConfig) -> Vec<Shard> {
    let shards = shards.max(1);
    let registry = Arc::new(StatisticRegistry::builtin());
    let mut buckets: Vec<Vec<Vec<Document>>> = vec![vec![Vec::new(), Vec::new()]; shards];
    for (i, doc) in latency_documents().into_iter().enumerate() {
        buckets[i % shards][(i / shards) % 2].push(doc);
    }
    buckets
        .into_iter()
        .enumerate()
        .map(|(id, segments)| {
            let mut shard = Shard::new(id, latency_mapping(), Arc::clone(&registry), config.clone());
            for docs in segments {
                shard.add_segment(docs);
            }
            shard
        })
        .collect()
}

/// One valid definition per builtin statistic, with non-default parameters
/// where the type has any.
///
/// # Panics
///
/// Never; every fixed definition here is valid.
#[must_use]
pub fn sample_definitions() -> Vec<AggregationDefinition> {
    let finish = |b: DefinitionBuilder| b.finish().expect("valid fixture definition");
    let sigma = ExtendedStatsBuilder::new().with_sigma(3.0).expect("valid sigma");
    let percents = PercentilesBuilder::new()
        .with_percents(&[50.0, 90.0, 99.0])
        .expect("valid percents")
        .keyed(false);

    vec![
        finish(AggregationDefinition::builder("requests", ValueCountBuilder).field("host")),
        finish(AggregationDefinition::builder("bytes", SumBuilder).field("size")),
        finish(AggregationDefinition::builder("fastest", MinBuilder).field("latency_ms")),
        finish(AggregationDefinition::builder("slowest", MaxBuilder).field("latency_ms")),
        finish(
            AggregationDefinition::builder("avg_latency", AvgBuilder)
                .field("latency_ms")
                .missing(MissingValue::number(0.0).expect("finite")),
        ),
        finish(AggregationDefinition::builder("latency_stats", StatsBuilder).field("latency_ms")),
        finish(AggregationDefinition::builder("latency_spread", sigma).field("latency_ms")),
        finish(AggregationDefinition::builder("latency_pct", percents).field("latency_ms")),
        finish(
            AggregationDefinition::builder(
                "hosts",
                CardinalityBuilder::new().with_precision_threshold(100),
            )
            .field("host"),
        ),
        finish(
            AggregationDefinition::builder("no_latency", MissingBuilder)
                .field("latency_ms")
                .sub_aggregation(finish(
                    AggregationDefinition::builder("bytes", SumBuilder).field("size"),
                )),
        ),
    ]
}

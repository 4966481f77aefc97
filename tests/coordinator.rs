#[macro_use]
mod macros;

use anyhow::Result;
use serde_json::{Value, json};
use shardagg::testing::{latency_shards, sample_definitions};
use shardagg::*;
use std::sync::Arc;

struct Unreachable(usize);

impl ShardClient for Unreachable {
    fn shard_id(&self) -> usize {
        self.0
    }

    fn execute(&self, _request: &[u8]) -> shardagg::Result<Vec<u8>> {
        Err(AggregationError::Deserialization {
            reason: "connection reset".into(),
        })
    }
}

fn clients(shards: Vec<Shard>) -> Vec<Arc<dyn ShardClient>> {
    shards
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn ShardClient>)
        .collect()
}

fn search(shards: usize, config: ShardConfig, defs: Vec<AggregationDefinition>) -> Result<Value> {
    let coordinator = Coordinator::new(
        clients(latency_shards(shards, &config)),
        CoordinatorConfig::default(),
    )?;
    coordinator.search(&AggregationTree::new(defs)?)?.to_json()
}

#[test]
fn every_statistic_over_three_shards() -> Result<()> {
    let json = search(3, ShardConfig::default(), sample_definitions())?;
    assert_eq!(json["_shards"], json!({"total": 3, "successful": 3, "failed": 0}));

    let aggs = &json["aggregations"];
    assert_eq!(aggs["requests"]["value"], 20);
    assert_eq!(aggs["bytes"]["value"], 19_000.0);
    assert_eq!(aggs["fastest"]["value"], 0.0);
    assert_eq!(aggs["slowest"]["value"], 180.0);
    assert_eq!(aggs["avg_latency"]["value"], 72.0);
    assert_eq!(
        aggs["latency_stats"],
        json!({"count": 16, "min": 0.0, "max": 180.0, "avg": 90.0, "sum": 1440.0})
    );
    assert_eq!(aggs["latency_spread"]["count"], 16);
    assert_eq!(aggs["latency_pct"]["values"][0], json!({"key": 50.0, "value": 90.0}));
    assert_eq!(aggs["hosts"]["value"], 3);
    assert_eq!(
        aggs["no_latency"],
        json!({"doc_count": 4, "bytes": {"value": 4600.0}})
    );
    Ok(())
}

#[test]
fn shard_count_does_not_change_results() -> Result<()> {
    let sequential = ShardConfig {
        parallel_segments: false,
        ..ShardConfig::default()
    };
    let one = search(1, sequential, sample_definitions())?;
    let five = search(5, ShardConfig::default(), sample_definitions())?;
    assert_eq!(one["aggregations"], five["aggregations"]);
    Ok(())
}

#[test]
fn extended_stats_report_bounds() -> Result<()> {
    let json = search(2, ShardConfig::default(), sample_definitions())?;
    let spread = &json["aggregations"]["latency_spread"];
    let std = spread["std_deviation"].as_f64().unwrap_or(f64::NAN);
    let upper = spread["std_deviation_bounds"]["upper"].as_f64().unwrap_or(f64::NAN);
    assert_approx_eq!(upper, 90.0 + 3.0 * std, 1e-9);
    Ok(())
}

#[test]
fn keyed_percentiles_render_as_object() -> Result<()> {
    let def = AggregationDefinition::builder(
        "latency_pct",
        PercentilesBuilder::new().with_percents(&[50.0, 100.0])?,
    )
    .field("latency_ms")
    .finish()?;
    let json = search(2, ShardConfig::default(), vec![def])?;
    assert_eq!(
        json["aggregations"]["latency_pct"]["values"],
        json!({"50.0": 90.0, "100.0": 180.0})
    );
    Ok(())
}

#[test]
fn equal_siblings_report_under_both_names() -> Result<()> {
    let defs = |name: &str| {
        AggregationDefinition::builder(name, StatsBuilder)
            .field("latency_ms")
            .finish()
    };
    let json = search(2, ShardConfig::default(), vec![defs("a")?, defs("b")?])?;
    assert_eq!(json["aggregations"]["a"], json["aggregations"]["b"]);
    assert_eq!(json["aggregations"]["a"]["count"], 16);
    Ok(())
}

#[test]
fn metadata_is_echoed() -> Result<()> {
    let mut meta = Metadata::new();
    meta.insert("panel".into(), json!("p99"));
    let def = AggregationDefinition::builder("slowest", MaxBuilder)
        .field("latency_ms")
        .meta(meta)
        .finish()?;
    let json = search(2, ShardConfig::default(), vec![def])?;
    assert_eq!(
        json["aggregations"]["slowest"],
        json!({"value": 180.0, "meta": {"panel": "p99"}})
    );
    Ok(())
}

#[test]
fn unmapped_fields_report_empty_values() -> Result<()> {
    let def = AggregationDefinition::builder("status_max", MaxBuilder)
        .field("status")
        .finish()?;
    let json = search(2, ShardConfig::default(), vec![def])?;
    assert_eq!(json["aggregations"]["status_max"]["value"], Value::Null);
    Ok(())
}

#[test]
fn zero_shards_render_every_statistic_empty() -> Result<()> {
    let coordinator = Coordinator::new(Vec::new(), CoordinatorConfig::default())?;
    let json = coordinator
        .search(&AggregationTree::new(sample_definitions())?)?
        .to_json()?;
    assert_eq!(json["_shards"], json!({"total": 0, "successful": 0, "failed": 0}));

    let aggs = &json["aggregations"];
    assert_eq!(aggs["requests"]["value"], 0);
    assert_eq!(aggs["bytes"]["value"], 0.0);
    assert_eq!(aggs["slowest"]["value"], Value::Null);
    assert_eq!(aggs["latency_stats"]["count"], 0);
    assert_eq!(aggs["latency_spread"]["count"], 0);
    assert_eq!(aggs["hosts"]["value"], 0);
    assert_eq!(aggs["no_latency"], json!({"doc_count": 0, "bytes": {"value": 0.0}}));
    Ok(())
}

#[test]
fn failed_shards_are_reported_beside_partial_results() -> Result<()> {
    let mut shards = clients(latency_shards(2, &ShardConfig::default()));
    shards.push(Arc::new(Unreachable(7)));

    let miscast = Shard::new(
        8,
        FieldMapping::new().with_field("latency_ms", FieldKind::Keyword),
        Arc::new(StatisticRegistry::builtin()),
        ShardConfig::default(),
    );
    shards.push(Arc::new(miscast));

    let coordinator = Coordinator::new(shards, CoordinatorConfig::default())?;
    let tree = AggregationTree::new(vec![
        AggregationDefinition::builder("slowest", MaxBuilder)
            .field("latency_ms")
            .finish()?,
    ])?;
    let response = coordinator.search(&tree)?;

    assert_eq!(response.total_shards(), 4);
    assert_eq!(response.successful_shards(), 2);
    let mut failed: Vec<_> = response.failures().iter().map(|f| f.shard_id).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![7, 8]);
    assert!(response.failures().iter().any(|f| matches!(
        f.error,
        AggregationError::Resolution { .. }
    )));
    assert_eq!(
        response.result("slowest").and_then(|r| r.result.value()),
        Some(180.0)
    );
    Ok(())
}

#[test]
fn fail_fast_aborts_on_any_failure() -> Result<()> {
    let mut shards = clients(latency_shards(2, &ShardConfig::default()));
    shards.push(Arc::new(Unreachable(3)));
    let coordinator = Coordinator::new(
        shards,
        CoordinatorConfig {
            failure_policy: FailurePolicy::FailFast,
            threads: Some(2),
            ..CoordinatorConfig::default()
        },
    )?;
    let err = coordinator
        .search(&AggregationTree::new(sample_definitions())?)
        .unwrap_err();
    assert!(err.to_string().contains("shard [3] failed"), "{err}");
    assert!(err.downcast_ref::<AggregationError>().is_some());
    Ok(())
}

#[test]
fn older_wire_version_is_spoken_on_request() -> Result<()> {
    let coordinator = Coordinator::new(
        clients(latency_shards(2, &ShardConfig::default())),
        CoordinatorConfig {
            wire_version: WireVersion::V1,
            ..CoordinatorConfig::default()
        },
    )?;
    let def = AggregationDefinition::builder(
        "latency_pct",
        PercentilesBuilder::new().with_percents(&[50.0])?.keyed(false),
    )
    .field("latency_ms")
    .finish()?;
    let json = coordinator.search(&AggregationTree::new(vec![def])?)?.to_json()?;
    // shards read V1 as keyed but the coordinator renders from its own tree
    assert_eq!(
        json["aggregations"]["latency_pct"]["values"],
        json!([{"key": 50.0, "value": 90.0}])
    );
    Ok(())
}

#[cfg(feature = "request-cache")]
#[test]
fn repeated_requests_hit_the_shard_cache() -> Result<()> {
    let shard = Arc::new(latency_shards(1, &ShardConfig::default()).remove(0));
    let coordinator = Coordinator::new(
        vec![Arc::clone(&shard) as Arc<dyn ShardClient>],
        CoordinatorConfig::default(),
    )?;
    let tree = AggregationTree::new(sample_definitions())?;

    let first = coordinator.search(&tree)?.to_json()?;
    assert_eq!(shard.cached_responses(), 1);
    let second = coordinator.search(&tree)?.to_json()?;
    assert_eq!(shard.cached_responses(), 1);
    assert_eq!(first, second);
    Ok(())
}

//! Fan a request out to every shard and reduce the answers.

use crate::config::{CoordinatorConfig, FailurePolicy};
use crate::document::DocumentBuilder;
use crate::error::AggregationError;
use crate::result::{NamedResult, empty_results, reduce_named, render_results};
use crate::shard::{ShardClient, ShardResponse};
use crate::tree::AggregationTree;
use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use rayon::prelude::*;
use serde_json::Value;
use std::sync::Arc;

/// A shard that did not contribute to the response.
#[derive(Clone, Debug, PartialEq)]
pub struct ShardFailure {
    pub shard_id: usize,
    pub error: AggregationError,
}

/// Reduced answer to one request.
#[derive(Clone, Debug)]
pub struct SearchResponse {
    tree: AggregationTree,
    total_shards: usize,
    failures: Vec<ShardFailure>,
    results: Vec<NamedResult>,
}

impl SearchResponse {
    #[must_use]
    pub fn results(&self) -> &[NamedResult] {
        &self.results
    }

    /// Result reported under `name`, at the top level.
    #[must_use]
    pub fn result(&self, name: &str) -> Option<&NamedResult> {
        self.results.iter().find(|r| r.name == name)
    }

    #[must_use]
    pub fn failures(&self) -> &[ShardFailure] {
        &self.failures
    }

    #[must_use]
    pub fn total_shards(&self) -> usize {
        self.total_shards
    }

    #[must_use]
    pub fn successful_shards(&self) -> usize {
        self.total_shards - self.failures.len()
    }

    /// `{"_shards": {...}, "aggregations": {...}}`
    ///
    /// # Errors
    ///
    /// Fails if the results do not match the request tree.
    pub fn to_json(&self) -> Result<Value> {
        let mut doc = DocumentBuilder::new();
        doc.start_object()?
            .start_object_field("_shards")?
            .field("total", self.total_shards)?
            .field("successful", self.successful_shards())?
            .field("failed", self.failures.len())?
            .end_object()?
            .start_object_field("aggregations")?;
        render_results(&mut doc, self.tree.aggregations(), &self.results)
            .context("failed to render aggregation results")?;
        doc.end_object()?.end_object()?;
        Ok(doc.finish()?)
    }
}

/// Sends requests to shards on its own thread pool.
pub struct Coordinator {
    shards: Vec<Arc<dyn ShardClient>>,
    config: CoordinatorConfig,
    pool: rayon::ThreadPool,
}

impl Coordinator {
    /// # Errors
    ///
    /// Fails if the thread pool cannot be built.
    pub fn new(shards: Vec<Arc<dyn ShardClient>>, config: CoordinatorConfig) -> Result<Self> {
        let threads = config.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("shardagg-coordinator-{i}"))
            .build()
            .context("failed to build coordinator thread pool")?;
        Ok(Self {
            shards,
            config,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `tree` on every shard and reduce what comes back.
    ///
    /// # Errors
    ///
    /// Fails if the tree cannot be encoded, if every shard failed, if any shard
    /// failed under [`FailurePolicy::FailFast`], or if shard results do not reduce.
    /// The underlying [`AggregationError`] stays downcastable.
    pub fn search(&self, tree: &AggregationTree) -> Result<SearchResponse> {
        let version = self.config.wire_version;
        let request = tree
            .to_bytes(version)
            .with_context(|| format!("failed to encode aggregation request at {version}"))?;
        debug!(
            "sending {} bytes to {} shards at {version}",
            request.len(),
            self.shards.len()
        );

        let outcomes: Vec<(usize, crate::Result<ShardResponse>)> = self.pool.install(|| {
            self.shards
                .par_iter()
                .map(|shard| {
                    let outcome = shard
                        .execute(&request)
                        .and_then(|bytes| ShardResponse::from_bytes(&bytes));
                    (shard.shard_id(), outcome)
                })
                .collect()
        });

        let mut responses = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (shard_id, outcome) in outcomes {
            match outcome {
                Ok(response) => responses.push(response.results),
                Err(error) => {
                    warn!("shard [{shard_id}] failed: {error}");
                    if self.config.failure_policy == FailurePolicy::FailFast {
                        return Err(anyhow!(error).context(format!("shard [{shard_id}] failed")));
                    }
                    failures.push(ShardFailure { shard_id, error });
                }
            }
        }
        if responses.is_empty() && !failures.is_empty() {
            let first = failures.swap_remove(0);
            bail!(
                "all {} shards failed, first failure on shard [{}]: {}",
                self.shards.len(),
                first.shard_id,
                first.error
            );
        }

        let results = self
            .pool
            .install(|| {
                responses
                    .into_par_iter()
                    .map(Ok)
                    .try_reduce_with(reduce_named)
            })
            .transpose()
            .context("failed to reduce shard results")?
            .unwrap_or_else(|| empty_results(tree.aggregations()));

        Ok(SearchResponse {
            tree: tree.clone(),
            total_shards: self.shards.len(),
            failures,
            results,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    struct Unreachable(usize);

    impl ShardClient for Unreachable {
        fn shard_id(&self) -> usize {
            self.0
        }

        fn execute(&self, _request: &[u8]) -> crate::Result<Vec<u8>> {
            Err(AggregationError::deserialization("connection reset"))
        }
    }

    #[test]
    fn all_shards_failing_is_fatal() {
        let coordinator = Coordinator::new(
            vec![Arc::new(Unreachable(0)), Arc::new(Unreachable(1))],
            CoordinatorConfig::default(),
        )
        .unwrap();
        let err = coordinator.search(&AggregationTree::default()).unwrap_err();
        assert!(err.to_string().contains("all 2 shards failed"));
    }

    #[test]
    fn no_shards_renders_empty_values() {
        use crate::definition::AggregationDefinition;
        use crate::statistic::{MissingBuilder, StatsBuilder, SumBuilder};
        use serde_json::json;

        let tree = AggregationTree::new(vec![
            AggregationDefinition::builder("latency_stats", StatsBuilder)
                .field("latency_ms")
                .finish()
                .unwrap(),
            AggregationDefinition::builder("no_latency", MissingBuilder)
                .field("latency_ms")
                .sub_aggregation(
                    AggregationDefinition::builder("bytes", SumBuilder)
                        .field("size")
                        .finish()
                        .unwrap(),
                )
                .finish()
                .unwrap(),
        ])
        .unwrap();
        let coordinator = Coordinator::new(Vec::new(), CoordinatorConfig::default()).unwrap();
        let response = coordinator.search(&tree).unwrap();
        assert_eq!(response.total_shards(), 0);
        assert_eq!(response.results().len(), 2);

        let json = response.to_json().unwrap();
        assert_eq!(
            json["aggregations"],
            json!({
                "latency_stats": {"count": 0, "min": null, "max": null, "avg": null, "sum": 0.0},
                "no_latency": {"doc_count": 0, "bytes": {"value": 0.0}}
            })
        );
    }
}

//! Configuration for shard execution and coordination.

use crate::stream::WireVersion;

/// Per-request limits applied while a shard executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Request circuit breaker limit in bytes.
    pub breaker_limit_bytes: u64,
    /// Estimated bytes reserved per computation unit before any value is collected.
    pub unit_overhead_bytes: u64,
    /// Estimated bytes reserved per retained value (percentile samples, sketch entries).
    pub bytes_per_value: u64,
    /// Compute structurally-equal leaf siblings once.
    pub deduplicate_siblings: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            breaker_limit_bytes: 64 * 1024 * 1024,
            unit_overhead_bytes: 256,
            bytes_per_value: 8,
            deduplicate_siblings: true,
        }
    }
}

/// How a [`Shard`](crate::shard::Shard) runs a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardConfig {
    pub context: ContextConfig,
    /// Process segments on the rayon pool instead of one after another.
    pub parallel_segments: bool,
    /// Maximum cached responses; `0` disables the request cache.
    pub request_cache_entries: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            parallel_segments: true,
            request_cache_entries: 64,
        }
    }
}

/// What the coordinator does when some shards fail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reduce what succeeded and report the failures alongside.
    #[default]
    AllowPartialResults,
    /// Abort the search on the first failed shard.
    FailFast,
}

/// Settings for a [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Fan-out pool size; `None` uses the number of logical CPUs.
    pub threads: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// Version requests are encoded at, for talking to older shards.
    pub wire_version: WireVersion,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            threads: None,
            failure_policy: FailurePolicy::default(),
            wire_version: WireVersion::CURRENT,
        }
    }
}

impl CoordinatorConfig {
    /// Threads the fan-out pool is built with.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

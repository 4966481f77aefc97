//! One shard: its segments, its mapping and the request entry point.
//!
//! A shard receives the encoded aggregation tree, decodes it with its own
//! registry, binds it, collects every segment with a fresh set of units and
//! reduces the segment results into one encoded [`ShardResponse`].

use crate::config::ShardConfig;
use crate::context::ExecutionContext;
use crate::error::{AggregationError, Result};
use crate::factory::AggregatorFactories;
use crate::index::{Document, Segment};
use crate::registry::StatisticRegistry;
use crate::result::{NamedResult, reduce_named};
use crate::tree::AggregationTree;
use crate::values::FieldMapping;
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "request-cache")]
use std::collections::{HashMap, VecDeque};
#[cfg(feature = "request-cache")]
use std::sync::{Mutex, PoisonError};

/// Anything the coordinator can send an encoded request to.
pub trait ShardClient: Send + Sync {
    fn shard_id(&self) -> usize;

    /// Run an encoded [`AggregationTree`] and return an encoded [`ShardResponse`].
    ///
    /// # Errors
    ///
    /// Any [`AggregationError`]; the coordinator treats it as this shard's failure.
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Reduced results of one shard, in request order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardResponse {
    pub shard_id: usize,
    pub results: Vec<NamedResult>,
}

impl ShardResponse {
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] if a result cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| {
            AggregationError::invalid_request(format!("shard response cannot be encoded ({e})"))
        })
    }

    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] on corrupt input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Encoded responses keyed by the fingerprint of the request that produced them.
#[cfg(feature = "request-cache")]
#[derive(Debug, Default)]
struct RequestCache {
    capacity: usize,
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
}

#[cfg(feature = "request-cache")]
impl RequestCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: String, response: Vec<u8>) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, response);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// An in-memory shard.
#[derive(Debug)]
pub struct Shard {
    id: usize,
    mapping: Arc<FieldMapping>,
    segments: Vec<Arc<Segment>>,
    registry: Arc<StatisticRegistry>,
    config: ShardConfig,
    #[cfg(feature = "request-cache")]
    cache: Mutex<RequestCache>,
}

impl Shard {
    #[must_use]
    pub fn new(
        id: usize,
        mapping: FieldMapping,
        registry: Arc<StatisticRegistry>,
        config: ShardConfig,
    ) -> Self {
        Self {
            id,
            mapping: Arc::new(mapping),
            segments: Vec::new(),
            registry,
            #[cfg(feature = "request-cache")]
            cache: Mutex::new(RequestCache::new(config.request_cache_entries)),
            config,
        }
    }

    /// Add an immutable segment. Cached responses are dropped.
    pub fn add_segment(&mut self, docs: Vec<Document>) {
        self.segments.push(Arc::new(Segment::new(docs)));
        #[cfg(feature = "request-cache")]
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    #[must_use]
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Responses currently cached.
    #[cfg(feature = "request-cache")]
    #[must_use]
    pub fn cached_responses(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Bind and run an already decoded tree.
    ///
    /// # Errors
    ///
    /// Returns resolution, binding or circuit breaker errors.
    pub fn execute_tree(&self, tree: &AggregationTree) -> Result<ShardResponse> {
        let ctx = ExecutionContext::new(
            self.id,
            Arc::clone(&self.mapping) as _,
            self.config.context.clone(),
        );
        let factories = AggregatorFactories::build(&ctx, tree.aggregations(), None)?;
        debug!(
            "shard [{}] runs {} aggregations as {} computations over {} segments",
            self.id,
            factories.len(),
            factories.computations(),
            self.segments.len()
        );

        let collect_segment = |segment: &Arc<Segment>| -> Result<Vec<NamedResult>> {
            let mut units = factories.create_units(segment)?;
            for doc in 0..segment.max_doc() {
                units.collect(doc);
            }
            trace!("shard [{}] collected {} docs", self.id, segment.max_doc());
            Ok(units.finish())
        };

        let empty;
        let segments = if self.segments.is_empty() {
            empty = [Arc::new(Segment::default())];
            &empty[..]
        } else {
            &self.segments[..]
        };
        let per_segment: Vec<Vec<NamedResult>> = if self.config.parallel_segments {
            segments.par_iter().map(collect_segment).collect::<Result<_>>()?
        } else {
            segments.iter().map(collect_segment).collect::<Result<_>>()?
        };

        let mut parts = per_segment.into_iter();
        let first = parts.next().unwrap_or_default();
        let results = parts.try_fold(first, reduce_named)?;
        Ok(ShardResponse {
            shard_id: self.id,
            results,
        })
    }

    fn run(&self, request: &[u8]) -> Result<Vec<u8>> {
        let tree = AggregationTree::from_bytes(&self.registry, request)?;
        self.execute_tree(&tree)?.to_bytes()
    }
}

impl ShardClient for Shard {
    fn shard_id(&self) -> usize {
        self.id
    }

    #[cfg(feature = "request-cache")]
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>> {
        let key = crate::tree::fingerprint(request);
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key);
        if let Some(response) = cached {
            debug!("shard [{}] answered request [{key}] from cache", self.id);
            return Ok(response);
        }
        let response = self.run(request)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, response.clone());
        Ok(response)
    }

    #[cfg(not(feature = "request-cache"))]
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>> {
        self.run(request)
    }
}

//! # shardagg
//!
//! Declarative **metric aggregations** for sharded search: a request names the
//! statistics to compute, the coordinating node ships them to every shard, each
//! shard binds them to its own fields and segments, and the partial results are
//! reduced back into one answer.
//!
//! ## Key Features
//!
//! - **Immutable definitions** - [`AggregationDefinition`] built once through a
//!   validating builder, never mutated afterwards
//! - **Versioned wire form** - definitions round-trip through [`stream`] byte for
//!   byte, dispatched by tag through a [`StatisticRegistry`]
//! - **Structural identity** - equal computations under different names hash and
//!   compare alike, so shards compute them once
//! - **Declarative rendering** - definitions and results render to JSON
//! - **Parallel execution** - segments and shards run on rayon, partial results
//!   reduce associatively in any order
//!
//! ## Quick Start
//!
//! ```
//! use shardagg::*;
//! use std::sync::Arc;
//! # fn main() -> anyhow::Result<()> {
//! let mapping = FieldMapping::new().with_field("latency_ms", FieldKind::Long);
//! let mut shard = Shard::new(0, mapping, Arc::new(StatisticRegistry::builtin()), ShardConfig::default());
//! shard.add_segment(vec![
//!     Document::new().with("latency_ms", 12i64),
//!     Document::new().with("latency_ms", 30i64),
//! ]);
//!
//! let tree = AggregationTree::new(vec![
//!     AggregationDefinition::builder("latency_stats", StatsBuilder)
//!         .field("latency_ms")
//!         .finish()?,
//! ])?;
//!
//! let coordinator = Coordinator::new(vec![Arc::new(shard)], CoordinatorConfig::default())?;
//! let response = coordinator.search(&tree)?;
//! let json = response.to_json()?;
//! assert_eq!(json["aggregations"]["latency_stats"]["max"], 30.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Statistics
//!
//! | Tag              | Fields  | Parameters                          |
//! |------------------|---------|-------------------------------------|
//! | `value_count`    | any     |                                     |
//! | `sum`, `min`, `max`, `avg`, `stats` | numeric |                    |
//! | `extended_stats` | numeric | `sigma`                             |
//! | `percentiles`    | numeric | `percents`, `keyed`                 |
//! | `cardinality`    | any     | `precision_threshold`               |
//! | `missing`        | any     | holds sub-aggregations              |
//!
//! ## Feature flags
//!
//! - `request-cache` (default): shards cache encoded responses keyed by the
//!   SHA-256 fingerprint of the request.

pub mod combiners;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod definition;
pub mod document;
pub mod error;
pub mod factory;
pub mod index;
pub mod registry;
pub mod result;
pub mod shard;
pub mod statistic;
pub mod stream;
pub mod testing;
pub mod tree;
pub mod units;
pub mod values;

// General re-exports
pub use combiners::CombineFn;
pub use config::{ContextConfig, CoordinatorConfig, FailurePolicy, ShardConfig};
pub use context::{CircuitBreaker, ExecutionContext, Reservation};
pub use coordinator::{Coordinator, SearchResponse, ShardFailure};
pub use definition::{AggregationDefinition, DefinitionBuilder, Metadata, StructuralKey};
pub use error::{AggregationError, Result};
pub use factory::{AggregatorFactories, AggregatorFactory};
pub use index::{DocId, Document, FieldValue, Segment};
pub use registry::StatisticRegistry;
pub use result::{NamedResult, PartialResult};
pub use shard::{Shard, ShardClient, ShardResponse};
pub use statistic::{
    AvgBuilder, CardinalityBuilder, ExtendedStatsBuilder, MaxBuilder, MinBuilder, MissingBuilder,
    PercentilesBuilder, Statistic, StatisticBuilder, StatisticType, StatsBuilder, SumBuilder,
    ValueCountBuilder,
};
pub use stream::{StreamInput, StreamOutput, WireVersion};
pub use tree::AggregationTree;
pub use values::{
    FieldKind, FieldMapping, MissingValue, ResolvedValuesSource, ValueType, ValuesSourceResolver,
    ValuesSourceSpec, ValuesSourceType,
};

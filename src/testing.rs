//! Testing utilities for aggregation definitions and their execution.
//!
//! Anyone adding a statistic type or wiring shards together can check the
//! contracts every definition must keep:
//!
//! - **Assertions**: wire round trips, render stability after a round trip,
//!   structural equality consistent with the structural hash
//! - **Fixtures**: a request-latency dataset with its mapping, split into shards,
//!   and one sample definition per builtin statistic
//!
//! # Quick Start
//!
//! ```
//! use shardagg::testing::*;
//! use shardagg::WireVersion;
//!
//! for def in sample_definitions() {
//!     let _copy = assert_round_trip(&def, WireVersion::CURRENT);
//!     assert_render_stable(&def);
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

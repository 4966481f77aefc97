//! Error-handling module for the crate.
//!
//! Every failure raised by the aggregation builder protocol is one of the
//! [`AggregationError`] variants below. The three request-facing categories map
//! to distinct handling at the coordinator:
//!
//! - [`AggregationError::InvalidRequest`] -- malformed user input, rejected before
//!   any shard work starts.
//! - [`AggregationError::Resolution`] -- a value-source/type mismatch found while
//!   binding a definition on a shard; reported as a partial shard failure.
//! - [`AggregationError::Deserialization`] -- unknown tag or corrupt wire state;
//!   fatal for that shard's participation only.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Error-Collection for all the possible Errors occurring in this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// The request was malformed: empty name, illegal parameter, bad nesting.
    #[error("invalid aggregation request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request
        reason: String,
    },
    /// The resolved value source cannot feed the statistic.
    #[error("failed to resolve values source for aggregation [{aggregation}]: {reason}")]
    Resolution {
        /// Name of the aggregation being bound
        aggregation: String,
        /// Description of the mismatch
        reason: String,
    },
    /// The wire form could not be turned back into a definition.
    #[error("failed to deserialize aggregation: {reason}")]
    Deserialization {
        /// Description of the corruption or unknown tag
        reason: String,
    },
    /// A memory reservation would exceed the request circuit breaker limit.
    #[error("[request] data too large, data for [{label}] would be [{wanted}] bytes, which is larger than the limit of [{limit}] bytes")]
    CircuitBreaking {
        /// Label of the reservation that tripped the breaker
        label: String,
        /// Bytes in use after the rejected reservation
        wanted: u64,
        /// Configured limit in bytes
        limit: u64,
    },
    /// Two partial results of different kinds were merged.
    #[error("cannot reduce [{left}] with [{right}]")]
    Reduce {
        /// Kind of the accumulating result
        left: &'static str,
        /// Kind of the incoming result
        right: &'static str,
    },
    /// Partial results from different shards do not describe the same aggregations.
    #[error("partial results do not line up: {reason}")]
    ResultShape {
        /// Which names or counts differed
        reason: String,
    },
    /// A statistic tag was registered twice.
    #[error("statistic type [{tag}] is already registered")]
    Registration {
        /// The duplicated tag
        tag: &'static str,
    },
    /// The declarative document writer was used out of balance.
    #[error("malformed document: {0}")]
    Document(String),
}

impl AggregationError {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution(aggregation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            aggregation: aggregation.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn deserialization(reason: impl Into<String>) -> Self {
        Self::Deserialization {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that reject the request as a whole, before shards run.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }
}

impl From<postcard::Error> for AggregationError {
    fn from(error: postcard::Error) -> Self {
        Self::deserialization(format!("corrupt wire state ({error})"))
    }
}

//! Per-shard execution context handed to [`AggregationDefinition::build`](crate::AggregationDefinition::build).

use crate::config::ContextConfig;
use crate::error::{AggregationError, Result};
use crate::values::ValuesSourceResolver;
use log::trace;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the memory a request's computation units reserve.
#[derive(Debug)]
pub struct CircuitBreaker {
    limit: u64,
    used: AtomicU64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Reserve `bytes` for `label`, released when the returned guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::CircuitBreaking`] if the reservation would
    /// exceed the limit; nothing is reserved in that case.
    pub fn reserve(self: &Arc<Self>, label: &str, bytes: u64) -> Result<Reservation> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let wanted = current.saturating_add(bytes);
            if wanted > self.limit {
                return Err(AggregationError::CircuitBreaking {
                    label: label.to_string(),
                    wanted,
                    limit: self.limit,
                });
            }
            match self.used.compare_exchange_weak(
                current,
                wanted,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        trace!("reserved {bytes} bytes for [{label}]");
        Ok(Reservation {
            breaker: Arc::clone(self),
            bytes,
        })
    }

    fn release(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Memory held against a [`CircuitBreaker`]; released on drop.
#[derive(Debug)]
pub struct Reservation {
    breaker: Arc<CircuitBreaker>,
    bytes: u64,
}

impl Reservation {
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.breaker.release(self.bytes);
    }
}

/// Resources of one shard for one request.
#[derive(Clone)]
pub struct ExecutionContext {
    shard_id: usize,
    resolver: Arc<dyn ValuesSourceResolver>,
    breaker: Arc<CircuitBreaker>,
    config: ContextConfig,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(
        shard_id: usize,
        resolver: Arc<dyn ValuesSourceResolver>,
        config: ContextConfig,
    ) -> Self {
        Self {
            shard_id,
            resolver,
            breaker: Arc::new(CircuitBreaker::new(config.breaker_limit_bytes)),
            config,
        }
    }

    #[must_use]
    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    #[must_use]
    pub fn resolver(&self) -> &dyn ValuesSourceResolver {
        self.resolver.as_ref()
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Debug for ExecutionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("shard_id", &self.shard_id)
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

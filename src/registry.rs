//! Tag-keyed registry used to decode statistics from the wire.
//!
//! Each tag maps to the `read_state` of the builder registered for it. A
//! process normally uses [`StatisticRegistry::builtin`]; restricted registries
//! model peers that predate some statistic.

use crate::error::{AggregationError, Result};
use crate::statistic::{
    AvgBuilder, CardinalityBuilder, ExtendedStatsBuilder, MaxBuilder, MinBuilder, MissingBuilder,
    PercentilesBuilder, StateHeader, Statistic, StatisticBuilder, StatisticType, StatsBuilder,
    SumBuilder, ValueCountBuilder, read_as,
};
use crate::stream::StreamInput;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

type ReadStateFn = fn(&StateHeader<'_>, &mut StreamInput<'_>) -> Result<Statistic>;

#[derive(Clone, Copy)]
struct Entry {
    ty: StatisticType,
    read: ReadStateFn,
}

/// Immutable once built; safe to share across threads.
#[derive(Clone, Default)]
pub struct StatisticRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl StatisticRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every builtin statistic type.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_types(&StatisticType::ALL)
    }

    /// Only the given builtin types. Duplicates in `types` are ignored.
    #[must_use]
    pub fn with_types(types: &[StatisticType]) -> Self {
        let mut registry = Self::new();
        for &ty in types {
            let entry = entry_for(ty);
            registry.entries.entry(ty.tag()).or_insert(entry);
        }
        registry
    }

    /// Register the builder `B` under its tag.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Registration`] if the tag is taken.
    pub fn register<B>(&mut self) -> Result<&mut Self>
    where
        B: StatisticBuilder + Into<Statistic>,
    {
        let tag = B::TYPE.tag();
        if self.entries.contains_key(tag) {
            return Err(AggregationError::Registration { tag });
        }
        self.entries.insert(
            tag,
            Entry {
                ty: B::TYPE,
                read: read_as::<B>,
            },
        );
        Ok(self)
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Type registered under `tag`, if any.
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<StatisticType> {
        self.entries.get(tag).map(|e| e.ty)
    }

    /// Decode the type-specific state registered under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] for an unknown tag or corrupt state.
    pub fn read_state(
        &self,
        tag: &str,
        header: &StateHeader<'_>,
        input: &mut StreamInput<'_>,
    ) -> Result<Statistic> {
        let entry = self.entries.get(tag).ok_or_else(|| {
            AggregationError::deserialization(format!(
                "unknown aggregation type [{tag}] for [{}]",
                header.name
            ))
        })?;
        (entry.read)(header, input)
    }
}

fn entry_for(ty: StatisticType) -> Entry {
    let read: ReadStateFn = match ty {
        StatisticType::ValueCount => read_as::<ValueCountBuilder>,
        StatisticType::Sum => read_as::<SumBuilder>,
        StatisticType::Min => read_as::<MinBuilder>,
        StatisticType::Max => read_as::<MaxBuilder>,
        StatisticType::Avg => read_as::<AvgBuilder>,
        StatisticType::Stats => read_as::<StatsBuilder>,
        StatisticType::ExtendedStats => read_as::<ExtendedStatsBuilder>,
        StatisticType::Percentiles => read_as::<PercentilesBuilder>,
        StatisticType::Cardinality => read_as::<CardinalityBuilder>,
        StatisticType::Missing => read_as::<MissingBuilder>,
    };
    Entry { ty, read }
}

impl Debug for StatisticRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

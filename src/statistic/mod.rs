//! Statistic types and the per-type builder contract.
//!
//! Every statistic is a variant of the sealed [`Statistic`] enum wrapping a
//! builder that implements [`StatisticBuilder`]. The builder owns the
//! type-specific ("extra") state and supplies five operations the framework
//! calls unconditionally: validate, write the state, read it back, render it,
//! and hash/compare it. Types without extra state implement all of them as
//! constants rather than leaving them out.
//!
//! Dispatch from a wire tag to the right `read_state` goes through the
//! [`StatisticRegistry`](crate::registry::StatisticRegistry).

mod cardinality;
mod extended_stats;
mod leaf;
mod percentiles;

pub use cardinality::CardinalityBuilder;
pub use extended_stats::ExtendedStatsBuilder;
pub use leaf::{
    AvgBuilder, MaxBuilder, MinBuilder, MissingBuilder, StatsBuilder, SumBuilder,
    ValueCountBuilder,
};
pub use percentiles::PercentilesBuilder;

use crate::document::DocumentBuilder;
use crate::error::Result;
use crate::stream::{StreamInput, StreamOutput};
use crate::values::{ValueType, ValuesSourceType};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{DefaultHasher, Hash, Hasher};

/// Identifies which statistic a definition produces. The tag is the wire
/// identifier and the dominant key of structural equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatisticType {
    ValueCount,
    Sum,
    Min,
    Max,
    Avg,
    Stats,
    ExtendedStats,
    Percentiles,
    Cardinality,
    Missing,
}

impl StatisticType {
    /// Every builtin type, in registration order.
    pub const ALL: [Self; 10] = [
        Self::ValueCount,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Avg,
        Self::Stats,
        Self::ExtendedStats,
        Self::Percentiles,
        Self::Cardinality,
        Self::Missing,
    ];

    /// Stable wire and declarative identifier.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::ValueCount => "value_count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Stats => "stats",
            Self::ExtendedStats => "extended_stats",
            Self::Percentiles => "percentiles",
            Self::Cardinality => "cardinality",
            Self::Missing => "missing",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Which family of fields the statistic can read.
    #[must_use]
    pub const fn values_source_type(self) -> ValuesSourceType {
        match self {
            Self::ValueCount | Self::Cardinality | Self::Missing => ValuesSourceType::Any,
            _ => ValuesSourceType::Numeric,
        }
    }

    /// Value type the statistic requires, if any.
    #[must_use]
    pub const fn target_value_type(self) -> Option<ValueType> {
        match self.values_source_type() {
            ValuesSourceType::Numeric => Some(ValueType::Numeric),
            _ => None,
        }
    }

    /// Only bucketing statistics may nest other aggregations.
    #[must_use]
    pub const fn accepts_sub_aggregations(self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl Display for StatisticType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Common header already consumed from the wire when a type's state is read.
#[derive(Clone, Copy, Debug)]
pub struct StateHeader<'a> {
    pub name: &'a str,
    pub values_source_type: ValuesSourceType,
    pub target_value_type: Option<ValueType>,
}

/// Contract every statistic builder implements.
pub trait StatisticBuilder: Clone + Debug + PartialEq + Send + Sync + 'static {
    const TYPE: StatisticType;

    /// Reject illegal parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`](crate::AggregationError::InvalidRequest).
    fn validate(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Write the type-specific state, in a fixed, versioned order. The tag is
    /// written by the enclosing definition.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    fn write_state(&self, out: &mut StreamOutput) -> Result<()>;

    /// Inverse of [`StatisticBuilder::write_state`].
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`](crate::AggregationError::Deserialization)
    /// on corrupt state.
    fn read_state(header: &StateHeader<'_>, input: &mut StreamInput<'_>) -> Result<Self>;

    /// Append the type-specific parameters to an open object and hand the writer back.
    ///
    /// # Errors
    ///
    /// Propagates document errors.
    fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder>;

    /// Feed the type-specific state into `state`.
    fn hash_state<H: Hasher>(&self, state: &mut H);

    /// Compare type-specific state.
    fn state_eq(&self, other: &Self) -> bool;
}

/// One variant per statistic type.
#[derive(Clone, Debug, PartialEq)]
pub enum Statistic {
    ValueCount(ValueCountBuilder),
    Sum(SumBuilder),
    Min(MinBuilder),
    Max(MaxBuilder),
    Avg(AvgBuilder),
    Stats(StatsBuilder),
    ExtendedStats(ExtendedStatsBuilder),
    Percentiles(PercentilesBuilder),
    Cardinality(CardinalityBuilder),
    Missing(MissingBuilder),
}

macro_rules! dispatch {
    ($stat:expr, $b:ident => $body:expr) => {
        match $stat {
            Statistic::ValueCount($b) => $body,
            Statistic::Sum($b) => $body,
            Statistic::Min($b) => $body,
            Statistic::Max($b) => $body,
            Statistic::Avg($b) => $body,
            Statistic::Stats($b) => $body,
            Statistic::ExtendedStats($b) => $body,
            Statistic::Percentiles($b) => $body,
            Statistic::Cardinality($b) => $body,
            Statistic::Missing($b) => $body,
        }
    };
}

macro_rules! into_statistic {
    ($($builder:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$builder> for Statistic {
                fn from(builder: $builder) -> Self {
                    Self::$variant(builder)
                }
            }
        )*
    };
}

into_statistic! {
    ValueCountBuilder => ValueCount,
    SumBuilder => Sum,
    MinBuilder => Min,
    MaxBuilder => Max,
    AvgBuilder => Avg,
    StatsBuilder => Stats,
    ExtendedStatsBuilder => ExtendedStats,
    PercentilesBuilder => Percentiles,
    CardinalityBuilder => Cardinality,
    MissingBuilder => Missing,
}

impl Statistic {
    #[must_use]
    pub fn statistic_type(&self) -> StatisticType {
        fn type_of<B: StatisticBuilder>(_: &B) -> StatisticType {
            B::TYPE
        }
        dispatch!(self, b => type_of(b))
    }

    /// # Errors
    ///
    /// See [`StatisticBuilder::validate`].
    pub fn validate(&self, name: &str) -> Result<()> {
        dispatch!(self, b => b.validate(name))
    }

    /// # Errors
    ///
    /// See [`StatisticBuilder::write_state`].
    pub fn write_state(&self, out: &mut StreamOutput) -> Result<()> {
        dispatch!(self, b => b.write_state(out))
    }

    /// # Errors
    ///
    /// See [`StatisticBuilder::render_body`].
    pub fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder> {
        dispatch!(self, b => b.render_body(doc))
    }

    /// Feed the type tag, then the type-specific state, into `state`.
    pub fn hash_structure<H: Hasher>(&self, state: &mut H) {
        self.statistic_type().tag().hash(state);
        dispatch!(self, b => b.hash_state(state));
    }

    /// Tag-seeded hash of the type-specific state. Types without state still
    /// hash differently from each other.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash_structure(&mut h);
        h.finish()
    }

    /// Same concrete type and identical type-specific state.
    #[must_use]
    pub fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ValueCount(a), Self::ValueCount(b)) => a.state_eq(b),
            (Self::Sum(a), Self::Sum(b)) => a.state_eq(b),
            (Self::Min(a), Self::Min(b)) => a.state_eq(b),
            (Self::Max(a), Self::Max(b)) => a.state_eq(b),
            (Self::Avg(a), Self::Avg(b)) => a.state_eq(b),
            (Self::Stats(a), Self::Stats(b)) => a.state_eq(b),
            (Self::ExtendedStats(a), Self::ExtendedStats(b)) => a.state_eq(b),
            (Self::Percentiles(a), Self::Percentiles(b)) => a.state_eq(b),
            (Self::Cardinality(a), Self::Cardinality(b)) => a.state_eq(b),
            (Self::Missing(a), Self::Missing(b)) => a.state_eq(b),
            _ => false,
        }
    }
}

/// Registry entry point: read `B`'s state and wrap it.
pub(crate) fn read_as<B>(header: &StateHeader<'_>, input: &mut StreamInput<'_>) -> Result<Statistic>
where
    B: StatisticBuilder + Into<Statistic>,
{
    B::read_state(header, input).map(Into::into)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn tags_round_trip_and_are_unique() {
        for ty in StatisticType::ALL {
            assert_eq!(StatisticType::from_tag(ty.tag()), Some(ty));
        }
        let mut tags: Vec<_> = StatisticType::ALL.iter().map(|t| t.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), StatisticType::ALL.len());
        assert_eq!(StatisticType::from_tag("geo_bounds"), None);
    }

    #[test]
    fn stateless_types_hash_by_tag() {
        let stats = Statistic::from(StatsBuilder);
        let sum = Statistic::from(SumBuilder);
        assert_eq!(stats.structural_hash(), Statistic::from(StatsBuilder).structural_hash());
        assert_ne!(stats.structural_hash(), sum.structural_hash());
        assert!(stats.structural_eq(&Statistic::Stats(StatsBuilder)));
        assert!(!stats.structural_eq(&sum));
    }

    #[test]
    fn requirements_follow_the_type() {
        assert_eq!(StatisticType::Stats.values_source_type(), ValuesSourceType::Numeric);
        assert_eq!(StatisticType::Stats.target_value_type(), Some(ValueType::Numeric));
        assert_eq!(StatisticType::Cardinality.target_value_type(), None);
        assert!(StatisticType::Missing.accepts_sub_aggregations());
        assert!(!StatisticType::Avg.accepts_sub_aggregations());
    }
}

//! Statistics whose definition carries no state beyond the common header.

use super::{StateHeader, StatisticBuilder, StatisticType};
use crate::document::DocumentBuilder;
use crate::error::Result;
use crate::stream::{StreamInput, StreamOutput};
use std::hash::Hasher;

macro_rules! stateless_statistic {
    ($(#[$doc:meta])* $builder:ident => $ty:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $builder;

        impl StatisticBuilder for $builder {
            const TYPE: StatisticType = StatisticType::$ty;

            fn write_state(&self, _out: &mut StreamOutput) -> Result<()> {
                Ok(())
            }

            fn read_state(_header: &StateHeader<'_>, _input: &mut StreamInput<'_>) -> Result<Self> {
                Ok(Self)
            }

            fn render_body<'d>(
                &self,
                doc: &'d mut DocumentBuilder,
            ) -> Result<&'d mut DocumentBuilder> {
                Ok(doc)
            }

            fn hash_state<H: Hasher>(&self, _state: &mut H) {}

            fn state_eq(&self, _other: &Self) -> bool {
                true
            }
        }
    };
}

stateless_statistic!(
    /// Number of values, over any field.
    ValueCountBuilder => ValueCount
);
stateless_statistic!(SumBuilder => Sum);
stateless_statistic!(MinBuilder => Min);
stateless_statistic!(MaxBuilder => Max);
stateless_statistic!(
    /// Arithmetic mean of a numeric field.
    AvgBuilder => Avg
);
stateless_statistic!(
    /// Count, min, max, avg and sum in one pass.
    StatsBuilder => Stats
);
stateless_statistic!(
    /// Single bucket of the documents lacking a value. May hold sub-aggregations.
    MissingBuilder => Missing
);

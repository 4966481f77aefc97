use super::{StateHeader, StatisticBuilder, StatisticType};
use crate::document::DocumentBuilder;
use crate::error::Result;
use crate::stream::{StreamInput, StreamOutput};
use std::hash::{Hash, Hasher};

/// Approximate count of distinct values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CardinalityBuilder {
    precision_threshold: Option<u64>,
}

impl CardinalityBuilder {
    /// Counts stay exact below this many distinct values unless configured otherwise.
    pub const DEFAULT_PRECISION_THRESHOLD: u64 = 3000;
    /// Thresholds above this are clamped at execution.
    pub const MAX_PRECISION_THRESHOLD: u64 = 40_000;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_precision_threshold(self, threshold: u64) -> Self {
        Self {
            precision_threshold: Some(threshold),
        }
    }

    /// The configured threshold, as requested.
    #[must_use]
    pub fn precision_threshold(&self) -> Option<u64> {
        self.precision_threshold
    }

    /// Sketch size used at execution.
    #[must_use]
    pub fn effective_threshold(&self) -> usize {
        let t = self
            .precision_threshold
            .unwrap_or(Self::DEFAULT_PRECISION_THRESHOLD)
            .min(Self::MAX_PRECISION_THRESHOLD);
        usize::try_from(t).unwrap_or(usize::MAX)
    }
}

impl StatisticBuilder for CardinalityBuilder {
    const TYPE: StatisticType = StatisticType::Cardinality;

    fn write_state(&self, out: &mut StreamOutput) -> Result<()> {
        out.write_optional(self.precision_threshold.as_ref(), |out, t| out.write_vu64(*t))
    }

    fn read_state(_header: &StateHeader<'_>, input: &mut StreamInput<'_>) -> Result<Self> {
        Ok(Self {
            precision_threshold: input.read_optional(StreamInput::read_vu64)?,
        })
    }

    fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder> {
        match self.precision_threshold {
            Some(t) => doc.field("precision_threshold", t),
            None => Ok(doc),
        }
    }

    fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.precision_threshold.hash(state);
    }

    fn state_eq(&self, other: &Self) -> bool {
        self.precision_threshold == other.precision_threshold
    }
}

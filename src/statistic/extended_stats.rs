use super::{StateHeader, StatisticBuilder, StatisticType};
use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::stream::{StreamInput, StreamOutput};
use ordered_float::NotNan;
use std::hash::{Hash, Hasher};

/// Stats plus variance, standard deviation and `avg ± sigma * std_deviation` bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExtendedStatsBuilder {
    sigma: NotNan<f64>,
}

impl ExtendedStatsBuilder {
    pub const DEFAULT_SIGMA: f64 = 2.0;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of standard deviations the bounds lie from the mean.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] for NaN or negative values.
    pub fn with_sigma(self, sigma: f64) -> Result<Self> {
        let sigma = NotNan::new(sigma)
            .map_err(|_| AggregationError::invalid_request("[sigma] must not be NaN"))?;
        if *sigma < 0.0 {
            return Err(negative_sigma(*sigma));
        }
        Ok(Self { sigma })
    }

    #[must_use]
    pub fn sigma(&self) -> f64 {
        self.sigma.into_inner()
    }
}

impl Default for ExtendedStatsBuilder {
    fn default() -> Self {
        Self {
            sigma: NotNan::new(Self::DEFAULT_SIGMA).unwrap_or_default(),
        }
    }
}

fn negative_sigma(sigma: f64) -> AggregationError {
    AggregationError::invalid_request(format!(
        "[sigma] must be greater than or equal to 0. Found [{sigma}]"
    ))
}

impl StatisticBuilder for ExtendedStatsBuilder {
    const TYPE: StatisticType = StatisticType::ExtendedStats;

    fn validate(&self, name: &str) -> Result<()> {
        if *self.sigma < 0.0 {
            return Err(AggregationError::invalid_request(format!(
                "[sigma] must be greater than or equal to 0. Found [{}] in [{name}]",
                self.sigma
            )));
        }
        Ok(())
    }

    fn write_state(&self, out: &mut StreamOutput) -> Result<()> {
        out.write_f64(self.sigma.into_inner())
    }

    fn read_state(header: &StateHeader<'_>, input: &mut StreamInput<'_>) -> Result<Self> {
        let sigma = NotNan::new(input.read_f64()?).map_err(|_| {
            AggregationError::deserialization(format!("NaN sigma for [{}]", header.name))
        })?;
        Ok(Self { sigma })
    }

    fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder> {
        doc.field("sigma", self.sigma.into_inner())
    }

    fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.sigma.hash(state);
    }

    fn state_eq(&self, other: &Self) -> bool {
        self.sigma == other.sigma
    }
}

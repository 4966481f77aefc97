use super::{StateHeader, StatisticBuilder, StatisticType};
use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::stream::{StreamInput, StreamOutput, WireVersion};
use ordered_float::NotNan;
use std::hash::{Hash, Hasher};

/// Percentiles over a numeric field.
///
/// Percents are kept sorted and deduplicated so two requests asking for the same
/// points in a different order are structurally equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PercentilesBuilder {
    percents: Vec<NotNan<f64>>,
    keyed: bool,
}

impl PercentilesBuilder {
    pub const DEFAULT_PERCENTS: [f64; 7] = [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0];

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the requested percents.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] when `percents` is empty or a
    /// value lies outside `[0, 100]`.
    pub fn with_percents(self, percents: &[f64]) -> Result<Self> {
        let percents = canonical_percents(percents).map_err(AggregationError::invalid_request)?;
        Ok(Self { percents, ..self })
    }

    /// Render results as an object keyed by percent instead of a list.
    #[must_use]
    pub fn keyed(self, keyed: bool) -> Self {
        Self { keyed, ..self }
    }

    #[must_use]
    pub fn percents(&self) -> Vec<f64> {
        self.percents.iter().map(|p| p.into_inner()).collect()
    }

    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.keyed
    }
}

impl Default for PercentilesBuilder {
    fn default() -> Self {
        Self {
            percents: canonical_percents(&Self::DEFAULT_PERCENTS).unwrap_or_default(),
            keyed: true,
        }
    }
}

fn canonical_percents(percents: &[f64]) -> std::result::Result<Vec<NotNan<f64>>, String> {
    if percents.is_empty() {
        return Err("[percents] must not be empty".into());
    }
    let mut out = percents
        .iter()
        // -0.0 would otherwise render as a distinct point
        .map(|&p| match NotNan::new(if p == 0.0 { 0.0 } else { p }) {
            Ok(p) if (0.0..=100.0).contains(&*p) => Ok(p),
            _ => Err(format!("percent [{p}] must be within [0, 100]")),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

impl StatisticBuilder for PercentilesBuilder {
    const TYPE: StatisticType = StatisticType::Percentiles;

    fn validate(&self, name: &str) -> Result<()> {
        if self.percents.is_empty() {
            return Err(AggregationError::invalid_request(format!(
                "[percents] must not be empty in [{name}]"
            )));
        }
        Ok(())
    }

    fn write_state(&self, out: &mut StreamOutput) -> Result<()> {
        out.write_vu64(self.percents.len() as u64)?;
        for p in &self.percents {
            out.write_f64(p.into_inner())?;
        }
        if out.version() >= WireVersion::V2 {
            out.write_bool(self.keyed)?;
        }
        Ok(())
    }

    fn read_state(header: &StateHeader<'_>, input: &mut StreamInput<'_>) -> Result<Self> {
        let len = input.read_vu64()?;
        let mut raw = Vec::new();
        for _ in 0..len {
            raw.push(input.read_f64()?);
        }
        let percents = canonical_percents(&raw).map_err(|reason| {
            AggregationError::deserialization(format!("{reason} for [{}]", header.name))
        })?;
        let keyed = if input.version() >= WireVersion::V2 {
            input.read_bool()?
        } else {
            true
        };
        Ok(Self { percents, keyed })
    }

    fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder> {
        doc.field("percents", self.percents())?
            .field("keyed", self.keyed)
    }

    fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.percents.hash(state);
        self.keyed.hash(state);
    }

    fn state_eq(&self, other: &Self) -> bool {
        self == other
    }
}

//! A request's top-level aggregations and their framed wire form.

use crate::definition::{AggregationDefinition, check_sibling_names};
use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::registry::StatisticRegistry;
use crate::stream::{StreamInput, StreamOutput, WireVersion};
use log::debug;
use serde_json::Value;

/// Ordered, uniquely named top-level aggregations of one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregationTree {
    aggregations: Vec<AggregationDefinition>,
}

impl AggregationTree {
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] if two aggregations share a name.
    pub fn new(aggregations: Vec<AggregationDefinition>) -> Result<Self> {
        check_sibling_names(&aggregations)?;
        Ok(Self { aggregations })
    }

    #[must_use]
    pub fn aggregations(&self) -> &[AggregationDefinition] {
        &self.aggregations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aggregations.is_empty()
    }

    /// Version header, count, then each definition.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    pub fn to_bytes(&self, version: WireVersion) -> Result<Vec<u8>> {
        let mut out = StreamOutput::new(version);
        out.write_vu64(u64::from(version.id()))?;
        out.write_vu64(self.aggregations.len() as u64)?;
        for aggregation in &self.aggregations {
            aggregation.write_to(&mut out)?;
        }
        debug!(
            "encoded {} aggregations at {version} in {} bytes",
            self.aggregations.len(),
            out.len()
        );
        Ok(out.into_bytes())
    }

    /// Decode a request written by [`AggregationTree::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] for an unsupported version,
    /// any definition that fails to decode, or trailing bytes.
    pub fn from_bytes(registry: &StatisticRegistry, bytes: &[u8]) -> Result<Self> {
        let mut input = StreamInput::new(bytes, WireVersion::V1);
        let version = u32::try_from(input.read_vu64()?)
            .map(WireVersion::from_id)
            .map_err(|_| AggregationError::deserialization("wire version out of range"))?;
        if !version.is_supported() {
            return Err(AggregationError::deserialization(format!(
                "unsupported wire version [{version}], this node reads up to [{}]",
                WireVersion::CURRENT
            )));
        }
        input.set_version(version);

        let count = input.read_vu64()?;
        let mut aggregations = Vec::new();
        for _ in 0..count {
            aggregations.push(AggregationDefinition::read_from(registry, &mut input)?);
        }
        input.expect_exhausted()?;
        check_sibling_names(&aggregations)
            .map_err(|e| AggregationError::deserialization(e.to_string()))?;
        Ok(Self { aggregations })
    }

    /// `{"aggs": {<name>: {...}, ...}}`
    ///
    /// # Errors
    ///
    /// Propagates document errors.
    pub fn to_document(&self) -> Result<Value> {
        let mut doc = DocumentBuilder::new();
        doc.start_object()?.start_object_field("aggs")?;
        for aggregation in &self.aggregations {
            aggregation.render(&mut doc)?;
        }
        doc.end_object()?.end_object()?;
        doc.finish()
    }

    /// Hex SHA-256 of the current-version wire form.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    #[cfg(feature = "request-cache")]
    pub fn fingerprint(&self) -> Result<String> {
        Ok(fingerprint(&self.to_bytes(WireVersion::CURRENT)?))
    }
}

/// Hex SHA-256 of an encoded request.
#[cfg(feature = "request-cache")]
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write;

    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statistic::{StatisticType, StatsBuilder, SumBuilder};
    use test_log::test;

    fn tree() -> AggregationTree {
        AggregationTree::new(vec![
            AggregationDefinition::builder("latency_stats", StatsBuilder)
                .field("latency_ms")
                .finish()
                .unwrap(),
            AggregationDefinition::builder("bytes", SumBuilder)
                .field("size")
                .finish()
                .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn trees_round_trip() {
        let bytes = tree().to_bytes(WireVersion::CURRENT).unwrap();
        let read = AggregationTree::from_bytes(&StatisticRegistry::builtin(), &bytes).unwrap();
        assert_eq!(read, tree());
    }

    #[test]
    fn newer_versions_are_rejected() {
        let future = WireVersion::from_id(WireVersion::CURRENT.id() + 1);
        let bytes = tree().to_bytes(future).unwrap();
        let err = AggregationTree::from_bytes(&StatisticRegistry::builtin(), &bytes).unwrap_err();
        assert!(matches!(err, AggregationError::Deserialization { .. }));
    }

    #[test]
    fn older_peers_reject_unknown_tags() {
        let registry = StatisticRegistry::with_types(&[StatisticType::Sum]);
        let bytes = tree().to_bytes(WireVersion::CURRENT).unwrap();
        let err = AggregationTree::from_bytes(&registry, &bytes).unwrap_err();
        assert!(err.to_string().contains("unknown aggregation type [stats]"));
    }

    #[test]
    fn duplicate_top_level_names_are_rejected() {
        let def = tree().aggregations()[0].clone();
        assert!(AggregationTree::new(vec![def.clone(), def]).is_err());
    }

    #[cfg(feature = "request-cache")]
    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = tree().fingerprint().unwrap();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, tree().fingerprint().unwrap());
        assert_eq!(fingerprint(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }
}

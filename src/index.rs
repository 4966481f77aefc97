//! A minimal in-memory index: documents grouped into immutable segments.
//!
//! This is the value-source collaborator the computation units read from.
//! [`FieldValueSource`] yields the values of one resolved field for a document of
//! one segment, substituting the configured missing value when the document has
//! none.

use crate::values::{MissingValue, ResolvedValuesSource};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Segment-local document ordinal.
pub type DocId = u32;

/// A single stored value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Long(i64),
    Double(f64),
    /// Milliseconds since the epoch.
    Date(i64),
    Boolean(bool),
    Keyword(String),
}

impl FieldValue {
    /// Numeric view of the value; keywords have none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) | Self::Date(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Keyword(_) => None,
        }
    }

    /// Hash used by cardinality sketches: the first eight bytes, little endian,
    /// of the SHA-256 of a tag byte followed by the value. Keywords are tagged
    /// `1` and hash their UTF-8 bytes. Numbers are tagged `0` and hash the
    /// little-endian bits of their `f64` form, so `Long(3)` and `Double(3.0)`
    /// count once.
    /// Stable across processes and builds.
    #[must_use]
    pub fn hash_key(&self) -> u64 {
        let mut h = Sha256::new();
        match self {
            Self::Keyword(s) => {
                h.update([1u8]);
                h.update(s.as_bytes());
            }
            other => {
                let n = other.as_f64().unwrap_or_default();
                h.update([0u8]);
                h.update((if n == 0.0 { 0.0 } else { n }).to_bits().to_le_bytes());
            }
        }
        let digest = h.finalize();
        let mut key = [0u8; 8];
        key.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(key)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Keyword(v.to_string())
    }
}

/// A document: field name to zero or more values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one value to `field`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.entry(field.into()).or_default().push(value.into());
        self
    }

    /// Add several values to `field`.
    #[must_use]
    pub fn with_values<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.fields
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn values(&self, field: &str) -> &[FieldValue] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// An immutable batch of documents.
#[derive(Clone, Debug, Default)]
pub struct Segment {
    docs: Vec<Document>,
}

impl Segment {
    #[must_use]
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    /// Number of documents, also one past the largest [`DocId`].
    #[must_use]
    pub fn max_doc(&self) -> DocId {
        DocId::try_from(self.docs.len()).unwrap_or(DocId::MAX)
    }

    #[must_use]
    pub fn doc(&self, doc: DocId) -> Option<&Document> {
        self.docs.get(doc as usize)
    }
}

/// Values of one resolved field within one segment.
#[derive(Clone, Debug)]
pub struct FieldValueSource {
    segment: Arc<Segment>,
    /// `None` when the field is unmapped on this shard.
    field: Option<String>,
    missing: Option<MissingValue>,
}

impl FieldValueSource {
    #[must_use]
    pub fn new(segment: &Arc<Segment>, source: &ResolvedValuesSource) -> Self {
        Self {
            segment: Arc::clone(segment),
            field: (!source.is_unmapped()).then(|| source.field.clone()),
            missing: source.missing.clone(),
        }
    }

    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    fn stored(&self, doc: DocId) -> &[FieldValue] {
        match (&self.field, self.segment.doc(doc)) {
            (Some(field), Some(d)) => d.values(field),
            _ => &[],
        }
    }

    /// Whether the document has a stored value, ignoring the missing substitute.
    #[must_use]
    pub fn has_value(&self, doc: DocId) -> bool {
        !self.stored(doc).is_empty()
    }

    /// Replace `out` with the numeric values of `doc`.
    pub fn numeric_values(&self, doc: DocId, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.stored(doc).iter().filter_map(FieldValue::as_f64));
        if out.is_empty()
            && let Some(MissingValue::Number(n)) = &self.missing
        {
            out.push(n.into_inner());
        }
    }

    /// Replace `out` with the value hashes of `doc`.
    pub fn value_hashes(&self, doc: DocId, out: &mut Vec<u64>) {
        out.clear();
        out.extend(self.stored(doc).iter().map(FieldValue::hash_key));
        if out.is_empty()
            && let Some(missing) = &self.missing
        {
            out.push(match missing {
                MissingValue::Number(n) => FieldValue::Double(n.into_inner()).hash_key(),
                MissingValue::Text(s) => FieldValue::Keyword(s.clone()).hash_key(),
            });
        }
    }

    /// Number of values `doc` contributes, counting the missing substitute.
    #[must_use]
    pub fn value_count(&self, doc: DocId) -> usize {
        match self.stored(doc).len() {
            0 => usize::from(self.missing.is_some()),
            n => n,
        }
    }
}

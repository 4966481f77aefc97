//! Value-source configuration: which field an aggregation reads and how its
//! values are coerced.
//!
//! A definition carries an unresolved [`ValuesSourceSpec`] that travels on the
//! wire unchanged. Each shard resolves it against its own mapping through a
//! [`ValuesSourceResolver`], producing a [`ResolvedValuesSource`] that the binding
//! step validates against the statistic's requirements.

use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::stream::{StreamInput, StreamOutput};
use ordered_float::NotNan;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// Broad family of values a statistic can consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValuesSourceType {
    /// Any field, numeric or not.
    Any,
    /// Fields whose values are numbers (long, double, date, boolean).
    Numeric,
    /// Fields read as raw terms.
    Bytes,
}

impl ValuesSourceType {
    pub(crate) fn id(self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Numeric => 1,
            Self::Bytes => 2,
        }
    }

    pub(crate) fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::Any),
            1 => Ok(Self::Numeric),
            2 => Ok(Self::Bytes),
            other => Err(AggregationError::deserialization(format!(
                "unknown values source type id [{other}]"
            ))),
        }
    }

    /// Whether a statistic declaring `self` can consume a field resolved as `resolved`.
    #[must_use]
    pub fn accepts(self, resolved: Self) -> bool {
        match self {
            Self::Any | Self::Bytes => true,
            Self::Numeric => resolved == Self::Numeric,
        }
    }
}

impl Display for ValuesSourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(match self {
            Self::Any => "any",
            Self::Numeric => "numeric",
            Self::Bytes => "bytes",
        })
    }
}

/// Value type named by a request (`value_type`) or required by a statistic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Long,
    Double,
    Numeric,
    Date,
    Boolean,
}

impl ValueType {
    pub(crate) fn id(self) -> u8 {
        match self {
            Self::String => 1,
            Self::Long => 2,
            Self::Double => 3,
            Self::Numeric => 4,
            Self::Date => 5,
            Self::Boolean => 6,
        }
    }

    pub(crate) fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            1 => Self::String,
            2 => Self::Long,
            3 => Self::Double,
            4 => Self::Numeric,
            5 => Self::Date,
            6 => Self::Boolean,
            other => {
                return Err(AggregationError::deserialization(format!(
                    "unknown value type id [{other}]"
                )));
            }
        })
    }

    /// Name used in the declarative form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Numeric => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }

    #[must_use]
    pub fn values_source_type(self) -> ValuesSourceType {
        match self {
            Self::String => ValuesSourceType::Bytes,
            _ => ValuesSourceType::Numeric,
        }
    }

    pub(crate) fn write_to(self, out: &mut StreamOutput) -> Result<()> {
        out.write(&self.id())
    }

    pub(crate) fn read_from(input: &mut StreamInput<'_>) -> Result<Self> {
        Self::from_id(input.read()?)
    }
}

/// Value substituted for documents that have none.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MissingValue {
    Number(NotNan<f64>),
    Text(String),
}

impl MissingValue {
    /// Numeric missing value.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] for NaN.
    pub fn number(value: f64) -> Result<Self> {
        NotNan::new(value)
            .map(Self::Number)
            .map_err(|_| AggregationError::invalid_request("[missing] must not be NaN"))
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::Value::from(n.into_inner()),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }

    fn write_to(&self, out: &mut StreamOutput) -> Result<()> {
        match self {
            Self::Number(n) => {
                out.write(&0u8)?;
                out.write_f64(n.into_inner())
            }
            Self::Text(s) => {
                out.write(&1u8)?;
                out.write_string(s)
            }
        }
    }

    fn read_from(input: &mut StreamInput<'_>) -> Result<Self> {
        match input.read::<u8>()? {
            0 => NotNan::new(input.read_f64()?)
                .map(Self::Number)
                .map_err(|_| AggregationError::deserialization("NaN missing value")),
            1 => Ok(Self::Text(input.read_string()?)),
            other => Err(AggregationError::deserialization(format!(
                "unknown missing value kind [{other}]"
            ))),
        }
    }
}

impl Display for MissingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Unresolved value-source configuration as written by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValuesSourceSpec {
    pub field: Option<String>,
    pub value_type: Option<ValueType>,
    pub format: Option<String>,
    pub missing: Option<MissingValue>,
}

impl ValuesSourceSpec {
    pub(crate) fn write_to(&self, out: &mut StreamOutput) -> Result<()> {
        out.write_optional_string(self.field.as_deref())?;
        out.write_optional(self.value_type.as_ref(), |out, vt| vt.write_to(out))?;
        out.write_optional_string(self.format.as_deref())?;
        out.write_optional(self.missing.as_ref(), |out, m| m.write_to(out))
    }

    pub(crate) fn read_from(input: &mut StreamInput<'_>) -> Result<Self> {
        Ok(Self {
            field: input.read_optional_string()?,
            value_type: input.read_optional(ValueType::read_from)?,
            format: input.read_optional_string()?,
            missing: input.read_optional(MissingValue::read_from)?,
        })
    }

    /// Append the common value-source parameters to an open object.
    pub(crate) fn render(&self, doc: &mut DocumentBuilder) -> Result<()> {
        if let Some(field) = &self.field {
            doc.field("field", field.as_str())?;
        }
        if let Some(value_type) = self.value_type {
            doc.field("value_type", value_type.name())?;
        }
        if let Some(format) = &self.format {
            doc.field("format", format.as_str())?;
        }
        if let Some(missing) = &self.missing {
            doc.field("missing", missing.to_json())?;
        }
        Ok(())
    }
}

/// Concrete type of a mapped field on a shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Long,
    Double,
    Date,
    Boolean,
    Keyword,
}

impl FieldKind {
    #[must_use]
    pub fn values_source_type(self) -> ValuesSourceType {
        match self {
            Self::Keyword => ValuesSourceType::Bytes,
            _ => ValuesSourceType::Numeric,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Keyword => "keyword",
        }
    }
}

/// A value-source configuration bound to one shard's mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResolvedValuesSource {
    pub field: String,
    /// `None` when the field is not mapped on this shard.
    pub kind: Option<FieldKind>,
    pub source_type: ValuesSourceType,
    pub missing: Option<MissingValue>,
    pub format: Option<String>,
}

impl ResolvedValuesSource {
    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.kind.is_none()
    }

    /// Name of the resolved field type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.map_or("unmapped", FieldKind::name)
    }
}

/// Resolves a [`ValuesSourceSpec`] against the fields known to a shard.
pub trait ValuesSourceResolver: Send + Sync {
    /// Resolve `spec` for the aggregation named `aggregation`.
    ///
    /// `required` is the value type the statistic asks for; it is used to type
    /// unmapped fields.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Resolution`] when the field cannot be coerced.
    fn resolve(
        &self,
        aggregation: &str,
        spec: &ValuesSourceSpec,
        required: Option<ValueType>,
    ) -> Result<ResolvedValuesSource>;
}

/// Field name to field kind, as mapped on one shard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMapping {
    fields: BTreeMap<String, FieldKind>,
}

impl FieldMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    #[must_use]
    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl ValuesSourceResolver for FieldMapping {
    fn resolve(
        &self,
        aggregation: &str,
        spec: &ValuesSourceSpec,
        required: Option<ValueType>,
    ) -> Result<ResolvedValuesSource> {
        let field = spec.field.clone().ok_or_else(|| {
            AggregationError::resolution(aggregation, "no field to aggregate on")
        })?;
        let kind = self.kind(&field);

        let source_type = match (kind, spec.value_type) {
            (Some(kind), Some(hint)) if hint.values_source_type() != kind.values_source_type() => {
                return Err(AggregationError::resolution(
                    aggregation,
                    format!(
                        "field [{field}] of type [{}] cannot be interpreted as [{}]",
                        kind.name(),
                        hint.name()
                    ),
                ));
            }
            (Some(kind), _) => kind.values_source_type(),
            (None, Some(hint)) => hint.values_source_type(),
            (None, None) => required.map_or(ValuesSourceType::Any, ValueType::values_source_type),
        };

        let missing = match (&spec.missing, source_type) {
            (Some(MissingValue::Text(text)), ValuesSourceType::Numeric) => {
                let parsed: f64 = text.parse().map_err(|_| {
                    AggregationError::resolution(
                        aggregation,
                        format!("missing value [{text}] is not a number for field [{field}]"),
                    )
                })?;
                Some(MissingValue::number(parsed).map_err(|_| {
                    AggregationError::resolution(aggregation, "missing value is NaN")
                })?)
            }
            (Some(MissingValue::Number(n)), ValuesSourceType::Bytes) => {
                Some(MissingValue::Text(n.to_string()))
            }
            (missing, _) => missing.clone(),
        };

        Ok(ResolvedValuesSource {
            field,
            kind,
            source_type,
            missing,
            format: spec.format.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn mapping() -> FieldMapping {
        FieldMapping::new()
            .with_field("latency_ms", FieldKind::Long)
            .with_field("host", FieldKind::Keyword)
    }

    fn spec(field: &str) -> ValuesSourceSpec {
        ValuesSourceSpec {
            field: Some(field.into()),
            ..ValuesSourceSpec::default()
        }
    }

    #[test]
    fn mapped_fields_take_their_kind() {
        let resolved = mapping().resolve("a", &spec("host"), None).unwrap();
        assert_eq!(resolved.kind, Some(FieldKind::Keyword));
        assert_eq!(resolved.source_type, ValuesSourceType::Bytes);
        assert!(!resolved.is_unmapped());
    }

    #[test]
    fn unmapped_fields_use_the_required_type() {
        let resolved = mapping()
            .resolve("a", &spec("nope"), Some(ValueType::Numeric))
            .unwrap();
        assert!(resolved.is_unmapped());
        assert_eq!(resolved.source_type, ValuesSourceType::Numeric);
        assert_eq!(resolved.type_name(), "unmapped");
    }

    #[test]
    fn conflicting_value_type_hint_fails() {
        let mut s = spec("host");
        s.value_type = Some(ValueType::Long);
        let err = mapping().resolve("a", &s, None).unwrap_err();
        assert!(matches!(err, AggregationError::Resolution { .. }));
    }

    #[test]
    fn missing_values_are_coerced() {
        let mut s = spec("latency_ms");
        s.missing = Some(MissingValue::Text("12.5".into()));
        let resolved = mapping().resolve("a", &s, None).unwrap();
        assert_eq!(resolved.missing, Some(MissingValue::number(12.5).unwrap()));

        s.missing = Some(MissingValue::Text("n/a".into()));
        assert!(mapping().resolve("a", &s, None).is_err());
    }

    #[test]
    fn numeric_only_rejects_bytes() {
        assert!(ValuesSourceType::Numeric.accepts(ValuesSourceType::Numeric));
        assert!(!ValuesSourceType::Numeric.accepts(ValuesSourceType::Bytes));
        assert!(ValuesSourceType::Any.accepts(ValuesSourceType::Bytes));
    }
}

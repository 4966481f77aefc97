//! Aggregation definitions: what to compute, over which field, under which name.
//!
//! An [`AggregationDefinition`] is built once on the coordinating node through
//! [`DefinitionBuilder`], written to every shard with
//! [`AggregationDefinition::write_to`], read back with
//! [`AggregationDefinition::read_from`] and bound to the shard with
//! [`AggregationDefinition::build`]. It is never mutated after construction.
//!
//! Two kinds of equality exist:
//!
//! - `PartialEq` compares everything, including name, metadata and
//!   sub-aggregations. Wire round trips preserve it.
//! - [`AggregationDefinition::structural_eq`] / [`AggregationDefinition::structural_hash`]
//!   compare only what determines the computed value: the statistic type, its
//!   type-specific state and the value-source configuration. Definitions named
//!   differently can be structurally equal. [`StructuralKey`] adapts the pair
//!   to hash map keys.
//!
//! # Examples
//! ```
//! use shardagg::{AggregationDefinition, StatsBuilder};
//!
//! let a = AggregationDefinition::builder("a", StatsBuilder)
//!     .field("latency_ms")
//!     .finish()
//!     .unwrap();
//! let b = AggregationDefinition::builder("b", StatsBuilder)
//!     .field("latency_ms")
//!     .finish()
//!     .unwrap();
//!
//! assert_ne!(a, b);
//! assert!(a.structural_eq(&b));
//! assert_eq!(a.structural_hash(), b.structural_hash());
//! ```

use crate::context::ExecutionContext;
use crate::document::DocumentBuilder;
use crate::error::{AggregationError, Result};
use crate::factory::{AggregatorFactories, AggregatorFactory};
use crate::registry::StatisticRegistry;
use crate::statistic::{StateHeader, Statistic, StatisticType};
use crate::stream::{StreamInput, StreamOutput};
use crate::values::{MissingValue, ResolvedValuesSource, ValueType, ValuesSourceSpec, ValuesSourceType};
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::LazyLock;

/// Deepest sub-aggregation nesting accepted, counting the root as 1.
pub const MAX_NESTING_DEPTH: usize = 32;

static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\[\]>]+$").expect("valid aggregation name regex"));

/// Opaque client annotations, echoed back with results.
pub type Metadata = Map<String, Value>;

/// A named, immutable request to compute one statistic.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationDefinition {
    name: String,
    statistic: Statistic,
    values_source: ValuesSourceSpec,
    metadata: Option<Metadata>,
    sub_aggregations: Vec<AggregationDefinition>,
}

/// Accumulates the parts of an [`AggregationDefinition`]; every setter returns a new builder.
#[derive(Clone, Debug)]
#[must_use]
pub struct DefinitionBuilder {
    name: String,
    statistic: Statistic,
    values_source: ValuesSourceSpec,
    metadata: Option<Metadata>,
    sub_aggregations: Vec<AggregationDefinition>,
}

impl DefinitionBuilder {
    pub fn field(self, field: impl Into<String>) -> Self {
        Self {
            values_source: ValuesSourceSpec {
                field: Some(field.into()),
                ..self.values_source
            },
            ..self
        }
    }

    /// Coerce the field to `value_type` when resolving it.
    pub fn value_type(self, value_type: ValueType) -> Self {
        Self {
            values_source: ValuesSourceSpec {
                value_type: Some(value_type),
                ..self.values_source
            },
            ..self
        }
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        Self {
            values_source: ValuesSourceSpec {
                format: Some(format.into()),
                ..self.values_source
            },
            ..self
        }
    }

    /// Value used for documents without one.
    pub fn missing(self, missing: MissingValue) -> Self {
        Self {
            values_source: ValuesSourceSpec {
                missing: Some(missing),
                ..self.values_source
            },
            ..self
        }
    }

    pub fn meta(self, metadata: Metadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..self
        }
    }

    /// Append a nested aggregation.
    pub fn sub_aggregation(self, sub: AggregationDefinition) -> Self {
        let mut sub_aggregations = self.sub_aggregations;
        sub_aggregations.push(sub);
        Self {
            sub_aggregations,
            ..self
        }
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::InvalidRequest`] for an empty or malformed name,
    /// a missing field, illegal statistic parameters, sub-aggregations under a
    /// statistic that cannot hold them, duplicate sibling names, or nesting deeper
    /// than [`MAX_NESTING_DEPTH`].
    pub fn finish(self) -> Result<AggregationDefinition> {
        let definition = AggregationDefinition {
            name: self.name,
            statistic: self.statistic,
            values_source: self.values_source,
            metadata: self.metadata,
            sub_aggregations: self.sub_aggregations,
        };
        definition.validate()?;
        if definition.depth() > MAX_NESTING_DEPTH {
            return Err(AggregationError::invalid_request(format!(
                "aggregation [{}] nests deeper than [{MAX_NESTING_DEPTH}] levels",
                definition.name
            )));
        }
        Ok(definition)
    }
}

impl AggregationDefinition {
    /// Start a definition named `name` computing `statistic`.
    pub fn builder(name: impl Into<String>, statistic: impl Into<Statistic>) -> DefinitionBuilder {
        DefinitionBuilder {
            name: name.into(),
            statistic: statistic.into(),
            values_source: ValuesSourceSpec::default(),
            metadata: None,
            sub_aggregations: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    #[must_use]
    pub fn statistic_type(&self) -> StatisticType {
        self.statistic.statistic_type()
    }

    /// Family of fields the statistic accepts.
    #[must_use]
    pub fn values_source_type(&self) -> ValuesSourceType {
        self.statistic_type().values_source_type()
    }

    /// Value type the statistic requires, if any.
    #[must_use]
    pub fn target_value_type(&self) -> Option<ValueType> {
        self.statistic_type().target_value_type()
    }

    #[must_use]
    pub fn values_source(&self) -> &ValuesSourceSpec {
        &self.values_source
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn sub_aggregations(&self) -> &[AggregationDefinition] {
        &self.sub_aggregations
    }

    /// Levels of nesting below and including this definition.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .sub_aggregations
            .iter()
            .map(Self::depth)
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AggregationError::invalid_request(
                "aggregation name must not be empty",
            ));
        }
        if !VALID_NAME.is_match(&self.name) {
            return Err(AggregationError::invalid_request(format!(
                "Invalid aggregation name [{}]. Aggregation names can contain any character except '[', ']', and '>'",
                self.name
            )));
        }
        if self.values_source.field.is_none() {
            return Err(AggregationError::invalid_request(format!(
                "Required [field] for aggregation [{}]",
                self.name
            )));
        }
        self.statistic.validate(&self.name)?;
        if !self.sub_aggregations.is_empty() && !self.statistic_type().accepts_sub_aggregations() {
            return Err(AggregationError::invalid_request(format!(
                "Aggregator [{}] of type [{}] cannot accept sub-aggregations",
                self.name,
                self.statistic_type()
            )));
        }
        check_sibling_names(&self.sub_aggregations)
    }

    /* ---------- wire ---------- */

    /// Write the tag, the common header, the type state and the sub-aggregations.
    ///
    /// # Errors
    ///
    /// Propagates stream errors.
    pub fn write_to(&self, out: &mut StreamOutput) -> Result<()> {
        out.write_string(self.statistic_type().tag())?;
        out.write_string(&self.name)?;
        out.write(&self.values_source_type().id())?;
        out.write_optional(self.target_value_type().as_ref(), |out, vt| vt.write_to(out))?;
        self.statistic.write_state(out)?;
        self.values_source.write_to(out)?;
        let metadata = self
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AggregationError::invalid_request(format!("unwritable [meta] ({e})")))?;
        out.write_optional_string(metadata.as_deref())?;
        out.write_vu64(self.sub_aggregations.len() as u64)?;
        for sub in &self.sub_aggregations {
            sub.write_to(out)?;
        }
        Ok(())
    }

    /// Inverse of [`AggregationDefinition::write_to`], dispatching on the tag through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Deserialization`] for an unknown tag, a header
    /// that disagrees with the registered type, corrupt or truncated state, or
    /// nesting deeper than [`MAX_NESTING_DEPTH`].
    pub fn read_from(registry: &StatisticRegistry, input: &mut StreamInput<'_>) -> Result<Self> {
        Self::read_nested(registry, input, 1)
    }

    fn read_nested(
        registry: &StatisticRegistry,
        input: &mut StreamInput<'_>,
        depth: usize,
    ) -> Result<Self> {
        if depth > MAX_NESTING_DEPTH {
            return Err(AggregationError::deserialization(format!(
                "aggregations nest deeper than [{MAX_NESTING_DEPTH}] levels"
            )));
        }
        let tag = input.read_string()?;
        let name = input.read_string()?;
        let values_source_type = ValuesSourceType::from_id(input.read()?)?;
        let target_value_type = input.read_optional(ValueType::read_from)?;

        let ty = registry.lookup(&tag).ok_or_else(|| {
            AggregationError::deserialization(format!(
                "unknown aggregation type [{tag}] for [{name}]"
            ))
        })?;
        if ty.values_source_type() != values_source_type || ty.target_value_type() != target_value_type {
            return Err(AggregationError::deserialization(format!(
                "aggregation [{name}] of type [{tag}] arrived with values source [{values_source_type}] \
                 and value type [{}], which this node does not register for that type",
                target_value_type.map_or("none", ValueType::name)
            )));
        }

        let header = StateHeader {
            name: &name,
            values_source_type,
            target_value_type,
        };
        let statistic = registry.read_state(&tag, &header, input)?;
        let values_source = ValuesSourceSpec::read_from(input)?;
        let metadata = input
            .read_optional_string()?
            .map(|text| serde_json::from_str::<Metadata>(&text))
            .transpose()
            .map_err(|e| {
                AggregationError::deserialization(format!("corrupt [meta] for [{name}] ({e})"))
            })?;

        let count = input.read_vu64()?;
        let mut sub_aggregations = Vec::new();
        for _ in 0..count {
            sub_aggregations.push(Self::read_nested(registry, input, depth + 1)?);
        }

        let definition = Self {
            name,
            statistic,
            values_source,
            metadata,
            sub_aggregations,
        };
        definition.validate().map_err(|e| match e {
            AggregationError::InvalidRequest { reason } => AggregationError::deserialization(reason),
            other => other,
        })?;
        Ok(definition)
    }

    /* ---------- structural identity ---------- */

    /// Hash of the statistic type, its state and the value-source configuration.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.statistic.hash_structure(&mut h);
        self.values_source.hash(&mut h);
        h.finish()
    }

    /// Whether `other` computes the same value, regardless of name, metadata and nesting.
    #[must_use]
    pub fn structural_eq(&self, other: &Self) -> bool {
        self.statistic.structural_eq(&other.statistic) && self.values_source == other.values_source
    }

    /* ---------- declarative form ---------- */

    /// Render `"<name>": { "<tag>": {...}, "meta": {...}, "aggs": {...} }` into an open object.
    ///
    /// # Errors
    ///
    /// Propagates document errors.
    pub fn render(&self, doc: &mut DocumentBuilder) -> Result<()> {
        doc.start_object_field(self.name.as_str())?;
        self.render_body(doc)?;
        if let Some(metadata) = &self.metadata {
            doc.field("meta", Value::Object(metadata.clone()))?;
        }
        if !self.sub_aggregations.is_empty() {
            doc.start_object_field("aggs")?;
            for sub in &self.sub_aggregations {
                sub.render(doc)?;
            }
            doc.end_object()?;
        }
        doc.end_object()?;
        Ok(())
    }

    /// Render only `"<tag>": { field..., <type parameters> }` into an open object.
    ///
    /// # Errors
    ///
    /// Propagates document errors.
    pub fn render_body<'d>(&self, doc: &'d mut DocumentBuilder) -> Result<&'d mut DocumentBuilder> {
        doc.start_object_field(self.statistic_type().tag())?;
        self.values_source.render(doc)?;
        self.statistic.render_body(doc)?.end_object()
    }

    /// The definition as a standalone JSON document.
    ///
    /// # Errors
    ///
    /// Propagates document errors.
    pub fn to_document(&self) -> Result<Value> {
        let mut doc = DocumentBuilder::new();
        doc.start_object()?;
        self.render(&mut doc)?;
        doc.end_object()?;
        doc.finish()
    }

    /* ---------- binding ---------- */

    /// Bind this definition to a shard.
    ///
    /// `source` is the value-source configuration already resolved against the
    /// shard's mapping; `parent` is the enclosing factory when nested;
    /// `sub_factories` are the already-built children.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Resolution`] if `source` cannot feed the
    /// statistic and [`AggregationError::InvalidRequest`] if children are given to
    /// a statistic that cannot hold them. No factory is produced in either case.
    pub fn build(
        &self,
        ctx: &ExecutionContext,
        source: ResolvedValuesSource,
        parent: Option<&AggregatorFactory>,
        sub_factories: AggregatorFactories,
    ) -> Result<AggregatorFactory> {
        if !source.is_unmapped() && !self.values_source_type().accepts(source.source_type) {
            return Err(AggregationError::resolution(
                &self.name,
                format!(
                    "Field [{}] of type [{}] is not supported for aggregation [{}]",
                    source.field,
                    source.type_name(),
                    self.statistic_type()
                ),
            ));
        }
        if !sub_factories.is_empty() && !self.statistic_type().accepts_sub_aggregations() {
            return Err(AggregationError::invalid_request(format!(
                "Aggregator [{}] of type [{}] cannot accept sub-aggregations",
                self.name,
                self.statistic_type()
            )));
        }
        debug!(
            "shard [{}] bound [{}] of type [{}] to field [{}] ({})",
            ctx.shard_id(),
            self.name,
            self.statistic_type(),
            source.field,
            source.type_name()
        );
        Ok(AggregatorFactory::new(
            ctx,
            &self.name,
            parent,
            self.statistic.clone(),
            source,
            sub_factories,
        ))
    }
}

/// Reject sibling definitions that share a name.
pub(crate) fn check_sibling_names(siblings: &[AggregationDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for sibling in siblings {
        if !seen.insert(sibling.name()) {
            return Err(AggregationError::invalid_request(format!(
                "Two sibling aggregations cannot have the same name: [{}]",
                sibling.name()
            )));
        }
    }
    Ok(())
}

/// Hash map key comparing definitions structurally.
#[derive(Clone, Copy, Debug)]
pub struct StructuralKey<'a>(pub &'a AggregationDefinition);

impl PartialEq for StructuralKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.structural_eq(other.0)
    }
}

impl Eq for StructuralKey<'_> {}

impl Hash for StructuralKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.structural_hash());
    }
}

//! Execution factories: definitions bound to one shard.
//!
//! A factory owns no aggregation state. It keeps what is needed to create a
//! fresh [`ComputationUnit`](crate::units::ComputationUnit) for every segment
//! the shard visits.

use crate::config::ContextConfig;
use crate::context::{CircuitBreaker, ExecutionContext};
use crate::definition::{AggregationDefinition, StructuralKey, check_sibling_names};
use crate::error::Result;
use crate::index::{FieldValueSource, Segment};
use crate::statistic::Statistic;
use crate::units::{self, ComputationUnit, UnitSet};
use crate::values::ResolvedValuesSource;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// One definition bound to one shard.
#[derive(Clone, Debug)]
pub struct AggregatorFactory {
    name: String,
    /// Names from the root aggregation down to this one.
    path: Vec<String>,
    statistic: Statistic,
    source: ResolvedValuesSource,
    sub_factories: AggregatorFactories,
    breaker: Arc<CircuitBreaker>,
    config: ContextConfig,
}

impl AggregatorFactory {
    pub(crate) fn new(
        ctx: &ExecutionContext,
        name: &str,
        parent: Option<&AggregatorFactory>,
        statistic: Statistic,
        source: ResolvedValuesSource,
        sub_factories: AggregatorFactories,
    ) -> Self {
        let mut path = parent.map(|p| p.path.clone()).unwrap_or_default();
        path.push(name.to_string());
        Self {
            name: name.to_string(),
            path,
            statistic,
            source,
            sub_factories,
            breaker: Arc::clone(ctx.breaker()),
            config: ctx.config().clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `outer>inner` path of this aggregation.
    #[must_use]
    pub fn path(&self) -> String {
        self.path.join(">")
    }

    #[must_use]
    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    #[must_use]
    pub fn source(&self) -> &ResolvedValuesSource {
        &self.source
    }

    #[must_use]
    pub fn sub_factories(&self) -> &AggregatorFactories {
        &self.sub_factories
    }

    /// Replace the children, keeping everything else.
    #[must_use]
    pub fn with_sub_factories(self, sub_factories: AggregatorFactories) -> Self {
        Self {
            sub_factories,
            ..self
        }
    }

    /// Estimated bytes a unit over `segment` may hold.
    fn estimate_bytes(&self, segment: &Segment) -> u64 {
        let per_value = self.config.bytes_per_value;
        let retained = match &self.statistic {
            Statistic::Percentiles(_) => u64::from(segment.max_doc()),
            Statistic::Cardinality(c) => (c.effective_threshold() as u64).min(u64::from(segment.max_doc())),
            _ => 0,
        };
        self.config
            .unit_overhead_bytes
            .saturating_add(retained.saturating_mul(per_value))
    }

    /// Create the unit that collects `segment`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::CircuitBreaking`](crate::AggregationError::CircuitBreaking)
    /// when the unit's estimated memory does not fit the request breaker.
    pub fn create_unit(&self, segment: &Arc<Segment>) -> Result<Box<dyn ComputationUnit>> {
        let reservation = self
            .breaker
            .reserve(&self.path(), self.estimate_bytes(segment))?;
        let source = FieldValueSource::new(segment, &self.source);
        let sub_units = if self.sub_factories.is_empty() {
            None
        } else {
            Some(self.sub_factories.create_units(segment)?)
        };
        Ok(units::create(&self.statistic, source, sub_units, reservation))
    }
}

/// Sibling factories, with structurally-equal leaves sharing one computation.
#[derive(Clone, Debug, Default)]
pub struct AggregatorFactories {
    factories: Vec<AggregatorFactory>,
    /// Index of the factory whose result each factory reports.
    computed_by: Vec<usize>,
}

impl AggregatorFactories {
    /// Resolve and bind `definitions` on the shard of `ctx`, recursively.
    ///
    /// # Errors
    ///
    /// Returns the first resolution or binding error.
    pub fn build(
        ctx: &ExecutionContext,
        definitions: &[AggregationDefinition],
        parent: Option<&AggregatorFactory>,
    ) -> Result<Self> {
        check_sibling_names(definitions)?;
        let mut factories: Vec<AggregatorFactory> = Vec::with_capacity(definitions.len());
        let mut computed_by = Vec::with_capacity(definitions.len());
        let mut leaves: HashMap<StructuralKey<'_>, usize> = HashMap::new();

        for (i, def) in definitions.iter().enumerate() {
            let source =
                ctx.resolver()
                    .resolve(def.name(), def.values_source(), def.target_value_type())?;
            let factory = def.build(ctx, source, parent, Self::default())?;
            let factory = if def.sub_aggregations().is_empty() {
                factory
            } else {
                let subs = Self::build(ctx, def.sub_aggregations(), Some(&factory))?;
                factory.with_sub_factories(subs)
            };

            let owner = if ctx.config().deduplicate_siblings && def.sub_aggregations().is_empty() {
                *leaves.entry(StructuralKey(def)).or_insert(i)
            } else {
                i
            };
            if owner != i {
                debug!(
                    "[{}] reuses the computation of structurally equal sibling [{}]",
                    factory.path(),
                    factories[owner].path()
                );
            }
            factories.push(factory);
            computed_by.push(owner);
        }
        Ok(Self {
            factories,
            computed_by,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregatorFactory> {
        self.factories.iter()
    }

    /// Number of distinct computations, after sharing.
    #[must_use]
    pub fn computations(&self) -> usize {
        self.computed_by
            .iter()
            .enumerate()
            .filter(|(i, owner)| i == *owner)
            .count()
    }

    /// Units for one segment, one per distinct computation.
    ///
    /// # Errors
    ///
    /// See [`AggregatorFactory::create_unit`].
    pub fn create_units(&self, segment: &Arc<Segment>) -> Result<UnitSet> {
        let mut units = Vec::with_capacity(self.factories.len());
        for (i, factory) in self.factories.iter().enumerate() {
            units.push(if self.computed_by[i] == i {
                Some(factory.create_unit(segment)?)
            } else {
                None
            });
        }
        let names = self.factories.iter().map(|f| f.name.clone()).collect();
        Ok(UnitSet::new(names, units, self.computed_by.clone()))
    }
}

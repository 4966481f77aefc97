//! Computation units: per-segment collectors created by factories.
//!
//! Each unit is owned by the task processing its segment, so it needs no
//! locking. A unit folds the values of every collected document into a
//! combiner accumulator and hands that accumulator back as a [`PartialResult`].

use crate::combiners::{
    Average, Cardinality, CombineFn, ExtendedStats, ExtendedStatsAcc, Max, Min, Percentiles,
    SortedSample, Stats, Sum, ValueCount,
};
use crate::context::Reservation;
use crate::index::{DocId, FieldValueSource};
use crate::result::{NamedResult, PartialResult};
use crate::statistic::Statistic;
use log::trace;
use std::marker::PhantomData;

/// Collects one segment for one aggregation.
pub trait ComputationUnit: Send {
    /// Feed a matching document.
    fn collect(&mut self, doc: DocId);

    /// Give up the accumulated state.
    fn finish(self: Box<Self>) -> PartialResult;
}

type IntoResult<A> = Box<dyn FnOnce(A) -> PartialResult + Send>;

/// Folds the numeric values of each document through `C`.
struct NumericUnit<C, A, O> {
    combiner: C,
    acc: A,
    source: FieldValueSource,
    scratch: Vec<f64>,
    into_result: IntoResult<A>,
    _reservation: Reservation,
    _out: PhantomData<fn() -> O>,
}

impl<C, A, O> NumericUnit<C, A, O>
where
    C: CombineFn<f64, A, O>,
    A: Send + 'static,
    O: 'static,
{
    fn boxed(
        combiner: C,
        source: FieldValueSource,
        reservation: Reservation,
        into_result: impl FnOnce(A) -> PartialResult + Send + 'static,
    ) -> Box<dyn ComputationUnit> {
        Box::new(Self {
            acc: combiner.create(),
            combiner,
            source,
            scratch: Vec::new(),
            into_result: Box::new(into_result),
            _reservation: reservation,
            _out: PhantomData,
        })
    }
}

impl<C, A, O> ComputationUnit for NumericUnit<C, A, O>
where
    C: CombineFn<f64, A, O>,
    A: Send,
{
    fn collect(&mut self, doc: DocId) {
        self.source.numeric_values(doc, &mut self.scratch);
        for &v in &self.scratch {
            self.combiner.add_input(&mut self.acc, v);
        }
    }

    fn finish(self: Box<Self>) -> PartialResult {
        let this = *self;
        (this.into_result)(this.acc)
    }
}

/// Folds the value hashes of each document through `C`. Works for any field type.
struct HashUnit<C, A, O> {
    combiner: C,
    acc: A,
    source: FieldValueSource,
    scratch: Vec<u64>,
    into_result: IntoResult<A>,
    _reservation: Reservation,
    _out: PhantomData<fn() -> O>,
}

impl<C, A, O> HashUnit<C, A, O>
where
    C: CombineFn<u64, A, O>,
    A: Send + 'static,
    O: 'static,
{
    fn boxed(
        combiner: C,
        source: FieldValueSource,
        reservation: Reservation,
        into_result: impl FnOnce(A) -> PartialResult + Send + 'static,
    ) -> Box<dyn ComputationUnit> {
        Box::new(Self {
            acc: combiner.create(),
            combiner,
            source,
            scratch: Vec::new(),
            into_result: Box::new(into_result),
            _reservation: reservation,
            _out: PhantomData,
        })
    }
}

impl<C, A, O> ComputationUnit for HashUnit<C, A, O>
where
    C: CombineFn<u64, A, O>,
    A: Send,
{
    fn collect(&mut self, doc: DocId) {
        self.source.value_hashes(doc, &mut self.scratch);
        for &h in &self.scratch {
            self.combiner.add_input(&mut self.acc, h);
        }
    }

    fn finish(self: Box<Self>) -> PartialResult {
        let this = *self;
        (this.into_result)(this.acc)
    }
}

/// Single bucket of documents without a value, feeding its own sub-units.
struct MissingUnit {
    source: FieldValueSource,
    doc_count: u64,
    sub_units: Option<UnitSet>,
    _reservation: Reservation,
}

impl ComputationUnit for MissingUnit {
    fn collect(&mut self, doc: DocId) {
        if self.source.value_count(doc) == 0 {
            self.doc_count += 1;
            if let Some(subs) = &mut self.sub_units {
                subs.collect(doc);
            }
        }
    }

    fn finish(self: Box<Self>) -> PartialResult {
        PartialResult::Missing {
            doc_count: self.doc_count,
            sub_results: self.sub_units.map(UnitSet::finish).unwrap_or_default(),
        }
    }
}

/// Build the unit computing `statistic` over `source`.
pub(crate) fn create(
    statistic: &Statistic,
    source: FieldValueSource,
    sub_units: Option<UnitSet>,
    reservation: Reservation,
) -> Box<dyn ComputationUnit> {
    trace!(
        "creating [{}] unit holding {} bytes",
        statistic.statistic_type(),
        reservation.bytes()
    );
    match statistic {
        Statistic::ValueCount(_) => {
            HashUnit::<_, _, u64>::boxed(ValueCount, source, reservation, PartialResult::ValueCount)
        }
        Statistic::Sum(_) => NumericUnit::boxed(Sum, source, reservation, PartialResult::Sum),
        Statistic::Min(_) => NumericUnit::boxed(Min, source, reservation, PartialResult::Min),
        Statistic::Max(_) => NumericUnit::boxed(Max, source, reservation, PartialResult::Max),
        Statistic::Avg(_) => NumericUnit::boxed(Average, source, reservation, PartialResult::Avg),
        Statistic::Stats(_) => NumericUnit::boxed(Stats, source, reservation, PartialResult::Stats),
        Statistic::ExtendedStats(b) => {
            let sigma = b.sigma();
            NumericUnit::boxed(ExtendedStats::new(sigma), source, reservation, move |acc: ExtendedStatsAcc| {
                PartialResult::ExtendedStats { sigma, acc }
            })
        }
        Statistic::Percentiles(b) => {
            let percents = b.percents();
            let keyed = b.is_keyed();
            NumericUnit::boxed(
                Percentiles::new(percents.clone()),
                source,
                reservation,
                move |mut sample: SortedSample| {
                    sample.seal();
                    PartialResult::Percentiles {
                        percents,
                        keyed,
                        sample,
                    }
                },
            )
        }
        Statistic::Cardinality(b) => HashUnit::boxed(
            Cardinality::new(b.effective_threshold()),
            source,
            reservation,
            PartialResult::Cardinality,
        ),
        Statistic::Missing(_) => Box::new(MissingUnit {
            source,
            doc_count: 0,
            sub_units,
            _reservation: reservation,
        }),
    }
}

/// Units of sibling aggregations over one segment.
///
/// Siblings that share a computation have no unit of their own and report a
/// copy of their owner's result.
pub struct UnitSet {
    names: Vec<String>,
    units: Vec<Option<Box<dyn ComputationUnit>>>,
    computed_by: Vec<usize>,
}

impl std::fmt::Debug for UnitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSet")
            .field("names", &self.names)
            .field("computed_by", &self.computed_by)
            .finish_non_exhaustive()
    }
}

impl UnitSet {
    pub(crate) fn new(
        names: Vec<String>,
        units: Vec<Option<Box<dyn ComputationUnit>>>,
        computed_by: Vec<usize>,
    ) -> Self {
        Self {
            names,
            units,
            computed_by,
        }
    }

    /// Feed `doc` to every unit.
    pub fn collect(&mut self, doc: DocId) {
        for unit in self.units.iter_mut().flatten() {
            unit.collect(doc);
        }
    }

    /// Finish every unit and name the results in sibling order.
    #[must_use]
    pub fn finish(self) -> Vec<NamedResult> {
        let computed: Vec<Option<PartialResult>> = self
            .units
            .into_iter()
            .map(|unit| unit.map(|u| u.finish()))
            .collect();
        self.names
            .into_iter()
            .zip(self.computed_by)
            .filter_map(|(name, owner)| {
                computed[owner]
                    .clone()
                    .map(|result| NamedResult::new(name, result))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::CircuitBreaker;
    use crate::index::{Document, Segment};
    use crate::statistic::{CardinalityBuilder, StatsBuilder, ValueCountBuilder};
    use crate::values::{FieldKind, ResolvedValuesSource};
    use std::sync::Arc;
    use test_log::test;

    fn segment() -> Arc<Segment> {
        Arc::new(Segment::new(vec![
            Document::new().with("latency_ms", 10i64).with("host", "a"),
            Document::new().with_values("latency_ms", [20i64, 30]).with("host", "b"),
            Document::new().with("host", "a"),
        ]))
    }

    fn source(field: &str, kind: FieldKind) -> FieldValueSource {
        let resolved = ResolvedValuesSource {
            field: field.into(),
            kind: Some(kind),
            source_type: kind.values_source_type(),
            missing: None,
            format: None,
        };
        FieldValueSource::new(&segment(), &resolved)
    }

    fn run(statistic: Statistic, source: FieldValueSource) -> PartialResult {
        let breaker = Arc::new(CircuitBreaker::new(1024));
        let mut unit = create(&statistic, source, None, breaker.reserve("t", 1).unwrap());
        for doc in 0..3 {
            unit.collect(doc);
        }
        unit.finish()
    }

    #[test]
    fn stats_unit_folds_multi_valued_documents() {
        let result = run(StatsBuilder.into(), source("latency_ms", FieldKind::Long));
        let stats = result.stats().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum, 60.0);
        assert_eq!(stats.min, Some(10.0));
    }

    #[test]
    fn hash_units_read_keywords() {
        assert_eq!(
            run(ValueCountBuilder.into(), source("host", FieldKind::Keyword)),
            PartialResult::ValueCount(3)
        );
        let distinct = run(CardinalityBuilder::new().into(), source("host", FieldKind::Keyword));
        assert_eq!(distinct.value(), Some(2.0));
    }

    #[test]
    fn missing_unit_counts_documents_without_values() {
        let breaker = Arc::new(CircuitBreaker::new(1024));
        let mut unit = create(
            &crate::statistic::MissingBuilder.into(),
            source("latency_ms", FieldKind::Long),
            None,
            breaker.reserve("t", 1).unwrap(),
        );
        for doc in 0..3 {
            unit.collect(doc);
        }
        assert_eq!(unit.finish().value(), Some(1.0));
        assert_eq!(breaker.used(), 0);
    }
}

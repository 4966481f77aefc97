//! Assertion functions for the definition contracts.

use crate::definition::AggregationDefinition;
use crate::registry::StatisticRegistry;
use crate::stream::{StreamInput, StreamOutput, WireVersion};

/// Write `def` at `version`, read it back with the builtin registry and assert
/// the copy equals the original. Returns the copy.
///
/// # Panics
///
/// Panics if writing or reading fails, if bytes are left over, or if the copy differs.
///
/// # Example
///
/// ```
/// use shardagg::testing::assert_round_trip;
/// use shardagg::{AggregationDefinition, SumBuilder, WireVersion};
///
/// let def = AggregationDefinition::builder("bytes", SumBuilder).field("size").finish().unwrap();
/// let copy = assert_round_trip(&def, WireVersion::V1);
/// assert_eq!(copy.name(), "bytes");
/// ```
#[must_use = "the decoded copy is returned for further checks"]
pub fn assert_round_trip(def: &AggregationDefinition, version: WireVersion) -> AggregationDefinition {
    let mut out = StreamOutput::new(version);
    if let Err(e) = def.write_to(&mut out) {
        panic!("failed to write [{}] at {version}: {e}", def.name());
    }
    let bytes = out.into_bytes();

    let mut input = StreamInput::new(&bytes, version);
    let read = match AggregationDefinition::read_from(&StatisticRegistry::builtin(), &mut input) {
        Ok(read) => read,
        Err(e) => panic!("failed to read [{}] back at {version}: {e}", def.name()),
    };
    assert!(
        input.is_exhausted(),
        "reading [{}] at {version} left bytes behind",
        def.name()
    );
    assert_eq!(
        &read, def,
        "wire round trip at {version} changed the definition"
    );
    read
}

/// Assert the declarative form of `def` is byte-identical after a wire round trip.
///
/// # Panics
///
/// Panics if rendering fails or the two renderings differ.
pub fn assert_render_stable(def: &AggregationDefinition) {
    let copy = assert_round_trip(def, WireVersion::CURRENT);
    let render = |d: &AggregationDefinition| match d.to_document() {
        Ok(doc) => doc.to_string().into_bytes(),
        Err(e) => panic!("failed to render [{}]: {e}", d.name()),
    };
    assert_eq!(
        render(def),
        render(&copy),
        "rendering of [{}] changed after a round trip",
        def.name()
    );
}

/// Assert structural equality and structural hash agree for `a` and `b`, in
/// both directions and against themselves.
///
/// # Panics
///
/// Panics if equal definitions hash differently or equality is not symmetric.
pub fn assert_structural_consistency(a: &AggregationDefinition, b: &AggregationDefinition) {
    assert!(a.structural_eq(a), "[{}] is not structurally equal to itself", a.name());
    assert!(b.structural_eq(b), "[{}] is not structurally equal to itself", b.name());
    assert_eq!(
        a.structural_eq(b),
        b.structural_eq(a),
        "structural equality of [{}] and [{}] is not symmetric",
        a.name(),
        b.name()
    );
    if a.structural_eq(b) {
        assert_eq!(
            a.structural_hash(),
            b.structural_hash(),
            "[{}] and [{}] are structurally equal but hash differently",
            a.name(),
            b.name()
        );
    }
}

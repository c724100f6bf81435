//! SEQUENCE / SET / SEQUENCE OF / SET OF decoding: the no-Spec
//! record-vs-collection heuristic, schema-guided record decode with
//! optional/defaulted component relocation via a tag map built from the
//! current position forward, and open-type re-entry through a fresh
//! cursor over stored bytes.

use crate::cursor::Cursor;
use crate::engine::{DecodeOptions, DecodeOutcome, Engine, ValueDecoder};
use crate::registry::universal_tag;
use crate::schema::{NamedTypes, Spec, TagMap, TagMapSpec};
use asn1_core::error::{Asn1Error, Asn1Result};
use asn1_core::length::Length;
use asn1_core::tag::{TagForm, TagSet};
use asn1_core::value::{Value, ValueKind};
use std::collections::HashSet;
use std::sync::Arc;

fn base_form(tag_set: &TagSet) -> TagForm {
    tag_set.base_tag().map(|t| t.form).unwrap_or(TagForm::Primitive)
}

fn is_set_tag(tag_set: &TagSet) -> bool {
    tag_set.base_tag().map(|t| t.number == universal_tag::SET).unwrap_or(false)
}

fn require_constructed(tag_set: &TagSet, what: &str) -> Asn1Result<()> {
    if base_form(tag_set) != TagForm::Constructed {
        return Err(Asn1Error::MalformedEncoding(format!("{what} must use the constructed form")));
    }
    Ok(())
}

// ------------------------------------------------------ no-Spec heuristic

fn decode_children_definite(
    cursor: &mut Cursor<'_>,
    end: usize,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Vec<Value>> {
    let mut out = Vec::new();
    while cursor.position() < end {
        out.push(engine.decode(cursor, None, options, depth)?);
    }
    Ok(out)
}

fn decode_children_indefinite(
    cursor: &mut Cursor<'_>,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Vec<Value>> {
    let mut out = Vec::new();
    loop {
        match engine.decode_allow_eoo(cursor, None, options, depth)? {
            DecodeOutcome::EndOfOctets => break,
            DecodeOutcome::Value(v) => out.push(v),
        }
    }
    Ok(out)
}

/// More than one distinct inner tag set observed ⇒ heterogeneous record
/// (SEQUENCE/SET); otherwise a homogeneous collection (SEQUENCE OF/SET OF).
fn looks_like_record(children: &[Value]) -> bool {
    let distinct: HashSet<&TagSet> = children.iter().map(|v| &v.tag_set).collect();
    distinct.len() > 1
}

fn log_guess(tag_set: &TagSet, is_set: bool, record: bool) {
    log::debug!(
        "no Spec for {tag_set}; guessed {} from {} distinct child tag set(s)",
        if record {
            if is_set { "SET" } else { "SEQUENCE" }
        } else if is_set {
            "SET OF"
        } else {
            "SEQUENCE OF"
        },
        if record { "more than one" } else { "at most one" },
    );
}

fn build_guessed(tag_set: &TagSet, is_set: bool, children: Vec<Value>) -> Value {
    let record = looks_like_record(&children);
    log_guess(tag_set, is_set, record);
    let kind = if record {
        let wrapped = children.into_iter().map(Some).collect();
        if is_set { ValueKind::Set(wrapped) } else { ValueKind::Sequence(wrapped) }
    } else if is_set {
        ValueKind::SetOf(children)
    } else {
        ValueKind::SequenceOf(children)
    };
    Value::new(tag_set.clone(), kind)
}

// --------------------------------------------------------- record decode

struct RecordOutcome {
    components: Vec<Option<Value>>,
}

fn decode_record(
    cursor: &mut Cursor<'_>,
    named_types: &NamedTypes,
    is_set: bool,
    length: Length,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<RecordOutcome> {
    let mut assigned: Vec<Option<Value>> = vec![None; named_types.len()];
    let mut position = 0usize;
    let deterministic = !is_set && !named_types.has_optional_or_default();
    let end = length.definite().map(|n| cursor.position() + n as usize);

    loop {
        if let Some(end) = end {
            if cursor.position() >= end {
                break;
            }
        }

        let (decoded, found) = if deterministic {
            if position >= named_types.len() {
                // All declared components are already assigned. In
                // indefinite-length mode the only valid next thing is the
                // EOO; `end.is_some()` (definite mode) can't reach here —
                // the loop's top-of-iteration check already broke out.
                match engine.decode_allow_eoo(cursor, None, options, depth)? {
                    DecodeOutcome::EndOfOctets => break,
                    DecodeOutcome::Value(_) => {
                        return Err(Asn1Error::SchemaMismatch(
                            "more components present than the SEQUENCE declares".into(),
                        ));
                    }
                }
            }
            let comp = named_types.get(position).expect("position checked above");
            let decoded = decode_one(cursor, Some(&comp.spec), end, engine, options, depth)?;
            match decoded {
                None => break,
                Some(v) => {
                    let found = position;
                    position += 1;
                    (v, found)
                }
            }
        } else {
            // SET: any remaining component may appear next, matched by
            // tag regardless of position. SEQUENCE with optional/default:
            // only components from the current position forward.
            let tag_map = if is_set {
                remaining_tag_map(named_types, &assigned)
            } else {
                named_types.tag_map_near_position(position)
            };
            let wrapper: Arc<dyn Spec> = TagMapSpec::new(tag_map);
            let decoded = decode_one(cursor, Some(&wrapper), end, engine, options, depth)?;
            match decoded {
                None => break,
                Some(v) => {
                    let found = if is_set {
                        named_types.position_by_type(&v.tag_set)
                    } else {
                        named_types.position_near_type(&v.tag_set, position)
                    }
                    .ok_or_else(|| {
                        Asn1Error::SchemaMismatch(format!(
                            "no component matches decoded tag set {}",
                            v.tag_set
                        ))
                    })?;
                    if assigned[found].is_some() {
                        return Err(Asn1Error::SchemaMismatch(format!(
                            "component '{}' decoded more than once",
                            named_types.get(found).map(|c| c.name).unwrap_or("?")
                        )));
                    }
                    log::debug!(
                        "{} component '{}' matched by tag set {}",
                        if is_set { "SET" } else { "SEQUENCE" },
                        named_types.get(found).map(|c| c.name).unwrap_or("?"),
                        v.tag_set,
                    );
                    if !is_set {
                        position = found + 1;
                    }
                    (v, found)
                }
            }
        };
        assigned[found] = Some(decoded);
    }

    for (i, nt) in named_types.iter().enumerate() {
        if assigned[i].is_none() {
            if let Some(default) = &nt.default {
                assigned[i] = Some(default.clone());
            } else if !nt.optional {
                return Err(Asn1Error::SchemaMismatch(format!(
                    "required component '{}' missing",
                    nt.name
                )));
            }
        }
    }

    Ok(RecordOutcome { components: assigned })
}

/// Decode one component TLV, or `None` at EOO (indefinite mode only).
fn decode_one(
    cursor: &mut Cursor<'_>,
    spec: Option<&Arc<dyn Spec>>,
    end: Option<usize>,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Option<Value>> {
    if end.is_some() {
        Ok(Some(engine.decode(cursor, spec, options, depth)?))
    } else {
        match engine.decode_allow_eoo(cursor, spec, options, depth)? {
            DecodeOutcome::EndOfOctets => Ok(None),
            DecodeOutcome::Value(v) => Ok(Some(v)),
        }
    }
}

fn remaining_tag_map(named_types: &NamedTypes, assigned: &[Option<Value>]) -> TagMap {
    let mut map = TagMap::new();
    for (i, c) in named_types.iter().enumerate() {
        if assigned[i].is_none() {
            map = map.insert(c.spec.tag_set(), c.spec.clone());
        }
    }
    map
}

// ------------------------------------------------------------- open types

fn governing_key(value: &Value) -> Option<Vec<u8>> {
    match &value.kind {
        ValueKind::ObjectIdentifier(arcs) => {
            Some(arcs.iter().map(u64::to_string).collect::<Vec<_>>().join(".").into_bytes())
        }
        ValueKind::Integer(bytes) => Some(bytes.clone()),
        ValueKind::OctetString(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

fn resolve_open_type(
    key: &[u8],
    named_type: &crate::schema::NamedType,
    options: &DecodeOptions<'_>,
) -> Option<Arc<dyn Spec>> {
    options
        .open_types
        .and_then(|table| table.get(key))
        .or_else(|| named_type.open_type_map.as_ref().and_then(|table| table.get(key)))
        .cloned()
}

/// Re-decode a stored open-type container under its resolved Spec.
/// SEQUENCE OF/SET OF containers are recursed element-wise: each raw
/// element is independently re-decoded under the same resolved Spec.
fn redecode_open_value(
    raw: &Value,
    resolved: &Arc<dyn Spec>,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Value> {
    match &raw.kind {
        ValueKind::SequenceOf(elements) => {
            let mut out = Vec::with_capacity(elements.len());
            for el in elements {
                out.push(redecode_open_value(el, resolved, engine, options, depth)?);
            }
            Ok(Value::new(raw.tag_set.clone(), ValueKind::SequenceOf(out)))
        }
        ValueKind::SetOf(elements) => {
            let mut out = Vec::with_capacity(elements.len());
            for el in elements {
                out.push(redecode_open_value(el, resolved, engine, options, depth)?);
            }
            Ok(Value::new(raw.tag_set.clone(), ValueKind::SetOf(out)))
        }
        _ => {
            let bytes = raw.as_octets().ok_or_else(|| {
                Asn1Error::SchemaMismatch(
                    "open-type component did not decode to a re-enterable container".into(),
                )
            })?;
            let mut cursor = Cursor::new(bytes);
            engine.decode(&mut cursor, Some(resolved), options, depth + 1)
        }
    }
}

fn apply_open_types(
    components: &mut [Option<Value>],
    named_types: &NamedTypes,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<()> {
    if !options.decode_open_types || !named_types.has_open_types() {
        return Ok(());
    }
    for (i, nt) in named_types.iter().enumerate() {
        if !nt.open_type {
            continue;
        }
        let Some(raw) = components[i].take() else { continue };
        let governing = components
            .get(nt.governed_by)
            .and_then(|v| v.as_ref())
            .and_then(governing_key);
        let resolved = governing.as_deref().and_then(|key| resolve_open_type(key, nt, options));
        components[i] = Some(match resolved {
            Some(spec) => redecode_open_value(&raw, &spec, engine, options, depth)?,
            None => raw,
        });
    }
    Ok(())
}

// ------------------------------------------------------- UniversalConstructedDecoder

/// SEQUENCE and SET: schema-guided record decode when a `Spec` with named
/// types is supplied, the no-Spec record/collection heuristic otherwise.
pub struct UniversalConstructedDecoder;

impl UniversalConstructedDecoder {
    fn decode(
        &self,
        cursor: &mut Cursor<'_>,
        tag_set: &TagSet,
        length: Length,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        require_constructed(tag_set, "SEQUENCE/SET")?;
        let is_set = is_set_tag(tag_set);

        match spec.and_then(|s| s.named_types()) {
            Some(named_types) if !named_types.is_empty() => {
                let mut outcome = decode_record(cursor, named_types, is_set, length, engine, options, depth)?;
                apply_open_types(&mut outcome.components, named_types, engine, options, depth)?;
                let kind = if is_set {
                    ValueKind::Set(outcome.components)
                } else {
                    ValueKind::Sequence(outcome.components)
                };
                Ok(Value::new(tag_set.clone(), kind))
            }
            Some(_) | None if spec.is_some() => {
                // declared record type with an empty component table:
                // decode every child with no Spec.
                let children = match length {
                    Length::Definite(n) => {
                        let end = cursor.position() + n as usize;
                        decode_children_definite(cursor, end, engine, options, depth)?
                    }
                    Length::Indefinite => decode_children_indefinite(cursor, engine, options, depth)?,
                };
                let wrapped = children.into_iter().map(Some).collect();
                let kind =
                    if is_set { ValueKind::Set(wrapped) } else { ValueKind::Sequence(wrapped) };
                Ok(Value::new(tag_set.clone(), kind))
            }
            _ => {
                let children = match length {
                    Length::Definite(n) => {
                        let end = cursor.position() + n as usize;
                        decode_children_definite(cursor, end, engine, options, depth)?
                    }
                    Length::Indefinite => decode_children_indefinite(cursor, engine, options, depth)?,
                };
                Ok(build_guessed(tag_set, is_set, children))
            }
        }
    }
}

impl ValueDecoder for UniversalConstructedDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        self.decode(cursor, tag_set, Length::Definite(length), spec, engine, options, depth)
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        self.decode(cursor, tag_set, Length::Indefinite, spec, engine, options, depth)
    }
}

// ------------------------------------------------- SequenceOfDecoder / SetOfDecoder

fn decode_homogeneous(
    cursor: &mut Cursor<'_>,
    tag_set: &TagSet,
    length: Length,
    spec: Option<&Arc<dyn Spec>>,
    is_set: bool,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Value> {
    require_constructed(tag_set, "SEQUENCE OF/SET OF")?;
    let component_spec = spec.and_then(|s| s.component_type()).cloned();
    let mut out = Vec::new();
    match length {
        Length::Definite(n) => {
            let end = cursor.position() + n as usize;
            while cursor.position() < end {
                out.push(engine.decode(cursor, component_spec.as_ref(), options, depth)?);
            }
        }
        Length::Indefinite => loop {
            match engine.decode_allow_eoo(cursor, component_spec.as_ref(), options, depth)? {
                DecodeOutcome::EndOfOctets => break,
                DecodeOutcome::Value(v) => out.push(v),
            }
        },
    }
    let kind = if is_set { ValueKind::SetOf(out) } else { ValueKind::SequenceOf(out) };
    Ok(Value::new(tag_set.clone(), kind))
}

pub struct SequenceOfDecoder;

impl ValueDecoder for SequenceOfDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        decode_homogeneous(cursor, tag_set, Length::Definite(length), spec, false, engine, options, depth)
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        decode_homogeneous(cursor, tag_set, Length::Indefinite, spec, false, engine, options, depth)
    }
}

pub struct SetOfDecoder;

impl ValueDecoder for SetOfDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        decode_homogeneous(cursor, tag_set, Length::Definite(length), spec, true, engine, options, depth)
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        decode_homogeneous(cursor, tag_set, Length::Indefinite, spec, true, engine, options, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::registry::Registry;
    use crate::schema::{LeafSpec, NamedType, RecordSpec, RepeatedSpec, TypeId};
    use asn1_core::tag::{Tag, TagForm};

    fn engine() -> Engine {
        Engine::new(Registry::universal())
    }

    fn int_spec() -> Arc<dyn Spec> {
        LeafSpec::new(TagSet::single(Tag::universal(TagForm::Primitive, 2)), TypeId::Integer)
    }

    #[test]
    fn schema_less_sequence_of_integer() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let bytes = [0x30, 0x09, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02, 0x02, 0x01, 0x03];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        match v.kind {
            ValueKind::SequenceOf(items) => {
                let ints: Vec<_> = items.iter().map(|i| i.integer_to_i128().unwrap()).collect();
                assert_eq!(ints, vec![1, 2, 3]);
            }
            other => panic!("expected SequenceOf, got {other:?}"),
        }
        assert_eq!(cur.position(), bytes.len());
    }

    #[test]
    fn schema_less_sequence_with_mixed_tags_guesses_record() {
        let eng = engine();
        let opts = DecodeOptions::default();
        // SEQUENCE { INTEGER 1, BOOLEAN TRUE }
        let bytes = [0x30, 0x06, 0x02, 0x01, 0x01, 0x01, 0x01, 0xFF];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert!(matches!(v.kind, ValueKind::Sequence(_)));
    }

    #[test]
    fn schema_guided_sequence_of() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let spec = RepeatedSpec::sequence_of(
            TagSet::single(Tag::universal(TagForm::Constructed, universal_tag::SEQUENCE)),
            int_spec(),
        );
        let bytes = [0x30, 0x06, 0x02, 0x01, 0x0A, 0x02, 0x01, 0x14];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, Some(&spec), &opts, 0).unwrap();
        match v.kind {
            ValueKind::SequenceOf(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].integer_to_i128(), Some(10));
            }
            other => panic!("expected SequenceOf, got {other:?}"),
        }
    }

    #[test]
    fn schema_guided_sequence_with_optional_component() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let named = NamedTypes::new(vec![
            NamedType::required("a", int_spec()),
            NamedType::optional("b", int_spec()),
        ]);
        let spec = RecordSpec::sequence(
            TagSet::single(Tag::universal(TagForm::Constructed, universal_tag::SEQUENCE)),
            named,
        );

        // Only "a" present.
        let bytes = [0x30, 0x03, 0x02, 0x01, 0x07];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, Some(&spec), &opts, 0).unwrap();
        match v.kind {
            ValueKind::Sequence(components) => {
                assert_eq!(components[0].as_ref().unwrap().integer_to_i128(), Some(7));
                assert!(components[1].is_none());
            }
            other => panic!("expected Sequence, got {other:?}"),
        }
    }

    #[test]
    fn schema_guided_sequence_missing_required_component_fails() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let named = NamedTypes::new(vec![NamedType::required("a", int_spec())]);
        let spec = RecordSpec::sequence(
            TagSet::single(Tag::universal(TagForm::Constructed, universal_tag::SEQUENCE)),
            named,
        );
        let bytes = [0x30, 0x00];
        let mut cur = Cursor::new(&bytes);
        assert!(eng.decode(&mut cur, Some(&spec), &opts, 0).is_err());
    }

    #[test]
    fn set_matches_components_by_tag_regardless_of_order() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let bool_spec = LeafSpec::new(TagSet::single(Tag::universal(TagForm::Primitive, 1)), TypeId::Boolean);
        let named = NamedTypes::new(vec![
            NamedType::required("flag", bool_spec),
            NamedType::required("count", int_spec()),
        ]);
        let spec = RecordSpec::set(
            TagSet::single(Tag::universal(TagForm::Constructed, universal_tag::SET)),
            named,
        );
        // On the wire: INTEGER first, then BOOLEAN — out of declaration order.
        let bytes = [0x31, 0x06, 0x02, 0x01, 0x2A, 0x01, 0x01, 0xFF];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, Some(&spec), &opts, 0).unwrap();
        match v.kind {
            ValueKind::Set(components) => {
                assert_eq!(components[0].as_ref().unwrap().kind, ValueKind::Boolean(true));
                assert_eq!(components[1].as_ref().unwrap().integer_to_i128(), Some(42));
            }
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn indefinite_length_sequence_of_matches_definite() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let spec = RepeatedSpec::sequence_of(
            TagSet::single(Tag::universal(TagForm::Constructed, universal_tag::SEQUENCE)),
            int_spec(),
        );
        let definite = [0x30, 0x06, 0x02, 0x01, 0x0A, 0x02, 0x01, 0x14];
        let indefinite = [0x30, 0x80, 0x02, 0x01, 0x0A, 0x02, 0x01, 0x14, 0x00, 0x00];

        let mut c1 = Cursor::new(&definite);
        let v1 = eng.decode(&mut c1, Some(&spec), &opts, 0).unwrap();
        let mut c2 = Cursor::new(&indefinite);
        let v2 = eng.decode(&mut c2, Some(&spec), &opts, 0).unwrap();
        assert_eq!(v1.kind, v2.kind);
        assert_eq!(c2.position(), indefinite.len());
    }
}

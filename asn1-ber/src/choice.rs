//! The CHOICE decoder. A CHOICE has no tag of its own unless explicitly
//! tagged; its Spec carries the alternatives' tag map instead of a fixed
//! tag set.
//!
//! `engine.rs`'s `GetValueDecoderByAsn1Spec` hands this decoder the whole
//! `ChoiceSpec` (never the resolved alternative) for both the explicit and
//! untagged case, so the two are told apart here by comparing `tag_set`
//! against the CHOICE's own (explicit) tag set.

use crate::cursor::Cursor;
use crate::engine::{DecodeOptions, DecodeOutcome, Engine, ValueDecoder};
use crate::schema::Spec;
use asn1_core::error::{Asn1Error, Asn1Result};
use asn1_core::length::Length;
use asn1_core::tag::TagSet;
use asn1_core::value::{Value, ValueKind};
use std::sync::Arc;

pub struct ChoiceDecoder;

impl ValueDecoder for ChoiceDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let s = spec.ok_or_else(|| {
            Asn1Error::SchemaMismatch("CHOICE requires a Spec to resolve its alternatives".into())
        })?;
        let alternatives = s.tag_map().ok_or_else(|| {
            Asn1Error::SchemaMismatch("CHOICE Spec carries no alternative tag map".into())
        })?;

        if *tag_set == s.tag_set() {
            // Explicitly tagged: the tag/length already consumed belong to
            // the CHOICE's own wrapper; decode exactly one inner TLV using
            // the alternatives as the Spec.
            log::debug!("CHOICE {tag_set} matches its own explicit tag; decoding inner alternative");
            let inner = engine.decode(cursor, Some(&wrap_alternatives(alternatives.clone())), options, depth)?;
            let effective = inner.tag_set.clone();
            return Ok(Value::new(effective, ValueKind::Choice(Box::new(inner))));
        }

        // Untagged: the tag/length already read are the alternative's own.
        // Re-dispatch the value using the resolved alternative's Spec
        // without re-reading the tag or length.
        let resolved = alternatives
            .get(tag_set)
            .or_else(|| tag_set.base_tag().and_then(|t| alternatives.get(&TagSet::single(*t))))
            .ok_or_else(|| Asn1Error::SchemaMismatch(format!("no CHOICE alternative for {tag_set}")))?;
        let value = engine.dispatch_resolved(
            cursor,
            tlv_start,
            tag_set,
            Length::Definite(length),
            &resolved,
            options,
            depth,
        )?;
        let effective = value.tag_set.clone();
        Ok(Value::new(effective, ValueKind::Choice(Box::new(value))))
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        tlv_start: usize,
        tag_set: &TagSet,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let s = spec.ok_or_else(|| {
            Asn1Error::SchemaMismatch("CHOICE requires a Spec to resolve its alternatives".into())
        })?;
        let alternatives = s.tag_map().ok_or_else(|| {
            Asn1Error::SchemaMismatch("CHOICE Spec carries no alternative tag map".into())
        })?;

        if *tag_set == s.tag_set() {
            let inner = engine.decode(cursor, Some(&wrap_alternatives(alternatives.clone())), options, depth)?;
            match engine.decode_allow_eoo(cursor, None, options, depth)? {
                DecodeOutcome::EndOfOctets => {}
                DecodeOutcome::Value(_) => {
                    return Err(Asn1Error::SchemaMismatch(
                        "missing EOO after indefinite-length explicit CHOICE".into(),
                    ))
                }
            }
            let effective = inner.tag_set.clone();
            return Ok(Value::new(effective, ValueKind::Choice(Box::new(inner))));
        }

        let resolved = alternatives
            .get(tag_set)
            .or_else(|| tag_set.base_tag().and_then(|t| alternatives.get(&TagSet::single(*t))))
            .ok_or_else(|| Asn1Error::SchemaMismatch(format!("no CHOICE alternative for {tag_set}")))?;
        let value = engine.dispatch_resolved(
            cursor,
            tlv_start,
            tag_set,
            Length::Indefinite,
            &resolved,
            options,
            depth,
        )?;
        let effective = value.tag_set.clone();
        Ok(Value::new(effective, ValueKind::Choice(Box::new(value))))
    }
}

/// Wrap an alternatives tag map as a standalone [`Spec`] so it can be
/// passed to `Engine::decode`, whose `GetValueDecoderByAsn1Spec` state
/// resolves the inner TLV's tag against it directly.
fn wrap_alternatives(alternatives: crate::schema::TagMap) -> Arc<dyn Spec> {
    crate::schema::ChoiceSpec::new(TagSet::empty(), alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DecodeOptions, Engine};
    use crate::registry::Registry;
    use crate::schema::{ChoiceSpec, LeafSpec, TagMap, TypeId};
    use asn1_core::tag::{Tag, TagForm};

    fn engine() -> Engine {
        Engine::new(Registry::universal())
    }

    #[test]
    fn untagged_choice_selects_matching_alternative() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let int_tag = TagSet::single(Tag::universal(TagForm::Primitive, 2));
        let bool_tag = TagSet::single(Tag::universal(TagForm::Primitive, 1));
        let alts = TagMap::new()
            .insert(int_tag.clone(), LeafSpec::new(int_tag, TypeId::Integer))
            .insert(bool_tag.clone(), LeafSpec::new(bool_tag, TypeId::Boolean));
        let choice_spec = ChoiceSpec::new(TagSet::empty(), alts);

        let mut cur = Cursor::new(&[0x02, 0x01, 0x07]);
        let v = eng.decode(&mut cur, Some(&choice_spec), &opts, 0).unwrap();
        match v.kind {
            ValueKind::Choice(inner) => assert_eq!(inner.integer_to_i128(), Some(7)),
            other => panic!("expected Choice, got {other:?}"),
        }
    }

    #[test]
    fn choice_decoded_standalone_equals_installed_alternative() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let int_tag = TagSet::single(Tag::universal(TagForm::Primitive, 2));
        let int_spec = LeafSpec::new(int_tag.clone(), TypeId::Integer);
        let alts = TagMap::new().insert(int_tag, int_spec.clone());
        let choice_spec = ChoiceSpec::new(TagSet::empty(), alts);

        let bytes = [0x02u8, 0x01, 0x2A];
        let mut cur1 = Cursor::new(&bytes);
        let standalone = eng.decode(&mut cur1, Some(&int_spec), &opts, 0).unwrap();

        let mut cur2 = Cursor::new(&bytes);
        let via_choice = eng.decode(&mut cur2, Some(&choice_spec), &opts, 0).unwrap();
        match via_choice.kind {
            ValueKind::Choice(inner) => assert_eq!(*inner, standalone),
            other => panic!("expected Choice, got {other:?}"),
        }
    }
}

//! The EXPLICIT-tag wrapper decoder: recurse into the engine on the
//! wrapper's contents, folding the wrapper's own tag into the accumulated
//! tag set so the decoded value's `tag_set` records the full EXPLICIT-tag
//! chain.

use crate::cursor::Cursor;
use crate::engine::{DecodeOptions, Engine, ValueDecoder};
use crate::schema::Spec;
use asn1_core::error::Asn1Result;
use asn1_core::tag::TagSet;
use asn1_core::value::{Value, ValueKind};
use std::sync::Arc;

pub struct ExplicitTagDecoder;

impl ValueDecoder for ExplicitTagDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        _length: u64,
        spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let inner_spec = spec.and_then(|s| s.component_type()).cloned();
        let inner =
            engine.decode_with_accumulated_tag_set(cursor, tag_set, inner_spec.as_ref(), options, depth)?;
        // Overall byte-count consistency with the wrapper's declared
        // length is checked by the caller (`engine.rs`'s `DecodeValue`
        // state), exactly as for any other decoder.
        let effective = inner.tag_set.clone();
        Ok(Value::new(effective, ValueKind::ExplicitTag(Box::new(inner))))
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
        let inner_spec = spec.and_then(|s| s.component_type()).cloned();
        let inner =
            engine.decode_with_accumulated_tag_set(cursor, tag_set, inner_spec.as_ref(), options, depth)?;
        if cursor.peek(2) == [0u8, 0u8] {
            cursor.read_bytes(2)?;
        } else {
            return Err(asn1_core::error::Asn1Error::SchemaMismatch(
                "indefinite-length EXPLICIT tag missing trailing EOO".into(),
            ));
        }
        let effective = inner.tag_set.clone();
        Ok(Value::new(effective, ValueKind::ExplicitTag(Box::new(inner))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::registry::Registry;

    fn engine() -> Engine {
        Engine::new(Registry::universal())
    }

    #[test]
    fn schema_less_explicit_tag_falls_back_automatically() {
        // context [0] EXPLICIT INTEGER, no Spec: the tag dispatch has no
        // entry for a context-specific constructed tag, so
        // `TryAsExplicitTag` kicks in unconditionally.
        let eng = engine();
        let opts = DecodeOptions::default();
        let bytes = [0xA0, 0x03, 0x02, 0x01, 0x05];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        match v.kind {
            ValueKind::ExplicitTag(inner) => assert_eq!(inner.integer_to_i128(), Some(5)),
            other => panic!("expected ExplicitTag, got {other:?}"),
        }
        assert_eq!(v.tag_set.len(), 2);
    }

    #[test]
    fn indefinite_explicit_tag_requires_trailing_eoo() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let bytes = [0xA0, 0x80, 0x02, 0x01, 0x05, 0x00, 0x00];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert_eq!(cur.position(), bytes.len());
        match v.kind {
            ValueKind::ExplicitTag(inner) => assert_eq!(inner.integer_to_i128(), Some(5)),
            other => panic!("expected ExplicitTag, got {other:?}"),
        }
    }
}

//! The ANY decoder. An ANY field accepts any tag; whether it is "tagged"
//! or "untagged" determines
//! whether the decoded bytes include the original TLV header.
//!
//! - Untagged ANY (no Spec, or Spec's tag map does not contain the
//!   encountered tag set): the decoder rewinds to the TLV's start and
//!   returns the verbatim header+value bytes.
//! - Tagged ANY (the encountered tag set is accepted by the Spec's tag
//!   map): only the value portion is returned.
//!
//! `engine.rs`'s `GetValueDecoderByAsn1Spec` always routes ANY-typed specs
//! here regardless of whether the tag matched, passing the resolved Spec
//! (the matched alternative, or the original ANY Spec on a miss) as
//! `spec`. This decoder tells the two cases apart by comparing that
//! resolved spec's identity against the caller's own `AnySpec`, which is
//! not observable through the `Spec` trait — so instead it keys off
//! whether `spec`'s tag map (if any) actually contains `tag_set`.

use crate::cursor::Cursor;
use crate::engine::{DecodeOptions, DecodeOutcome, Engine, ValueDecoder};
use crate::schema::Spec;
use asn1_core::error::Asn1Result;
use asn1_core::tag::TagSet;
use asn1_core::value::{Value, ValueKind};
use std::sync::Arc;

pub struct AnyDecoder;

/// True if `spec` accepts `tag_set` through its own tag map — i.e. this is
/// a "tagged ANY" and only the value portion should be kept.
fn is_tagged(spec: Option<&Arc<dyn Spec>>, tag_set: &TagSet) -> bool {
    match spec.and_then(|s| s.tag_map()) {
        Some(tag_map) => tag_map.get(tag_set).is_some(),
        None => false,
    }
}

impl ValueDecoder for AnyDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        let content = cursor.read_bytes(length as usize)?;
        let bytes = if is_tagged(spec, tag_set) {
            content.to_vec()
        } else {
            cursor.since(tlv_start).to_vec()
        };
        Ok(Value::new(tag_set.clone(), ValueKind::Any(bytes)))
    }

    /// Indefinite-length ANY consumes nested TLVs until EOO and
    /// concatenates their raw bytes as the contents portion of the outer
    /// ANY; no headers are fabricated for the removed EOO marker.
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
        let tagged = is_tagged(spec, tag_set);
        let content_start = cursor.position();
        loop {
            match engine.decode_allow_eoo(cursor, None, options, depth)? {
                DecodeOutcome::EndOfOctets => break,
                // the nested TLV's bytes are already part of the
                // contiguous span since content_start; nothing further to
                // collect per element, just keep scanning for EOO.
                DecodeOutcome::Value(_) => {}
            }
        }
        // drop the trailing EOO marker; it is not part of the ANY's contents.
        let span_start = if tagged { content_start } else { tlv_start };
        let span = cursor.since(span_start);
        let bytes = span[..span.len() - 2].to_vec();
        Ok(Value::new(tag_set.clone(), ValueKind::Any(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::registry::Registry;
    use crate::schema::AnySpec;

    fn engine() -> Engine {
        Engine::new(Registry::universal())
    }

    #[test]
    fn untagged_any_preserves_original_header() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let spec: Arc<dyn Spec> = AnySpec::new();
        let bytes = [0x02u8, 0x01, 0x05];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, Some(&spec), &opts, 0).unwrap();
        assert_eq!(v.kind, ValueKind::Any(bytes.to_vec()));
    }
}

//! The TLV dispatch engine: reads one tag/length pair, resolves a decoder
//! for it (by schema, by tag, or by falling back to an explicit-tag guess),
//! and hands off to that decoder's `decode_definite`/`decode_indefinite`.
//!
//! The dispatch logic is a single `loop { match state { ... } }` over
//! [`DecodeState`], the same shape a connection-level state machine uses
//! for its own transitions.

use crate::cursor::Cursor;
use crate::registry::Registry;
use crate::schema::{Spec, TypeId};
use asn1_core::error::{Asn1Error, Asn1Result};
use asn1_core::length::Length;
use asn1_core::tag::{Tag, TagClass, TagForm, TagSet};
use asn1_core::value::{Value, ValueKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Construction-time engine configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Whether indefinite-length TLVs (length octet `0x80`) are accepted.
    pub support_indefinite_length: bool,
    /// Recursion guard: a pathological deeply-nested input fails cleanly
    /// instead of overflowing the call stack.
    pub max_depth: usize,
    /// When `TryAsExplicitTag` fails to find an explicit-tag shape, return
    /// the raw TLV as an ANY value (`DumpRawValue`) instead of failing.
    pub fallback_to_raw_value: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            support_indefinite_length: true,
            max_depth: 64,
            fallback_to_raw_value: false,
        }
    }
}

/// A short-circuit hook that would receive a constructed value's raw
/// substrate bytes instead of its recursively decoded components. See
/// [`DecodeOptions::substrate_fun`].
pub type SubstrateFun<'a> = &'a dyn Fn(&Value, &[u8], u64) -> Value;

/// Per-call decode options.
#[derive(Clone, Default)]
pub struct DecodeOptions<'a> {
    /// Enable open-type resolution for components flagged `open_type` in
    /// their schema.
    pub decode_open_types: bool,
    /// Caller-supplied open-type lookup, takes precedence over any table
    /// embedded in the schema.
    pub open_types: Option<&'a HashMap<Vec<u8>, Arc<dyn Spec>>>,
    /// Deprecated fragment-collection hook: would receive a constructed
    /// value's prototype, its raw substrate bytes, and its length in
    /// place of recursing into its components. This engine always
    /// recurses and never calls it; kept on `DecodeOptions` so schemas
    /// ported from callers that set it still compile.
    pub substrate_fun: Option<SubstrateFun<'a>>,
    /// Deprecated: in the original API, disables recursion into
    /// constructed values entirely in favor of `substrate_fun`. Never
    /// read by this engine.
    pub recursive_flag: bool,
}

/// The outcome of one call into the engine: a decoded value, or the
/// end-of-contents sentinel consumed while decoding indefinite-length
/// containers. The sentinel never escapes the public API.
pub enum DecodeOutcome {
    Value(Value),
    EndOfOctets,
}

/// A decoder for one ASN.1 value shape (one universal primitive type, or
/// one of SEQUENCE/SET/SEQUENCE OF/SET OF/CHOICE/ANY/explicit-tag).
pub trait ValueDecoder: Send + Sync {
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
    ) -> Asn1Result<Value>;

    /// Decode the indefinite-length form. The default implementation
    /// rejects it; only constructed-shaped decoders (string types in
    /// constructed form, SEQUENCE/SET/SEQUENCE OF/SET OF/CHOICE/ANY,
    /// explicit tag) override this.
    ///
    /// `tlv_start` is the position of this TLV's first identifier octet —
    /// untagged ANY rewinds here to replay the header it would otherwise
    /// skip.
    fn decode_indefinite(
        &self,
        _cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        _tag_set: &TagSet,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        Err(Asn1Error::UnsupportedFeature(
            "indefinite length is not supported for this type".into(),
        ))
    }
}

/// Which dispatch state the loop is currently in.
enum DecodeState {
    DecodeTag,
    DecodeLength,
    GetValueDecoder,
    GetValueDecoderByAsn1Spec,
    GetValueDecoderByTag,
    TryAsExplicitTag,
    DecodeValue,
    DumpRawValue,
}

/// Short-form tag intern cache, keyed by the first identifier octet.
#[derive(Default)]
struct Caches {
    tags: HashMap<u8, Tag>,
}

/// A reusable decoding context: the type registry plus engine-wide
/// options and caches. Not `Sync` — the intern caches use `RefCell` — so
/// an `Engine` is built per thread/caller.
pub struct Engine {
    registry: Registry,
    options: EngineOptions,
    caches: RefCell<Caches>,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self::with_options(registry, EngineOptions::default())
    }

    pub fn with_options(registry: Registry, options: EngineOptions) -> Self {
        Self { registry, options, caches: RefCell::new(Caches::default()) }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Decode one top-level or nested value with no caller-accumulated tag
    /// set. This is the entry point value decoders use to recurse into
    /// nested TLVs (SEQUENCE/SET components, CHOICE alternatives, ANY
    /// elements).
    pub fn decode(
        &self,
        cursor: &mut Cursor<'_>,
        spec: Option<&Arc<dyn Spec>>,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        match self.decode_one(cursor, None, spec, options, depth, false)? {
            DecodeOutcome::Value(v) => Ok(v),
            DecodeOutcome::EndOfOctets => unreachable!("allow_eoo was false"),
        }
    }

    /// Like [`decode`](Self::decode), but returns the EOO sentinel instead
    /// of erroring if the next two octets are `00 00`. Used by
    /// indefinite-length container loops.
    pub fn decode_allow_eoo(
        &self,
        cursor: &mut Cursor<'_>,
        spec: Option<&Arc<dyn Spec>>,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<DecodeOutcome> {
        self.decode_one(cursor, None, spec, options, depth, true)
    }

    /// Fold a newly decoded tag onto an already-accumulated tag set before
    /// continuing the dispatch loop. Used by the explicit-tag decoder to
    /// recurse one level deeper while keeping the outer tag(s) attached to
    /// the eventually-produced `Value`.
    pub(crate) fn decode_with_accumulated_tag_set(
        &self,
        cursor: &mut Cursor<'_>,
        accumulated: &TagSet,
        spec: Option<&Arc<dyn Spec>>,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        match self.decode_one(cursor, Some(accumulated), spec, options, depth, false)? {
            DecodeOutcome::Value(v) => Ok(v),
            DecodeOutcome::EndOfOctets => unreachable!("allow_eoo was false"),
        }
    }

    /// Decode the value portion of an already-read tag/length pair under a
    /// specific resolved Spec, performing the same decoder lookup and
    /// length bookkeeping as the `DecodeValue` state. Used by
    /// [`crate::choice::ChoiceDecoder`] to reuse the tag and length it was
    /// handed when untagging a CHOICE alternative, and by the constructed
    /// decoder's SET/SEQUENCE-with-optional
    /// component relocation once a tag-map lookup has resolved which
    /// named type the just-decoded TLV belongs to.
    pub(crate) fn dispatch_resolved(
        &self,
        cursor: &mut Cursor<'_>,
        tlv_start: usize,
        tag_set: &TagSet,
        length: Length,
        resolved_spec: &Arc<dyn Spec>,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let base = tag_set.base_tag().copied();
        let dec = self
            .registry
            .type_map_get(resolved_spec.type_id())
            .or_else(|| self.registry.tag_map_get(&resolved_spec.tag_set()))
            .or_else(|| base.and_then(|t| self.registry.tag_map_get(&TagSet::single(t))))
            .ok_or_else(|| {
                Asn1Error::SchemaMismatch(format!("no decoder resolves tag set {tag_set}"))
            })?;
        match length {
            Length::Definite(n) => {
                let value_start = cursor.position();
                let v = dec.decode_definite(
                    cursor,
                    tlv_start,
                    tag_set,
                    n,
                    Some(resolved_spec),
                    self,
                    options,
                    depth + 1,
                )?;
                let consumed = (cursor.position() - value_start) as u64;
                if consumed != n {
                    return Err(Asn1Error::LengthMismatch { expected: n, consumed });
                }
                Ok(v)
            }
            Length::Indefinite => dec.decode_indefinite(
                cursor,
                tlv_start,
                tag_set,
                Some(resolved_spec),
                self,
                options,
                depth + 1,
            ),
        }
    }

    fn read_tag(&self, cursor: &mut Cursor<'_>) -> Asn1Result<Tag> {
        let first = cursor.peek(1);
        if let Some(&octet) = first.first() {
            if octet & 0x1F != 0x1F {
                if let Some(tag) = self.caches.borrow().tags.get(&octet) {
                    cursor.read_byte()?;
                    return Ok(*tag);
                }
            }
        }
        let octet = cursor.read_byte()?;
        let class = TagClass::from_bits(octet >> 6);
        let form = TagForm::from_bits((octet >> 5) & 1);
        let number = if octet & 0x1F == 0x1F {
            let mut n: u32 = 0;
            let mut continuation_octets = 0;
            loop {
                if continuation_octets >= 5 {
                    return Err(Asn1Error::MalformedEncoding(
                        "tag number continuation too long".into(),
                    ));
                }
                let b = cursor.read_byte()?;
                n = (n << 7) | (b & 0x7F) as u32;
                continuation_octets += 1;
                if b & 0x80 == 0 {
                    break;
                }
            }
            n
        } else {
            (octet & 0x1F) as u32
        };
        let tag = Tag::new(class, form, number);
        if octet & 0x1F != 0x1F {
            self.caches.borrow_mut().tags.insert(octet, tag);
        }
        Ok(tag)
    }

    fn read_length(&self, cursor: &mut Cursor<'_>) -> Asn1Result<Length> {
        let first = cursor.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(Length::Definite(first as u64));
        }
        let num_octets = (first & 0x7F) as usize;
        if num_octets == 0 {
            return Ok(Length::Indefinite);
        }
        if num_octets > 8 {
            return Err(Asn1Error::UnsupportedFeature(format!(
                "length field of {num_octets} octets exceeds u64 range"
            )));
        }
        let bytes = cursor.read_bytes(num_octets)?;
        let mut value: u64 = 0;
        for &b in bytes {
            value = (value << 8) | b as u64;
        }
        Ok(Length::Definite(value))
    }

    fn decode_one(
        &self,
        cursor: &mut Cursor<'_>,
        incoming_tag_set: Option<&TagSet>,
        spec: Option<&Arc<dyn Spec>>,
        options: &DecodeOptions<'_>,
        depth: usize,
        allow_eoo: bool,
    ) -> Asn1Result<DecodeOutcome> {
        if depth > self.options.max_depth {
            return Err(Asn1Error::SchemaMismatch(format!(
                "maximum nesting depth {} exceeded",
                self.options.max_depth
            )));
        }
        if allow_eoo && self.options.support_indefinite_length && cursor.peek(2) == [0u8, 0u8] {
            cursor.read_bytes(2)?;
            return Ok(DecodeOutcome::EndOfOctets);
        }

        let mut state = DecodeState::DecodeTag;
        let mark = cursor.position();
        let mut tag = Tag::universal(TagForm::Primitive, 0);
        let mut tag_set = TagSet::empty();
        let mut length = Length::Definite(0);
        let mut chosen_spec: Option<Arc<dyn Spec>> = None;
        let mut chosen_decoder: Option<Arc<dyn ValueDecoder>> = None;

        loop {
            state = match state {
                DecodeState::DecodeTag => {
                    tag = self.read_tag(cursor)?;
                    tag_set = match incoming_tag_set {
                        Some(ts) => ts.append_inner(tag),
                        None => TagSet::single(tag),
                    };
                    log::trace!("decode_tag: at {mark}, read tag {tag}, tag_set now {tag_set}");
                    DecodeState::DecodeLength
                }
                DecodeState::DecodeLength => {
                    length = self.read_length(cursor)?;
                    if length.is_indefinite() && !self.options.support_indefinite_length {
                        return Err(Asn1Error::UnsupportedFeature(
                            "indefinite length encoding is disabled".into(),
                        ));
                    }
                    log::trace!("decode_length: tag_set {tag_set} has length {length}");
                    DecodeState::GetValueDecoder
                }
                DecodeState::GetValueDecoder => {
                    if spec.is_some() {
                        DecodeState::GetValueDecoderByAsn1Spec
                    } else {
                        DecodeState::GetValueDecoderByTag
                    }
                }
                DecodeState::GetValueDecoderByTag => {
                    if let Some(dec) = self.registry.tag_map_get(&tag_set) {
                        log::debug!("resolved {tag_set} to a universal decoder by full tag set");
                        chosen_decoder = Some(dec);
                        DecodeState::DecodeValue
                    } else if let Some(dec) = self.registry.tag_map_get(&TagSet::single(tag)) {
                        log::debug!("resolved {tag_set} to a universal decoder by base tag {tag}");
                        chosen_decoder = Some(dec);
                        DecodeState::DecodeValue
                    } else {
                        DecodeState::TryAsExplicitTag
                    }
                }
                DecodeState::GetValueDecoderByAsn1Spec => {
                    let s = spec.expect("spec branch only reached when spec.is_some()");
                    // ANY never fails to resolve: a tag found in its tag
                    // map is a "tagged ANY" (value bytes only), anything
                    // else is an "untagged ANY" that replays its own TLV
                    // header. Either way AnyDecoder itself is invoked, never
                    // TryAsExplicitTag.
                    if s.type_id() == TypeId::Any {
                        let resolved = s
                            .tag_map()
                            .and_then(|tm| tm.get(&tag_set).or_else(|| tm.get(&TagSet::single(tag))));
                        log::debug!(
                            "ANY spec resolving {tag_set}: {}",
                            if resolved.is_some() { "tagged match" } else { "untagged, replaying header" }
                        );
                        chosen_spec = Some(resolved.unwrap_or_else(|| s.clone()));
                        chosen_decoder = self.registry.type_map_get(TypeId::Any);
                        DecodeState::DecodeValue
                    } else if s.type_id() == TypeId::Choice {
                        // Explicitly tagged CHOICE matches its own tag set;
                        // untagged CHOICE is matched via the already-read
                        // tag/length against its alternatives' tag map.
                        // Either way `ChoiceDecoder` is handed the whole
                        // `ChoiceSpec`, not the resolved alternative, so it
                        // can tell the two cases apart itself.
                        let untagged_match = s
                            .tag_map()
                            .map(|tm| tm.get(&tag_set).or_else(|| tm.get(&TagSet::single(tag))).is_some())
                            .unwrap_or(false);
                        if s.tag_set() == tag_set || untagged_match {
                            chosen_spec = Some(s.clone());
                            chosen_decoder = self.registry.type_map_get(TypeId::Choice);
                            DecodeState::DecodeValue
                        } else {
                            DecodeState::TryAsExplicitTag
                        }
                    } else {
                        let resolved_spec = if let Some(tag_map) = s.tag_map() {
                            tag_map.get(&tag_set).or_else(|| tag_map.get(&TagSet::single(tag)))
                        } else if s.tag_set() == tag_set
                            || s.tag_set().base_tag() == tag_set.base_tag()
                        {
                            Some(s.clone())
                        } else {
                            None
                        };
                        match resolved_spec {
                            None => DecodeState::TryAsExplicitTag,
                            Some(cs) => {
                                let dec = self
                                    .registry
                                    .type_map_get(cs.type_id())
                                    .or_else(|| self.registry.tag_map_get(&cs.tag_set()))
                                    .or_else(|| self.registry.tag_map_get(&TagSet::single(tag)));
                                chosen_spec = Some(cs);
                                match dec {
                                    Some(dec) => {
                                        chosen_decoder = Some(dec);
                                        DecodeState::DecodeValue
                                    }
                                    None => DecodeState::TryAsExplicitTag,
                                }
                            }
                        }
                    }
                }
                DecodeState::TryAsExplicitTag => {
                    if tag.form == TagForm::Constructed && tag.class != TagClass::Universal {
                        log::debug!(
                            "no decoder resolves {tag_set} directly; assuming EXPLICIT tagging"
                        );
                        chosen_decoder = Some(self.registry.explicit_tag_decoder.clone());
                        DecodeState::DecodeValue
                    } else if self.options.fallback_to_raw_value {
                        log::warn!(
                            "no decoder for {tag_set} and it cannot be an explicit tag; \
                             falling back to DumpRawValue"
                        );
                        DecodeState::DumpRawValue
                    } else {
                        return Err(Asn1Error::SchemaMismatch(format!(
                            "no decoder for tag set {tag_set}"
                        )));
                    }
                }
                DecodeState::DecodeValue => {
                    let decoder = chosen_decoder
                        .as_ref()
                        .expect("DecodeValue only reached with a chosen decoder");
                    let value_start = cursor.position();
                    let value = match length {
                        Length::Definite(n) => {
                            let v = decoder.decode_definite(
                                cursor,
                                mark,
                                &tag_set,
                                n,
                                chosen_spec.as_ref(),
                                self,
                                options,
                                depth + 1,
                            )?;
                            let consumed = (cursor.position() - value_start) as u64;
                            if consumed != n {
                                return Err(Asn1Error::LengthMismatch { expected: n, consumed });
                            }
                            v
                        }
                        Length::Indefinite => decoder.decode_indefinite(
                            cursor,
                            mark,
                            &tag_set,
                            chosen_spec.as_ref(),
                            self,
                            options,
                            depth + 1,
                        )?,
                    };
                    return Ok(DecodeOutcome::Value(value));
                }
                DecodeState::DumpRawValue => {
                    let header_len = cursor.position() - mark;
                    let n = length.definite().ok_or_else(|| {
                        Asn1Error::UnsupportedFeature(
                            "cannot dump a raw value of indefinite length".into(),
                        )
                    })?;
                    cursor.read_bytes(n as usize)?;
                    let _ = header_len;
                    let raw = cursor.since(mark).to_vec();
                    return Ok(DecodeOutcome::Value(Value::new(tag_set, ValueKind::Any(raw))));
                }
            };
        }
    }

    /// The public driving entry point: a lazy iterator over successive
    /// top-level values in `bytes`.
    pub fn decode_all<'a>(
        &'a self,
        bytes: &'a [u8],
        spec: Option<&'a Arc<dyn Spec>>,
    ) -> DecodeAll<'a> {
        DecodeAll { engine: self, cursor: Cursor::new(bytes), spec }
    }
}

/// Iterator returned by [`Engine::decode_all`].
pub struct DecodeAll<'a> {
    engine: &'a Engine,
    cursor: Cursor<'a>,
    spec: Option<&'a Arc<dyn Spec>>,
}

impl<'a> Iterator for DecodeAll<'a> {
    type Item = Asn1Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_at_end() {
            return None;
        }
        let options = DecodeOptions::default();
        Some(self.engine.decode(&mut self.cursor, self.spec, &options, 0))
    }
}

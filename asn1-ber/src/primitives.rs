//! Decoders for the universal primitive ASN.1 types: INTEGER, BOOLEAN,
//! NULL, BIT STRING, OCTET STRING, OBJECT IDENTIFIER, REAL, the
//! character-string family, and the time-string family.

use crate::cursor::Cursor;
use crate::engine::{DecodeOptions, DecodeOutcome, Engine, ValueDecoder};
use crate::schema::Spec;
use asn1_core::bit_string::BitString;
use asn1_core::error::{Asn1Error, Asn1Result};
use asn1_core::tag::{TagForm, TagSet};
use asn1_core::value::{CharacterStringKind, RealValue, TimeStringKind, Value, ValueKind};
use std::sync::Arc;

fn base_form(tag_set: &TagSet) -> TagForm {
    tag_set.base_tag().map(|t| t.form).unwrap_or(TagForm::Primitive)
}

// ---------------------------------------------------------------- INTEGER

pub struct IntegerDecoder;

impl ValueDecoder for IntegerDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        if base_form(tag_set) == TagForm::Constructed {
            return Err(Asn1Error::MalformedEncoding(
                "INTEGER must use the primitive form".into(),
            ));
        }
        let bytes = cursor.read_bytes(length as usize)?.to_vec();
        Ok(Value::new(tag_set.clone(), ValueKind::Integer(bytes)))
    }
}

// ---------------------------------------------------------------- BOOLEAN

pub struct BooleanDecoder;

impl ValueDecoder for BooleanDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        if base_form(tag_set) == TagForm::Constructed {
            return Err(Asn1Error::MalformedEncoding(
                "BOOLEAN must use the primitive form".into(),
            ));
        }
        let bytes = cursor.read_bytes(length as usize)?;
        let truthy = bytes.iter().any(|&b| b != 0);
        Ok(Value::new(tag_set.clone(), ValueKind::Boolean(truthy)))
    }
}

// ------------------------------------------------------------------- NULL

pub struct NullDecoder;

impl ValueDecoder for NullDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        if length != 0 {
            // consume the (illegal) content so callers see a clean error
            // rather than a desynchronized cursor.
            let _ = cursor.read_bytes(length as usize)?;
            return Err(Asn1Error::MalformedEncoding(
                "NULL must have zero-length content".into(),
            ));
        }
        Ok(Value::new(tag_set.clone(), ValueKind::Null))
    }
}

// --------------------------------------------------------- OBJECT IDENTIFIER

pub struct ObjectIdentifierDecoder;

fn read_base128(bytes: &[u8]) -> Asn1Result<(u64, usize)> {
    if bytes.is_empty() {
        return Err(Asn1Error::SubstrateUnderrun("truncated OID sub-identifier".into()));
    }
    if bytes[0] == 0x80 {
        return Err(Asn1Error::MalformedEncoding(
            "OID sub-identifier may not start with 0x80".into(),
        ));
    }
    let mut value: u64 = 0;
    let mut used = 0;
    loop {
        if used >= bytes.len() {
            return Err(Asn1Error::SubstrateUnderrun("truncated OID sub-identifier".into()));
        }
        let b = bytes[used];
        value = (value << 7) | (b & 0x7F) as u64;
        used += 1;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((value, used))
}

fn decode_oid_arcs(content: &[u8]) -> Asn1Result<Vec<u64>> {
    if content.is_empty() {
        return Err(Asn1Error::MalformedEncoding("OBJECT IDENTIFIER has empty content".into()));
    }
    let (first, used) = read_base128(content)?;
    let (a0, a1) = if first <= 39 {
        (0, first)
    } else if first <= 79 {
        (1, first - 40)
    } else {
        (2, first - 80)
    };
    let mut arcs = vec![a0, a1];
    let mut i = used;
    while i < content.len() {
        let (arc, used) = read_base128(&content[i..])?;
        arcs.push(arc);
        i += used;
    }
    Ok(arcs)
}

impl ValueDecoder for ObjectIdentifierDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        if base_form(tag_set) == TagForm::Constructed {
            return Err(Asn1Error::MalformedEncoding(
                "OBJECT IDENTIFIER must use the primitive form".into(),
            ));
        }
        let content = cursor.read_bytes(length as usize)?;
        let arcs = decode_oid_arcs(content)?;
        Ok(Value::new(tag_set.clone(), ValueKind::ObjectIdentifier(arcs)))
    }
}

// ------------------------------------------------------------------- REAL

pub struct RealDecoder;

fn parse_nr_form(text: &str, nr: u8) -> Asn1Result<f64> {
    let normalized = text.trim().replace(',', ".");
    let normalized = match nr {
        3 => normalized.replacen('E', "e", 1),
        _ => normalized,
    };
    normalized
        .parse::<f64>()
        .map_err(|e| Asn1Error::MalformedEncoding(format!("invalid REAL character form: {e}")))
}

impl ValueDecoder for RealDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        _engine: &Engine,
        _options: &DecodeOptions<'_>,
        _depth: usize,
    ) -> Asn1Result<Value> {
        if base_form(tag_set) == TagForm::Constructed {
            return Err(Asn1Error::MalformedEncoding("REAL must use the primitive form".into()));
        }
        if length == 0 {
            return Ok(Value::new(tag_set.clone(), ValueKind::Real(RealValue::Decimal(0.0))));
        }
        let content = cursor.read_bytes(length as usize)?;
        let f = content[0];
        let real = if f & 0xC0 == 0x80 {
            let base_bits = (f >> 4) & 0x3;
            let base_multiplier: i64 = match base_bits {
                0 => 1,
                1 => 3,
                2 => 4,
                _ => {
                    return Err(Asn1Error::MalformedEncoding(
                        "REAL binary encoding base 3 (reserved) is illegal".into(),
                    ))
                }
            };
            let scale = (f >> 2) & 0x3;
            let mut idx = 1;
            let n = if f & 0x3 == 3 {
                let len = *content
                    .get(idx)
                    .ok_or_else(|| Asn1Error::SubstrateUnderrun("REAL exponent length octet".into()))?
                    as usize;
                idx += 1;
                len
            } else {
                (f & 0x3) as usize + 1
            };
            if idx + n > content.len() {
                return Err(Asn1Error::SubstrateUnderrun("REAL exponent octets".into()));
            }
            let exp_bytes = &content[idx..idx + n];
            idx += n;
            let mut exponent: i64 = if exp_bytes[0] & 0x80 != 0 { -1 } else { 0 };
            for &b in exp_bytes {
                exponent = (exponent << 8) | b as i64;
            }
            exponent *= base_multiplier;
            let mantissa_bytes = &content[idx..];
            if mantissa_bytes.is_empty() {
                return Err(Asn1Error::MalformedEncoding("REAL missing mantissa octets".into()));
            }
            let mut mantissa: i128 = 0;
            for &b in mantissa_bytes {
                mantissa = (mantissa << 8) | b as i128;
            }
            mantissa <<= scale;
            if f & 0x40 != 0 {
                mantissa = -mantissa;
            }
            RealValue::Binary { mantissa, exponent: exponent as i32 }
        } else if f & 0xC0 == 0x40 {
            if f & 1 == 0 {
                RealValue::PositiveInfinity
            } else {
                RealValue::NegativeInfinity
            }
        } else if f & 0xC0 == 0x00 {
            let nr = f & 0x3;
            let text = std::str::from_utf8(&content[1..])
                .map_err(|_| Asn1Error::MalformedEncoding("REAL character form not UTF-8".into()))?;
            RealValue::Decimal(parse_nr_form(text, nr)?)
        } else {
            return Err(Asn1Error::MalformedEncoding("unrecognized REAL encoding".into()));
        };
        Ok(Value::new(tag_set.clone(), ValueKind::Real(real)))
    }
}

// ------------------------------------------------------------ OCTET STRING

pub struct OctetStringDecoder;

fn decode_octet_fragments_definite(
    cursor: &mut Cursor<'_>,
    length: u64,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Vec<u8>> {
    let end = cursor.position() + length as usize;
    let mut out = Vec::new();
    while cursor.position() < end {
        let v = engine.decode(cursor, None, options, depth)?;
        match v.kind {
            ValueKind::OctetString(bytes) => out.extend(bytes),
            other => {
                return Err(Asn1Error::SchemaMismatch(format!(
                    "constructed OCTET STRING segment decoded as {other:?} instead of OCTET STRING"
                )))
            }
        }
    }
    Ok(out)
}

fn decode_octet_fragments_indefinite(
    cursor: &mut Cursor<'_>,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        match engine.decode_allow_eoo(cursor, None, options, depth)? {
            DecodeOutcome::EndOfOctets => break,
            DecodeOutcome::Value(v) => match v.kind {
                ValueKind::OctetString(bytes) => out.extend(bytes),
                other => {
                    return Err(Asn1Error::SchemaMismatch(format!(
                        "constructed OCTET STRING segment decoded as {other:?} instead of OCTET STRING"
                    )))
                }
            },
        }
    }
    Ok(out)
}

impl ValueDecoder for OctetStringDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = match base_form(tag_set) {
            TagForm::Primitive => cursor.read_bytes(length as usize)?.to_vec(),
            TagForm::Constructed => {
                decode_octet_fragments_definite(cursor, length, engine, options, depth)?
            }
        };
        Ok(Value::new(tag_set.clone(), ValueKind::OctetString(bytes)))
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = decode_octet_fragments_indefinite(cursor, engine, options, depth)?;
        Ok(Value::new(tag_set.clone(), ValueKind::OctetString(bytes)))
    }
}

// -------------------------------------------------------------- BIT STRING

pub struct BitStringDecoder;

fn decode_bit_string_primitive(cursor: &mut Cursor<'_>, length: u64) -> Asn1Result<BitString> {
    if length == 0 {
        return Err(Asn1Error::MalformedEncoding(
            "primitive BIT STRING requires at least the trailing-bits octet".into(),
        ));
    }
    let unused = cursor.read_byte()?;
    if unused > 7 {
        return Err(Asn1Error::MalformedEncoding(format!(
            "BIT STRING trailing unused-bits count {unused} exceeds 7"
        )));
    }
    let value_len = (length - 1) as usize;
    let bytes = cursor.read_bytes(value_len)?.to_vec();
    let num_bits = value_len * 8 - unused as usize;
    BitString::new(bytes, num_bits).map_err(|e| match e {
        asn1_core::error::Asn1Error::MalformedEncoding(msg) => Asn1Error::MalformedEncoding(msg),
        other => other,
    })
}

fn decode_bit_string_fragments_definite(
    cursor: &mut Cursor<'_>,
    length: u64,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<BitString> {
    let end = cursor.position() + length as usize;
    let mut segments = Vec::new();
    while cursor.position() < end {
        let v = engine.decode(cursor, None, options, depth)?;
        match v.kind {
            ValueKind::BitString(b) => segments.push(b),
            other => {
                return Err(Asn1Error::SchemaMismatch(format!(
                    "constructed BIT STRING segment decoded as {other:?} instead of BIT STRING"
                )))
            }
        }
    }
    Ok(BitString::concat(segments))
}

fn decode_bit_string_fragments_indefinite(
    cursor: &mut Cursor<'_>,
    engine: &Engine,
    options: &DecodeOptions<'_>,
    depth: usize,
) -> Asn1Result<BitString> {
    let mut segments = Vec::new();
    loop {
        match engine.decode_allow_eoo(cursor, None, options, depth)? {
            DecodeOutcome::EndOfOctets => break,
            DecodeOutcome::Value(v) => match v.kind {
                ValueKind::BitString(b) => segments.push(b),
                other => {
                    return Err(Asn1Error::SchemaMismatch(format!(
                        "constructed BIT STRING segment decoded as {other:?} instead of BIT STRING"
                    )))
                }
            },
        }
    }
    Ok(BitString::concat(segments))
}

impl ValueDecoder for BitStringDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bit_string = match base_form(tag_set) {
            TagForm::Primitive => decode_bit_string_primitive(cursor, length)?,
            TagForm::Constructed => {
                decode_bit_string_fragments_definite(cursor, length, engine, options, depth)?
            }
        };
        Ok(Value::new(tag_set.clone(), ValueKind::BitString(bit_string)))
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bit_string = decode_bit_string_fragments_indefinite(cursor, engine, options, depth)?;
        Ok(Value::new(tag_set.clone(), ValueKind::BitString(bit_string)))
    }
}

// ------------------------------------------------------- CHARACTER STRINGS

/// Decoded exactly like OCTET STRING; the only difference between the
/// eleven character-string types is which tag/kind they are registered
/// under.
pub struct CharacterStringDecoder {
    kind: CharacterStringKind,
}

impl CharacterStringDecoder {
    pub fn new(kind: CharacterStringKind) -> Self {
        Self { kind }
    }
}

impl ValueDecoder for CharacterStringDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = match base_form(tag_set) {
            TagForm::Primitive => cursor.read_bytes(length as usize)?.to_vec(),
            TagForm::Constructed => {
                decode_octet_fragments_definite(cursor, length, engine, options, depth)?
            }
        };
        Ok(Value::new(tag_set.clone(), ValueKind::CharacterString(self.kind, bytes)))
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = decode_octet_fragments_indefinite(cursor, engine, options, depth)?;
        Ok(Value::new(tag_set.clone(), ValueKind::CharacterString(self.kind, bytes)))
    }
}

// ------------------------------------------------------------ TIME STRINGS

pub struct TimeStringDecoder {
    kind: TimeStringKind,
}

impl TimeStringDecoder {
    pub fn new(kind: TimeStringKind) -> Self {
        Self { kind }
    }
}

impl ValueDecoder for TimeStringDecoder {
    fn decode_definite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        length: u64,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = match base_form(tag_set) {
            TagForm::Primitive => cursor.read_bytes(length as usize)?.to_vec(),
            TagForm::Constructed => {
                decode_octet_fragments_definite(cursor, length, engine, options, depth)?
            }
        };
        Ok(Value::new(tag_set.clone(), ValueKind::TimeString(self.kind, bytes)))
    }

    fn decode_indefinite(
        &self,
        cursor: &mut Cursor<'_>,
        _tlv_start: usize,
        tag_set: &TagSet,
        _spec: Option<&Arc<dyn Spec>>,
        engine: &Engine,
        options: &DecodeOptions<'_>,
        depth: usize,
    ) -> Asn1Result<Value> {
        let bytes = decode_octet_fragments_indefinite(cursor, engine, options, depth)?;
        Ok(Value::new(tag_set.clone(), ValueKind::TimeString(self.kind, bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use asn1_core::tag::{Tag, TagForm};

    fn engine() -> Engine {
        Engine::new(Registry::universal())
    }

    #[test]
    fn decode_integer_positive_and_negative() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let mut cur = Cursor::new(&[0x02, 0x01, 0x7F]);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert_eq!(v.integer_to_i128(), Some(127));

        let mut cur = Cursor::new(&[0x02, 0x01, 0xFF]);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert_eq!(v.integer_to_i128(), Some(-1));
    }

    #[test]
    fn decode_boolean_normalizes_any_nonzero() {
        let eng = engine();
        let opts = DecodeOptions::default();
        for (bytes, expected) in [
            (&[0x01u8, 0x01, 0xFF][..], true),
            (&[0x01, 0x01, 0x00][..], false),
            (&[0x01, 0x01, 0x42][..], true),
        ] {
            let mut cur = Cursor::new(bytes);
            let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
            assert_eq!(v.kind, ValueKind::Boolean(expected));
        }
    }

    #[test]
    fn decode_null_rejects_nonempty_content() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let mut cur = Cursor::new(&[0x05, 0x01, 0x00]);
        assert!(eng.decode(&mut cur, None, &opts, 0).is_err());
    }

    #[test]
    fn decode_rsa_oid() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let mut cur = Cursor::new(&[0x06, 0x06, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D]);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert_eq!(v.kind, ValueKind::ObjectIdentifier(vec![1, 2, 840, 113549]));
    }

    #[test]
    fn decode_oid_rejects_leading_0x80() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let mut cur = Cursor::new(&[0x06, 0x02, 0x80, 0x37]);
        assert!(eng.decode(&mut cur, None, &opts, 0).is_err());
    }

    #[test]
    fn decode_bit_string_trailing_bits() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let mut cur = Cursor::new(&[0x03, 0x04, 0x06, 0x6E, 0x5D, 0xC0]);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        match v.kind {
            ValueKind::BitString(bs) => assert_eq!(bs.num_bits(), 18),
            other => panic!("expected BitString, got {other:?}"),
        }
    }

    #[test]
    fn decode_indefinite_length_octet_string() {
        let eng = engine();
        let opts = DecodeOptions::default();
        let bytes = [
            0x24, 0x80, 0x04, 0x03, b'f', b'o', b'o', 0x04, 0x03, b'b', b'a', b'r', 0x00, 0x00,
        ];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        assert_eq!(v.kind, ValueKind::OctetString(b"foobar".to_vec()));
        assert_eq!(cur.position(), bytes.len());
    }

    #[test]
    fn decode_long_form_tag_number() {
        // Context-specific tag id 640, primitive, length 1, content 0x00.
        let eng = engine();
        let opts = DecodeOptions::default();
        let bytes = [0x9F, 0x85, 0x00, 0x01, 0x00];
        let mut cur = Cursor::new(&bytes);
        let v = eng.decode(&mut cur, None, &opts, 0).unwrap();
        let leaf = v.tag_set.base_tag().unwrap();
        assert_eq!(leaf.number, 640);
        let _ = Tag::universal(TagForm::Primitive, 0); // silence unused-import if reordered
    }
}

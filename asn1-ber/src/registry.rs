//! The decoder registry: a `tagMap` keyed by canonical tag set and a
//! `typeMap` keyed by type id, the latter covering types whose tag set
//! alone is ambiguous (SEQUENCE vs SEQUENCE OF, SET vs SET OF, CHOICE,
//! ANY). Unambiguous `tagMap` entries are lifted into `typeMap` too, so a
//! schema-guided lookup never has to fall back.

use crate::any::AnyDecoder;
use crate::choice::ChoiceDecoder;
use crate::constructed::{SequenceOfDecoder, SetOfDecoder, UniversalConstructedDecoder};
use crate::explicit_tag::ExplicitTagDecoder;
use crate::primitives::{
    BitStringDecoder, BooleanDecoder, CharacterStringDecoder, IntegerDecoder, NullDecoder,
    ObjectIdentifierDecoder, OctetStringDecoder, RealDecoder, TimeStringDecoder,
};
use asn1_core::tag::{Tag, TagForm, TagSet};
use asn1_core::value::{CharacterStringKind, TimeStringKind};
use crate::engine::ValueDecoder;
use crate::schema::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// The universal-type tag numbers this crate registers (X.690 clause 8,
/// table 1).
pub mod universal_tag {
    pub const BOOLEAN: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const BIT_STRING: u32 = 3;
    pub const OCTET_STRING: u32 = 4;
    pub const NULL: u32 = 5;
    pub const OBJECT_IDENTIFIER: u32 = 6;
    pub const OBJECT_DESCRIPTOR: u32 = 7;
    pub const REAL: u32 = 9;
    pub const ENUMERATED: u32 = 10;
    pub const UTF8_STRING: u32 = 12;
    pub const SEQUENCE: u32 = 16;
    pub const SET: u32 = 17;
    pub const NUMERIC_STRING: u32 = 18;
    pub const PRINTABLE_STRING: u32 = 19;
    pub const TELETEX_STRING: u32 = 20;
    pub const VIDEOTEX_STRING: u32 = 21;
    pub const IA5_STRING: u32 = 22;
    pub const UTC_TIME: u32 = 23;
    pub const GENERALIZED_TIME: u32 = 24;
    pub const GRAPHIC_STRING: u32 = 25;
    pub const VISIBLE_STRING: u32 = 26;
    pub const GENERAL_STRING: u32 = 27;
    pub const UNIVERSAL_STRING: u32 = 28;
    pub const BMP_STRING: u32 = 30;
}

/// Two lookup tables: by tag set (for schema-less and universal-type
/// dispatch) and by type id (for schema-guided dispatch where the tag set
/// alone is ambiguous, e.g. SEQUENCE vs SEQUENCE OF).
pub struct Registry {
    tag_map: HashMap<TagSet, Arc<dyn ValueDecoder>>,
    type_map: HashMap<TypeId, Arc<dyn ValueDecoder>>,
    pub(crate) explicit_tag_decoder: Arc<dyn ValueDecoder>,
}

impl Registry {
    pub fn tag_map_get(&self, tag_set: &TagSet) -> Option<Arc<dyn ValueDecoder>> {
        self.tag_map.get(tag_set).cloned()
    }

    pub fn type_map_get(&self, type_id: TypeId) -> Option<Arc<dyn ValueDecoder>> {
        self.type_map.get(&type_id).cloned()
    }

    fn insert(&mut self, tag: Tag, decoder: Arc<dyn ValueDecoder>) {
        self.tag_map.insert(TagSet::single(tag), decoder);
    }

    /// Lift every tag-map entry whose type id is not already present in
    /// `typeMap` — the same post-processing step the original decoder
    /// applies so unambiguous types get the faster by-type-id lookup path.
    fn lift_unambiguous(&mut self, universal_type_ids: &[(Tag, TypeId)]) {
        for (tag, type_id) in universal_type_ids {
            if !self.type_map.contains_key(type_id) {
                if let Some(decoder) = self.tag_map.get(&TagSet::single(*tag)) {
                    self.type_map.insert(*type_id, decoder.clone());
                }
            }
        }
    }

    /// The registry of every universal ASN.1 type this crate implements.
    pub fn universal() -> Self {
        use universal_tag as u;

        let mut reg = Self {
            tag_map: HashMap::new(),
            type_map: HashMap::new(),
            explicit_tag_decoder: Arc::new(ExplicitTagDecoder),
        };

        let boolean = Tag::universal(TagForm::Primitive, u::BOOLEAN);
        let integer = Tag::universal(TagForm::Primitive, u::INTEGER);
        let enumerated = Tag::universal(TagForm::Primitive, u::ENUMERATED);
        let null = Tag::universal(TagForm::Primitive, u::NULL);
        let oid = Tag::universal(TagForm::Primitive, u::OBJECT_IDENTIFIER);
        let real = Tag::universal(TagForm::Primitive, u::REAL);
        let bit_string_p = Tag::universal(TagForm::Primitive, u::BIT_STRING);
        let bit_string_c = Tag::universal(TagForm::Constructed, u::BIT_STRING);
        let octet_string_p = Tag::universal(TagForm::Primitive, u::OCTET_STRING);
        let octet_string_c = Tag::universal(TagForm::Constructed, u::OCTET_STRING);
        let sequence = Tag::universal(TagForm::Constructed, u::SEQUENCE);
        let set = Tag::universal(TagForm::Constructed, u::SET);

        reg.insert(boolean, Arc::new(BooleanDecoder));
        reg.insert(integer, Arc::new(IntegerDecoder));
        reg.insert(enumerated, Arc::new(IntegerDecoder));
        reg.insert(null, Arc::new(NullDecoder));
        reg.insert(oid, Arc::new(ObjectIdentifierDecoder));
        reg.insert(real, Arc::new(RealDecoder));
        reg.insert(bit_string_p, Arc::new(BitStringDecoder));
        reg.insert(bit_string_c, Arc::new(BitStringDecoder));
        reg.insert(octet_string_p, Arc::new(OctetStringDecoder));
        reg.insert(octet_string_c, Arc::new(OctetStringDecoder));

        let char_kinds = [
            (u::UTF8_STRING, CharacterStringKind::Utf8String),
            (u::NUMERIC_STRING, CharacterStringKind::NumericString),
            (u::PRINTABLE_STRING, CharacterStringKind::PrintableString),
            (u::TELETEX_STRING, CharacterStringKind::TeletexString),
            (u::VIDEOTEX_STRING, CharacterStringKind::VideotexString),
            (u::IA5_STRING, CharacterStringKind::Ia5String),
            (u::GRAPHIC_STRING, CharacterStringKind::GraphicString),
            (u::VISIBLE_STRING, CharacterStringKind::VisibleString),
            (u::GENERAL_STRING, CharacterStringKind::GeneralString),
            (u::UNIVERSAL_STRING, CharacterStringKind::UniversalString),
            (u::BMP_STRING, CharacterStringKind::BmpString),
            (u::OBJECT_DESCRIPTOR, CharacterStringKind::ObjectDescriptor),
        ];
        for (tag_number, kind) in char_kinds {
            let decoder: Arc<dyn ValueDecoder> = Arc::new(CharacterStringDecoder::new(kind));
            reg.insert(Tag::universal(TagForm::Primitive, tag_number), decoder.clone());
            reg.insert(Tag::universal(TagForm::Constructed, tag_number), decoder);
        }

        let time_kinds = [
            (u::UTC_TIME, TimeStringKind::UtcTime),
            (u::GENERALIZED_TIME, TimeStringKind::GeneralizedTime),
        ];
        for (tag_number, kind) in time_kinds {
            let decoder: Arc<dyn ValueDecoder> = Arc::new(TimeStringDecoder::new(kind));
            reg.insert(Tag::universal(TagForm::Primitive, tag_number), decoder.clone());
            reg.insert(Tag::universal(TagForm::Constructed, tag_number), decoder);
        }

        reg.insert(sequence, Arc::new(UniversalConstructedDecoder));
        reg.insert(set, Arc::new(UniversalConstructedDecoder));

        // Disambiguation types: tagSet alone cannot tell a SEQUENCE from a
        // SEQUENCE OF, or CHOICE/ANY which carry no fixed tag at all, so
        // these live only in typeMap.
        reg.type_map.insert(TypeId::Sequence, Arc::new(UniversalConstructedDecoder));
        reg.type_map.insert(TypeId::Set, Arc::new(UniversalConstructedDecoder));
        reg.type_map.insert(TypeId::SequenceOf, Arc::new(SequenceOfDecoder));
        reg.type_map.insert(TypeId::SetOf, Arc::new(SetOfDecoder));
        reg.type_map.insert(TypeId::Choice, Arc::new(ChoiceDecoder));
        reg.type_map.insert(TypeId::Any, Arc::new(AnyDecoder));
        reg.type_map.insert(TypeId::ExplicitTag, reg.explicit_tag_decoder.clone());

        let universal_type_ids = [
            (boolean, TypeId::Boolean),
            (integer, TypeId::Integer),
            (enumerated, TypeId::Enumerated),
            (null, TypeId::Null),
            (oid, TypeId::ObjectIdentifier),
            (real, TypeId::Real),
            (bit_string_p, TypeId::BitString),
            (octet_string_p, TypeId::OctetString),
        ];
        reg.lift_unambiguous(&universal_type_ids);

        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_registry_resolves_integer_by_tag() {
        let reg = Registry::universal();
        let tag = Tag::universal(TagForm::Primitive, universal_tag::INTEGER);
        assert!(reg.tag_map_get(&TagSet::single(tag)).is_some());
    }

    #[test]
    fn unambiguous_types_are_lifted_into_type_map() {
        let reg = Registry::universal();
        assert!(reg.type_map_get(TypeId::Integer).is_some());
        assert!(reg.type_map_get(TypeId::Boolean).is_some());
    }
}

//! ASN.1 tags and tag sets (ITU-T X.690 clause 8.1).
//!
//! A [`Tag`] is the (class, form, number) triple carried by a single
//! identifier octet (or octets, in long form). A [`TagSet`] is the ordered
//! accumulation of tags built up while decoding nested EXPLICIT tags: the
//! outermost tag is decoded first and the base (innermost) type's tag is
//! folded in last.

use std::fmt;

/// The four ASN.1 tag classes, encoded in bits 7-6 of the identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl TagClass {
    /// Decode the class from bits 7-6 of an identifier octet (already
    /// shifted down to occupy bits 1-0).
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    /// Encode the class into bits 7-6 of an identifier octet.
    pub fn to_bits(self) -> u8 {
        match self {
            TagClass::Universal => 0b00,
            TagClass::Application => 0b01,
            TagClass::ContextSpecific => 0b10,
            TagClass::Private => 0b11,
        }
    }
}

/// Primitive or constructed form, bit 5 of the identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagForm {
    Primitive,
    Constructed,
}

impl TagForm {
    pub fn from_bits(bits: u8) -> Self {
        if bits & 1 == 1 {
            TagForm::Constructed
        } else {
            TagForm::Primitive
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            TagForm::Primitive => 0,
            TagForm::Constructed => 1,
        }
    }
}

/// A single ASN.1 tag: class, form, and the tag number.
///
/// Tag numbers below 31 fit in the identifier octet's low 5 bits (short
/// form); 31 and above are encoded as a base-128 continuation sequence
/// (long form, see `asn1_ber`'s tag reader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    pub class: TagClass,
    pub form: TagForm,
    pub number: u32,
}

impl Tag {
    pub fn new(class: TagClass, form: TagForm, number: u32) -> Self {
        Self { class, form, number }
    }

    pub fn universal(form: TagForm, number: u32) -> Self {
        Self::new(TagClass::Universal, form, number)
    }

    pub fn application(form: TagForm, number: u32) -> Self {
        Self::new(TagClass::Application, form, number)
    }

    pub fn context(form: TagForm, number: u32) -> Self {
        Self::new(TagClass::ContextSpecific, form, number)
    }

    pub fn private(form: TagForm, number: u32) -> Self {
        Self::new(TagClass::Private, form, number)
    }

    /// A tag compares equal to another for dispatch purposes regardless of
    /// form: IMPLICIT retagging and CHOICE alternative matching key off
    /// class+number only.
    pub fn matches_class_number(&self, other: &Tag) -> bool {
        self.class == other.class && self.number == other.number
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self.class {
            TagClass::Universal => "UNIVERSAL",
            TagClass::Application => "APPLICATION",
            TagClass::ContextSpecific => "CONTEXT",
            TagClass::Private => "PRIVATE",
        };
        write!(f, "[{} {}]", c, self.number)
    }
}

/// An ordered accumulation of [`Tag`]s, outermost tag first.
///
/// Most values carry a `TagSet` of length one (their own tag). Nesting an
/// EXPLICIT tag around a base type produces a `TagSet` of length two or
/// more: the outer wrapper's tag is pushed first, and the base type's tag
/// is appended last each time the engine recurses one level deeper. The
/// "base tag" — the one that actually selects a decoder — is therefore
/// always the last element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    /// A `TagSet` containing a single tag.
    pub fn single(tag: Tag) -> Self {
        Self { tags: vec![tag] }
    }

    /// An empty `TagSet`, used as the starting accumulator before any tag
    /// has been read.
    pub fn empty() -> Self {
        Self { tags: Vec::new() }
    }

    /// Fold a newly decoded, deeper tag onto this set, returning the
    /// extended set. Used while unwrapping EXPLICIT tags: each recursive
    /// call into the engine appends the tag found at that nesting level.
    pub fn append_inner(&self, inner: Tag) -> Self {
        let mut tags = self.tags.clone();
        tags.push(inner);
        Self { tags }
    }

    /// The innermost (base) tag — the one that selects a concrete decoder.
    pub fn base_tag(&self) -> Option<&Tag> {
        self.tags.last()
    }

    /// The outermost tag — the first one encountered on the wire.
    pub fn outer_tag(&self) -> Option<&Tag> {
        self.tags.first()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.tags.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_class_round_trip() {
        for bits in 0..4u8 {
            let class = TagClass::from_bits(bits);
            assert_eq!(class.to_bits(), bits);
        }
    }

    #[test]
    fn tag_set_base_tag_is_last_appended() {
        let outer = Tag::context(TagForm::Constructed, 0);
        let inner = Tag::universal(TagForm::Primitive, 2);
        let set = TagSet::single(outer).append_inner(inner);
        assert_eq!(set.len(), 2);
        assert_eq!(set.outer_tag(), Some(&outer));
        assert_eq!(set.base_tag(), Some(&inner));
    }

    #[test]
    fn matches_class_number_ignores_form() {
        let a = Tag::universal(TagForm::Primitive, 4);
        let b = Tag::universal(TagForm::Constructed, 4);
        assert!(a.matches_class_number(&b));
    }
}

//! A minimal, concrete implementation of the type-system contract the
//! dispatch engine consumes.
//!
//! The engine itself only ever touches a type through the [`Spec`] trait —
//! this module exists so the engine is directly testable and usable
//! without pulling in an external ASN.1-compiler crate: plain Rust builders
//! for leaf, SEQUENCE/SET, SEQUENCE OF/SET OF, and CHOICE specs.

use asn1_core::tag::TagSet;
use asn1_core::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies which concrete decoder a [`Spec`] resolves to, used to
/// disambiguate types whose `tagSet` alone is not unique (SEQUENCE vs
/// SEQUENCE OF, SET vs SET OF, CHOICE, ANY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    Boolean,
    Integer,
    Enumerated,
    Null,
    BitString,
    OctetString,
    ObjectIdentifier,
    Real,
    CharacterString,
    TimeString,
    Sequence,
    SequenceOf,
    Set,
    SetOf,
    Choice,
    Any,
    ExplicitTag,
    /// Not a real ASN.1 type. Marks a [`TagMapSpec`]: a dispatch-only
    /// wrapper that exposes a tag map for resolution without routing
    /// through `ChoiceDecoder`/`AnyDecoder`'s own wrapping semantics.
    TagMapDispatch,
}

/// A map from tag set to the [`Spec`] it selects, used for CHOICE
/// alternatives, ANY-by-tag resolution, and open-type lookup tables.
#[derive(Clone, Default)]
pub struct TagMap {
    entries: Vec<(TagSet, Arc<dyn Spec>)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, tag_set: TagSet, spec: Arc<dyn Spec>) -> Self {
        self.entries.push((tag_set, spec));
        self
    }

    pub fn get(&self, tag_set: &TagSet) -> Option<Arc<dyn Spec>> {
        self.entries
            .iter()
            .find(|(ts, _)| ts == tag_set)
            .map(|(_, s)| s.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TagSet, Arc<dyn Spec>)> {
        self.entries.iter()
    }
}

/// One named component of a SEQUENCE/SET.
#[derive(Clone)]
pub struct NamedType {
    pub name: &'static str,
    pub spec: Arc<dyn Spec>,
    pub optional: bool,
    pub default: Option<Value>,
    /// True if this component is an open type whose concrete Spec is
    /// resolved at decode time from a governing sibling value.
    pub open_type: bool,
    /// Position of the sibling component whose decoded value selects this
    /// open type's concrete Spec (conventionally the component immediately
    /// before it, e.g. an OBJECT IDENTIFIER followed by the value it
    /// governs). Only meaningful when `open_type` is set.
    pub governed_by: usize,
    /// The schema-embedded open-type lookup table, consulted when the
    /// caller's `DecodeOptions::open_types` does not cover the governing
    /// value.
    pub open_type_map: Option<HashMap<Vec<u8>, Arc<dyn Spec>>>,
}

impl NamedType {
    pub fn required(name: &'static str, spec: Arc<dyn Spec>) -> Self {
        Self {
            name,
            spec,
            optional: false,
            default: None,
            open_type: false,
            governed_by: 0,
            open_type_map: None,
        }
    }

    pub fn optional(name: &'static str, spec: Arc<dyn Spec>) -> Self {
        Self {
            name,
            spec,
            optional: true,
            default: None,
            open_type: false,
            governed_by: 0,
            open_type_map: None,
        }
    }

    pub fn defaulted(name: &'static str, spec: Arc<dyn Spec>, default: Value) -> Self {
        Self {
            name,
            spec,
            optional: false,
            default: Some(default),
            open_type: false,
            governed_by: 0,
            open_type_map: None,
        }
    }

    /// An open-type component: `spec` should be an [`AnySpec`] (or a
    /// tag-restricted ANY) so the engine hands back raw bytes that are
    /// later re-decoded under the Spec resolved from `governed_by`'s value.
    pub fn open(name: &'static str, spec: Arc<dyn Spec>, governed_by: usize) -> Self {
        Self {
            name,
            spec,
            optional: false,
            default: None,
            open_type: true,
            governed_by,
            open_type_map: None,
        }
    }

    pub fn with_open_type_map(mut self, map: HashMap<Vec<u8>, Arc<dyn Spec>>) -> Self {
        self.open_type_map = Some(map);
        self
    }

    pub fn is_optional_or_defaulted(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

/// The ordered component table of a SEQUENCE or SET.
#[derive(Clone, Default)]
pub struct NamedTypes {
    components: Vec<NamedType>,
}

impl NamedTypes {
    pub fn new(components: Vec<NamedType>) -> Self {
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&NamedType> {
        self.components.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedType> {
        self.components.iter()
    }

    /// True if every component's tag set is unique across the whole table
    /// (so SET components can be matched by tag alone, position-free).
    pub fn tag_map_unique(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.components
            .iter()
            .all(|c| seen.insert(c.spec.tag_set()))
    }

    pub fn has_optional_or_default(&self) -> bool {
        self.components.iter().any(|c| c.is_optional_or_defaulted())
    }

    pub fn has_open_types(&self) -> bool {
        self.components.iter().any(|c| c.open_type)
    }

    /// Positions of every component that is neither optional nor defaulted
    /// — these must be present for the container to decode successfully.
    pub fn required_components(&self) -> Vec<usize> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_optional_or_defaulted())
            .map(|(i, _)| i)
            .collect()
    }

    /// A tag map built from position `start` to the end of the table, used
    /// to resolve which optional/defaulted component a decoded tag belongs
    /// to.
    pub fn tag_map_near_position(&self, start: usize) -> TagMap {
        let mut map = TagMap::new();
        for c in self.components.iter().skip(start) {
            map = map.insert(c.spec.tag_set(), c.spec.clone());
        }
        map
    }

    /// The position of the (first) component whose tag set matches `tag_set`,
    /// searched from the beginning (used by SET, which is order-free).
    pub fn position_by_type(&self, tag_set: &TagSet) -> Option<usize> {
        self.components.iter().position(|c| &c.spec.tag_set() == tag_set)
    }

    /// The position of the first component at or after `start` whose tag
    /// set matches `tag_set` (used while relocating the SEQUENCE cursor
    /// past an optional/defaulted gap).
    pub fn position_near_type(&self, tag_set: &TagSet, start: usize) -> Option<usize> {
        self.components
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, c)| &c.spec.tag_set() == tag_set)
            .map(|(i, _)| i)
    }
}

/// The contract the dispatch engine consumes for a schema type. Treated as
/// opaque by the engine beyond these methods; this crate's own
/// [`NamedTypes`]/leaf builders are one concrete implementation, not a
/// privileged one.
pub trait Spec: fmt::Debug + Send + Sync {
    fn tag_set(&self) -> TagSet;
    fn type_id(&self) -> TypeId;

    /// For CHOICE and ANY: the alternatives this Spec dispatches over.
    fn tag_map(&self) -> Option<&TagMap> {
        None
    }

    /// For SEQUENCE OF / SET OF / ANY-with-governed-element: the element
    /// type.
    fn component_type(&self) -> Option<&Arc<dyn Spec>> {
        None
    }

    /// For SEQUENCE / SET: the named component table.
    fn named_types(&self) -> Option<&NamedTypes> {
        None
    }
}

/// A leaf (primitive) type's Spec: just a fixed tag set and type id.
#[derive(Debug, Clone)]
pub struct LeafSpec {
    tag_set: TagSet,
    type_id: TypeId,
}

impl LeafSpec {
    pub fn new(tag_set: TagSet, type_id: TypeId) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, type_id })
    }
}

impl Spec for LeafSpec {
    fn tag_set(&self) -> TagSet {
        self.tag_set.clone()
    }

    fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// A SEQUENCE or SET Spec.
#[derive(Debug, Clone)]
pub struct RecordSpec {
    tag_set: TagSet,
    type_id: TypeId,
    named_types: NamedTypes,
}

impl fmt::Debug for NamedTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.components.iter().map(|c| c.name)).finish()
    }
}

impl RecordSpec {
    pub fn sequence(tag_set: TagSet, named_types: NamedTypes) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, type_id: TypeId::Sequence, named_types })
    }

    pub fn set(tag_set: TagSet, named_types: NamedTypes) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, type_id: TypeId::Set, named_types })
    }
}

impl Spec for RecordSpec {
    fn tag_set(&self) -> TagSet {
        self.tag_set.clone()
    }

    fn type_id(&self) -> TypeId {
        self.type_id
    }

    fn named_types(&self) -> Option<&NamedTypes> {
        Some(&self.named_types)
    }
}

/// A SEQUENCE OF / SET OF Spec.
#[derive(Debug, Clone)]
pub struct RepeatedSpec {
    tag_set: TagSet,
    type_id: TypeId,
    component_type: Arc<dyn Spec>,
}

impl RepeatedSpec {
    pub fn sequence_of(tag_set: TagSet, component_type: Arc<dyn Spec>) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, type_id: TypeId::SequenceOf, component_type })
    }

    pub fn set_of(tag_set: TagSet, component_type: Arc<dyn Spec>) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, type_id: TypeId::SetOf, component_type })
    }
}

impl Spec for RepeatedSpec {
    fn tag_set(&self) -> TagSet {
        self.tag_set.clone()
    }

    fn type_id(&self) -> TypeId {
        self.type_id
    }

    fn component_type(&self) -> Option<&Arc<dyn Spec>> {
        Some(&self.component_type)
    }
}

/// A CHOICE Spec. `tag_set` is only meaningful when the CHOICE is itself
/// explicitly tagged; an untagged CHOICE is matched purely via `tag_map`.
#[derive(Debug, Clone)]
pub struct ChoiceSpec {
    tag_set: TagSet,
    alternatives: TagMap,
}

impl ChoiceSpec {
    pub fn new(tag_set: TagSet, alternatives: TagMap) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, alternatives })
    }
}

impl Spec for ChoiceSpec {
    fn tag_set(&self) -> TagSet {
        self.tag_set.clone()
    }

    fn type_id(&self) -> TypeId {
        TypeId::Choice
    }

    fn tag_map(&self) -> Option<&TagMap> {
        Some(&self.alternatives)
    }
}

/// A dispatch-only wrapper around a tag map, used by the constructed
/// decoder to resolve which named SET/SEQUENCE component a just-read tag
/// belongs to. Unlike [`ChoiceSpec`], `type_id` is not `Choice`, so the
/// engine's generic spec-resolution branch hands back the matched
/// alternative directly instead of wrapping it in `ValueKind::Choice`.
#[derive(Debug, Clone)]
pub struct TagMapSpec {
    alternatives: TagMap,
}

impl TagMapSpec {
    pub fn new(alternatives: TagMap) -> Arc<dyn Spec> {
        Arc::new(Self { alternatives })
    }
}

impl Spec for TagMapSpec {
    fn tag_set(&self) -> TagSet {
        TagSet::empty()
    }

    fn type_id(&self) -> TypeId {
        TypeId::TagMapDispatch
    }

    fn tag_map(&self) -> Option<&TagMap> {
        Some(&self.alternatives)
    }
}

/// An ANY Spec, optionally restricted to a tag map of acceptable
/// alternatives (otherwise any tag is accepted and the header is
/// preserved on an untagged match).
#[derive(Debug, Clone, Default)]
pub struct AnySpec {
    alternatives: Option<TagMap>,
}

impl AnySpec {
    pub fn new() -> Arc<dyn Spec> {
        Arc::new(Self { alternatives: None })
    }

    pub fn with_alternatives(alternatives: TagMap) -> Arc<dyn Spec> {
        Arc::new(Self { alternatives: Some(alternatives) })
    }
}

impl Spec for AnySpec {
    fn tag_set(&self) -> TagSet {
        TagSet::empty()
    }

    fn type_id(&self) -> TypeId {
        TypeId::Any
    }

    fn tag_map(&self) -> Option<&TagMap> {
        self.alternatives.as_ref()
    }
}

/// An EXPLICIT-tag wrapper Spec around a base type.
#[derive(Debug, Clone)]
pub struct ExplicitTagSpec {
    tag_set: TagSet,
    base: Arc<dyn Spec>,
}

impl ExplicitTagSpec {
    pub fn new(tag_set: TagSet, base: Arc<dyn Spec>) -> Arc<dyn Spec> {
        Arc::new(Self { tag_set, base })
    }

    pub fn base(&self) -> &Arc<dyn Spec> {
        &self.base
    }
}

impl Spec for ExplicitTagSpec {
    fn tag_set(&self) -> TagSet {
        self.tag_set.clone()
    }

    fn type_id(&self) -> TypeId {
        TypeId::ExplicitTag
    }

    fn component_type(&self) -> Option<&Arc<dyn Spec>> {
        Some(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asn1_core::tag::{Tag, TagForm};

    fn int_spec() -> Arc<dyn Spec> {
        LeafSpec::new(TagSet::single(Tag::universal(TagForm::Primitive, 2)), TypeId::Integer)
    }

    #[test]
    fn named_types_tag_map_unique_detects_duplicates() {
        let nt = NamedTypes::new(vec![
            NamedType::required("a", int_spec()),
            NamedType::required("b", int_spec()),
        ]);
        assert!(!nt.tag_map_unique());
    }

    #[test]
    fn required_components_skips_optional() {
        let nt = NamedTypes::new(vec![
            NamedType::required("a", int_spec()),
            NamedType::optional("b", int_spec()),
        ]);
        assert_eq!(nt.required_components(), vec![0]);
    }
}

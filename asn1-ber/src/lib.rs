//! A schema-driven BER/CER/DER decoder for ASN.1 (ITU-T X.690).
//!
//! The entry point is [`Engine`], built from a [`Registry`] of the
//! universal types (`Registry::universal`). Decoding proceeds TLV by TLV
//! through a ten-state dispatch loop (`engine`'s module docs), consulting
//! an optional [`Spec`] for schema-guided decoding and falling back to a
//! set of schema-less heuristics otherwise.

pub mod any;
pub mod choice;
pub mod constructed;
pub mod cursor;
pub mod engine;
pub mod explicit_tag;
pub mod primitives;
pub mod registry;
pub mod schema;

pub use cursor::Cursor;
pub use engine::{DecodeOptions, DecodeOutcome, Engine, EngineOptions, ValueDecoder};
pub use registry::Registry;
pub use schema::{
    AnySpec, ChoiceSpec, ExplicitTagSpec, LeafSpec, NamedType, NamedTypes, RecordSpec,
    RepeatedSpec, Spec, TagMap, TypeId,
};

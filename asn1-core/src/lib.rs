//! Core types shared by ASN.1 BER/CER/DER tooling.
//!
//! This crate provides the value types a decoder needs regardless of wire
//! format: tags and tag sets (§ITU-T X.690 clause 8.1), lengths, the bit
//! string value type, and the decoded value tree. It carries no codec logic
//! of its own; `asn1-ber` builds the BER decoder on top of these types.

pub mod bit_string;
pub mod error;
pub mod length;
pub mod tag;
pub mod value;

pub use bit_string::BitString;
pub use error::{Asn1Error, Asn1Result};
pub use length::Length;
pub use tag::{Tag, TagClass, TagForm, TagSet};
pub use value::{Value, ValueKind};

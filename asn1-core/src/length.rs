//! ASN.1 length octets (ITU-T X.690 clause 8.1.3).

use std::fmt;

/// A decoded BER length: either a definite byte count or the indefinite
/// form (length octet `0x80`), whose end is instead marked by an
/// end-of-contents (`00 00`) TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Length {
    Definite(u64),
    Indefinite,
}

impl Length {
    pub fn is_indefinite(self) -> bool {
        matches!(self, Length::Indefinite)
    }

    /// The definite byte count, if this length is definite.
    pub fn definite(self) -> Option<u64> {
        match self {
            Length::Definite(n) => Some(n),
            Length::Indefinite => None,
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Definite(n) => write!(f, "{n}"),
            Length::Indefinite => write!(f, "indefinite"),
        }
    }
}

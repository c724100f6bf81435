use thiserror::Error;

/// Error type for ASN.1 decoding operations.
#[derive(Error, Debug)]
pub enum Asn1Error {
    #[error("substrate underrun: {0}")]
    SubstrateUnderrun(String),

    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("length mismatch: decoder consumed {consumed} bytes, expected {expected}")]
    LengthMismatch { expected: u64, consumed: u64 },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for ASN.1 decoding operations.
pub type Asn1Result<T> = Result<T, Asn1Error>;

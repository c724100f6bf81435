//! The ASN.1 BIT STRING value type.

use crate::error::{Asn1Error, Asn1Result};
use std::fmt;

/// Arbitrary string of bits. A bit string value can have any length,
/// including zero, and is stored MSB-first within each byte.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitString {
    bytes: Vec<u8>,
    num_bits: usize,
}

impl BitString {
    /// Construct a new bit string from its byte backing and bit count.
    ///
    /// # Errors
    /// Returns an error if `num_bits` cannot fit in `bytes`.
    pub fn new(bytes: Vec<u8>, num_bits: usize) -> Asn1Result<Self> {
        if num_bits > bytes.len() * 8 {
            return Err(Asn1Error::MalformedEncoding(format!(
                "bit string needs {} bytes to hold {} bits, got {}",
                num_bits.div_ceil(8),
                num_bits,
                bytes.len()
            )));
        }
        Ok(Self { bytes, num_bits })
    }

    /// An empty bit string (zero bits).
    pub fn empty() -> Self {
        Self { bytes: Vec::new(), num_bits: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn get_bit(&self, index: usize) -> Asn1Result<bool> {
        if index >= self.num_bits {
            return Err(Asn1Error::MalformedEncoding(format!(
                "bit index {index} out of bounds (num_bits: {})",
                self.num_bits
            )));
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        Ok((self.bytes[byte_index] >> bit_index) & 1 == 1)
    }

    /// Concatenate the bit content of constructed BIT STRING segments, in
    /// encounter order, into a single value (X.690 clause 8.6.3). Only the
    /// last segment may carry unused trailing bits.
    pub fn concat(segments: Vec<BitString>) -> Self {
        let total_bits: usize = segments.iter().map(|s| s.num_bits).sum();
        let mut bytes = Vec::with_capacity(total_bits.div_ceil(8));
        let mut bit_buf = 0u8;
        let mut bit_buf_len = 0u8;
        for seg in &segments {
            for i in 0..seg.num_bits {
                let bit = seg.get_bit(i).expect("index within segment bounds");
                bit_buf = (bit_buf << 1) | (bit as u8);
                bit_buf_len += 1;
                if bit_buf_len == 8 {
                    bytes.push(bit_buf);
                    bit_buf = 0;
                    bit_buf_len = 0;
                }
            }
        }
        if bit_buf_len > 0 {
            bytes.push(bit_buf << (8 - bit_buf_len));
        }
        Self { bytes, num_bits: total_bits }
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_too_few_bytes() {
        let result = BitString::new(vec![0xFF], 16);
        assert!(result.is_err());
    }

    #[test]
    fn partial_byte() {
        let bit_string = BitString::new(vec![0xFF], 4).unwrap();
        assert_eq!(bit_string.num_bits(), 4);
        assert!(bit_string.get_bit(0).unwrap());
        assert!(bit_string.get_bit(3).unwrap());
    }

    #[test]
    fn concat_matches_primitive_equivalent() {
        let a = BitString::new(vec![0b1010_1010], 8).unwrap();
        let b = BitString::new(vec![0b1100_0000], 2).unwrap();
        let joined = BitString::concat(vec![a, b]);
        let expected = BitString::new(vec![0b1010_1010, 0b1100_0000], 10).unwrap();
        assert_eq!(joined, expected);
    }
}

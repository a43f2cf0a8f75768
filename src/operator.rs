//! Operator identities
//!
//! An operator is addressed by a fixed-width 20-byte identity. The all-zero
//! address is reserved: empty leaf slots carry it as their sentinel.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Width of an operator address in bytes.
pub const OPERATOR_ID_LEN: usize = 20;

/// Errors produced while parsing textual identities and seeds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseIdError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes.
    #[error("expected at most {expected} bytes, got {actual}")]
    InvalidLength {
        /// Maximum accepted length.
        expected: usize,
        /// Length actually decoded.
        actual: usize,
    },
}

/// Opaque, fixed-width operator address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorId([u8; OPERATOR_ID_LEN]);

impl OperatorId {
    /// The reserved empty-slot address.
    pub const ZERO: OperatorId = OperatorId([0; OPERATOR_ID_LEN]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; OPERATOR_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Address whose low bytes hold `value` (big-endian). Handy for fixtures.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; OPERATOR_ID_LEN];
        bytes[OPERATOR_ID_LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; OPERATOR_ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved sentinel address.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; OPERATOR_ID_LEN]
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for OperatorId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_padded::<OPERATOR_ID_LEN>(s)?;
        Ok(Self(bytes))
    }
}

/// Decode `0x`-prefixed (or bare) hex into a left-padded fixed-width array.
///
/// Shorter inputs are treated as big-endian numbers, so `0x01` becomes
/// `[0, .., 0, 1]`. Odd-length input gets an implicit leading zero nibble.
pub(crate) fn decode_padded<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let digits = s.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    let decoded = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    }
    .map_err(|err| ParseIdError::InvalidHex(err.to_string()))?;

    if decoded.len() > N {
        return Err(ParseIdError::InvalidLength {
            expected: N,
            actual: decoded.len(),
        });
    }

    let mut bytes = [0u8; N];
    bytes[N - decoded.len()..].copy_from_slice(&decoded);
    Ok(bytes)
}

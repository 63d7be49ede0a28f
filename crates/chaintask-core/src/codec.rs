//! Hex field codec for Ethereum-style JSON-RPC quantities and data.
//!
//! All functions accept input with or without a `0x` / `0X` prefix and never
//! panic on malformed input.

use num_bigint::BigUint;
use thiserror::Error;

/// Errors produced while decoding a hex-encoded wire value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed hex string {input:?}")]
    MalformedHex { input: String },

    #[error("hex value {input:?} does not fit in {bits} bits")]
    Overflow { input: String, bits: u32 },
}

impl CodecError {
    fn malformed(input: &str) -> Self {
        Self::MalformedHex {
            input: input.to_string(),
        }
    }

    fn overflow(input: &str, bits: u32) -> Self {
        Self::Overflow {
            input: input.to_string(),
            bits,
        }
    }
}

fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Validates the digits of `input` and returns them without the prefix.
fn hex_digits(input: &str) -> Result<&str, CodecError> {
    let digits = strip_prefix(input);
    if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(digits)
    } else {
        Err(CodecError::malformed(input))
    }
}

/// Significant digits of a quantity (leading zeros removed).
fn significant_digits(input: &str) -> Result<&str, CodecError> {
    Ok(hex_digits(input)?.trim_start_matches('0'))
}

/// Decode a hex quantity into its canonical decimal string.
///
/// The value is unbounded, so chain-native amounts wider than any machine
/// word still decode. `"0x"` decodes to `"0"`.
pub fn parse_hex_to_big_decimal(input: &str) -> Result<String, CodecError> {
    let digits = significant_digits(input)?;
    if digits.is_empty() {
        return Ok("0".to_string());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .map(|v| v.to_str_radix(10))
        .ok_or_else(|| CodecError::malformed(input))
}

/// Decode a hex quantity into a `u64`.
pub fn parse_hex_to_u64(input: &str) -> Result<u64, CodecError> {
    let digits = significant_digits(input)?;
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 16 {
        return Err(CodecError::overflow(input, 64));
    }
    u64::from_str_radix(digits, 16).map_err(|_| CodecError::malformed(input))
}

/// Normalize hex data to a lowercase, `0x`-prefixed byte string.
///
/// Odd-length input is left-padded with a zero nibble, so `0x1` becomes `0x01`.
pub fn parse_hex_bytes(input: &str) -> Result<String, CodecError> {
    let digits = hex_digits(input)?;
    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))
    } else {
        hex::decode(digits)
    }
    .map_err(|_| CodecError::malformed(input))?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

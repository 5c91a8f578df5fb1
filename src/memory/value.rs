//! Runtime value representation
//!
//! This module defines the [`Value`] enum held in the interpreter's register
//! file, and the byte encoding used when values are stored in simulated memory.
//!
//! # Value Types
//!
//! - [`Value::Int`]: signed integer, stored as 1 to 8 little-endian bytes
//! - [`Value::Pointer`]: a [`PointerValue`] carrying its provenance
//!
//! Integers are truncated to the referenced type's width on write and
//! sign-extended on read, the same conversion a C compiler performs when an
//! `int` is assigned through a `char *`.

use super::pointer::PointerValue;
use crate::interpreter::constants::MAX_SCALAR_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory address type (64-bit)
pub type Address = u64;

/// Runtime values in the simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Pointer(PointerValue),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Pointer(ptr) => write!(f, "{}", ptr),
        }
    }
}

/// Encode an integer into `width` little-endian bytes, truncating high bits.
///
/// Returns `None` when `width` is not a scalar width (1..=8).
pub fn encode_int(value: i64, width: usize) -> Option<Vec<u8>> {
    if width == 0 || width > MAX_SCALAR_SIZE {
        return None;
    }
    Some(value.to_le_bytes()[..width].to_vec())
}

/// Decode little-endian bytes into a sign-extended integer.
///
/// Returns `None` when the slice is not a scalar width (1..=8).
pub fn decode_int(bytes: &[u8]) -> Option<i64> {
    let width = bytes.len();
    if width == 0 || width > MAX_SCALAR_SIZE {
        return None;
    }
    let mut buf = [0u8; MAX_SCALAR_SIZE];
    buf[..width].copy_from_slice(bytes);
    let raw = i64::from_le_bytes(buf);
    // Shift the sign bit of the narrow value into bit 63 and back.
    let shift = (MAX_SCALAR_SIZE - width) * 8;
    Some((raw << shift) >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_truncates_on_encode() {
        assert_eq!(encode_int(0x1234, 1), Some(vec![0x34]));
        assert_eq!(encode_int(42, 4), Some(vec![42, 0, 0, 0]));
        assert_eq!(encode_int(1, 0), None);
        assert_eq!(encode_int(1, 9), None);
    }

    #[test]
    fn test_decode_sign_extends() {
        assert_eq!(decode_int(&[0xff]), Some(-1));
        assert_eq!(decode_int(&[0x7f]), Some(127));
        assert_eq!(decode_int(&[0xfe, 0xff, 0xff, 0xff]), Some(-2));
        assert_eq!(decode_int(&(-300i64).to_le_bytes()), Some(-300));
        assert_eq!(decode_int(&[]), None);
    }
}

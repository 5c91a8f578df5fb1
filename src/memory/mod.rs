//! Memory model for the simulator
//!
//! This module provides the core memory abstractions:
//! - [`address_space`]: the flat simulated memory with heap and stack regions
//! - [`heap`]: heap blocks with malloc/calloc/free and generation tracking
//! - [`stack`]: call frames with named slots
//! - [`pointer`]: typed pointer values carrying provenance
//! - [`value`]: register values and their byte encoding
//!
//! # Sizes
//!
//! There is no type system. Every pointer carries the size of the type it
//! references, and that size alone drives arithmetic and access width:
//! ```text
//! p + n  →  p.target + n * p.elem_size
//! *p     →  p.elem_size bytes at p.target
//! ```
//!
//! Pointers stored in memory take [`POINTER_SIZE`](crate::interpreter::constants::POINTER_SIZE)
//! bytes.

pub mod address_space;
pub mod heap;
pub mod pointer;
pub mod stack;
pub mod value;

use value::Address;

/// Check that `[target, target + len)` lies inside `[base, base + size)`.
///
/// Written with checked arithmetic so that a pointer moved below zero or past
/// `u64::MAX` is simply out of range.
pub fn range_within(base: Address, size: usize, target: Address, len: usize) -> bool {
    let Some(offset) = target.checked_sub(base) else {
        return false;
    };
    match offset.checked_add(len as u64) {
        Some(last) => last <= size as u64,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_within() {
        assert!(range_within(100, 12, 100, 4));
        assert!(range_within(100, 12, 108, 4));
        assert!(!range_within(100, 12, 109, 4));
        assert!(!range_within(100, 12, 112, 1));
        assert!(!range_within(100, 12, 99, 1));
        assert!(!range_within(100, 12, u64::MAX, 4));
    }
}

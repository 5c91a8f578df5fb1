//! Typed pointer values with provenance
//!
//! A [`PointerValue`] is what `&x`, `malloc` and pointer arithmetic produce. It
//! carries three things:
//!
//! - the current **target** address,
//! - the **referenced type size** (`sizeof(*p)`), which scales arithmetic and
//!   sets the width of a dereference,
//! - its **provenance**: the allocation it was derived from.
//!
//! Provenance is fixed when the pointer is created. Arithmetic and field
//! access only move the target, so a dereference can always be judged against
//! the allocation the pointer came from, wherever the target has wandered.

use super::heap::{BlockId, Generation};
use super::stack::FrameId;
use super::value::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The allocation a pointer was derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Derived from a heap block; `generation` is the block's generation when
    /// the pointer was created.
    Heap { block: BlockId, generation: Generation },
    /// Derived from a named slot in a call frame
    Stack { frame: FrameId, slot: String },
    Null,
}

/// A typed pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerValue {
    pub target: Address,
    pub elem_size: usize,
    pub provenance: Provenance,
}

impl PointerValue {
    /// The null pointer for a given referenced type size
    pub fn null(elem_size: usize) -> Self {
        PointerValue {
            target: 0,
            elem_size,
            provenance: Provenance::Null,
        }
    }

    /// Pointer to the base of a heap block
    pub fn to_heap(base: Address, elem_size: usize, block: BlockId, generation: Generation) -> Self {
        PointerValue {
            target: base,
            elem_size,
            provenance: Provenance::Heap { block, generation },
        }
    }

    /// Pointer to a stack slot (`&slot`)
    pub fn to_slot(address: Address, elem_size: usize, frame: FrameId, slot: &str) -> Self {
        PointerValue {
            target: address,
            elem_size,
            provenance: Provenance::Stack {
                frame,
                slot: slot.to_string(),
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.provenance, Provenance::Null)
    }

    /// `p + n`: move the target by `n * elem_size` bytes.
    ///
    /// Wraps instead of failing so that any sequence of moves can be undone
    /// exactly; whether the result is usable is decided at dereference time.
    pub fn add(&self, n: i64) -> PointerValue {
        let bytes = n.wrapping_mul(self.elem_size as i64);
        PointerValue {
            target: self.target.wrapping_add_signed(bytes),
            elem_size: self.elem_size,
            provenance: self.provenance.clone(),
        }
    }

    /// `&p->field`: a pointer `offset` bytes past the target, referencing a
    /// field of `field_size` bytes. Nothing is read through `self`.
    pub fn field(&self, offset: u64, field_size: usize) -> PointerValue {
        PointerValue {
            target: self.target.wrapping_add(offset),
            elem_size: field_size,
            provenance: self.provenance.clone(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Heap { block, generation } => {
                write!(f, "heap block #{} (gen {})", block, generation)
            }
            Provenance::Stack { frame, slot } => write!(f, "'{}' in frame #{}", slot, frame),
            Provenance::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for PointerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() && self.target == 0 {
            return write!(f, "NULL");
        }
        write!(f, "0x{:08x} -> {}", self.target, self.provenance)
    }
}

//! Simulated address space
//!
//! One flat, byte-addressable memory per simulation run:
//!
//! ```text
//! 0 ........ NULL_GUARD ........ heap_end ........ end
//! | unmapped | heap (grows up →) | (← grows down) stack |
//! ```
//!
//! The heap and stack regions each have their own capacity, so they can grow
//! toward each other but never overlap. The address space knows nothing about
//! provenance or liveness: every access is validated by the diagnostics engine
//! first, and the only checks made here are against the total capacity.
//!
//! Besides raw bytes it keeps a per-byte initialization map and a shadow table
//! of pointers stored in memory, so that a pointer written through `*pp = p`
//! can be read back with its provenance intact.

use super::pointer::PointerValue;
use super::value::Address;
use crate::interpreter::constants::{NULL_GUARD, POINTER_SIZE};
use rustc_hash::FxHashMap;
use std::ops::Range;
use thiserror::Error;

/// Capacity and range failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    #[error("stack overflow: requested {requested} bytes, {available} of {capacity} available")]
    StackExhausted {
        requested: usize,
        available: usize,
        capacity: usize,
    },

    #[error("heap exhausted: requested {requested} bytes, largest free run is {available} of {capacity}")]
    HeapExhausted {
        requested: usize,
        available: usize,
        capacity: usize,
    },

    #[error("address range 0x{addr:x}+{len} lies outside the address space")]
    OutOfRange { addr: Address, len: usize },
}

/// Which region an address falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Unmapped,
    Heap,
    Stack,
}

#[derive(Debug, Clone)]
pub struct AddressSpace {
    bytes: Vec<u8>,
    init_map: Vec<bool>,
    heap_capacity: usize,
    stack_capacity: usize,
    /// First never-used heap byte
    heap_top: Address,
    /// Free runs below `heap_top`, sorted by address and coalesced
    holes: Vec<(Address, usize)>,
    /// Lowest stack byte in use; equals `end()` when the stack is empty
    stack_pointer: Address,
    pointer_shadow: FxHashMap<Address, PointerValue>,
}

impl AddressSpace {
    /// Callers validate the capacities first; see `SimConfig::validate`.
    pub fn new(heap_capacity: usize, stack_capacity: usize) -> Self {
        let total = heap_capacity.saturating_add(stack_capacity);
        let end = NULL_GUARD + total as u64;
        AddressSpace {
            bytes: vec![0; total],
            init_map: vec![false; total],
            heap_capacity,
            stack_capacity,
            heap_top: NULL_GUARD,
            holes: Vec::new(),
            stack_pointer: end,
            pointer_shadow: FxHashMap::default(),
        }
    }

    pub fn heap_start(&self) -> Address {
        NULL_GUARD
    }

    pub fn heap_end(&self) -> Address {
        NULL_GUARD + self.heap_capacity as u64
    }

    /// One past the last mapped address
    pub fn end(&self) -> Address {
        self.heap_end() + self.stack_capacity as u64
    }

    pub fn heap_capacity(&self) -> usize {
        self.heap_capacity
    }

    pub fn stack_capacity(&self) -> usize {
        self.stack_capacity
    }

    pub fn stack_pointer(&self) -> Address {
        self.stack_pointer
    }

    /// Bytes currently carved out of the stack region
    pub fn stack_in_use(&self) -> usize {
        (self.end() - self.stack_pointer) as usize
    }

    /// Bytes currently carved out of the heap region
    pub fn heap_in_use(&self) -> usize {
        let below_top = (self.heap_top - NULL_GUARD) as usize;
        below_top - self.holes.iter().map(|(_, size)| size).sum::<usize>()
    }

    pub fn region_of(&self, addr: Address) -> Region {
        if addr < NULL_GUARD || addr >= self.end() {
            Region::Unmapped
        } else if addr < self.heap_end() {
            Region::Heap
        } else {
            Region::Stack
        }
    }

    /// Carve `size` bytes off the top of the stack. The new bytes start out
    /// uninitialized.
    pub fn allocate_stack(&mut self, size: usize) -> Result<Address, SpaceError> {
        let available = (self.stack_pointer - self.heap_end()) as usize;
        if size > available {
            return Err(SpaceError::StackExhausted {
                requested: size,
                available,
                capacity: self.stack_capacity,
            });
        }
        self.stack_pointer -= size as u64;
        self.reset_range(self.stack_pointer, size);
        Ok(self.stack_pointer)
    }

    /// Pop the stack back to a mark previously read from [`Self::stack_pointer`]
    pub fn release_stack(&mut self, mark: Address) {
        debug_assert!(mark >= self.stack_pointer && mark <= self.end());
        self.stack_pointer = mark.min(self.end());
    }

    /// Carve a heap run of `size` bytes: first fit among freed holes, then the
    /// untouched tail of the region. The new bytes start out uninitialized.
    pub fn allocate_heap(&mut self, size: usize) -> Result<Address, SpaceError> {
        if let Some(pos) = self.holes.iter().position(|&(_, len)| len >= size) {
            let (base, len) = self.holes[pos];
            if len == size {
                self.holes.remove(pos);
            } else {
                self.holes[pos] = (base + size as u64, len - size);
            }
            self.reset_range(base, size);
            return Ok(base);
        }

        let tail = (self.heap_end() - self.heap_top) as usize;
        if size > tail {
            let largest_hole = self.holes.iter().map(|&(_, len)| len).max().unwrap_or(0);
            return Err(SpaceError::HeapExhausted {
                requested: size,
                available: tail.max(largest_hole),
                capacity: self.heap_capacity,
            });
        }
        let base = self.heap_top;
        self.heap_top += size as u64;
        self.reset_range(base, size);
        Ok(base)
    }

    /// Return a heap run to the free list, merging it with neighbouring holes
    pub fn release_heap(&mut self, base: Address, size: usize) {
        let pos = self
            .holes
            .iter()
            .position(|&(addr, _)| addr > base)
            .unwrap_or(self.holes.len());
        self.holes.insert(pos, (base, size));

        // Merge with the following hole, then with the preceding one
        if pos + 1 < self.holes.len() {
            let (next_base, next_len) = self.holes[pos + 1];
            if base + size as u64 == next_base {
                self.holes[pos].1 += next_len;
                self.holes.remove(pos + 1);
            }
        }
        if pos > 0 {
            let (prev_base, prev_len) = self.holes[pos - 1];
            if prev_base + prev_len as u64 == self.holes[pos].0 {
                self.holes[pos - 1].1 += self.holes[pos].1;
                self.holes.remove(pos);
            }
        }

        // A hole touching the bump pointer gives its bytes back to the tail
        if let Some(&(last_base, last_len)) = self.holes.last() {
            if last_base + last_len as u64 == self.heap_top {
                self.heap_top = last_base;
                self.holes.pop();
            }
        }
    }

    /// Read `len` bytes. Uninitialized bytes read back as whatever was last
    /// stored there.
    pub fn read(&self, addr: Address, len: usize) -> Result<&[u8], SpaceError> {
        let range = self.index(addr, len)?;
        Ok(&self.bytes[range])
    }

    /// Write bytes and mark them initialized
    pub fn write(&mut self, addr: Address, data: &[u8]) -> Result<(), SpaceError> {
        let range = self.index(addr, data.len())?;
        self.clear_pointer_shadow(addr, data.len());
        self.bytes[range.clone()].copy_from_slice(data);
        self.init_map[range].fill(true);
        Ok(())
    }

    /// Fill a range with zeros and mark it initialized (calloc)
    pub fn zero_fill(&mut self, addr: Address, len: usize) -> Result<(), SpaceError> {
        let range = self.index(addr, len)?;
        self.clear_pointer_shadow(addr, len);
        self.bytes[range.clone()].fill(0);
        self.init_map[range].fill(true);
        Ok(())
    }

    /// Check if every byte in a range has been written since it was allocated
    pub fn is_initialized(&self, addr: Address, len: usize) -> bool {
        match self.index(addr, len) {
            Ok(range) => self.init_map[range].iter().all(|&b| b),
            Err(_) => false,
        }
    }

    /// Bytes of a range with uninitialized ones as `None` (for display)
    pub fn dump(&self, addr: Address, len: usize) -> Vec<Option<u8>> {
        match self.index(addr, len) {
            Ok(range) => range
                .map(|i| self.init_map[i].then_some(self.bytes[i]))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Store a pointer: its target address as 8 bytes plus its provenance
    pub fn store_pointer(&mut self, addr: Address, ptr: &PointerValue) -> Result<(), SpaceError> {
        self.write(addr, &ptr.target.to_le_bytes())?;
        self.pointer_shadow.insert(addr, ptr.clone());
        Ok(())
    }

    /// The pointer stored at exactly `addr`, if those bytes still hold one
    pub fn load_pointer(&self, addr: Address) -> Option<&PointerValue> {
        self.pointer_shadow.get(&addr)
    }

    fn index(&self, addr: Address, len: usize) -> Result<Range<usize>, SpaceError> {
        let out_of_range = SpaceError::OutOfRange { addr, len };
        let last = addr.checked_add(len as u64).ok_or(out_of_range.clone())?;
        if addr < NULL_GUARD || last > self.end() {
            return Err(out_of_range);
        }
        let start = (addr - NULL_GUARD) as usize;
        Ok(start..start + len)
    }

    /// Forget initialization and stored pointers for a freshly carved range
    fn reset_range(&mut self, addr: Address, len: usize) {
        if let Ok(range) = self.index(addr, len) {
            self.init_map[range].fill(false);
        }
        self.clear_pointer_shadow(addr, len);
    }

    /// Drop every stored pointer overlapping `[addr, addr + len)`
    fn clear_pointer_shadow(&mut self, addr: Address, len: usize) {
        if self.pointer_shadow.is_empty() {
            return;
        }
        let lo = addr.saturating_sub(POINTER_SIZE as u64 - 1);
        let hi = addr.saturating_add(len as u64);
        if len > self.pointer_shadow.len() {
            self.pointer_shadow.retain(|&key, _| key < lo || key >= hi);
        } else {
            for key in lo..hi {
                self.pointer_shadow.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_do_not_overlap() {
        let space = AddressSpace::new(256, 128);
        assert_eq!(space.heap_start(), NULL_GUARD);
        assert_eq!(space.heap_end(), NULL_GUARD + 256);
        assert_eq!(space.end(), NULL_GUARD + 384);
        assert_eq!(space.region_of(0), Region::Unmapped);
        assert_eq!(space.region_of(NULL_GUARD), Region::Heap);
        assert_eq!(space.region_of(NULL_GUARD + 256), Region::Stack);
        assert_eq!(space.region_of(space.end()), Region::Unmapped);
    }

    #[test]
    fn test_stack_grows_down_and_releases() {
        let mut space = AddressSpace::new(64, 64);
        let mark = space.stack_pointer();
        let a = space.allocate_stack(4).unwrap();
        let b = space.allocate_stack(8).unwrap();
        assert_eq!(a, space.end() - 4);
        assert_eq!(b, a - 8);
        assert_eq!(space.stack_in_use(), 12);
        space.release_stack(mark);
        assert_eq!(space.stack_in_use(), 0);
    }

    #[test]
    fn test_stack_overflow() {
        let mut space = AddressSpace::new(16, 16);
        space.allocate_stack(12).unwrap();
        let err = space.allocate_stack(8).unwrap_err();
        assert_eq!(
            err,
            SpaceError::StackExhausted {
                requested: 8,
                available: 4,
                capacity: 16
            }
        );
    }

    #[test]
    fn test_heap_reuses_freed_hole() {
        let mut space = AddressSpace::new(64, 16);
        let a = space.allocate_heap(16).unwrap();
        let b = space.allocate_heap(16).unwrap();
        space.release_heap(a, 16);
        let c = space.allocate_heap(8).unwrap();
        assert_eq!(c, a);
        let d = space.allocate_heap(8).unwrap();
        assert_eq!(d, a + 8);
        assert!(b > d);
    }

    #[test]
    fn test_heap_holes_coalesce_into_tail() {
        let mut space = AddressSpace::new(64, 16);
        let a = space.allocate_heap(16).unwrap();
        let b = space.allocate_heap(16).unwrap();
        space.release_heap(a, 16);
        space.release_heap(b, 16);
        assert_eq!(space.heap_in_use(), 0);
        // The whole region is one run again
        assert_eq!(space.allocate_heap(64).unwrap(), a);
    }

    #[test]
    fn test_heap_exhausted() {
        let mut space = AddressSpace::new(32, 16);
        space.allocate_heap(24).unwrap();
        assert!(matches!(
            space.allocate_heap(16),
            Err(SpaceError::HeapExhausted { requested: 16, .. })
        ));
    }

    #[test]
    fn test_initialization_tracking() {
        let mut space = AddressSpace::new(32, 16);
        let a = space.allocate_heap(8).unwrap();
        assert!(!space.is_initialized(a, 4));
        space.write(a, &[1, 2, 3, 4]).unwrap();
        assert!(space.is_initialized(a, 4));
        assert!(!space.is_initialized(a, 8));
        assert_eq!(space.dump(a + 2, 4), vec![Some(3), Some(4), None, None]);
    }

    #[test]
    fn test_reallocated_bytes_are_uninitialized_again() {
        let mut space = AddressSpace::new(32, 16);
        let a = space.allocate_heap(4).unwrap();
        space.write(a, &[9; 4]).unwrap();
        space.release_heap(a, 4);
        let b = space.allocate_heap(4).unwrap();
        assert_eq!(a, b);
        assert!(!space.is_initialized(b, 4));
    }

    #[test]
    fn test_pointer_shadow_cleared_by_overlapping_write() {
        let mut space = AddressSpace::new(64, 16);
        let a = space.allocate_heap(16).unwrap();
        let p = PointerValue::to_heap(a, 4, 0, 1);
        space.store_pointer(a + 8, &p).unwrap();
        assert_eq!(space.load_pointer(a + 8), Some(&p));
        assert_eq!(space.read(a + 8, 8).unwrap(), &a.to_le_bytes());

        space.write(a + 12, &[0]).unwrap();
        assert_eq!(space.load_pointer(a + 8), None);
    }

    #[test]
    fn test_out_of_range_access() {
        let space = AddressSpace::new(16, 16);
        assert!(space.read(0, 1).is_err());
        assert!(space.read(space.end() - 2, 4).is_err());
        assert!(space.read(u64::MAX, 2).is_err());
    }
}

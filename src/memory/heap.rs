//! Heap allocator for the simulator
//!
//! This module keeps the bookkeeping for every heap block ever allocated:
//! - malloc/calloc carve a run of the address space's heap region
//! - free marks the block [`BlockStatus::Freed`] and hands its bytes back
//! - blocks are never removed, so a stale pointer can still be traced to the
//!   block it came from and classified as use-after-free or double-free
//!
//! # Generations
//!
//! Every allocation draws a fresh generation from a counter that only grows,
//! and freeing bumps the block's own generation once more. A pointer records
//! the generation it was created under, so any pointer taken before a free no
//! longer matches its block, and a later block placed at the same address
//! never matches it either.
//!
//! The allocator does not validate anything itself; the diagnostics engine
//! checks a request before the interpreter calls in here.

use super::address_space::{AddressSpace, SpaceError};
use super::pointer::PointerValue;
use super::value::Address;
use serde::Serialize;
use thiserror::Error;

/// Index of a block in allocation order
pub type BlockId = usize;

/// Generation counter for detecting stale pointers
pub type Generation = u32;

/// State of a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockStatus {
    Live,
    Freed,
}

/// A block of heap memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapBlock {
    pub id: BlockId,
    pub base: Address,
    pub size: usize,
    /// Referenced type size of the pointer handed out for this block
    pub elem_size: usize,
    pub generation: Generation,
    pub status: BlockStatus,
    /// Instruction index of the malloc/calloc
    pub allocated_at: usize,
    pub freed_at: Option<usize>,
}

impl HeapBlock {
    pub fn is_live(&self) -> bool {
        self.status == BlockStatus::Live
    }

    /// One past the last byte of the block
    pub fn end(&self) -> Address {
        self.base + self.size as u64
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.base && addr < self.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error("heap block #{0} does not exist")]
    UnknownBlock(BlockId),

    #[error("heap block #{0} is already freed")]
    AlreadyFreed(BlockId),
}

/// The heap
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    blocks: Vec<HeapBlock>,
    next_generation: Generation,
}

impl HeapAllocator {
    pub fn new() -> Self {
        HeapAllocator {
            blocks: Vec::new(),
            next_generation: 1,
        }
    }

    /// Allocate `size` uninitialized bytes
    pub fn malloc(
        &mut self,
        space: &mut AddressSpace,
        size: usize,
        elem_size: usize,
        at: usize,
    ) -> Result<PointerValue, HeapError> {
        let base = space.allocate_heap(size)?;
        let generation = self.fresh_generation();
        let id = self.blocks.len();
        self.blocks.push(HeapBlock {
            id,
            base,
            size,
            elem_size,
            generation,
            status: BlockStatus::Live,
            allocated_at: at,
            freed_at: None,
        });
        log::debug!(
            "malloc({}) -> block #{} at 0x{:x} gen {}",
            size,
            id,
            base,
            generation
        );
        Ok(PointerValue::to_heap(base, elem_size, id, generation))
    }

    /// Allocate `count * size` zeroed bytes. The caller has already checked
    /// that the product does not overflow.
    pub fn calloc(
        &mut self,
        space: &mut AddressSpace,
        count: usize,
        size: usize,
        at: usize,
    ) -> Result<PointerValue, HeapError> {
        let total = count * size;
        let ptr = self.malloc(space, total, size, at)?;
        space.zero_fill(ptr.target, total)?;
        Ok(ptr)
    }

    /// Mark a live block freed and return its bytes to the address space
    pub fn free(
        &mut self,
        space: &mut AddressSpace,
        id: BlockId,
        at: usize,
    ) -> Result<(), HeapError> {
        let next = self.next_generation;
        let block = self.blocks.get_mut(id).ok_or(HeapError::UnknownBlock(id))?;
        if block.status == BlockStatus::Freed {
            return Err(HeapError::AlreadyFreed(id));
        }
        block.status = BlockStatus::Freed;
        block.freed_at = Some(at);
        block.generation = next;
        space.release_heap(block.base, block.size);
        log::debug!("free(block #{}) at 0x{:x}", id, block.base);
        self.next_generation = next.wrapping_add(1);
        Ok(())
    }

    /// Get a block by id, live or freed
    pub fn block(&self, id: BlockId) -> Option<&HeapBlock> {
        self.blocks.get(id)
    }

    /// The live block containing `addr`, if any
    pub fn live_block_at(&self, addr: Address) -> Option<&HeapBlock> {
        self.blocks
            .iter()
            .find(|block| block.is_live() && block.contains(addr))
    }

    /// Get all blocks (for display, includes freed ones)
    pub fn blocks(&self) -> &[HeapBlock] {
        &self.blocks
    }

    /// Every block still live: at the end of a run, these are the leaks
    pub fn collect_leaks(&self) -> Vec<HeapBlock> {
        self.blocks
            .iter()
            .filter(|block| block.is_live())
            .cloned()
            .collect()
    }

    /// Get total live bytes
    pub fn live_bytes(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| block.is_live())
            .map(|block| block.size)
            .sum()
    }

    fn fresh_generation(&mut self) -> Generation {
        let generation = self.next_generation;
        self.next_generation = generation.wrapping_add(1);
        generation
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

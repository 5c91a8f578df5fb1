// Snapshot history for stepping through a finished run

use crate::memory::address_space::AddressSpace;
use crate::memory::heap::{HeapAllocator, HeapBlock};
use crate::memory::stack::{Frame, FrameStack};
use crate::memory::value::Value;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// A frame with the bytes of its slots (empty once the frame is dead)
#[derive(Debug, Clone)]
pub struct FrameView {
    pub frame: Frame,
    pub contents: Vec<Vec<Option<u8>>>,
}

/// A heap block with its bytes (empty once the block is freed)
#[derive(Debug, Clone)]
pub struct BlockView {
    pub block: HeapBlock,
    pub contents: Vec<Option<u8>>,
}

/// Snapshot of simulator state after one instruction
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Instruction just executed; `None` for the state before the first one
    pub index: Option<usize>,
    pub frames: Vec<FrameView>,
    pub blocks: Vec<BlockView>,
    /// Register file, sorted by handle name
    pub registers: Vec<(String, Value)>,
    /// Number of findings recorded so far
    pub findings_len: usize,
    pub stack_in_use: usize,
    pub heap_in_use: usize,
}

impl Snapshot {
    pub fn capture(
        index: Option<usize>,
        space: &AddressSpace,
        heap: &HeapAllocator,
        frames: &FrameStack,
        registers: &FxHashMap<String, Value>,
        findings_len: usize,
    ) -> Self {
        let frames = frames
            .frames()
            .iter()
            .map(|frame| FrameView {
                contents: if frame.alive {
                    frame
                        .slots
                        .iter()
                        .map(|slot| space.dump(slot.address, slot.size))
                        .collect()
                } else {
                    Vec::new()
                },
                frame: frame.clone(),
            })
            .collect();

        let blocks = heap
            .blocks()
            .iter()
            .map(|block| BlockView {
                contents: if block.is_live() {
                    space.dump(block.base, block.size)
                } else {
                    Vec::new()
                },
                block: block.clone(),
            })
            .collect();

        let mut registers: Vec<(String, Value)> = registers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        registers.sort_by(|a, b| a.0.cmp(&b.0));

        Snapshot {
            index,
            frames,
            blocks,
            registers,
            findings_len,
            stack_in_use: space.stack_in_use(),
            heap_in_use: space.heap_in_use(),
        }
    }

    /// Estimate the memory usage of this snapshot in bytes
    pub fn estimated_size(&self) -> usize {
        // This is a rough estimate
        // Frames and blocks: a fixed overhead each plus their dumped bytes
        let frame_size: usize = self
            .frames
            .iter()
            .map(|view| 100 + view.contents.iter().map(Vec::len).sum::<usize>() * 2)
            .sum();
        let block_size: usize = self
            .blocks
            .iter()
            .map(|view| 80 + view.contents.len() * 2)
            .sum();

        // Registers: assume 64 bytes per entry on average
        let register_size = self.registers.len() * 64;

        frame_size + block_size + register_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot memory limit exceeded: {current} + {size} > {limit}")]
    LimitExceeded {
        current: usize,
        size: usize,
        limit: usize,
    },
}

/// Manages execution history for stepping back and forth
#[derive(Debug)]
pub struct SnapshotManager {
    snapshots: Vec<Snapshot>,
    max_memory: usize,
    current_memory: usize,
}

impl SnapshotManager {
    pub fn new(max_memory: usize) -> Self {
        SnapshotManager {
            snapshots: Vec::new(),
            max_memory,
            current_memory: 0,
        }
    }

    /// Add a snapshot to history
    pub fn push(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let snapshot_size = snapshot.estimated_size();

        if self.current_memory + snapshot_size > self.max_memory {
            return Err(SnapshotError::LimitExceeded {
                current: self.current_memory,
                size: snapshot_size,
                limit: self.max_memory,
            });
        }

        self.current_memory += snapshot_size;
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Get a snapshot by index
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// Get the number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Get current memory usage
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get max memory limit
    pub fn memory_limit(&self) -> usize {
        self.max_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_after_malloc() -> Snapshot {
        let mut space = AddressSpace::new(64, 64);
        let mut heap = HeapAllocator::new();
        let mut frames = FrameStack::new();
        frames.push_frame(&space, "main", None, None);
        frames.declare(&mut space, "x", 4).unwrap();
        let p = heap.malloc(&mut space, 4, 4, 0).unwrap();
        space.write(p.target, &[7, 0, 0, 0]).unwrap();

        let mut registers = FxHashMap::default();
        registers.insert("p".to_string(), Value::Pointer(p));
        Snapshot::capture(Some(0), &space, &heap, &frames, &registers, 0)
    }

    #[test]
    fn test_capture_dumps_live_memory() {
        let snapshot = capture_after_malloc();
        assert_eq!(snapshot.frames.len(), 1);
        assert_eq!(snapshot.frames[0].contents, vec![vec![None; 4]]);
        assert_eq!(snapshot.blocks[0].contents, vec![Some(7), Some(0), Some(0), Some(0)]);
        assert_eq!(snapshot.registers[0].0, "p");
        assert_eq!(snapshot.heap_in_use, 4);
        assert_eq!(snapshot.stack_in_use, 4);
    }

    #[test]
    fn test_manager_enforces_limit() {
        let snapshot = capture_after_malloc();
        let size = snapshot.estimated_size();
        let mut manager = SnapshotManager::new(size * 2);
        manager.push(snapshot.clone()).unwrap();
        manager.push(snapshot.clone()).unwrap();
        assert!(matches!(
            manager.push(snapshot),
            Err(SnapshotError::LimitExceeded { .. })
        ));
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.memory_usage(), size * 2);
    }
}

//! Diagnostics engine
//!
//! The single authority on whether a memory operation is allowed. Every
//! check here is a pure function of the pointer and the current heap/frame
//! state: it classifies a violation but never touches the address space, the
//! heap or the frame stack. The only state [`Diagnostics`] owns is the ordered
//! list of findings that becomes the [`SimulationReport`].
//!
//! # Checks
//!
//! - [`Diagnostics::check_access`]: provenance, liveness and bounds of a read
//!   or write through a pointer
//! - [`Diagnostics::check_initialized`]: whether the bytes about to be read
//!   were ever written
//! - [`Diagnostics::check_free`]: whether a pointer may be passed to `free`
//! - [`Diagnostics::check_heap_request`]: malloc/calloc sizes
//!
//! Bounds are always judged against the allocation the pointer was derived
//! from. An address that happens to fall inside a neighbouring allocation is
//! still out of bounds; the message names the neighbour to make that visible.

pub mod report;

use crate::memory::address_space::AddressSpace;
use crate::memory::heap::{BlockId, HeapAllocator};
use crate::memory::pointer::{PointerValue, Provenance};
use crate::memory::range_within;
use crate::memory::stack::FrameStack;
use crate::memory::value::Address;
use serde::Serialize;
use std::fmt;

pub use report::SimulationReport;

/// How a finding affects execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Warning,
    Fatal,
}

/// Finding taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// Dereference through a pointer into a popped frame
    DanglingPointerDeref,
    /// Dereference through a pointer into a freed heap block
    UseAfterFree,
    DoubleFree,
    /// Free of a non-base address, a stack pointer or a stale pointer
    InvalidFree,
    /// Access outside the originating allocation
    OutOfBounds,
    NullPointerDeref,
    /// Read of bytes never written since allocation
    UninitializedRead,
    /// Zero-sized or overflowing allocation request
    InvalidSize,
    /// Handle unbound at run time, non-pointer dereferenced, or a width that
    /// cannot hold the value
    InvalidOperand,
    /// Stack or heap region exhausted
    CapacityExceeded,
    /// Heap block still live at the end of the run
    MemoryLeak,
}

impl DiagnosticKind {
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticKind::UninitializedRead | DiagnosticKind::MemoryLeak => Severity::Warning,
            _ => Severity::Fatal,
        }
    }

    /// Resource-limit faults halt even when halting on fatal findings is off
    pub fn always_halts(self) -> bool {
        matches!(self, DiagnosticKind::CapacityExceeded)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::DanglingPointerDeref => "dangling pointer dereference",
            DiagnosticKind::UseAfterFree => "use after free",
            DiagnosticKind::DoubleFree => "double free",
            DiagnosticKind::InvalidFree => "invalid free",
            DiagnosticKind::OutOfBounds => "out-of-bounds access",
            DiagnosticKind::NullPointerDeref => "null pointer dereference",
            DiagnosticKind::UninitializedRead => "uninitialized read",
            DiagnosticKind::InvalidSize => "invalid allocation size",
            DiagnosticKind::InvalidOperand => "invalid operand",
            DiagnosticKind::CapacityExceeded => "capacity exceeded",
            DiagnosticKind::MemoryLeak => "memory leak",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// A classified violation, before it is placed in the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: DiagnosticKind,
    pub message: String,
    pub address: Option<Address>,
    pub pointer: Option<PointerValue>,
}

impl Violation {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Violation {
            kind,
            message: message.into(),
            address: None,
            pointer: None,
        }
    }

    pub fn at(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn through(mut self, pointer: &PointerValue) -> Self {
        self.address = Some(pointer.target);
        self.pointer = Some(pointer.clone());
        self
    }
}

/// One entry of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Instruction index, or the program length for end-of-run findings
    pub index: usize,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub address: Option<Address>,
    pub pointer: Option<PointerValue>,
}

impl Finding {
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Accumulated findings for one run
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    findings: Vec<Finding>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics {
            findings: Vec::new(),
        }
    }

    /// Append a finding
    pub fn record(&mut self, index: usize, violation: Violation, severity: Severity) -> &Finding {
        match severity {
            Severity::Fatal => log::debug!("[{}] {}: {}", index, violation.kind, violation.message),
            Severity::Warning => log::trace!("[{}] {}: {}", index, violation.kind, violation.message),
        }
        self.findings.push(Finding {
            index,
            kind: violation.kind,
            severity,
            message: violation.message,
            address: violation.address,
            pointer: violation.pointer,
        });
        // Just pushed
        &self.findings[self.findings.len() - 1]
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(Finding::is_fatal)
    }

    /// Validate a `len`-byte access through `ptr` (named `subject` in
    /// messages) against the allocation it was derived from.
    pub fn check_access(
        subject: &str,
        ptr: &PointerValue,
        len: usize,
        heap: &HeapAllocator,
        frames: &FrameStack,
    ) -> Result<(), Violation> {
        match &ptr.provenance {
            Provenance::Null => Err(Violation::new(
                DiagnosticKind::NullPointerDeref,
                format!("'{}' is NULL", subject),
            )
            .through(ptr)),

            Provenance::Heap { block, generation } => {
                let Some(owner) = heap.block(*block) else {
                    return Err(unknown_allocation(subject, ptr));
                };
                if !owner.is_live() {
                    let when = owner
                        .freed_at
                        .map(|at| format!(" at instruction {}", at))
                        .unwrap_or_default();
                    return Err(Violation::new(
                        DiagnosticKind::UseAfterFree,
                        format!(
                            "'{}' points into heap block #{} ({} bytes at 0x{:x}), freed{}",
                            subject, owner.id, owner.size, owner.base, when
                        ),
                    )
                    .through(ptr));
                }
                if owner.generation != *generation {
                    return Err(Violation::new(
                        DiagnosticKind::UseAfterFree,
                        format!(
                            "'{}' carries generation {} but heap block #{} is at generation {}",
                            subject, generation, owner.id, owner.generation
                        ),
                    )
                    .through(ptr));
                }
                if !range_within(owner.base, owner.size, ptr.target, len) {
                    let neighbour = heap
                        .live_block_at(ptr.target)
                        .filter(|other| other.id != owner.id)
                        .map(|other| format!(" (address lies in heap block #{})", other.id))
                        .unwrap_or_default();
                    return Err(Violation::new(
                        DiagnosticKind::OutOfBounds,
                        format!(
                            "'{}' accesses {} bytes at offset {} of heap block #{} ({} bytes){}",
                            subject,
                            len,
                            signed_offset(ptr.target, owner.base),
                            owner.id,
                            owner.size,
                            neighbour
                        ),
                    )
                    .through(ptr));
                }
                Ok(())
            }

            Provenance::Stack { frame, slot } => {
                let Some(owner) = frames.frame(*frame) else {
                    return Err(unknown_allocation(subject, ptr));
                };
                if !owner.alive {
                    let when = owner
                        .returned_at
                        .map(|at| format!(" at instruction {}", at))
                        .unwrap_or_default();
                    return Err(Violation::new(
                        DiagnosticKind::DanglingPointerDeref,
                        format!(
                            "'{}' points to '{}' in {}() (frame #{}), which returned{}",
                            subject, slot, owner.function, owner.id, when
                        ),
                    )
                    .through(ptr));
                }
                let Some(cell) = owner.slot(slot) else {
                    return Err(unknown_allocation(subject, ptr));
                };
                if !range_within(cell.address, cell.size, ptr.target, len) {
                    return Err(Violation::new(
                        DiagnosticKind::OutOfBounds,
                        format!(
                            "'{}' accesses {} bytes at offset {} of '{}' ({} bytes) in {}()",
                            subject,
                            len,
                            signed_offset(ptr.target, cell.address),
                            slot,
                            cell.size,
                            owner.function
                        ),
                    )
                    .through(ptr));
                }
                Ok(())
            }
        }
    }

    /// Check a validated read for bytes never written since allocation
    pub fn check_initialized(
        subject: &str,
        ptr: &PointerValue,
        len: usize,
        space: &AddressSpace,
    ) -> Result<(), Violation> {
        if space.is_initialized(ptr.target, len) {
            return Ok(());
        }
        Err(Violation::new(
            DiagnosticKind::UninitializedRead,
            format!(
                "'{}' reads {} bytes at 0x{:x} that were never written",
                subject, len, ptr.target
            ),
        )
        .through(ptr))
    }

    /// Validate `free(ptr)`. Returns the block to free, or `None` for
    /// `free(NULL)`, which does nothing.
    pub fn check_free(
        subject: &str,
        ptr: &PointerValue,
        heap: &HeapAllocator,
    ) -> Result<Option<BlockId>, Violation> {
        match &ptr.provenance {
            Provenance::Null => Ok(None),

            Provenance::Stack { frame, slot } => Err(Violation::new(
                DiagnosticKind::InvalidFree,
                format!(
                    "'{}' points to stack slot '{}' in frame #{}, not heap memory",
                    subject, slot, frame
                ),
            )
            .through(ptr)),

            Provenance::Heap { block, generation } => {
                let Some(owner) = heap.block(*block) else {
                    return Err(unknown_allocation(subject, ptr));
                };
                if !owner.is_live() {
                    let when = owner
                        .freed_at
                        .map(|at| format!(" at instruction {}", at))
                        .unwrap_or_default();
                    return Err(Violation::new(
                        DiagnosticKind::DoubleFree,
                        format!(
                            "heap block #{} behind '{}' was already freed{}",
                            owner.id, subject, when
                        ),
                    )
                    .through(ptr));
                }
                if owner.generation != *generation {
                    return Err(Violation::new(
                        DiagnosticKind::InvalidFree,
                        format!(
                            "'{}' is stale: generation {} but heap block #{} is at generation {}",
                            subject, generation, owner.id, owner.generation
                        ),
                    )
                    .through(ptr));
                }
                if ptr.target != owner.base {
                    return Err(Violation::new(
                        DiagnosticKind::InvalidFree,
                        format!(
                            "'{}' is {} bytes into heap block #{}; free needs the block's base address 0x{:x}",
                            subject,
                            signed_offset(ptr.target, owner.base),
                            owner.id,
                            owner.base
                        ),
                    )
                    .through(ptr));
                }
                Ok(Some(owner.id))
            }
        }
    }

    /// Validate a `count * size` allocation request against the heap
    /// capacity, returning the byte total.
    pub fn check_heap_request(count: usize, size: usize, capacity: usize) -> Result<usize, Violation> {
        let Some(total) = count.checked_mul(size) else {
            return Err(Violation::new(
                DiagnosticKind::InvalidSize,
                format!("{} * {} bytes overflows", count, size),
            ));
        };
        if total == 0 {
            return Err(Violation::new(
                DiagnosticKind::InvalidSize,
                "zero-byte allocation",
            ));
        }
        if total > capacity {
            return Err(Violation::new(
                DiagnosticKind::InvalidSize,
                format!(
                    "{} bytes requested, more than the whole heap ({} bytes)",
                    total, capacity
                ),
            ));
        }
        Ok(total)
    }
}

fn unknown_allocation(subject: &str, ptr: &PointerValue) -> Violation {
    Violation::new(
        DiagnosticKind::InvalidOperand,
        format!("'{}' refers to an allocation that never existed ({})", subject, ptr.provenance),
    )
    .through(ptr)
}

fn signed_offset(target: Address, base: Address) -> i128 {
    target as i128 - base as i128
}

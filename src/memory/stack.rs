//! Call stack implementation
//!
//! This module provides the frame stack for function calls:
//! - [`FrameStack`]: every frame ever pushed, plus the chain of active ones
//! - [`Frame`]: a single function's activation record
//! - [`Slot`]: a named local variable with its address and size
//!
//! # Frame Lifetime
//!
//! Popping a frame releases its stack bytes but keeps the [`Frame`] record
//! with `alive` cleared. A pointer into the frame keeps the frame id in its
//! provenance, so dereferencing it later finds the dead record and reports a
//! dangling pointer instead of reading whatever now lives at that address.

use super::address_space::{AddressSpace, SpaceError};
use super::value::Address;
use serde::Serialize;
use thiserror::Error;

/// Index of a frame in push order
pub type FrameId = usize;

/// Local variable on the stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub name: String,
    pub address: Address,
    pub size: usize,
}

impl Slot {
    pub fn end(&self) -> Address {
        self.address + self.size as u64
    }
}

/// Stack frame for a function call
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub id: FrameId,
    pub function: String,
    pub slots: Vec<Slot>,
    pub alive: bool,
    /// Stack pointer at entry; popping restores it
    pub stack_mark: Address,
    /// Result handle the caller binds on return
    pub return_to: Option<String>,
    /// Instruction index of the call (`None` for the root frame)
    pub called_at: Option<usize>,
    /// Instruction index of the return that popped this frame
    pub returned_at: Option<usize>,
}

impl Frame {
    /// Get a slot by name
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error("'{name}' is already declared in {function}()")]
    DuplicateSlot { name: String, function: String },

    #[error("no active frame")]
    NoFrame,

    #[error("cannot return from the root frame")]
    RootFrame,
}

/// The call stack
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
    active: Vec<FrameId>,
}

impl FrameStack {
    pub fn new() -> Self {
        FrameStack {
            frames: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Push a new frame; parameters are declared into it afterwards
    pub fn push_frame(
        &mut self,
        space: &AddressSpace,
        function: &str,
        return_to: Option<String>,
        called_at: Option<usize>,
    ) -> FrameId {
        let id = self.frames.len();
        self.frames.push(Frame {
            id,
            function: function.to_string(),
            slots: Vec::new(),
            alive: true,
            stack_mark: space.stack_pointer(),
            return_to,
            called_at,
            returned_at: None,
        });
        self.active.push(id);
        log::debug!("push frame #{} {}()", id, function);
        id
    }

    /// Declare a slot in the current frame
    pub fn declare(
        &mut self,
        space: &mut AddressSpace,
        name: &str,
        size: usize,
    ) -> Result<Address, StackError> {
        let id = *self.active.last().ok_or(StackError::NoFrame)?;
        let frame = &mut self.frames[id];
        if frame.slot(name).is_some() {
            return Err(StackError::DuplicateSlot {
                name: name.to_string(),
                function: frame.function.clone(),
            });
        }
        let address = space.allocate_stack(size)?;
        frame.slots.push(Slot {
            name: name.to_string(),
            address,
            size,
        });
        Ok(address)
    }

    /// Pop the current frame, release its bytes and mark it dead.
    ///
    /// The root frame cannot be popped.
    pub fn pop_frame(
        &mut self,
        space: &mut AddressSpace,
        at: usize,
    ) -> Result<&Frame, StackError> {
        if self.active.len() <= 1 {
            return Err(if self.active.is_empty() {
                StackError::NoFrame
            } else {
                StackError::RootFrame
            });
        }
        let id = self.active.pop().ok_or(StackError::NoFrame)?;
        let frame = &mut self.frames[id];
        frame.alive = false;
        frame.returned_at = Some(at);
        space.release_stack(frame.stack_mark);
        log::debug!("pop frame #{} {}()", id, frame.function);
        Ok(frame)
    }

    /// Remove the frame pushed by a call that failed before its body ran.
    /// No record is kept, since no pointer into it can exist yet.
    pub fn discard_frame(&mut self, space: &mut AddressSpace) {
        if self.active.len() <= 1 {
            return;
        }
        if let Some(frame) = self.frames.pop() {
            self.active.pop();
            space.release_stack(frame.stack_mark);
            log::debug!("discard frame #{} {}()", frame.id, frame.function);
        }
    }

    /// Get the current (top) frame
    pub fn current(&self) -> Option<&Frame> {
        self.active.last().map(|&id| &self.frames[id])
    }

    /// Get any frame by id, live or dead
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub fn is_alive(&self, id: FrameId) -> bool {
        self.frames.get(id).is_some_and(|frame| frame.alive)
    }

    /// Active frames from the root to the current one (for display)
    pub fn active_frames(&self) -> impl Iterator<Item = &Frame> {
        self.active.iter().map(|&id| &self.frames[id])
    }

    /// Get all frames, including popped ones
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Get the depth of the call stack
    pub fn depth(&self) -> usize {
        self.active.len()
    }
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AddressSpace, FrameStack) {
        let space = AddressSpace::new(64, 64);
        let mut stack = FrameStack::new();
        stack.push_frame(&space, "main", None, None);
        (space, stack)
    }

    #[test]
    fn test_declare_assigns_distinct_addresses() {
        let (mut space, mut stack) = setup();
        let x = stack.declare(&mut space, "x", 4).unwrap();
        let y = stack.declare(&mut space, "y", 8).unwrap();
        assert_ne!(x, y);
        let frame = stack.current().unwrap();
        assert_eq!(frame.slot("x").unwrap().address, x);
        assert_eq!(frame.slot("y").unwrap().end(), x);
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let (mut space, mut stack) = setup();
        stack.declare(&mut space, "x", 4).unwrap();
        assert_eq!(
            stack.declare(&mut space, "x", 4),
            Err(StackError::DuplicateSlot {
                name: "x".to_string(),
                function: "main".to_string()
            })
        );
    }

    #[test]
    fn test_same_name_in_nested_frame() {
        let (mut space, mut stack) = setup();
        let outer = stack.declare(&mut space, "x", 4).unwrap();
        stack.push_frame(&space, "f", None, Some(1));
        let inner = stack.declare(&mut space, "x", 4).unwrap();
        assert_ne!(outer, inner);
    }

    #[test]
    fn test_pop_marks_dead_and_releases() {
        let (mut space, mut stack) = setup();
        let before = space.stack_in_use();
        let id = stack.push_frame(&space, "f", Some("r".to_string()), Some(0));
        stack.declare(&mut space, "local", 16).unwrap();
        assert!(stack.is_alive(id));

        let popped = stack.pop_frame(&mut space, 3).unwrap();
        assert_eq!(popped.id, id);
        assert_eq!(popped.return_to.as_deref(), Some("r"));
        assert_eq!(popped.returned_at, Some(3));
        assert!(!stack.is_alive(id));
        assert_eq!(space.stack_in_use(), before);
        // The dead record is still there
        assert!(stack.frame(id).unwrap().slot("local").is_some());
    }

    #[test]
    fn test_root_frame_cannot_pop() {
        let (mut space, mut stack) = setup();
        assert!(matches!(
            stack.pop_frame(&mut space, 0),
            Err(StackError::RootFrame)
        ));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_declare_overflow() {
        let (mut space, mut stack) = setup();
        assert!(matches!(
            stack.declare(&mut space, "big", 128),
            Err(StackError::Space(SpaceError::StackExhausted { .. }))
        ));
        assert!(stack.current().unwrap().slots.is_empty());
    }
}

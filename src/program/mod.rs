//! Instruction set and program validation
//!
//! A [`Program`] is the straight-line instruction trace the simulator runs.
//! It normally arrives pre-parsed from an external front end (as JSON through
//! serde, or as a text listing through [`parse`]).
//!
//! # Operands
//!
//! Instructions name two kinds of things:
//! - **slots**: locals declared in the current frame (`declare`, `addr`)
//! - **handles**: results of earlier instructions (`addr`, `malloc`, `read`,
//!   `add`, `field`, `call ... -> r`), kept in the interpreter's register file
//!
//! Handles are global to the run, so a pointer returned by a call stays
//! reachable after the callee's frame is gone, which is exactly how a dangling
//! pointer escapes.
//!
//! [`Program::validate`] rejects static misuse (duplicate slots, unknown
//! names, unbalanced returns) before anything executes.

pub mod parse;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use parse::parse_listing;

/// A value operand: an integer constant, `NULL`, or a handle
///
/// In JSON, null is written `"NULL"` as in listings; a bare `null` is also
/// accepted where the operand is not optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JsonOperand", into = "JsonOperand")]
pub enum Operand {
    Const(i64),
    Handle(String),
    Null,
}

const NULL_TOKEN: &str = "NULL";

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonOperand {
    Const(i64),
    Name(String),
    Null,
}

impl From<JsonOperand> for Operand {
    fn from(raw: JsonOperand) -> Self {
        match raw {
            JsonOperand::Const(n) => Operand::Const(n),
            JsonOperand::Name(name) if name == NULL_TOKEN => Operand::Null,
            JsonOperand::Name(name) => Operand::Handle(name),
            JsonOperand::Null => Operand::Null,
        }
    }
}

impl From<Operand> for JsonOperand {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Const(n) => JsonOperand::Const(n),
            Operand::Handle(name) => JsonOperand::Name(name),
            Operand::Null => JsonOperand::Name(NULL_TOKEN.to_string()),
        }
    }
}

/// A call parameter: declared as a slot in the callee's frame and
/// initialized with `arg`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub size: usize,
    pub arg: Operand,
}

fn default_elem_size() -> usize {
    1
}

/// One simulator instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Instruction {
    /// Declare a local slot of `size` bytes in the current frame
    Declare {
        name: String,
        size: usize,
        #[serde(default)]
        init: Option<Operand>,
    },

    /// `dest = &slot`; the pointer references `elem_size` bytes (defaults to
    /// the slot size)
    AddressOf {
        dest: String,
        slot: String,
        #[serde(default)]
        elem_size: Option<usize>,
    },

    /// `dest = *ptr`
    DereferenceRead { dest: String, ptr: String },

    /// `*ptr = value`
    DereferenceWrite { ptr: String, value: Operand },

    /// `dest = src + offset` (scaled by the referenced type size)
    PointerAdd {
        dest: String,
        src: String,
        offset: i64,
    },

    /// `dest = &src->field` for a field `offset` bytes in, `size` bytes wide
    FieldAccess {
        dest: String,
        src: String,
        offset: u64,
        size: usize,
    },

    /// Push a frame for `function` and declare its parameters
    Call {
        function: String,
        #[serde(default)]
        params: Vec<Param>,
        #[serde(default)]
        result: Option<String>,
    },

    /// Pop the current frame, binding `value` to the caller's result handle
    Return {
        #[serde(default)]
        value: Option<Operand>,
    },

    /// `dest = malloc(size)` as a pointer to `elem_size`-byte elements
    Malloc {
        dest: String,
        size: usize,
        #[serde(default = "default_elem_size")]
        elem_size: usize,
    },

    /// `dest = calloc(count, size)`
    Calloc {
        dest: String,
        count: usize,
        size: usize,
    },

    /// `free(ptr)`
    Free { ptr: String },
}

impl Instruction {
    /// Short mnemonic used in listings and log lines
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Declare { .. } => "declare",
            Instruction::AddressOf { .. } => "addr",
            Instruction::DereferenceRead { .. } => "read",
            Instruction::DereferenceWrite { .. } => "write",
            Instruction::PointerAdd { .. } => "add",
            Instruction::FieldAccess { .. } => "field",
            Instruction::Call { .. } => "call",
            Instruction::Return { .. } => "ret",
            Instruction::Malloc { .. } => "malloc",
            Instruction::Calloc { .. } => "calloc",
            Instruction::Free { .. } => "free",
        }
    }

    /// The handle this instruction binds, if any
    pub fn defines(&self) -> Option<&str> {
        match self {
            Instruction::AddressOf { dest, .. }
            | Instruction::DereferenceRead { dest, .. }
            | Instruction::PointerAdd { dest, .. }
            | Instruction::FieldAccess { dest, .. }
            | Instruction::Malloc { dest, .. }
            | Instruction::Calloc { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Handles this instruction reads
    pub fn uses(&self) -> Vec<&str> {
        fn operand(op: &Operand) -> Option<&str> {
            match op {
                Operand::Handle(name) => Some(name),
                _ => None,
            }
        }

        match self {
            Instruction::Declare { init, .. } => init.iter().filter_map(operand).collect(),
            Instruction::DereferenceRead { ptr, .. } | Instruction::Free { ptr } => vec![ptr],
            Instruction::DereferenceWrite { ptr, value } => {
                let mut used = vec![ptr.as_str()];
                used.extend(operand(value));
                used
            }
            Instruction::PointerAdd { src, .. } | Instruction::FieldAccess { src, .. } => {
                vec![src]
            }
            Instruction::Call { params, .. } => {
                params.iter().filter_map(|p| operand(&p.arg)).collect()
            }
            Instruction::Return { value } => value.iter().filter_map(operand).collect(),
            Instruction::AddressOf { .. }
            | Instruction::Malloc { .. }
            | Instruction::Calloc { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(n) => write!(f, "{}", n),
            Operand::Handle(name) => write!(f, "{}", name),
            Operand::Null => f.write_str(NULL_TOKEN),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        match self {
            Instruction::Declare { name, size, init } => {
                write!(f, " {} {}", name, size)?;
                if let Some(init) = init {
                    write!(f, " = {}", init)?;
                }
                Ok(())
            }
            Instruction::AddressOf {
                dest,
                slot,
                elem_size,
            } => {
                write!(f, " {} {}", dest, slot)?;
                if let Some(elem) = elem_size {
                    write!(f, " elem {}", elem)?;
                }
                Ok(())
            }
            Instruction::DereferenceRead { dest, ptr } => write!(f, " {} {}", dest, ptr),
            Instruction::DereferenceWrite { ptr, value } => write!(f, " {} {}", ptr, value),
            Instruction::PointerAdd { dest, src, offset } => {
                write!(f, " {} {} {}", dest, src, offset)
            }
            Instruction::FieldAccess {
                dest,
                src,
                offset,
                size,
            } => write!(f, " {} {} {} {}", dest, src, offset, size),
            Instruction::Call {
                function,
                params,
                result,
            } => {
                write!(f, " {}", function)?;
                for param in params {
                    write!(f, " {}:{}={}", param.name, param.size, param.arg)?;
                }
                if let Some(result) = result {
                    write!(f, " -> {}", result)?;
                }
                Ok(())
            }
            Instruction::Return { value } => match value {
                Some(value) => write!(f, " {}", value),
                None => Ok(()),
            },
            Instruction::Malloc {
                dest,
                size,
                elem_size,
            } => {
                write!(f, " {} {}", dest, size)?;
                if *elem_size != 1 {
                    write!(f, " elem {}", elem_size)?;
                }
                Ok(())
            }
            Instruction::Calloc { dest, count, size } => {
                write!(f, " {} {} {}", dest, count, size)
            }
            Instruction::Free { ptr } => write!(f, " {}", ptr),
        }
    }
}

/// Static misuse and listing errors, reported before execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("instruction {index}: '{name}' is already declared in this frame")]
    DuplicateSlot { index: usize, name: String },

    #[error("instruction {index}: no slot named '{name}' in this frame")]
    UnknownSlot { index: usize, name: String },

    #[error("instruction {index}: handle '{name}' is used before it is defined")]
    UnknownHandle { index: usize, name: String },

    #[error("instruction {index}: return outside of any call")]
    UnbalancedReturn { index: usize },

    #[error("instruction {index}: {message}")]
    InvalidSize { index: usize, message: String },
}

/// An ordered instruction sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

/// Slots declared in one call level, plus the handle its return binds
#[derive(Default)]
struct Scope {
    slots: FxHashSet<String>,
    result: Option<String>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Program { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Parse a JSON instruction array
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject static misuse: duplicate slots in one frame, references to
    /// slots or handles that cannot exist yet, returns without a call, and
    /// zero-sized storage or element types.
    pub fn validate(&self) -> Result<(), ProgramError> {
        let mut scopes = vec![Scope::default()];
        let mut handles: FxHashSet<String> = FxHashSet::default();

        for (index, instr) in self.instructions.iter().enumerate() {
            for name in instr.uses() {
                if !handles.contains(name) {
                    return Err(ProgramError::UnknownHandle {
                        index,
                        name: name.to_string(),
                    });
                }
            }

            let zero = |what: &str| ProgramError::InvalidSize {
                index,
                message: format!("{} must be at least 1 byte", what),
            };

            match instr {
                Instruction::Declare { name, size, .. } => {
                    if *size == 0 {
                        return Err(zero("slot size"));
                    }
                    let scope = scopes.last_mut().ok_or(ProgramError::UnbalancedReturn { index })?;
                    if !scope.slots.insert(name.clone()) {
                        return Err(ProgramError::DuplicateSlot {
                            index,
                            name: name.clone(),
                        });
                    }
                }
                Instruction::AddressOf {
                    slot, elem_size, ..
                } => {
                    if *elem_size == Some(0) {
                        return Err(zero("element size"));
                    }
                    let known = scopes.last().is_some_and(|scope| scope.slots.contains(slot));
                    if !known {
                        return Err(ProgramError::UnknownSlot {
                            index,
                            name: slot.clone(),
                        });
                    }
                }
                Instruction::FieldAccess { size, .. } if *size == 0 => {
                    return Err(zero("field size"));
                }
                Instruction::Malloc { elem_size, .. } if *elem_size == 0 => {
                    return Err(zero("element size"));
                }
                Instruction::Call { params, result, .. } => {
                    let mut scope = Scope {
                        result: result.clone(),
                        ..Scope::default()
                    };
                    for param in params {
                        if param.size == 0 {
                            return Err(zero("parameter size"));
                        }
                        if !scope.slots.insert(param.name.clone()) {
                            return Err(ProgramError::DuplicateSlot {
                                index,
                                name: param.name.clone(),
                            });
                        }
                    }
                    scopes.push(scope);
                }
                Instruction::Return { .. } => {
                    if scopes.len() <= 1 {
                        return Err(ProgramError::UnbalancedReturn { index });
                    }
                    if let Some(result) = scopes.pop().and_then(|scope| scope.result) {
                        handles.insert(result);
                    }
                }
                _ => {}
            }

            if let Some(dest) = instr.defines() {
                handles.insert(dest.to_string());
            }
        }
        Ok(())
    }

    /// Count of instructions per mnemonic (for the CLI summary)
    pub fn histogram(&self) -> FxHashMap<&'static str, usize> {
        let mut counts = FxHashMap::default();
        for instr in &self.instructions {
            *counts.entry(instr.mnemonic()).or_insert(0) += 1;
        }
        counts
    }
}

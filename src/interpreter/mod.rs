//! Instruction interpreter
//!
//! This module provides the core execution logic:
//! - [`engine`]: the [`Simulator`](engine::Simulator) and its dispatch loop
//! - [`errors`]: setup errors and conversions from component errors to findings
//! - [`constants`]: address layout and default capacities
//!
//! Instruction handlers live in `memory_ops` (slots and pointers), `calls`
//! (frames) and `builtins` (heap).
//!
//! # Execution Model
//!
//! Instructions run strictly in order. Each handler returns
//! `Result<(), Violation>`; an `Err` is recorded as a finding and, if fatal,
//! stops the run unless halting is turned off. A snapshot is taken after
//! every instruction, whether or not it faulted.

mod builtins;
mod calls;
pub mod constants;
pub mod engine;
pub mod errors;
mod memory_ops;

pub use engine::Simulator;
pub use errors::SetupError;

//! # Introduction
//!
//! memsim executes small pointer programs against a simulated flat address
//! space and reports every memory-safety violation it can prove: dangling
//! stack pointers, use after free, double and invalid frees, out-of-bounds
//! accesses, uninitialized reads and leaks. A snapshot of the full memory
//! state is captured after each instruction and can be navigated forward and
//! backward through a terminal UI built with [ratatui](https://docs.rs/ratatui).
//!
//! ## Execution pipeline
//!
//! ```text
//! Listing/JSON → Program → Simulator → Report + Snapshots → TUI
//! ```
//!
//! 1. [`program`]: the instruction set, a text listing parser and static
//!    validation.
//! 2. [`interpreter`]: executes instructions in order, routing every memory
//!    access through the diagnostics engine.
//! 3. [`memory`]: the address space, heap allocator and frame stack. Pointers
//!    carry provenance (which allocation they came from, and its generation)
//!    so violations are judged against the right allocation.
//! 4. [`diagnostics`]: the checks themselves, plus the findings list that
//!    becomes the [`diagnostics::SimulationReport`].
//! 5. [`snapshot`]: per-instruction history with a configurable memory limit.
//! 6. [`ui`]: ratatui-based trace viewer; not part of the stable library API.
//!
//! ## Example
//!
//! ```
//! use memsim::config::SimConfig;
//! use memsim::diagnostics::DiagnosticKind;
//! use memsim::interpreter::Simulator;
//! use memsim::program::parse_listing;
//!
//! let program = parse_listing("malloc p 4 elem 4\nfree p\nwrite p 1\n").unwrap();
//! let mut simulator = Simulator::new(program, SimConfig::default()).unwrap();
//! let report = simulator.run();
//! assert_eq!(report.terminal_finding().unwrap().kind, DiagnosticKind::UseAfterFree);
//! ```

pub mod config;
pub mod diagnostics;
pub mod interpreter;
pub mod memory;
pub mod program;
pub mod snapshot;
pub mod ui;

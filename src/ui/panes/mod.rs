//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`program`]: instruction listing with the current instruction and finding markers
//! - [`stack`]: live and returned frames with slot dumps, plus the handle registers
//! - [`heap`]: heap blocks with their state, generation and hex dumps
//! - [`findings`]: findings recorded so far
//! - [`status`]: status bar with keybindings and execution state
//! - `utils`: shared hex dump, value formatting and scrolling helpers
//!
//! Each pane module exports a primary `render_*` function and, where it
//! scrolls, its scroll state type.

mod utils;

pub mod findings;
pub mod heap;
pub mod program;
pub mod stack;
pub mod status;

// Re-export render functions for convenience
pub use findings::{render_finding_detail, render_findings_pane};
pub use heap::{render_heap_pane, HeapRenderData, HeapScrollState};
pub use program::{render_program_pane, ProgramRenderData, ProgramScrollState};
pub use stack::{render_stack_pane, StackRenderData, StackScrollState};
pub use status::{render_status_bar, StatusRenderData};

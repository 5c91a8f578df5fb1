//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! The UI is organized into three layers:
//!
//! - **[`app`]**: application state, keyboard event loop, pane focus, history cursor
//! - **[`panes`]**: stateless render functions for each visible pane (program,
//!   findings, stack, heap, status bar)
//! - **[`theme`]**: centralized color palette used by all panes
//!
//! The entry point for consumers is [`App`]: construct it with a finished
//! [`Simulator`] and its report, and call [`App::run`] to start the event loop.
//!
//! [`Simulator`]: crate::interpreter::Simulator
//! [`App::run`]: app::App::run

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;

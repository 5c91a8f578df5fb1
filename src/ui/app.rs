//! Main TUI application state and logic
//!
//! The simulation has already run to completion when the app starts; the app
//! only moves a cursor through the recorded snapshot history.

use crate::diagnostics::{Finding, SimulationReport};
use crate::interpreter::Simulator;
use crate::snapshot::Snapshot;
use crate::ui::panes::{
    HeapRenderData, HeapScrollState, ProgramRenderData, ProgramScrollState, StackRenderData,
    StackScrollState, StatusRenderData,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Program,
    Findings,
    Stack,
    Heap,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: program -> findings -> stack -> heap)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Program => FocusedPane::Findings,
            FocusedPane::Findings => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Program,
        }
    }

    /// Move focus to the previous pane (counter-clockwise)
    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Program => FocusedPane::Heap,
            FocusedPane::Findings => FocusedPane::Program,
            FocusedPane::Stack => FocusedPane::Findings,
            FocusedPane::Heap => FocusedPane::Stack,
        }
    }
}

/// The main application state
pub struct App {
    /// The finished simulation and its history
    pub simulator: Simulator,

    pub report: SimulationReport,

    /// Position in the snapshot history
    pub position: usize,

    /// Currently focused pane
    pub focused_pane: FocusedPane,

    /// Per-pane scroll state
    pub program_scroll: ProgramScrollState,
    pub stack_scroll: StackScrollState,
    pub heap_scroll: HeapScrollState,
    pub findings_scroll: usize,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,

    /// Whether auto-play mode is active
    pub is_playing: bool,

    /// Last time a step was taken in play mode
    pub last_play_time: Instant,

    /// Last time space was pressed (for debouncing)
    pub last_space_press: Instant,
}

impl App {
    pub fn new(simulator: Simulator, report: SimulationReport) -> Self {
        let status_message = if simulator.history_truncated() {
            format!(
                "History truncated after {} steps (snapshot memory limit)",
                simulator.total_snapshots()
            )
        } else {
            String::from("Ready!")
        };
        let now = Instant::now();
        App {
            simulator,
            report,
            position: 0,
            focused_pane: FocusedPane::Program,
            program_scroll: ProgramScrollState {
                offset: 0,
                target_row: None,
            },
            stack_scroll: StackScrollState { offset: 0 },
            heap_scroll: HeapScrollState {
                offset: 0,
                prev_item_count: 0,
            },
            findings_scroll: 0,
            should_quit: false,
            status_message,
            is_playing: false,
            last_play_time: now,
            last_space_press: now.checked_sub(Duration::from_secs(1)).unwrap_or(now),
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.is_playing && self.last_play_time.elapsed() >= Duration::from_millis(500) {
                if self.step_forward() {
                    self.status_message = "Playing...".to_string();
                } else {
                    self.is_playing = false;
                    self.status_message = "Playback complete".to_string();
                }
                self.last_play_time = Instant::now();
            }

            // Poll with a timeout so auto-play keeps running
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn total_steps(&self) -> usize {
        self.simulator.total_snapshots()
    }

    fn is_at_end(&self) -> bool {
        self.position + 1 >= self.total_steps()
    }

    /// Findings recorded up to the current snapshot
    pub fn visible_findings(&self) -> &[Finding] {
        visible_findings(&self.simulator, &self.report, self.position)
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        // Panes, a detail line for the latest finding, then the status bar
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(main_chunks[0]);

        // Left column: Program (top) | Findings (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(columns[0]);

        // Right column: Stack (top) | Heap (bottom)
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        let findings = visible_findings(&self.simulator, &self.report, self.position);
        let latest = findings.last();
        let error_address = findings
            .iter()
            .rev()
            .find(|finding| finding.is_fatal())
            .and_then(|finding| finding.address);

        let snapshot = self.simulator.snapshot(self.position);
        let current = snapshot.and_then(|snapshot| snapshot.index);

        super::panes::render_program_pane(
            frame,
            left_rows[0],
            ProgramRenderData {
                program: self.simulator.program(),
                current,
                findings,
            },
            self.focused_pane == FocusedPane::Program,
            &mut self.program_scroll,
        );

        super::panes::render_findings_pane(
            frame,
            left_rows[1],
            findings,
            self.focused_pane == FocusedPane::Findings,
            &mut self.findings_scroll,
        );

        super::panes::render_stack_pane(
            frame,
            right_rows[0],
            StackRenderData {
                frames: snapshot.map(|snapshot| snapshot.frames.as_slice()).unwrap_or_default(),
                registers: snapshot.map(|snapshot| snapshot.registers.as_slice()).unwrap_or_default(),
            },
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );

        super::panes::render_heap_pane(
            frame,
            right_rows[1],
            HeapRenderData {
                blocks: snapshot.map(|snapshot| snapshot.blocks.as_slice()).unwrap_or_default(),
                heap_in_use: snapshot.map_or(0, |snapshot| snapshot.heap_in_use),
                error_address,
            },
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );

        super::panes::render_finding_detail(frame, main_chunks[1], latest);

        super::panes::render_status_bar(
            frame,
            main_chunks[2],
            StatusRenderData {
                message: &self.status_message,
                current_step: self.position,
                total_steps: self.total_steps(),
                halted: self.report.halted_at.is_some(),
                is_playing: self.is_playing,
            },
        );
    }

    /// Handle keyboard events
    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            // Number keys step forward N times directly
            KeyCode::Char(c @ '1'..='9') => {
                self.is_playing = false;
                let n = c.to_digit(10).unwrap_or(1) as usize;
                let stepped = (0..n).take_while(|_| self.step_forward()).count();
                self.status_message = format!("Stepped forward {} step(s)", stepped);
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.prev();
            }
            KeyCode::Left => {
                self.is_playing = false;
                self.status_message = if self.step_backward() {
                    "Stepped backward".to_string()
                } else {
                    "Already at the start".to_string()
                };
            }
            KeyCode::Right => {
                self.is_playing = false;
                self.status_message = if self.step_forward() {
                    "Stepped forward".to_string()
                } else {
                    "Already at the end".to_string()
                };
            }
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Program => {
                    // Scrolling up makes the current line move down visually
                    if let Some(row) = self.program_scroll.target_row {
                        self.program_scroll.target_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Findings => {
                    self.findings_scroll = self.findings_scroll.saturating_sub(1);
                }
                FocusedPane::Stack => {
                    self.stack_scroll.offset = self.stack_scroll.offset.saturating_sub(1);
                }
                FocusedPane::Heap => {
                    self.heap_scroll.offset = self.heap_scroll.offset.saturating_sub(1);
                }
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Program => {
                    if let Some(row) = self.program_scroll.target_row {
                        self.program_scroll.target_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Findings => {
                    self.findings_scroll = self.findings_scroll.saturating_add(1);
                }
                FocusedPane::Stack => {
                    self.stack_scroll.offset = self.stack_scroll.offset.saturating_add(1);
                }
                FocusedPane::Heap => {
                    self.heap_scroll.offset = self.heap_scroll.offset.saturating_add(1);
                }
            },
            KeyCode::Char(' ') => {
                // Toggle auto-play mode (with 200ms debounce to prevent key repeat spam)
                if self.last_space_press.elapsed() >= Duration::from_millis(200) {
                    self.last_space_press = Instant::now();
                    self.is_playing = !self.is_playing;
                    if self.is_playing {
                        let now = Instant::now();
                        self.last_play_time =
                            now.checked_sub(Duration::from_secs(1)).unwrap_or(now);
                        self.status_message = "Playing...".to_string();
                    } else {
                        self.status_message = "Paused".to_string();
                    }
                }
            }
            KeyCode::Enter => {
                self.is_playing = false;
                self.position = self.total_steps().saturating_sub(1);
                self.findings_scroll = usize::MAX;
                self.status_message = "Jumped to end".to_string();
            }
            KeyCode::Backspace => {
                self.is_playing = false;
                self.position = 0;
                self.status_message = "Jumped to start".to_string();
            }
            _ => {}
        }
    }

    /// Move one snapshot forward; false at the end of the history
    fn step_forward(&mut self) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.position += 1;
        // Keep the newest finding in view
        self.findings_scroll = usize::MAX;
        true
    }

    fn step_backward(&mut self) -> bool {
        if self.position == 0 {
            return false;
        }
        self.position -= 1;
        true
    }
}

/// Findings recorded up to history `position`. The last snapshot also shows
/// the end-of-run leak findings.
fn visible_findings<'a>(
    simulator: &Simulator,
    report: &'a SimulationReport,
    position: usize,
) -> &'a [Finding] {
    let at_end = position + 1 >= simulator.total_snapshots();
    if at_end && !simulator.history_truncated() {
        return &report.findings;
    }
    let len = simulator
        .snapshot(position)
        .map_or(0, |snapshot: &Snapshot| snapshot.findings_len)
        .min(report.findings.len());
    &report.findings[..len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::program::parse_listing;
    use crossterm::event::KeyModifiers;

    fn app(source: &str) -> App {
        let mut simulator =
            Simulator::new(parse_listing(source).unwrap(), SimConfig::default()).unwrap();
        let report = simulator.run();
        App::new(simulator, report)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_stepping_is_bounded() {
        let mut app = app("malloc p 4\nfree p\n");
        assert_eq!(app.total_steps(), 3);

        press(&mut app, KeyCode::Left);
        assert_eq!(app.position, 0);
        press(&mut app, KeyCode::Char('9'));
        assert_eq!(app.position, 2);
        assert_eq!(app.status_message, "Stepped forward 2 step(s)");
        press(&mut app, KeyCode::Right);
        assert_eq!(app.position, 2);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.position, 0);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.position, 2);
    }

    #[test]
    fn test_findings_follow_history() {
        let mut app = app("malloc p 4\nmalloc q 4\nfree p\n");
        // The leak only appears once the end of the run is reached
        assert!(app.visible_findings().is_empty());
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        assert!(app.visible_findings().is_empty());
        press(&mut app, KeyCode::Right);
        assert_eq!(app.visible_findings().len(), 1);
        press(&mut app, KeyCode::Left);
        assert!(app.visible_findings().is_empty());
    }

    #[test]
    fn test_focus_cycles() {
        let mut app = app("declare x 4\n");
        for _ in 0..4 {
            press(&mut app, KeyCode::Tab);
        }
        assert_eq!(app.focused_pane, FocusedPane::Program);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.focused_pane, FocusedPane::Heap);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}

//! Program listing pane
//!
//! Shows the instruction listing with the instruction of the current
//! snapshot highlighted. Instructions that raised findings so far carry a
//! marker in the gutter: `✗` for fatal, `!` for warnings.

use super::utils::pane_block;
use crate::diagnostics::{Finding, Severity};
use crate::program::{Instruction, Program};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Scroll state for the program pane
pub struct ProgramScrollState {
    pub offset: usize,
    /// Visual row the current instruction is kept at
    pub target_row: Option<usize>,
}

/// Data needed to render the program pane
pub struct ProgramRenderData<'a> {
    pub program: &'a Program,
    /// Instruction just executed; `None` before the first
    pub current: Option<usize>,
    /// Findings visible at this point of the history
    pub findings: &'a [Finding],
}

/// Worst severity raised by instruction `index`
fn marker(findings: &[Finding], index: usize) -> Option<Severity> {
    findings
        .iter()
        .filter(|finding| finding.index == index)
        .map(|finding| finding.severity)
        .max()
}

fn instruction_spans(instruction: &Instruction) -> Vec<Span<'static>> {
    let text = instruction.to_string();
    let (mnemonic, rest) = text.split_once(' ').unwrap_or((text.as_str(), ""));
    let mnemonic_style = match instruction {
        Instruction::Call { .. } | Instruction::Return { .. } => {
            Style::default().fg(DEFAULT_THEME.function)
        }
        Instruction::Malloc { .. } | Instruction::Calloc { .. } | Instruction::Free { .. } => {
            Style::default().fg(DEFAULT_THEME.scalar)
        }
        _ => Style::default().fg(DEFAULT_THEME.accent),
    }
    .add_modifier(Modifier::BOLD);

    vec![
        Span::styled(mnemonic.to_string(), mnemonic_style),
        Span::raw(" "),
        Span::styled(rest.to_string(), Style::default().fg(DEFAULT_THEME.fg)),
    ]
}

/// Render the program pane
pub fn render_program_pane(
    frame: &mut Frame,
    area: Rect,
    data: ProgramRenderData,
    is_focused: bool,
    scroll_state: &mut ProgramScrollState,
) {
    let block = pane_block(" Program ", is_focused);
    let total_lines = data.program.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    let target_row = scroll_state
        .target_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_row = Some(target_row);

    // Keep the current instruction at the target row
    if let Some(current) = data.current {
        scroll_state.offset = current.saturating_sub(target_row);
    }
    if total_lines > visible_height {
        scroll_state.offset = scroll_state.offset.min(total_lines - visible_height);
    } else {
        scroll_state.offset = 0;
    }

    let lines: Vec<Line> = data
        .program
        .instructions
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(index, instruction)| {
            let is_current = data.current == Some(index);
            let (gutter, gutter_style) = match marker(data.findings, index) {
                Some(Severity::Fatal) => ("✗", Style::default().fg(DEFAULT_THEME.fatal)),
                Some(Severity::Warning) => ("!", Style::default().fg(DEFAULT_THEME.warning)),
                None => (" ", Style::default()),
            };
            let num_style = if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.scalar)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.muted)
            };

            let mut spans = vec![
                Span::styled(gutter, gutter_style.add_modifier(Modifier::BOLD)),
                Span::styled(format!("{:4} ", index), num_style),
            ];
            let mut body = instruction_spans(instruction);
            if is_current {
                let fatal_here = marker(data.findings, index) == Some(Severity::Fatal);
                let highlight = if fatal_here {
                    Style::default()
                        .bg(DEFAULT_THEME.fatal)
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().bg(DEFAULT_THEME.highlight_bg)
                };
                for span in &mut body {
                    span.style = span.style.patch(highlight);
                }
            }
            spans.extend(body);
            Line::from(spans)
        })
        .collect();

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

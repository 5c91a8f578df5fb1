//! Call stack pane
//!
//! Live frames are listed innermost first, each with its slots and their
//! bytes. Frames that already returned stay in the list, dimmed, because
//! pointers into them can still be dereferenced (and will be reported).
//! The register file follows the frames.

use super::utils::{bytes_per_line, hex_dump, pane_block, separator, value_span, visible_window};
use crate::memory::value::Value;
use crate::snapshot::FrameView;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

/// Scroll state for the stack pane
pub struct StackScrollState {
    pub offset: usize,
}

/// Data needed to render the stack pane
pub struct StackRenderData<'a> {
    pub frames: &'a [FrameView],
    pub registers: &'a [(String, Value)],
}

/// Render the stack pane
pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    data: StackRenderData,
    is_focused: bool,
    scroll_state: &mut StackScrollState,
) {
    let block = pane_block(" Stack ", is_focused);
    let per_line = bytes_per_line(area.width.saturating_sub(2));
    let mut all_items = Vec::new();

    let (live, dead): (Vec<&FrameView>, Vec<&FrameView>) =
        data.frames.iter().partition(|view| view.frame.alive);

    for view in live.iter().rev() {
        let frame_info = &view.frame;
        let mut header = vec![
            Span::styled(
                format!("{}()", frame_info.function),
                Style::default()
                    .fg(DEFAULT_THEME.function)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  #{}", frame_info.id),
                Style::default().fg(DEFAULT_THEME.muted),
            ),
        ];
        if let Some(handle) = &frame_info.return_to {
            header.push(Span::styled(
                format!("  -> {}", handle),
                Style::default().fg(DEFAULT_THEME.handle),
            ));
        }
        all_items.push(ListItem::new(Line::from(header)));

        if frame_info.slots.is_empty() {
            all_items.push(
                ListItem::new("  (no locals)").style(Style::default().fg(DEFAULT_THEME.muted)),
            );
        }
        for (slot, contents) in frame_info.slots.iter().zip(&view.contents) {
            all_items.push(ListItem::new(Line::from(vec![
                Span::raw("  "),
                Span::styled(slot.name.clone(), Style::default().fg(DEFAULT_THEME.fg)),
                Span::styled(
                    format!(" : {} bytes", slot.size),
                    Style::default().fg(DEFAULT_THEME.accent),
                ),
            ])));
            hex_dump(&mut all_items, slot.address, contents, per_line);
        }
        all_items.push(separator());
    }

    for view in dead {
        let returned = view
            .frame
            .returned_at
            .map(|at| format!(" at {}", at))
            .unwrap_or_default();
        all_items.push(
            ListItem::new(format!(
                "{}()  #{}  returned{}",
                view.frame.function, view.frame.id, returned
            ))
            .style(
                Style::default()
                    .fg(DEFAULT_THEME.dangling)
                    .add_modifier(Modifier::CROSSED_OUT),
            ),
        );
    }

    if !data.registers.is_empty() {
        all_items.push(separator());
        all_items.push(ListItem::new(Span::styled(
            "Handles",
            Style::default()
                .fg(DEFAULT_THEME.accent)
                .add_modifier(Modifier::BOLD),
        )));
        for (name, value) in data.registers {
            all_items.push(ListItem::new(Line::from(vec![
                Span::raw("  "),
                Span::styled(name.clone(), Style::default().fg(DEFAULT_THEME.handle)),
                Span::raw(" = "),
                value_span(value),
            ])));
        }
    }

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let visible_items = visible_window(all_items, &mut scroll_state.offset, visible_height);
    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

//! Heap pane rendering with block states and hex dumps
//!
//! Every block ever allocated is listed in address order. Live blocks show
//! their bytes (`??` for bytes never written); freed blocks show when they
//! were freed and their current generation, so a stale pointer's generation
//! can be compared at a glance.

use super::utils::{bytes_per_line, hex_dump, pane_block, separator, visible_window};
use crate::memory::value::Address;
use crate::snapshot::BlockView;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

/// Scroll state for the heap pane
pub struct HeapScrollState {
    pub offset: usize,
    pub prev_item_count: usize,
}

/// Data needed to render the heap pane
pub struct HeapRenderData<'a> {
    pub blocks: &'a [BlockView],
    pub heap_in_use: usize,
    /// Address of the latest fatal finding, highlighted
    pub error_address: Option<Address>,
}

/// Render the heap pane
pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    data: HeapRenderData,
    is_focused: bool,
    scroll_state: &mut HeapScrollState,
) {
    let title = format!(" Heap ({} bytes in use) ", data.heap_in_use);
    let block = pane_block(&title, is_focused);
    let per_line = bytes_per_line(area.width.saturating_sub(2));
    let mut all_items = Vec::new();

    if data.blocks.is_empty() {
        all_items.push(
            ListItem::new("(no allocations)").style(Style::default().fg(DEFAULT_THEME.muted)),
        );
    }

    let mut sorted: Vec<&BlockView> = data.blocks.iter().collect();
    sorted.sort_by_key(|view| (view.block.base, view.block.id));
    let count = sorted.len();

    for (i, view) in sorted.into_iter().enumerate() {
        let heap_block = &view.block;
        let hit = data
            .error_address
            .is_some_and(|addr| heap_block.contains(addr));
        let addr_style = if hit {
            Style::default()
                .fg(DEFAULT_THEME.fatal)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(DEFAULT_THEME.muted)
        };

        if heap_block.is_live() {
            all_items.push(ListItem::new(Line::from(vec![
                Span::styled(format!("0x{:08x}", heap_block.base), addr_style),
                Span::raw(" | "),
                Span::styled(
                    format!("#{} {} bytes", heap_block.id, heap_block.size),
                    Style::default().fg(DEFAULT_THEME.live),
                ),
                Span::styled(
                    format!("  gen {}  @{}", heap_block.generation, heap_block.allocated_at),
                    Style::default().fg(DEFAULT_THEME.muted),
                ),
            ])));
            hex_dump(&mut all_items, heap_block.base, &view.contents, per_line);
        } else {
            let freed = heap_block
                .freed_at
                .map(|at| format!(" at {}", at))
                .unwrap_or_default();
            all_items.push(ListItem::new(Line::from(vec![
                Span::styled(format!("0x{:08x}", heap_block.base), addr_style),
                Span::raw(" | "),
                Span::styled(
                    format!("#{} {} bytes freed{}", heap_block.id, heap_block.size, freed),
                    Style::default()
                        .fg(DEFAULT_THEME.freed)
                        .add_modifier(Modifier::CROSSED_OUT),
                ),
                Span::styled(
                    format!("  gen {}", heap_block.generation),
                    Style::default().fg(DEFAULT_THEME.muted),
                ),
            ])));
        }

        if i + 1 < count {
            all_items.push(separator());
        }
    }

    let total_items = all_items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    // Follow new allocations to the bottom, otherwise keep the user's position
    if total_items > scroll_state.prev_item_count && total_items > visible_height {
        scroll_state.offset = total_items - visible_height;
    }
    scroll_state.prev_item_count = total_items;

    let visible_items = visible_window(all_items, &mut scroll_state.offset, visible_height);
    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

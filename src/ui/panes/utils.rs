//! Shared utility functions for pane rendering
//!
//! All functions in this module are `pub(super)`, making them accessible only
//! within the panes module.

use crate::memory::value::{Address, Value};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, ListItem},
};

/// Bordered pane block, highlighted when focused
pub(super) fn pane_block(title: &str, is_focused: bool) -> Block<'_> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// `  0xADDR: xx xx ?? ..` for one row of a dump; `??` marks bytes never written
pub(super) fn hex_row(address: Address, bytes: &[Option<u8>]) -> String {
    let mut row = format!("  0x{:08x}: ", address);
    for byte in bytes {
        match byte {
            Some(b) => row.push_str(&format!("{:02x} ", b)),
            None => row.push_str("?? "),
        }
    }
    row
}

/// Hex dump of a memory range, `bytes_per_line` bytes per row
pub(super) fn hex_dump<'a>(
    items: &mut Vec<ListItem<'a>>,
    base: Address,
    bytes: &[Option<u8>],
    bytes_per_line: usize,
) {
    for (i, chunk) in bytes.chunks(bytes_per_line.max(1)).enumerate() {
        let address = base + (i * bytes_per_line) as u64;
        let has_uninit = chunk.iter().any(Option::is_none);
        let style = if has_uninit {
            Style::default().fg(DEFAULT_THEME.uninit)
        } else {
            Style::default().fg(DEFAULT_THEME.muted)
        };
        items.push(ListItem::new(hex_row(address, chunk)).style(style));
    }
}

/// How many dump bytes fit in `width` columns (16 at most)
pub(super) fn bytes_per_line(width: u16) -> usize {
    // "  0xADDR: " prefix is 14 columns, each byte takes 3
    let available = (width as usize).saturating_sub(14 + 2);
    (available / 3).clamp(1, 16)
}

/// Styled rendering of a register value
pub(super) fn value_span(value: &Value) -> Span<'static> {
    match value {
        Value::Int(n) => Span::styled(n.to_string(), Style::default().fg(DEFAULT_THEME.scalar)),
        Value::Pointer(ptr) if ptr.is_null() => {
            Span::styled("NULL", Style::default().fg(DEFAULT_THEME.null))
        }
        Value::Pointer(ptr) => Span::styled(ptr.to_string(), Style::default().fg(DEFAULT_THEME.pointer)),
    }
}

/// Blank separator line
pub(super) fn separator<'a>() -> ListItem<'a> {
    ListItem::new(Line::from(Span::raw("")))
}

/// Clamp `offset` to the scrollable range and return the visible window
pub(super) fn visible_window<'a>(
    items: Vec<ListItem<'a>>,
    offset: &mut usize,
    visible_height: usize,
) -> Vec<ListItem<'a>> {
    let total_items = items.len();
    if total_items > visible_height {
        let max_scroll = total_items - visible_height;
        *offset = (*offset).min(max_scroll);
    } else {
        *offset = 0;
    }
    items.into_iter().skip(*offset).take(visible_height).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_row_marks_uninitialized() {
        assert_eq!(
            hex_row(0x1000, &[Some(0x2a), None, Some(0)]),
            "  0x00001000: 2a ?? 00 "
        );
    }

    #[test]
    fn test_bytes_per_line_bounds() {
        assert_eq!(bytes_per_line(0), 1);
        assert_eq!(bytes_per_line(200), 16);
        assert_eq!(bytes_per_line(16 + 24), 8);
    }

    #[test]
    fn test_visible_window_clamps_offset() {
        let items: Vec<ListItem> = (0..10).map(|i| ListItem::new(i.to_string())).collect();
        let mut offset = 50;
        let window = visible_window(items, &mut offset, 4);
        assert_eq!(offset, 6);
        assert_eq!(window.len(), 4);

        let items: Vec<ListItem> = (0..3).map(|i| ListItem::new(i.to_string())).collect();
        let mut offset = 2;
        visible_window(items, &mut offset, 4);
        assert_eq!(offset, 0);
    }
}

//! Findings pane rendering

use super::utils::{pane_block, visible_window};
use crate::diagnostics::{DiagnosticKind, Finding, Severity};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Padding, Paragraph, Wrap},
    Frame,
};

/// Render the findings recorded up to the current snapshot
pub fn render_findings_pane(
    frame: &mut Frame,
    area: Rect,
    findings: &[Finding],
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let title = format!(" Findings ({}) ", findings.len());
    let block = pane_block(&title, is_focused);

    if findings.is_empty() {
        let paragraph = Paragraph::new("(none so far)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.muted));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let all_items: Vec<ListItem> = findings
        .iter()
        .map(|finding| {
            let color = match finding.severity {
                Severity::Fatal => DEFAULT_THEME.fatal,
                Severity::Warning => DEFAULT_THEME.warning,
            };
            let location = if finding.kind == DiagnosticKind::MemoryLeak {
                "end".to_string()
            } else {
                format!("{:>3}", finding.index)
            };
            ListItem::new(Line::from(vec![
                Span::styled(location, Style::default().fg(DEFAULT_THEME.muted)),
                Span::raw(" "),
                Span::styled(
                    finding.kind.to_string(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(": ", Style::default().fg(DEFAULT_THEME.muted)),
                Span::styled(finding.message.clone(), Style::default().fg(DEFAULT_THEME.fg)),
            ]))
        })
        .collect();

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let visible_items = visible_window(all_items, scroll_offset, visible_height);
    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

/// Full text of one finding, for the detail line under the panes
pub fn render_finding_detail(frame: &mut Frame, area: Rect, finding: Option<&Finding>) {
    let Some(finding) = finding else {
        return;
    };
    let mut spans = vec![Span::styled(
        format!(" {} ", finding.severity),
        Style::default()
            .fg(match finding.severity {
                Severity::Fatal => DEFAULT_THEME.fatal,
                Severity::Warning => DEFAULT_THEME.warning,
            })
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(ptr) = &finding.pointer {
        spans.push(Span::styled(
            format!("via {} ", ptr),
            Style::default().fg(DEFAULT_THEME.pointer),
        ));
    }
    spans.push(Span::styled(
        finding.message.clone(),
        Style::default().fg(DEFAULT_THEME.fg),
    ));
    let paragraph = Paragraph::new(Line::from(spans)).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

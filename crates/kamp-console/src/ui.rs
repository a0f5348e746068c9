use crate::state::{App, PanelSlot};
use crate::theme;
use chrono::Local;
use kamp_core::{MessageRecord, PanelController, Role};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
    Frame,
};

pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);

    frame.render_widget(render_tabs(app), layout[0]);
    match app.active_slot() {
        Some(PanelSlot::Bound(panel)) => {
            render_transcript(frame, panel, app.active_scroll_back(), layout[1]);
            render_input(frame, panel, layout[2]);
        }
        Some(PanelSlot::Unavailable { kind, reason }) => {
            let body = Paragraph::new(Line::from(Span::styled(
                format!("{} is unavailable: {reason}", kind.title()),
                Style::new().fg(theme::WARN),
            )))
            .block(panel_block(kind.title()));
            frame.render_widget(body, layout[1]);
            frame.render_widget(panel_block("Input"), layout[2]);
        }
        None => {}
    }
    frame.render_widget(render_status(app), layout[3]);

    if app.help_open {
        render_help_overlay(frame);
    }
}

fn panel_block(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::new().fg(theme::BORDER))
        .title(Span::styled(
            format!(" {title} "),
            Style::new().fg(theme::TITLE).add_modifier(Modifier::BOLD),
        ))
        .style(Style::new().bg(theme::BG))
}

fn render_tabs(app: &App) -> Tabs<'static> {
    let titles: Vec<Line<'static>> = app
        .slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let mut label = format!("{} {}", index + 1, slot.kind().title());
            match slot {
                PanelSlot::Bound(panel) if panel.is_awaiting() => label.push_str(" …"),
                PanelSlot::Unavailable { .. } => label.push_str(" (off)"),
                _ => {}
            }
            Line::from(label)
        })
        .collect();
    Tabs::new(titles)
        .select(app.active)
        .block(panel_block("kamp"))
        .style(Style::new().fg(theme::MUTED))
        .highlight_style(theme::TAB_SELECTED)
}

fn render_transcript(frame: &mut Frame, panel: &PanelController, scroll_back: u16, area: Rect) {
    let inner_width = area.width.saturating_sub(2);
    let visible = area.height.saturating_sub(2);
    let body = Paragraph::new(Text::from(transcript_lines(panel.transcript().records())))
        .wrap(Wrap { trim: false });
    let total = rendered_height(&body, inner_width);
    let top = scroll_top(total, visible, scroll_back);
    let body = body
        .block(panel_block(panel.kind().title()))
        .scroll((top, 0));
    frame.render_widget(body, area);
}

fn render_input(frame: &mut Frame, panel: &PanelController, area: Rect) {
    let input = panel.input();
    let (title, style) = if input.is_enabled() {
        ("Input", Style::new().fg(theme::TEXT))
    } else {
        ("Input (waiting for reply)", Style::new().fg(theme::MUTED))
    };
    let prompt = if panel.kind() == kamp_core::PanelKind::Terminal {
        "$ "
    } else {
        "> "
    };
    let paragraph = Paragraph::new(Line::from(vec![
        Span::styled(prompt, Style::new().fg(theme::ACCENT)),
        Span::styled(input.text().to_string(), style),
    ]))
    .block(panel_block(title));
    frame.render_widget(paragraph, area);
    if input.is_enabled() {
        let offset = (prompt.len() + input.text().chars().count()) as u16;
        let max_x = area.x + area.width.saturating_sub(2);
        frame.set_cursor((area.x + 1 + offset).min(max_x), area.y + 1);
    }
}

fn render_status(app: &App) -> Paragraph<'static> {
    let note = app.status_note.clone().unwrap_or_default();
    Paragraph::new(Line::from(vec![
        Span::styled(
            "Tab switch  Enter send  Ctrl-L clear  F1 help  Ctrl-C quit",
            Style::new().fg(theme::MUTED),
        ),
        Span::raw("  "),
        Span::styled(note, Style::new().fg(theme::TITLE)),
    ]))
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect(60, 50, frame.size());
    let entry = |key: &'static str, text: &'static str| {
        Line::from(vec![
            Span::styled(format!("{key:<12}"), Style::new().fg(theme::ACCENT)),
            Span::styled(text, Style::new().fg(theme::TEXT)),
        ])
    };
    let lines = vec![
        entry("Tab/S-Tab", "Next / previous panel"),
        entry("Enter", "Send input"),
        entry("Backspace", "Delete last character"),
        entry("PgUp/PgDn", "Scroll transcript"),
        entry("End", "Follow newest messages"),
        entry("Ctrl-L", "Clear panel"),
        entry("F1 / Esc", "Toggle / close help"),
        entry("Ctrl-C", "Quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(panel_block("Help")), area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

pub fn transcript_lines(records: &[MessageRecord]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for record in records {
        let user = record.role() == Role::User;
        let label = format!(
            "{} {} ",
            record.at().with_timezone(&Local).format("%H:%M"),
            if user { "you" } else { "bot" }
        );
        let text_style = if record.is_pending() {
            theme::pending_style()
        } else if user {
            Style::new().fg(theme::TEXT)
        } else {
            Style::new().fg(theme::bot_text_color(record.text()))
        };
        let indent = " ".repeat(label.chars().count());
        for (index, text) in record.text().split('\n').enumerate() {
            let lead = if index == 0 {
                Span::styled(label.clone(), theme::role_label_style(user))
            } else {
                Span::raw(indent.clone())
            };
            lines.push(Line::from(vec![
                lead,
                Span::styled(text.to_string(), text_style),
            ]));
        }
    }
    lines
}

/// Rows the paragraph occupies once word-wrapped at `width`. Measured
/// before a block is attached so borders are not counted.
pub fn rendered_height(paragraph: &Paragraph<'_>, width: u16) -> u16 {
    paragraph.line_count(width.max(1)).min(u16::MAX as usize) as u16
}

pub fn scroll_top(total: u16, visible: u16, scroll_back: u16) -> u16 {
    total.saturating_sub(visible).saturating_sub(scroll_back)
}

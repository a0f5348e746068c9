use ratatui::style::{Color, Modifier, Style};

pub const BG: Color = Color::Rgb(11, 18, 32);
pub const BORDER: Color = Color::Rgb(71, 85, 105);
pub const TITLE: Color = Color::Rgb(191, 219, 254);
pub const TEXT: Color = Color::Rgb(226, 232, 240);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const ACCENT: Color = Color::Rgb(56, 189, 248);
pub const OK: Color = Color::Rgb(34, 197, 94);
pub const WARN: Color = Color::Rgb(245, 158, 11);
pub const CRITICAL: Color = Color::Rgb(239, 68, 68);

pub const TAB_SELECTED: Style = Style::new()
    .fg(Color::Black)
    .bg(ACCENT)
    .add_modifier(Modifier::BOLD);

pub fn role_label_style(user: bool) -> Style {
    if user {
        Style::new().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::new().fg(OK).add_modifier(Modifier::BOLD)
    }
}

pub fn pending_style() -> Style {
    Style::new().fg(MUTED).add_modifier(Modifier::ITALIC)
}

/// Bot lines carry their own markers; color them by what the reconciler
/// wrote.
pub fn bot_text_color(text: &str) -> Color {
    if text.starts_with(kamp_core::ERROR_PREFIX) || text.starts_with("stderr:") {
        CRITICAL
    } else if text.starts_with("[exit ") {
        if text == "[exit 0]" {
            MUTED
        } else {
            WARN
        }
    } else {
        TEXT
    }
}

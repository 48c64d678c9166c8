use ratatui::style::{Color, Modifier, Style};
use sysdash_core::{ModuleStatus, ResponseKind};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const MUTED: Color = Color::Rgb(146, 131, 116);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn status_color(status: ModuleStatus) -> Color {
    match status {
        ModuleStatus::Running => Color::Rgb(184, 187, 38),
        ModuleStatus::Starting => Color::Rgb(250, 189, 47),
        ModuleStatus::Stopped => Color::Rgb(214, 93, 14),
    }
}

pub fn response_color(kind: ResponseKind) -> Color {
    match kind {
        ResponseKind::Notice => Color::Rgb(131, 165, 152),
        ResponseKind::Error => Color::Rgb(254, 128, 25),
    }
}

pub fn connection_color(connected: bool) -> Color {
    if connected {
        Color::Rgb(142, 192, 124)
    } else {
        Color::Rgb(251, 73, 52)
    }
}

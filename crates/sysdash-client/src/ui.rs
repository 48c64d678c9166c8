use crate::app::{App, InputMode};
use crate::theme;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Sparkline, Table, TableState},
    Frame,
};
use sysdash_core::store::ModuleSnapshot;
use sysdash_core::{Sample, StoreSnapshot};

pub fn render(f: &mut Frame, app: &App) {
    let snapshot = app.store.snapshot();
    let area = f.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(area);

    render_header(f, app, &snapshot, rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    render_modules(f, app, &snapshot, body[0]);
    render_metrics(f, app, &snapshot, body[1]);
    render_responses(f, &snapshot, rows[2]);
    render_input(f, app, rows[3]);
}

fn render_header(f: &mut Frame, app: &App, snapshot: &StoreSnapshot, area: Rect) {
    let link = if app.connected { "online" } else { "offline" };
    let line = Line::from(vec![
        Span::styled("sysdash ", theme::HEADER_STYLE),
        Span::styled(
            format!("[{link}]"),
            Style::default()
                .fg(theme::connection_color(app.connected))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "  page {} ({})  modules {}",
            snapshot.page.identity,
            snapshot.page.kind,
            snapshot.modules.len()
        )),
        Span::styled(
            app.status_note
                .as_deref()
                .map(|note| format!("  {note}"))
                .unwrap_or_default(),
            Style::default().fg(theme::MUTED),
        ),
    ]);
    let block = Block::default().borders(Borders::ALL);
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_modules(f: &mut Frame, app: &App, snapshot: &StoreSnapshot, area: Rect) {
    let header = Row::new(vec!["Module", "Status", "Commands"]).style(theme::HEADER_STYLE);
    let rows: Vec<Row> = snapshot
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| {
            Row::new(vec![
                Cell::from(module.name.clone()),
                Cell::from(Span::styled(
                    module.status.as_str(),
                    Style::default().fg(theme::status_color(module.status)),
                )),
                Cell::from(module.commands.join(" ")),
            ])
            .style(theme::zebra_row_style(index))
        })
        .collect();
    let widths = [
        Constraint::Percentage(40),
        Constraint::Length(10),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Modules"))
        .highlight_style(theme::SELECTED_STYLE);
    let mut state = TableState::default();
    if !snapshot.modules.is_empty() {
        state.select(Some(app.cursor));
    }
    f.render_stateful_widget(table, area, &mut state);
}

fn sparkline_data(samples: &[Sample]) -> Vec<u64> {
    samples
        .iter()
        .map(|sample| sample.value.max(0.0).round() as u64)
        .collect()
}

fn render_metrics(f: &mut Frame, app: &App, snapshot: &StoreSnapshot, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Min(3),
        ])
        .split(area);

    let heap = sparkline_data(&snapshot.heap);
    let heap_title = match snapshot.heap.last() {
        Some(sample) => format!("Heap {:.0}", sample.value),
        None => "Heap".to_string(),
    };
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(heap_title))
            .data(&heap)
            .style(Style::default().fg(Color::Rgb(131, 165, 152))),
        parts[0],
    );

    let goroutines = sparkline_data(&snapshot.goroutines);
    let goroutine_title = match snapshot.goroutines.last() {
        Some(sample) => format!("Goroutines {:.0}", sample.value),
        None => "Goroutines".to_string(),
    };
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(goroutine_title))
            .data(&goroutines)
            .style(Style::default().fg(Color::Rgb(250, 189, 47))),
        parts[1],
    );

    let selected = app
        .selected_module()
        .and_then(|name| snapshot.module(&name).cloned());
    render_module_metrics(f, selected.as_ref(), parts[2]);
}

fn render_module_metrics(f: &mut Frame, module: Option<&ModuleSnapshot>, area: Rect) {
    let title = module
        .map(|module| format!("Metrics: {}", module.name))
        .unwrap_or_else(|| "Metrics".to_string());
    let items: Vec<ListItem> = match module {
        Some(module) if !module.metrics.is_empty() => module
            .metrics
            .iter()
            .map(|(key, samples)| {
                let latest = samples
                    .last()
                    .map(|sample| format!("{:.2}", sample.value))
                    .unwrap_or_else(|| "-".to_string());
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{key:<32}"), Style::default().fg(theme::MUTED)),
                    Span::raw(latest),
                    Span::styled(
                        format!("  ({} samples)", samples.len()),
                        Style::default().fg(theme::MUTED),
                    ),
                ]))
            })
            .collect(),
        _ => vec![ListItem::new("no samples")],
    };
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn render_responses(f: &mut Frame, snapshot: &StoreSnapshot, area: Rect) {
    let items: Vec<ListItem> = snapshot
        .responses
        .iter()
        .rev()
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    entry.timestamp.format("%H:%M:%S ").to_string(),
                    Style::default().fg(theme::MUTED),
                ),
                Span::styled(
                    entry.text.clone(),
                    Style::default().fg(theme::response_color(entry.kind)),
                ),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Responses")),
        area,
    );
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let (title, text) = match &app.input {
        InputMode::Normal => (
            "Keys".to_string(),
            "j/k select  s start  x stop  r reset  c command  n open  d dashboard  g gc  D dismiss  C close  q quit"
                .to_string(),
        ),
        InputMode::Command { module, buffer } => (format!("Command for {module}"), format!("> {buffer}")),
        InputMode::Password { buffer } => (
            "Password".to_string(),
            format!("> {}", "*".repeat(buffer.chars().count())),
        ),
    };
    f.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

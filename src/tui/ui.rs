use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::tui::{
    app::{InputMode, QuerymancerApp},
    message::{EntryKind, TranscriptEntry},
};

/// Render the main UI
pub fn render_ui(f: &mut Frame, app: &QuerymancerApp, mode: InputMode) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Status bar
            Constraint::Min(5),    // Transcript and database panel
            Constraint::Length(3), // Input box
        ])
        .split(f.size());

    render_status_bar(f, app, chunks[0]);
    render_body(f, app, chunks[1]);
    render_input_box(f, app, mode, chunks[2]);
}

fn render_status_bar(f: &mut Frame, app: &QuerymancerApp, area: Rect) {
    let tools = app.tool_names();
    let status_text = Line::from(vec![
        Span::styled("Model: ", Style::default().fg(Color::Gray)),
        Span::styled(app.model_name(), Style::default().fg(Color::Green)),
        Span::styled(" | Tools: ", Style::default().fg(Color::Gray)),
        Span::styled(tools.join(" "), Style::default().fg(Color::Green)),
        Span::styled(" | Session: ", Style::default().fg(Color::Gray)),
        Span::styled(
            app.session().id.simple().to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Querymancer"));

    f.render_widget(status_bar, area);
}

fn render_body(f: &mut Frame, app: &QuerymancerApp, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(75), // Chat
            Constraint::Percentage(25), // Database panel
        ])
        .split(area);

    render_transcript(f, app, chunks[0]);
    render_database_panel(f, app, chunks[1]);
}

fn entry_color(kind: EntryKind) -> Color {
    match kind {
        EntryKind::User => Color::Cyan,
        EntryKind::Assistant => Color::Green,
        EntryKind::ToolCall => Color::Yellow,
        EntryKind::ToolResult => Color::DarkGray,
        EntryKind::Error => Color::Red,
    }
}

fn entry_lines(entry: &TranscriptEntry) -> Vec<Line<'_>> {
    let color = entry_color(entry.kind);
    let label = Span::styled(
        format!("{}: ", entry.label()),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    );
    let body_style = match entry.kind {
        EntryKind::ToolCall | EntryKind::ToolResult => {
            Style::default().fg(color).add_modifier(Modifier::ITALIC)
        }
        EntryKind::Error => Style::default().fg(color),
        _ => Style::default(),
    };

    let mut lines = Vec::new();
    let mut content = entry.content.lines();
    let first = content.next().unwrap_or_default();
    lines.push(Line::from(vec![label, Span::styled(first, body_style)]));
    lines.extend(content.map(|line| Line::from(Span::styled(line, body_style))));
    lines.push(Line::from(""));
    lines
}

/// Rows a wrapped paragraph of `lines` occupies at `width` columns.
fn wrapped_height(lines: &[Line<'_>], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn render_transcript(f: &mut Frame, app: &QuerymancerApp, area: Rect) {
    let transcript = app.transcript();
    let lines: Vec<Line> = transcript.iter().flat_map(entry_lines).collect();

    // Pin to the bottom unless the user scrolled back
    let inner_height = area.height.saturating_sub(2);
    let content_height = wrapped_height(&lines, area.width.saturating_sub(2));
    let bottom = content_height.saturating_sub(inner_height);
    let offset = bottom.saturating_sub(app.scroll_back());

    let chat = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Conversation"))
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));

    f.render_widget(chat, area);
}

fn render_database_panel(f: &mut Frame, app: &QuerymancerApp, area: Rect) {
    let lines = match app.database_info() {
        Ok(info) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::raw("File: "),
                    Span::styled(
                        info.display_path(app.app_home()),
                        Style::default().fg(Color::Yellow),
                    ),
                ]),
                Line::from(vec![
                    Span::raw("Size: "),
                    Span::styled(
                        format!("{:.2} MB", info.size_mb()),
                        Style::default().fg(Color::Yellow),
                    ),
                ]),
                Line::from(""),
                Line::from(Span::styled(
                    "Tables:",
                    Style::default().add_modifier(Modifier::UNDERLINED),
                )),
            ];
            lines.extend(info.tables.iter().map(|table| {
                Line::from(vec![
                    Span::styled(table.name.clone(), Style::default().fg(Color::Green)),
                    Span::styled(
                        format!(" ({} rows)", table.row_count),
                        Style::default().fg(Color::DarkGray),
                    ),
                ])
            }));
            lines
        }
        Err(err) => vec![Line::from(Span::styled(
            err.clone(),
            Style::default().fg(Color::Red),
        ))],
    };

    let panel = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Database Information"),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(panel, area);
}

fn render_input_box(f: &mut Frame, app: &QuerymancerApp, mode: InputMode, area: Rect) {
    let (text, style) = if app.is_loading() {
        (
            app.loading_message().to_string(),
            Style::default().fg(Color::Magenta),
        )
    } else {
        (app.input().to_string(), Style::default())
    };

    let title = match mode {
        InputMode::Editing => "Ask (Enter to send, Esc to stop editing)",
        InputMode::Normal => "Ask (e to edit, q to quit)",
    };

    let input = Paragraph::new(text).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(if app.is_loading() {
                Color::DarkGray
            } else {
                Color::White
            })),
    );

    f.render_widget(input, area);

    if !app.is_loading() && mode == InputMode::Editing {
        f.set_cursor(
            // Put cursor past the end of the input text
            area.x + app.input().chars().count() as u16 + 1,
            area.y + 1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_lines_label_first_line_only() {
        let entry = TranscriptEntry::new(EntryKind::Assistant, "line one\nline two");
        let lines = entry_lines(&entry);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].spans[0].content, "Querymancer: ");
        assert_eq!(lines[1].spans[0].content, "line two");
    }

    #[test]
    fn test_wrapped_height_counts_wrapped_rows() {
        let lines = vec![Line::from("x".repeat(25)), Line::from("")];
        assert_eq!(wrapped_height(&lines, 10), 4);
    }
}

use super::input::TextInput;
use super::{Modal, TuiState, FIELD_LABELS, SUBMIT_FOCUS};
use crate::models::message::Role;
use crate::models::state::{Artifact, DataSource, Operation, WizardStep};
use crate::render::RenderedBlock;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use std::time::Instant;

pub(crate) fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &TuiState) {
    let window_area = centered_window(area, 120, 40);

    let title = match state.app.step.target() {
        Some(t) => format!(
            "sqlpilot: {} ({}@{})",
            state.app.step.title(),
            t.database,
            t.host
        ),
        None => format!("sqlpilot: {}", state.app.step.title()),
    };
    f.render_widget(Block::default().borders(Borders::ALL).title(title), window_area);

    let inner = window_area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    match &state.app.step {
        WizardStep::SelectSource => draw_select(f, rows[0], state),
        WizardStep::Connect { source } => draw_connect(f, rows[0], state, *source),
        WizardStep::LoadArtifacts { .. } => draw_artifacts(f, rows[0], state),
        WizardStep::Chat { .. } => draw_chat(f, rows[0], state),
    }

    let hint = match state.app.step {
        WizardStep::SelectSource => "Up/Down choose  Enter select  Esc quit",
        WizardStep::Connect { .. } => "Tab/Up/Down move  Enter submit  Esc back  Ctrl+C quit",
        WizardStep::LoadArtifacts { .. } => {
            "S schema  M metadata  V vector  A all  Enter continue  Ctrl+C quit"
        }
        WizardStep::Chat { .. } => {
            "Enter send  PgUp/PgDn scroll  Ctrl+O block  Ctrl+Y copy  Ctrl+R run  Esc quit"
        }
    };
    f.render_widget(
        Paragraph::new(Line::styled(hint, Style::default().fg(Color::DarkGray))),
        rows[1],
    );

    if let Some(Modal::ConfirmQuit { yes_focused }) = state.modal {
        draw_quit_modal(f, window_area, yes_focused);
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60).min(area.width);
    let h = height.min(area.height.saturating_sub(2)).max(20).min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

/// Field text with the cursor cell reversed when focused.
fn input_spans(input: &TextInput, focused: bool) -> Vec<Span<'static>> {
    let shown = input.display();
    if !focused {
        return vec![Span::raw(shown)];
    }
    let chars: Vec<char> = shown.chars().collect();
    let at = input.cursor().min(chars.len());
    let before: String = chars[..at].iter().collect();
    let under: String = chars.get(at).map(|c| c.to_string()).unwrap_or_else(|| " ".to_string());
    let after: String = chars.get(at + 1..).map(|s| s.iter().collect()).unwrap_or_default();
    vec![
        Span::raw(before),
        Span::styled(under, Style::default().add_modifier(Modifier::REVERSED)),
        Span::raw(after),
    ]
}

fn error_lines(state: &TuiState) -> Vec<Line<'static>> {
    match &state.app.error {
        Some(e) => vec![
            Line::styled(e.clone(), Style::default().fg(Color::Red)),
            Line::from(""),
        ],
        None => Vec::new(),
    }
}

fn draw_select(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState) {
    let mut lines = vec![Line::from("Connect a data source:"), Line::from("")];
    for (i, source) in DataSource::ALL.iter().enumerate() {
        let selected = i == state.source_index;
        let mut style = Style::default();
        if !source.is_supported() {
            style = style.fg(Color::DarkGray);
        }
        if selected {
            style = style.add_modifier(Modifier::REVERSED);
        }
        let mut spans = vec![
            Span::raw(if selected { "> " } else { "  " }),
            Span::styled(format!(" {} ", source.label()), style),
        ];
        if !source.is_supported() {
            spans.push(Span::styled(
                "  (coming soon)",
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled(
        format!("Backend: {}", state.backend_label),
        Style::default().fg(Color::DarkGray),
    ));

    let p = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn draw_connect(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState, source: DataSource) {
    let connecting = state.app.operations.is_in_flight(Operation::Connect);

    let mut lines = vec![Line::styled(
        format!("Connect to {}", source.label()),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    lines.push(Line::from(""));
    lines.extend(error_lines(state));

    for (i, label) in FIELD_LABELS.iter().enumerate() {
        let focused = state.form.focus == i;
        let label_style = if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let mut spans = vec![Span::styled(format!("{:>14}: ", label), label_style)];
        spans.extend(input_spans(&state.form.fields[i], focused));
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    let label = if connecting {
        "Connecting..."
    } else {
        "Test Connection"
    };
    lines.push(Line::from(vec![
        Span::raw(format!("{:>16}", "")),
        button_text(label, state.form.focus == SUBMIT_FOCUS, !connecting),
    ]));

    let p = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn artifact_action(artifact: Artifact) -> (&'static str, &'static str) {
    match artifact {
        Artifact::Schema => ("S", "Load Schema"),
        Artifact::Metadata => ("M", "Load Metadata"),
        Artifact::VectorIndex => ("V", "Load Vector"),
    }
}

fn draw_artifacts(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState) {
    let mut lines = vec![
        Line::styled(
            "Load Schema and Metadata",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
    ];
    lines.extend(error_lines(state));

    for artifact in Artifact::PIPELINE {
        let (key, label) = artifact_action(artifact);
        let status = if state.app.operations.is_in_flight(artifact.operation()) {
            Span::styled(
                format!("Loading {}...", artifact.label()),
                Style::default().fg(Color::Yellow),
            )
        } else if state.app.loaded.is_loaded(artifact) {
            Span::styled("Loaded", Style::default().fg(Color::Green))
        } else {
            Span::styled("Not Loaded", Style::default().fg(Color::DarkGray))
        };
        lines.push(Line::from(vec![
            Span::styled(format!("[{}] ", key), Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:<16}", label)),
            status,
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[A] ", Style::default().fg(Color::Cyan)),
        Span::raw("Prepare all (schema, then metadata, then vector)"),
    ]));
    lines.push(Line::from(""));
    lines.push(Line::from(button_text("Continue", true, true)));

    let p = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn loaded_text(loaded: bool) -> &'static str {
    if loaded {
        "Loaded"
    } else {
        "Not Loaded"
    }
}

fn draw_chat(f: &mut ratatui::Frame<'_>, area: Rect, state: &TuiState) {
    let error_height = if state.app.error.is_some() { 3 } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Min(3),
                Constraint::Length(error_height),
                Constraint::Length(1),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    // Transcript
    let lines = transcript_lines(state, Instant::now());
    let block = Block::default().borders(Borders::ALL);
    let inner_width = rows[0].width.saturating_sub(2).max(1);
    let visible = rows[0].height.saturating_sub(2);
    let total = wrapped_height(&lines, inner_width);
    let top = total
        .saturating_sub(visible)
        .saturating_sub(state.scroll_from_bottom);
    let p = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((top, 0));
    f.render_widget(p, rows[0]);

    // Error
    if let Some(e) = &state.app.error {
        let p = Paragraph::new(e.clone())
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .wrap(Wrap { trim: true });
        f.render_widget(p, rows[1]);
    }

    // Status bar
    let loaded = state.app.loaded;
    let mut activity = Vec::new();
    if state.app.operations.is_in_flight(Operation::Chat) {
        activity.push("Processing...");
    }
    if state.app.operations.is_in_flight(Operation::ExecuteQuery) {
        activity.push("Running query...");
    }
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(58)].as_ref())
        .split(rows[2]);
    f.render_widget(
        Paragraph::new(Line::styled(
            activity.join("  "),
            Style::default().fg(Color::Yellow),
        )),
        cols[0],
    );
    f.render_widget(
        Paragraph::new(format!(
            "Schema: {} | Metadata: {} | Vector: {}",
            loaded_text(loaded.schema),
            loaded_text(loaded.metadata),
            loaded_text(loaded.vector)
        ))
        .alignment(Alignment::Right),
        cols[1],
    );

    // Input
    let busy = state.app.operations.is_in_flight(Operation::Chat);
    let send_label = if busy { "Processing..." } else { "Send" };
    let can_send = !busy && !state.chat_input.value().trim().is_empty();
    let input_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(19)].as_ref())
        .split(rows[3]);
    let input = if state.chat_input.value().is_empty() && !busy {
        Line::styled("Ask a question...", Style::default().fg(Color::DarkGray))
    } else {
        Line::from(input_spans(&state.chat_input, !busy))
    };
    f.render_widget(
        Paragraph::new(input).block(Block::default().borders(Borders::ALL)),
        input_cols[0],
    );
    f.render_widget(
        Paragraph::new(Line::from(button_text(send_label, can_send, can_send)))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL)),
        input_cols[1],
    );
}

/// Visual rows `lines` occupy when wrapped at `width`.
fn wrapped_height(lines: &[Line<'_>], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|l| l.width().max(1).div_ceil(width))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

pub(crate) fn transcript_lines(state: &TuiState, now: Instant) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for (i, msg) in state.app.transcript.messages().iter().enumerate() {
        let (who, color) = match msg.role {
            Role::User => ("You", Color::Green),
            Role::Assistant => ("Assistant", Color::Magenta),
        };
        let at = msg
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string();
        lines.push(Line::from(vec![
            Span::styled(
                who,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {}", at), Style::default().fg(Color::DarkGray)),
        ]));

        match (msg.role, state.rendered_message(i)) {
            (Role::Assistant, Some(rendered)) => {
                for block in &rendered.blocks {
                    match block {
                        RenderedBlock::Text(text) => lines.extend(text.iter().cloned()),
                        RenderedBlock::Code(code) => {
                            let key = (i, code.id);
                            let selected = state.selected_block == Some(key);
                            let copied = state.copies.is_copied(key, now);

                            let mut header_style = Style::default().fg(Color::DarkGray);
                            if selected {
                                header_style = header_style.add_modifier(Modifier::REVERSED);
                            }
                            let mut header = vec![Span::styled(
                                format!("┌─ {} #{} ", code.language, code.id + 1),
                                header_style,
                            )];
                            if copied {
                                header.push(Span::styled(
                                    " Copied!",
                                    Style::default().fg(Color::Green),
                                ));
                            } else if selected {
                                header.push(Span::styled(
                                    " Ctrl+Y copy  Ctrl+R run",
                                    Style::default().fg(Color::DarkGray),
                                ));
                            }
                            lines.push(Line::from(header));

                            for code_line in &code.lines {
                                let mut spans = vec![Span::styled(
                                    "│ ",
                                    Style::default().fg(Color::DarkGray),
                                )];
                                spans.extend(code_line.spans.iter().cloned());
                                lines.push(Line::from(spans));
                            }
                            lines.push(Line::styled("└─", Style::default().fg(Color::DarkGray)));
                        }
                    }
                }
            }
            _ => {
                for l in msg.content.lines() {
                    lines.push(Line::from(l.to_string()));
                }
            }
        }
        lines.push(Line::from(""));
    }

    lines
}

fn draw_quit_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, yes_focused: bool) {
    let modal_w = 56u16
        .min(window_area.width.saturating_sub(4))
        .max(40)
        .min(window_area.width);
    let modal_h = 7u16.min(window_area.height);
    let x = window_area.x + (window_area.width.saturating_sub(modal_w)) / 2;
    let y = window_area.y + (window_area.height.saturating_sub(modal_h)) / 2;
    let area = Rect {
        x,
        y,
        width: modal_w,
        height: modal_h,
    };

    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title("Quit sqlpilot?");
    let body = Paragraph::new(Text::from(vec![
        Line::from("The connection and chat transcript will be lost."),
        Line::from(""),
        Line::from(""),
    ]))
    .block(block)
    .wrap(Wrap { trim: false });
    f.render_widget(body, area);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height.saturating_sub(2),
        width: area.width.saturating_sub(2),
        height: 1,
    };
    let line = Line::from(vec![
        button_text("Yes, quit", yes_focused, true),
        Span::raw(" "),
        button_text("No", !yes_focused, true),
    ]);
    f.render_widget(
        Paragraph::new(Text::from(line)).alignment(Alignment::Right),
        buttons_area,
    );
}

#[cfg(test)]
mod tests {
    use super::super::new_smoke_state;
    use super::*;
    use crate::config::AppConfig;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn render(state: &TuiState, w: u16, h: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(w, h)).unwrap();
        terminal.draw(|f| draw(f.size(), f, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..h {
            for x in 0..w {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn select_screen_lists_sources() {
        let state = new_smoke_state(&AppConfig::default(), "select");
        let screen = render(&state, 100, 30);
        assert!(screen.contains("PostgreSQL"));
        assert!(screen.contains("Snowflake"));
        assert!(screen.contains("(coming soon)"));
    }

    #[test]
    fn connect_screen_masks_password() {
        let state = new_smoke_state(&AppConfig::default(), "connect");
        let screen = render(&state, 100, 30);
        assert!(screen.contains("Connect to PostgreSQL"));
        assert!(screen.contains("********"));
        assert!(!screen.contains("password"));
        assert!(screen.contains("[ Test Connection ]"));
    }

    #[test]
    fn artifacts_screen_shows_each_status() {
        let state = new_smoke_state(&AppConfig::default(), "artifacts");
        let screen = render(&state, 100, 30);
        assert!(screen.contains("Loaded"));
        assert!(screen.contains("Loading Metadata..."));
        assert!(screen.contains("Not Loaded"));
    }

    #[test]
    fn chat_screen_shows_code_block_and_status() {
        let state = new_smoke_state(&AppConfig::default(), "chat");
        let screen = render(&state, 120, 40);
        assert!(screen.contains("sql #1"), "{}", screen);
        assert!(screen.contains("Copied!"));
        assert!(screen.contains("Schema: Loaded | Metadata: Loaded | Vector: Loaded"));
        assert!(screen.contains("LIMIT 5;"));
    }

    #[test]
    fn quit_modal_renders_over_any_step() {
        let mut state = new_smoke_state(&AppConfig::default(), "chat");
        state.modal = Some(Modal::ConfirmQuit { yes_focused: false });
        let screen = render(&state, 100, 30);
        assert!(screen.contains("Quit sqlpilot?"));
        assert!(screen.contains("[ Yes, quit ]"));
    }

    #[test]
    fn wrapped_height_counts_visual_rows() {
        let lines = vec![Line::from("abcdef"), Line::from(""), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 3), 4);
    }

    #[test]
    fn tiny_terminal_does_not_panic() {
        let state = new_smoke_state(&AppConfig::default(), "chat");
        render(&state, 30, 10);
    }
}

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use crate::app::{App, Status};
use crate::mistral::MODEL;
use crate::state::{ChatMessage, ChatRole, WELCOME};

const SEND_LABEL: &str = "Send";
const SEND_WIDTH: u16 = 10;

/// Split a line into spans, styling **bold** runs. Unclosed markers stay literal.
fn markdown_spans(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        if close == 0 {
            // "****" renders as-is
            spans.push(Span::raw(rest[..open + 4].to_string()));
            rest = &after_open[2..];
            continue;
        }
        if open > 0 {
            spans.push(Span::raw(rest[..open].to_string()));
        }
        spans.push(Span::styled(
            after_open[..close].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }
    spans
}

fn role_style(role: ChatRole) -> Style {
    match role {
        ChatRole::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ChatRole::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    }
}

/// Styled counterpart of [`ChatMessage::rendered_lines`].
fn message_lines(msg: &ChatMessage) -> Vec<Line<'static>> {
    let label = format!("{}:", msg.role.label());
    let indent = " ".repeat(label.len() + 1);
    let mut lines = Vec::new();

    for (i, text) in msg.content.lines().enumerate() {
        let mut spans = if i == 0 {
            vec![Span::styled(label.clone(), role_style(msg.role)), Span::raw(" ")]
        } else {
            vec![Span::raw(indent.clone())]
        };
        match msg.role {
            ChatRole::User => spans.push(Span::raw(text.to_string())),
            ChatRole::Assistant => spans.extend(markdown_spans(text)),
        }
        lines.push(Line::from(spans));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(label, role_style(msg.role))));
    }
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, transcript, input row, status bar
    let [header_area, transcript_area, input_row, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);
    render_transcript(app, frame, transcript_area);
    render_input_row(app, frame, input_row);
    render_status(app, frame, status_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Mistral AI Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(MODEL, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    app.transcript_area = Some(area);

    // Inner size minus borders, used by the scroll calculations
    app.transcript_height = area.height.saturating_sub(2);
    app.transcript_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = WELCOME
        .iter()
        .map(|s| Line::from(Span::styled(*s, Style::default().fg(Color::Green))))
        .collect();
    lines.push(Line::default());

    for msg in app.transcript.messages() {
        lines.extend(message_lines(msg));
        if msg.role == ChatRole::Assistant {
            lines.push(Line::default());
        }
    }

    if app.is_busy() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(vec![
            Span::styled("AI:", role_style(ChatRole::Assistant)),
            Span::styled(
                format!(" Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ),
        ]));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    // Rows are counted before the block is attached so borders are not included
    let transcript = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    app.transcript_rows =
        u16::try_from(transcript.line_count(app.transcript_width)).unwrap_or(u16::MAX);
    app.sync_transcript_scroll();

    let transcript = transcript.block(block).scroll((app.transcript_scroll, 0));
    frame.render_widget(transcript, area);

    if app.transcript_rows > app.transcript_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state = ScrollbarState::new(app.max_transcript_scroll() as usize)
            .position(app.transcript_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input_row(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, send_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(SEND_WIDTH),
    ])
    .areas(area);
    app.send_button_area = Some(send_area);

    let busy = app.is_busy();
    let (border_color, text_style) = if busy {
        (Color::DarkGray, Style::default().fg(Color::DarkGray))
    } else {
        (Color::Yellow, Style::default().fg(Color::Cyan))
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    // Horizontal scrolling keeps the cursor visible in the inner width
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(text_style)
        .block(input_block);
    frame.render_widget(input, input_area);

    if !busy {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }

    let send_style = if busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
    };
    let send = Paragraph::new(Line::from(Span::styled(format!(" {} ", SEND_LABEL), send_style)))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        );
    frame.render_widget(send, send_area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let status_style = match app.status {
        Status::Ready => Style::default().bg(Color::Blue).fg(Color::White),
        Status::Processing => Style::default().bg(Color::Yellow).fg(Color::Black),
        Status::RateLimited { .. } => Style::default().bg(Color::Red).fg(Color::White),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![
        Span::styled(format!(" {} ", app.status.label()), status_style),
        Span::styled(" ", label_style),
    ];
    if app.is_busy() {
        spans.extend(vec![
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]);
    } else {
        spans.extend(vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
        ]);
    }
    spans.extend(vec![
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Ctrl+C ", key_style),
        Span::styled(" quit ", label_style),
    ]);
    if !app.dispatcher.client().has_api_key() {
        spans.push(Span::styled(
            " no API key set ",
            Style::default().fg(Color::Red).bg(Color::Black),
        ));
    }

    let status = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, RetryPolicy};
    use crate::mistral::MistralClient;
    use ratatui::{backend::TestBackend, Terminal};
    use std::time::Duration;

    fn offline_app() -> App {
        let client = MistralClient::new(Some("key".to_string()), "http://192.0.2.1/", None).unwrap();
        App::new(Dispatcher::new(client, Duration::from_secs(1), RetryPolicy::default()))
    }

    fn draw(app: &mut App) -> String {
        draw_sized(app, 60, 16)
    }

    fn draw_sized(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for row in buffer.content.chunks(buffer.area.width as usize) {
            for cell in row {
                text.push_str(cell.symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn bold_markdown_becomes_spans() {
        let spans = markdown_spans("a **b** c");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].content, "b");
        assert!(spans[1].style.add_modifier.contains(Modifier::BOLD));

        let spans = markdown_spans("open **only");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "open **only");
    }

    #[tokio::test]
    async fn idle_window_shows_welcome_and_ready() {
        let mut app = offline_app();
        let screen = draw(&mut app);
        assert!(screen.contains("Welcome to Mistral AI Chat!"));
        assert!(screen.contains("Ready"));
        assert!(screen.contains("Send"));
        assert!(app.send_button_area.is_some());
    }

    #[tokio::test]
    async fn exchange_lines_render_with_labels() {
        let mut app = offline_app();
        app.transcript.push_user("hi");
        app.transcript.push_assistant("Hello!");
        let screen = draw(&mut app);
        assert!(screen.contains("You: hi"));
        assert!(screen.contains("AI: Hello!"));
    }

    #[tokio::test]
    async fn word_wrapped_reply_end_stays_reachable() {
        let mut app = offline_app();
        let words: Vec<String> = (0..30)
            .map(|i| format!("word{:02}{}", i, "x".repeat(14)))
            .collect();
        app.transcript.push_user("tell me a lot");
        app.transcript.push_assistant(format!("{} FINALTOKEN", words.join(" ")));

        let screen = draw_sized(&mut app, 40, 16);
        assert!(app.follow_bottom);
        assert!(screen.contains("FINALTOKEN"), "reply end hidden while following:\n{}", screen);

        app.scroll_transcript_up(app.page_size() * 4);
        let screen = draw_sized(&mut app, 40, 16);
        assert!(!screen.contains("FINALTOKEN"));

        app.scroll_transcript_down(u16::MAX);
        assert!(app.follow_bottom);
        let screen = draw_sized(&mut app, 40, 16);
        assert!(screen.contains("FINALTOKEN"), "reply end unreachable by scrolling:\n{}", screen);
    }

    #[tokio::test]
    async fn busy_window_shows_processing() {
        let mut app = offline_app();
        app.input = "hello".to_string();
        assert!(app.submit());
        let screen = draw(&mut app);
        assert!(screen.contains("Processing..."));
        assert!(screen.contains("AI: Thinking."));
        app.cancel_pending();
    }
}

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::App;
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any state
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => {
                app.quit();
                return;
            }
            _ => {}
        }
    }

    match key.code {
        // Transcript scrolling works while busy
        KeyCode::Up => app.scroll_transcript_up(1),
        KeyCode::Down => app.scroll_transcript_down(1),
        KeyCode::PageUp => app.scroll_transcript_up(app.page_size()),
        KeyCode::PageDown => app.scroll_transcript_down(app.page_size()),

        KeyCode::Esc => app.cancel_pending(),

        // Everything else edits the input, which is disabled while busy
        _ if app.is_busy() => {}

        KeyCode::Enter => {
            app.submit();
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        // Unbound Ctrl/Alt chords must not type their letter
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_transcript = app.transcript_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let on_send = app.send_button_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) if on_send => {
            app.submit();
        }
        MouseEventKind::ScrollDown if in_transcript => {
            app.scroll_transcript_down(WHEEL_LINES);
        }
        MouseEventKind::ScrollUp if in_transcript => {
            app.scroll_transcript_up(WHEEL_LINES);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, RetryPolicy};
    use crate::app::Status;
    use crate::mistral::MistralClient;
    use crate::state::ChatRole;
    use crossterm::event::KeyEventKind;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn offline_app() -> App {
        let client = MistralClient::new(None, "http://192.0.2.1/", None).unwrap();
        App::new(Dispatcher::new(client, Duration::ZERO, RetryPolicy::default()))
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)));
        }
    }

    fn click(column: u16, row: u16) -> AppEvent {
        AppEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[tokio::test]
    async fn editing_is_utf8_safe() {
        let mut app = offline_app();
        type_text(&mut app, "héllo");
        handle_event(&mut app, key(KeyCode::Home));
        handle_event(&mut app, key(KeyCode::Right));
        handle_event(&mut app, key(KeyCode::Delete));
        assert_eq!(app.input, "hllo");

        handle_event(&mut app, key(KeyCode::End));
        handle_event(&mut app, key(KeyCode::Backspace));
        type_text(&mut app, "ø");
        assert_eq!(app.input, "hllø");
        assert_eq!(app.input_cursor, 4);
    }

    #[tokio::test]
    async fn enter_submits_and_locks_input() {
        let mut app = offline_app();
        type_text(&mut app, "hi");
        handle_event(&mut app, key(KeyCode::Enter));
        assert!(app.is_busy());
        assert_eq!(app.transcript.len(), 1);

        type_text(&mut app, "ignored");
        assert_eq!(app.input, "");
    }

    #[tokio::test]
    async fn enter_on_blank_input_does_nothing() {
        let mut app = offline_app();
        type_text(&mut app, "   ");
        handle_event(&mut app, key(KeyCode::Enter));
        assert!(!app.is_busy());
        assert!(app.transcript.is_empty());
        assert_eq!(app.input, "   ");
    }

    #[tokio::test]
    async fn clicking_send_submits() {
        let mut app = offline_app();
        app.send_button_area = Some(Rect::new(50, 20, 10, 3));
        type_text(&mut app, "hi");

        handle_event(&mut app, click(10, 10));
        assert!(!app.is_busy());

        handle_event(&mut app, click(55, 21));
        assert!(app.is_busy());
    }

    /// Accepts connections and never answers, so requests stay in flight.
    async fn silent_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    #[tokio::test]
    async fn esc_cancels_with_one_reply_line() {
        let endpoint = silent_endpoint().await;
        let client = MistralClient::new(Some("key".to_string()), &endpoint, None).unwrap();
        let mut app = App::new(Dispatcher::new(client, Duration::ZERO, RetryPolicy::default()));

        type_text(&mut app, "hello");
        handle_event(&mut app, key(KeyCode::Enter));
        assert!(app.is_busy());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!app.poll_pending());

        handle_event(&mut app, key(KeyCode::Esc));
        let mut completed = false;
        for _ in 0..200 {
            if app.poll_pending() {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(completed, "cancelled exchange never completed");

        let messages = app.transcript.messages();
        let replies = messages.iter().filter(|m| m.role == ChatRole::Assistant).count();
        assert_eq!(replies, 1);
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("Request cancelled."));
        assert_eq!(app.status, Status::Ready);
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn ctrl_chords_do_not_type() {
        let mut app = offline_app();
        type_text(&mut app, "ab");
        for c in ['a', 'e', 'u'] {
            handle_event(&mut app, AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)));
        }
        handle_event(&mut app, AppEvent::Key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::ALT)));
        assert_eq!(app.input, "ab");
        assert_eq!(app.input_cursor, 2);

        // Shifted letters still type
        handle_event(&mut app, AppEvent::Key(KeyEvent::new(KeyCode::Char('C'), KeyModifiers::SHIFT)));
        assert_eq!(app.input, "abC");
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn ctrl_c_quits() {
        let mut app = offline_app();
        let mut event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        event.kind = KeyEventKind::Press;
        handle_event(&mut app, AppEvent::Key(event));
        assert!(app.should_quit);
    }
}

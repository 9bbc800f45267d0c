//! UI-agnostic chat state
//!
//! The transcript is append-only and lives only as long as the window.

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "You",
            ChatRole::Assistant => "AI",
        }
    }
}

/// A chat message in the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    /// `You: ...` / `AI: ...`, one entry per content line. Continuation
    /// lines are indented under the label.
    pub fn rendered_lines(&self) -> Vec<String> {
        let label = self.role.label();
        let indent = " ".repeat(label.len() + 2);
        let mut lines = Vec::new();
        for (i, line) in self.content.lines().enumerate() {
            if i == 0 {
                lines.push(format!("{}: {}", label, line));
            } else {
                lines.push(format!("{}{}", indent, line));
            }
        }
        if lines.is_empty() {
            lines.push(format!("{}:", label));
        }
        lines
    }
}

pub const WELCOME: [&str; 2] = ["Welcome to Mistral AI Chat!", "Type your message below."];

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Plain text of the whole window: welcome banner, then every message.
    /// An assistant reply is followed by a blank line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = WELCOME.iter().map(|s| s.to_string()).collect();
        lines.push(String::new());
        for msg in &self.messages {
            lines.extend(msg.rendered_lines());
            if msg.role == ChatRole::Assistant {
                lines.push(String::new());
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_welcome_only() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(
            transcript.lines(),
            vec!["Welcome to Mistral AI Chat!", "Type your message below.", ""]
        );
    }

    #[test]
    fn exchange_renders_labels() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hi");
        transcript.push_assistant("Hello!");

        let lines = transcript.lines();
        assert_eq!(&lines[3..], &["You: Hi", "AI: Hello!", ""]);
    }

    #[test]
    fn multiline_reply_is_indented() {
        let msg = ChatMessage::assistant("API Error: HTTP 500\nStatus: 500");
        assert_eq!(
            msg.rendered_lines(),
            vec!["AI: API Error: HTTP 500", "    Status: 500"]
        );
        assert_eq!(ChatMessage::assistant("").rendered_lines(), vec!["AI:"]);
    }
}

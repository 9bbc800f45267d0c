use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can end an exchange without a reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured (set API_KEY)")]
    MissingApiKey,

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status {
        status: StatusCode,
        details: Option<serde_json::Value>,
    },

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("response contained no choices")]
    EmptyChoices,

    #[error("request cancelled")]
    Cancelled,
}

impl ChatError {
    /// Text shown in the transcript in place of a reply.
    ///
    /// Transport and HTTP failures read `API Error: ...`, decoding problems
    /// read `Unexpected Error: ...`.
    pub fn display_text(&self) -> String {
        match self {
            ChatError::Status { status, details } => {
                let mut text = format!("API Error: {}", self);
                match details.as_ref().and_then(|d| serde_json::to_string_pretty(d).ok()) {
                    Some(pretty) => {
                        text.push_str("\nDetails: ");
                        text.push_str(&pretty);
                    }
                    None => text.push_str(&format!("\nStatus: {}", status.as_u16())),
                }
                text
            }
            ChatError::MissingApiKey | ChatError::Transport(_) | ChatError::RateLimited { .. } => {
                format!("API Error: {}", self)
            }
            ChatError::Decode(_) | ChatError::EmptyChoices => {
                format!("Unexpected Error: {}", self)
            }
            ChatError::Cancelled => "Request cancelled.".to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

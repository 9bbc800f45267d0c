pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod mistral;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use config::Config;
pub use dispatcher::{DispatchEvent, Dispatcher, RetryPolicy, Throttle};
pub use error::ChatError;
pub use mistral::{ChatRequest, MistralClient};
pub use state::{ChatMessage, ChatRole, Transcript};

use futures_util::FutureExt;
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dispatcher::{reply_text, DispatchEvent, Dispatcher};
use crate::error::ChatError;
use crate::state::Transcript;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Processing,
    RateLimited { secs: u64 },
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Status::Ready => "Ready".to_string(),
            Status::Processing => "Processing...".to_string(),
            Status::RateLimited { secs } => format!("Rate limited. Waiting {} seconds...", secs),
        }
    }
}

/// The one outstanding request, if any.
pub struct PendingRequest {
    handle: JoinHandle<Result<String, ChatError>>,
    cancel: CancellationToken,
}

pub struct App {
    pub should_quit: bool,

    // Input line
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Transcript
    pub transcript: Transcript,
    pub transcript_scroll: u16,
    pub transcript_height: u16, // inner height, set during render
    pub transcript_width: u16,  // inner width, set during render
    pub transcript_rows: u16,   // wrapped row count, set during render
    pub follow_bottom: bool,

    // Request state
    pub status: Status,
    pub pending: Option<PendingRequest>,
    pub dispatcher: Dispatcher,
    events_tx: mpsc::UnboundedSender<DispatchEvent>,
    events_rx: mpsc::UnboundedReceiver<DispatchEvent>,

    // Animation state
    pub animation_frame: u8,

    // Areas for mouse hit-testing (updated during render)
    pub transcript_area: Option<Rect>,
    pub send_button_area: Option<Rect>,
}

impl App {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            should_quit: false,

            input: String::new(),
            input_cursor: 0,

            transcript: Transcript::new(),
            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,
            transcript_rows: 0,
            follow_bottom: true,

            status: Status::Ready,
            pending: None,
            dispatcher,
            events_tx,
            events_rx,

            animation_frame: 0,

            transcript_area: None,
            send_button_area: None,
        }
    }

    /// Input and Send are disabled while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Start an exchange with the current input. Returns false when nothing
    /// was sent: blank input, or a request already outstanding.
    pub fn submit(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }

        let message = self.input.trim().to_string();
        if message.is_empty() {
            return false;
        }

        self.transcript.push_user(message.clone());
        self.input.clear();
        self.input_cursor = 0;
        self.status = Status::Processing;
        self.follow_bottom = true;

        let dispatcher = self.dispatcher.clone();
        let events = self.events_tx.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(chars = message.chars().count(), "submitting message");
        let handle = tokio::spawn(async move {
            dispatcher.dispatch(&message, &events, &token).await
        });

        self.pending = Some(PendingRequest { handle, cancel });
        true
    }

    pub fn cancel_pending(&mut self) {
        if let Some(pending) = &self.pending {
            debug!("cancelling outstanding request");
            pending.cancel.cancel();
        }
    }

    /// Apply dispatcher progress and, once the task has finished, append
    /// the reply and re-enable input. Returns true when an exchange completed.
    pub fn poll_pending(&mut self) -> bool {
        while let Ok(event) = self.events_rx.try_recv() {
            if self.pending.is_none() {
                continue;
            }
            match event {
                DispatchEvent::RateLimited { wait, .. } => {
                    self.status = Status::RateLimited { secs: wait.as_secs() };
                }
                DispatchEvent::Throttled { .. } | DispatchEvent::Retrying { .. } => {
                    self.status = Status::Processing;
                }
            }
        }

        let finished = match &self.pending {
            Some(pending) => pending.handle.is_finished(),
            None => false,
        };
        if !finished {
            return false;
        }

        let Some(mut pending) = self.pending.take() else {
            return false;
        };
        let joined = (&mut pending.handle).now_or_never();
        let text = match joined {
            Some(Ok(outcome)) => {
                if let Err(e) = &outcome {
                    if !e.is_cancelled() {
                        error!(error = %e, "chat request failed");
                    }
                }
                reply_text(&outcome)
            }
            Some(Err(join_error)) => {
                error!(error = %join_error, "chat task did not complete");
                format!("Unexpected Error: {}", join_error)
            }
            None => {
                // is_finished() said otherwise; keep waiting.
                self.pending = Some(pending);
                return false;
            }
        };

        self.transcript.push_assistant(text);
        self.status = Status::Ready;
        self.follow_bottom = true;
        true
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn quit(&mut self) {
        self.cancel_pending();
        self.should_quit = true;
    }

    // Transcript scrolling

    pub fn max_transcript_scroll(&self) -> u16 {
        let visible_height = if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        };
        self.transcript_rows.saturating_sub(visible_height)
    }

    /// Clamp the scroll offset, pinning to the bottom while following.
    pub fn sync_transcript_scroll(&mut self) {
        let max_scroll = self.max_transcript_scroll();
        if self.follow_bottom || self.transcript_scroll > max_scroll {
            self.transcript_scroll = max_scroll;
        }
    }

    pub fn scroll_transcript_up(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_transcript_down(&mut self, lines: u16) {
        let max_scroll = self.max_transcript_scroll();
        self.transcript_scroll = self.transcript_scroll.saturating_add(lines).min(max_scroll);
        self.follow_bottom = self.transcript_scroll >= max_scroll;
    }

    pub fn page_size(&self) -> u16 {
        self.transcript_height.saturating_sub(1).max(1)
    }
}

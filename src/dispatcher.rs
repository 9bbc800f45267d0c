//! Request dispatch: throttling, bounded 429 retries and cancellation around
//! a single [`MistralClient`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::mistral::{Attempt, ChatRequest, MistralClient};

/// Progress reported to the window while a dispatch is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Throttled { wait: Duration },
    RateLimited { wait: Duration, attempt: u32 },
    /// The rate-limit wait is over and the request is being resent.
    Retrying { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_retry_after: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_retry_after: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based). The server's value wins;
    /// without one the default doubles each attempt. Both are capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let wait = retry_after.unwrap_or_else(|| {
            let factor = 1u32
                .checked_shl(attempt.saturating_sub(1))
                .unwrap_or(u32::MAX);
            self.default_retry_after.saturating_mul(factor)
        });
        wait.min(self.max_backoff)
    }
}

/// Minimum spacing between request starts.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn wait_needed(&self, last_start: Option<Instant>, now: Instant) -> Duration {
        match last_start {
            Some(prev) => self.interval.saturating_sub(now.saturating_duration_since(prev)),
            None => Duration::ZERO,
        }
    }

    /// Sleep out the rest of the interval, then record a new start.
    /// Returns how long it slept. Dropping the future mid-sleep records nothing.
    pub async fn acquire(&self) -> Duration {
        let mut last_start = self.last_start.lock().await;
        let wait = self.wait_needed(*last_start, Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        *last_start = Some(Instant::now());
        wait
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    client: MistralClient,
    throttle: Arc<Throttle>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(client: MistralClient, throttle_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            throttle: Arc::new(Throttle::new(throttle_interval)),
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        let client = MistralClient::new(
            config.resolve_api_key(),
            &config.endpoint,
            config.request_timeout(),
        )?;
        Ok(Self::new(client, config.throttle_interval(), config.retry_policy()))
    }

    pub fn client(&self) -> &MistralClient {
        &self.client
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send `message` as a single-turn request and return the reply text.
    ///
    /// Only HTTP 429 is retried, with an identical payload, at most
    /// `max_retries` times. Cancelling `cancel` aborts whatever stage is
    /// running: throttle wait, request, or rate-limit wait.
    pub async fn dispatch(
        &self,
        message: &str,
        events: &mpsc::UnboundedSender<DispatchEvent>,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let request = ChatRequest::single_turn(message);
        let mut retries = 0u32;

        loop {
            let waited = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                waited = self.throttle.acquire() => waited,
            };
            if !waited.is_zero() {
                debug!(wait_ms = waited.as_millis() as u64, "request throttled");
                let _ = events.send(DispatchEvent::Throttled { wait: waited });
            }

            debug!(attempt = retries + 1, chars = message.chars().count(), "sending chat request");
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                result = self.client.send(&request) => result?,
            };

            match attempt {
                Attempt::Reply(text) => return Ok(text),
                Attempt::RateLimited { retry_after } => {
                    if retries >= self.retry.max_retries {
                        warn!(retries, "rate limited, giving up");
                        return Err(ChatError::RateLimited { retries });
                    }
                    retries += 1;

                    let wait = self.retry.delay_for(retries, retry_after);
                    warn!(
                        attempt = retries,
                        wait_secs = wait.as_secs(),
                        server_directed = retry_after.is_some(),
                        "rate limited, retrying"
                    );
                    let _ = events.send(DispatchEvent::RateLimited { wait, attempt: retries });

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    let _ = events.send(DispatchEvent::Retrying { attempt: retries });
                }
            }
        }
    }
}

/// Transcript text for a finished dispatch.
pub fn reply_text(outcome: &Result<String, ChatError>) -> String {
    match outcome {
        Ok(text) => text.clone(),
        Err(e) => e.display_text(),
    }
}

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatError;

pub const DEFAULT_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";
pub const MODEL: &str = "mistral-large-latest";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
}

impl ChatRequest {
    /// A request carrying only the latest user turn.
    pub fn single_turn(message: &str) -> Self {
        Self {
            model: MODEL.to_string(),
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: message.to_string(),
            }],
        }
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Outcome of a single POST that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Reply(String),
    RateLimited { retry_after: Option<Duration> },
}

#[derive(Clone)]
pub struct MistralClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl MistralClient {
    pub fn new(
        api_key: Option<String>,
        endpoint: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ChatError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            api_key,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Issue one POST. A 429 is reported as [`Attempt::RateLimited`] rather
    /// than an error so the caller decides whether to retry.
    pub async fn send(&self, request: &ChatRequest) -> Result<Attempt, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "chat completion response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            return Ok(Attempt::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let details = serde_json::from_slice::<serde_json::Value>(&body).ok();
            return Err(ChatError::Status { status, details });
        }

        let body = response.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&body).map_err(ChatError::Decode)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| Attempt::Reply(choice.message.content))
            .ok_or(ChatError::EmptyChoices)
    }
}

/// Seconds from a `Retry-After` header. HTTP-date values are not honored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn single_turn_payload_shape() {
        let request = ChatRequest::single_turn("Hi there");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "mistral-large-latest",
                "messages": [{ "role": "user", "content": "Hi there" }]
            })
        );
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 3 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        // Unroutable endpoint: reaching the network would hang or error differently.
        let client = MistralClient::new(None, "http://192.0.2.1/v1/chat", None).unwrap();
        assert!(!client.has_api_key());
        let err = client.send(&ChatRequest::single_turn("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::MissingApiKey));
    }
}

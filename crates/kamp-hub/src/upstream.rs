use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";
const UPSTREAM_TIMEOUT_SECS: u64 = 15;
const UPSTREAM_MAX_TOKENS: u32 = 500;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response had no choices")]
    Empty,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [CompletionMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionReply,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    content: String,
}

/// Chat-completions client used for any model other than the mock one.
#[derive(Debug, Clone)]
pub struct UpstreamChat {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl UpstreamChat {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String, UpstreamError> {
        let body = CompletionRequest {
            model,
            messages: [CompletionMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: UPSTREAM_MAX_TOKENS,
        };
        let response: CompletionResponse = self
            .http
            .post(self.url.as_str())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let choice = response.choices.into_iter().next().ok_or(UpstreamError::Empty)?;
        Ok(choice.message.content.trim().to_string())
    }

    /// Upstream failures are reported inside the reply text so the panel
    /// still shows something readable.
    pub async fn reply(&self, model: &str, prompt: &str) -> String {
        match self.complete(model, prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "upstream_error", model = model, error = %err);
                format!("(AI error: {err})")
            }
        }
    }
}

use async_trait::async_trait;
use kamp_core::dispatch::{Dispatcher, Failure, PendingRequest, Reply, RequestPayload};
use kamp_core::wire::{ChatResponse, ExecResponse};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5080";

#[derive(Debug, Clone)]
pub struct HttpDispatcherConfig {
    pub base_url: String,
}

impl HttpDispatcherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("base url is missing")]
    BaseUrlMissing,
    #[error("base url must use http or https: {0}")]
    InvalidBaseUrl(String),
    #[error("http client setup failed: {0}")]
    Setup(#[from] reqwest::Error),
}

/// Posts panel requests as JSON to the hub. One attempt per call, no client
/// timeout: a request that never settles keeps its placeholder pending.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(config: HttpDispatcherConfig) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        let trimmed = path.trim();
        if trimmed.starts_with('/') {
            format!("{}{}", self.base_url, trimmed)
        } else {
            format!("{}/{}", self.base_url, trimmed)
        }
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(StatusCode, Vec<u8>), Failure> {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(url.as_str())
            .json(body)
            .send()
            .await
            .map_err(|err| {
                warn!(event = "dispatch_send_failed", url = %url, error = %err);
                Failure::transport(err.to_string())
            })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| {
            warn!(event = "dispatch_read_failed", url = %url, error = %err);
            Failure::transport(err.to_string())
        })?;
        debug!(event = "dispatch_response", url = %url, status = status.as_u16(), bytes = bytes.len());
        Ok((status, bytes.to_vec()))
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, request: &PendingRequest) -> Result<Reply, Failure> {
        match &request.payload {
            RequestPayload::Chat(body) => {
                let (status, bytes) = self.post(request.endpoint(), body).await?;
                decode_response::<ChatResponse>(status, &bytes).map(Reply::Chat)
            }
            RequestPayload::Exec(body) => {
                let (status, bytes) = self.post(request.endpoint(), body).await?;
                decode_response::<ExecResponse>(status, &bytes).map(Reply::Exec)
            }
        }
    }
}

/// Maps a raw response onto the panel failure taxonomy. An `error` field wins
/// regardless of status; other non-2xx statuses and undecodable bodies are
/// transport failures; a 2xx body missing its display field still decodes.
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Result<T, Failure> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            if !status.is_success() {
                return Err(Failure::transport(format!("http {}", status.as_u16())));
            }
            return Err(Failure::transport(format!("invalid json response: {err}")));
        }
    };
    if let Some(message) = error_field(&value) {
        return Err(Failure::server(message));
    }
    if !status.is_success() {
        return Err(Failure::transport(format!("http {}", status.as_u16())));
    }
    serde_json::from_value(value)
        .map_err(|err| Failure::transport(format!("unexpected response shape: {err}")))
}

fn error_field(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::BaseUrlMissing);
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ClientError::InvalidBaseUrl(trimmed.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_wins_over_status() {
        let body = br#"{"error":"no prompt provided"}"#;
        let failure = decode_response::<ChatResponse>(StatusCode::BAD_REQUEST, body)
            .expect_err("server error");
        assert_eq!(failure, Failure::server("no prompt provided"));

        let failure =
            decode_response::<ChatResponse>(StatusCode::OK, body).expect_err("server error");
        assert_eq!(failure, Failure::server("no prompt provided"));
    }

    #[test]
    fn non_success_without_error_is_transport() {
        let failure = decode_response::<ChatResponse>(StatusCode::BAD_GATEWAY, b"<html>")
            .expect_err("transport error");
        assert_eq!(failure, Failure::transport("http 502"));

        let failure = decode_response::<ChatResponse>(StatusCode::INTERNAL_SERVER_ERROR, b"{}")
            .expect_err("transport error");
        assert_eq!(failure, Failure::transport("http 500"));
    }

    #[test]
    fn malformed_success_body_is_transport() {
        let failure = decode_response::<ChatResponse>(StatusCode::OK, b"not json")
            .expect_err("transport error");
        assert!(matches!(failure, Failure::Transport { .. }));
        assert!(failure.message().starts_with("invalid json response"));

        let failure = decode_response::<ExecResponse>(StatusCode::OK, br#"{"returncode":"zero"}"#)
            .expect_err("transport error");
        assert!(failure.message().starts_with("unexpected response shape"));
    }

    #[test]
    fn success_without_reply_still_decodes() {
        let reply = decode_response::<ChatResponse>(StatusCode::OK, b"{}").expect("decoded");
        assert_eq!(reply, ChatResponse::default());
    }

    #[test]
    fn base_url_is_validated_and_trimmed() {
        assert!(matches!(
            normalize_base_url("  "),
            Err(ClientError::BaseUrlMissing)
        ));
        assert!(matches!(
            normalize_base_url("localhost:5080"),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert_eq!(
            normalize_base_url("http://127.0.0.1:5080/").expect("valid"),
            "http://127.0.0.1:5080"
        );
    }

    #[test]
    fn endpoint_joins_paths() {
        let dispatcher =
            HttpDispatcher::new(HttpDispatcherConfig::new("http://127.0.0.1:5080/")).expect("client");
        assert_eq!(dispatcher.endpoint("/api/chat"), "http://127.0.0.1:5080/api/chat");
        assert_eq!(dispatcher.endpoint("api/exec"), "http://127.0.0.1:5080/api/exec");
    }
}

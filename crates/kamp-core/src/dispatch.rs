use crate::panel::PanelKind;
use crate::wire::{ChatRequest, ChatResponse, ExecRequest, ExecResponse, CHAT_ENDPOINT, EXEC_ENDPOINT};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    Chat(ChatRequest),
    Exec(ExecRequest),
}

impl RequestPayload {
    pub fn endpoint(&self) -> &'static str {
        match self {
            RequestPayload::Chat(_) => CHAT_ENDPOINT,
            RequestPayload::Exec(_) => EXEC_ENDPOINT,
        }
    }

    /// The text the user submitted, whichever shape it was wrapped in.
    pub fn input_text(&self) -> &str {
        match self {
            RequestPayload::Chat(request) => &request.message,
            RequestPayload::Exec(request) => &request.cmd,
        }
    }
}

/// One in-flight call, correlated to the panel whose placeholder it will
/// resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: String,
    pub panel: PanelKind,
    pub payload: RequestPayload,
}

impl PendingRequest {
    pub fn endpoint(&self) -> &'static str {
        self.payload.endpoint()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Chat(ChatResponse),
    Exec(ExecResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("server error: {message}")]
    Server { message: String },
}

impl Failure {
    pub fn transport(message: impl Into<String>) -> Self {
        Failure::Transport {
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Failure::Server {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Failure::Transport { message } | Failure::Server { message } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Failure::Transport { .. } => "transport_error",
            Failure::Server { .. } => "server_error",
        }
    }
}

/// Sends exactly one request per call. Implementations must not retry.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, request: &PendingRequest) -> Result<Reply, Failure>;
}

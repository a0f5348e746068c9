use crate::dispatch::{Dispatcher, Failure, PendingRequest, Reply, RequestPayload};
use crate::reconcile::{reconcile, Reconciliation};
use crate::transcript::{Role, Transcript};
use crate::wire::{ChatRequest, ExecRequest, DEFAULT_MODEL};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

pub const PENDING_PLACEHOLDER: &str = "…";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Chat,
    Assistant,
    Terminal,
}

impl PanelKind {
    pub const ALL: [PanelKind; 3] = [PanelKind::Chat, PanelKind::Assistant, PanelKind::Terminal];

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelKind::Chat => "chat",
            PanelKind::Assistant => "assistant",
            PanelKind::Terminal => "terminal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PanelKind::Chat => "Chat",
            PanelKind::Assistant => "Assistant",
            PanelKind::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "chat" => Ok(PanelKind::Chat),
            "assistant" => Ok(PanelKind::Assistant),
            "terminal" | "exec" => Ok(PanelKind::Terminal),
            other => Err(format!("Unknown panel: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub kind: PanelKind,
    pub model: String,
}

impl PanelConfig {
    pub fn chat(model: impl Into<String>) -> Self {
        Self {
            kind: PanelKind::Chat,
            model: model.into(),
        }
    }

    pub fn assistant(model: impl Into<String>) -> Self {
        Self {
            kind: PanelKind::Assistant,
            model: model.into(),
        }
    }

    pub fn terminal() -> Self {
        Self {
            kind: PanelKind::Terminal,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    fn payload(&self, text: String) -> RequestPayload {
        match self.kind {
            PanelKind::Chat | PanelKind::Assistant => RequestPayload::Chat(ChatRequest {
                message: text,
                model: self.model.clone(),
            }),
            PanelKind::Terminal => RequestPayload::Exec(ExecRequest { cmd: text }),
        }
    }
}

/// Editable text field of a panel. Edits are ignored while disabled.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    text: String,
    enabled: bool,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self {
            text: String::new(),
            enabled: true,
        }
    }
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn push_char(&mut self, c: char) {
        if self.enabled {
            self.text.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.enabled {
            self.text.pop();
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        if self.enabled {
            self.text = text.into();
        }
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Handles a front end hands to a controller. A panel whose surface lacks
/// any of them stays unbound.
#[derive(Debug, Clone, Default)]
pub struct PanelBindings {
    pub input: Option<InputBuffer>,
    pub transcript: Option<Transcript>,
    pub submit: bool,
}

impl PanelBindings {
    pub fn complete() -> Self {
        Self {
            input: Some(InputBuffer::new()),
            transcript: Some(Transcript::new()),
            submit: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("{0} panel has no input field")]
    MissingInput(PanelKind),
    #[error("{0} panel has no transcript container")]
    MissingTranscript(PanelKind),
    #[error("{0} panel has no submit control")]
    MissingSubmit(PanelKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("input is empty")]
    Empty,
    #[error("request {request_id} is still awaiting a reply")]
    Busy { request_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    AwaitingReply { request: PendingRequest },
}

/// Drives one panel through Idle -> AwaitingReply -> Idle.
///
/// Correlation with the placeholder is positional, so the controller keeps
/// a single request outstanding and keeps the input disabled until it
/// settles.
#[derive(Debug)]
pub struct PanelController {
    config: PanelConfig,
    input: InputBuffer,
    transcript: Transcript,
    state: PanelState,
    next_request_seq: u64,
}

impl PanelController {
    pub fn bind(config: PanelConfig, bindings: PanelBindings) -> Result<Self, BindError> {
        let kind = config.kind;
        if !bindings.submit {
            return Err(BindError::MissingSubmit(kind));
        }
        let input = bindings.input.ok_or(BindError::MissingInput(kind))?;
        let transcript = bindings
            .transcript
            .ok_or(BindError::MissingTranscript(kind))?;
        Ok(Self {
            config,
            input,
            transcript,
            state: PanelState::Idle,
            next_request_seq: 0,
        })
    }

    pub fn new(config: PanelConfig) -> Self {
        Self {
            config,
            input: InputBuffer::new(),
            transcript: Transcript::new(),
            state: PanelState::Idle,
            next_request_seq: 0,
        }
    }

    pub fn kind(&self) -> PanelKind {
        self.config.kind
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, PanelState::AwaitingReply { .. })
    }

    pub fn input_enabled(&self) -> bool {
        self.input.is_enabled()
    }

    pub fn awaiting_request_id(&self) -> Option<&str> {
        match &self.state {
            PanelState::AwaitingReply { request } => Some(request.request_id.as_str()),
            PanelState::Idle => None,
        }
    }

    /// Validates the input and, if accepted, performs the optimistic half of
    /// a round trip: clear input, append the user record and the pending
    /// placeholder, then hand back the request to dispatch.
    pub fn begin_submit(&mut self) -> Result<PendingRequest, SubmitRejected> {
        if let PanelState::AwaitingReply { request } = &self.state {
            return Err(SubmitRejected::Busy {
                request_id: request.request_id.clone(),
            });
        }
        let text = self.input.text().trim().to_string();
        if text.is_empty() {
            return Err(SubmitRejected::Empty);
        }
        self.input.take();
        self.transcript.append(Role::User, text.as_str());
        self.transcript.append_pending(Role::Bot, PENDING_PLACEHOLDER);

        let request = PendingRequest {
            request_id: self.next_request_id(),
            panel: self.config.kind,
            payload: self.config.payload(text),
        };
        self.input.set_enabled(false);
        self.state = PanelState::AwaitingReply {
            request: request.clone(),
        };
        info!(
            event = "panel_submit",
            panel = %self.config.kind,
            request_id = %request.request_id,
            endpoint = request.endpoint()
        );
        Ok(request)
    }

    /// Applies a settled request. Settlements for anything other than the
    /// outstanding request leave the transcript untouched.
    pub fn settle(
        &mut self,
        request_id: &str,
        outcome: Result<Reply, Failure>,
    ) -> Reconciliation {
        let request = match std::mem::replace(&mut self.state, PanelState::Idle) {
            PanelState::AwaitingReply { request } if request.request_id == request_id => request,
            other => {
                self.state = other;
                warn!(
                    event = "panel_stale_settlement",
                    panel = %self.config.kind,
                    request_id = request_id,
                    awaiting = self.awaiting_request_id().unwrap_or("none")
                );
                return Reconciliation::default();
            }
        };
        self.input.set_enabled(true);

        let outcome_kind = match &outcome {
            Ok(_) => "ok",
            Err(failure) => failure.kind(),
        };
        let reconciliation = reconcile(&mut self.transcript, &request, &outcome);
        info!(
            event = "panel_settled",
            panel = %self.config.kind,
            request_id = request_id,
            outcome = outcome_kind,
            trailing = reconciliation.appended.len()
        );
        reconciliation
    }

    pub async fn submit<D>(&mut self, dispatcher: &D) -> Result<Reconciliation, SubmitRejected>
    where
        D: Dispatcher + ?Sized,
    {
        let request = self.begin_submit()?;
        let outcome = dispatcher.send(&request).await;
        Ok(self.settle(&request.request_id, outcome))
    }

    /// Starts a fresh transcript and abandons any outstanding request; its
    /// settlement will be ignored when it arrives.
    pub fn clear(&mut self) {
        if let Some(request_id) = self.awaiting_request_id() {
            info!(
                event = "panel_abandon",
                panel = %self.config.kind,
                request_id = request_id
            );
        }
        self.transcript = Transcript::new();
        self.state = PanelState::Idle;
        self.input.set_enabled(true);
    }

    fn next_request_id(&mut self) -> String {
        self.next_request_seq = self.next_request_seq.saturating_add(1);
        format!("{}-{}", self.config.kind, self.next_request_seq)
    }
}

use crate::dispatch::{Failure, PendingRequest, Reply, RequestPayload};
use crate::transcript::{RecordId, Role, Transcript};
use crate::wire::{ChatResponse, ExecResponse};

pub const NO_REPLY_TEXT: &str = "(no reply)";
pub const NO_OUTPUT_TEXT: &str = "(no output)";
pub const ERROR_PREFIX: &str = "(error)";

/// What a settlement did to the transcript. `resolved` is `None` when there
/// was no placeholder left to finalize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub resolved: Option<RecordId>,
    pub appended: Vec<RecordId>,
}

impl Reconciliation {
    pub fn is_stale(&self) -> bool {
        self.resolved.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    pub headline: String,
    pub trailing: Vec<String>,
}

impl Rendering {
    fn single(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            trailing: Vec::new(),
        }
    }
}

pub fn render_outcome(request: &PendingRequest, outcome: &Result<Reply, Failure>) -> Rendering {
    match outcome {
        Ok(reply) => match reply_error(reply) {
            Some(message) => Rendering::single(format_failure(&Failure::server(message))),
            None => match reply {
                Reply::Chat(response) => render_chat(response),
                Reply::Exec(response) => render_exec(&request.payload, response),
            },
        },
        Err(failure) => Rendering::single(format_failure(failure)),
    }
}

/// A decoded body can still carry the server's `error` field; it wins over
/// any other content.
fn reply_error(reply: &Reply) -> Option<&str> {
    let error = match reply {
        Reply::Chat(response) => response.error.as_deref(),
        Reply::Exec(response) => response.error.as_deref(),
    };
    error.filter(|message| !message.trim().is_empty())
}

pub fn format_failure(failure: &Failure) -> String {
    format!("{ERROR_PREFIX} {}", failure.message())
}

/// Resolves the newest placeholder with the rendered outcome, then appends
/// any trailing lines after it. Nothing is appended when the placeholder is
/// already gone.
pub fn reconcile(
    transcript: &mut Transcript,
    request: &PendingRequest,
    outcome: &Result<Reply, Failure>,
) -> Reconciliation {
    let rendering = render_outcome(request, outcome);
    let Some(resolved) = transcript.resolve_last_pending(rendering.headline) else {
        return Reconciliation::default();
    };
    let appended = rendering
        .trailing
        .into_iter()
        .map(|line| transcript.append(Role::Bot, line))
        .collect();
    Reconciliation {
        resolved: Some(resolved),
        appended,
    }
}

fn render_chat(response: &ChatResponse) -> Rendering {
    let text = response
        .reply
        .as_deref()
        .filter(|reply| !reply.is_empty())
        .unwrap_or(NO_REPLY_TEXT);
    Rendering::single(text)
}

fn render_exec(payload: &RequestPayload, response: &ExecResponse) -> Rendering {
    let mut trailing = Vec::new();
    let stdout = response
        .stdout
        .as_deref()
        .map(|text| text.trim_end_matches(['\n', '\r']))
        .unwrap_or_default();
    let stderr = response
        .stderr
        .as_deref()
        .map(|text| text.trim_end_matches(['\n', '\r']))
        .unwrap_or_default();
    if !stdout.is_empty() {
        trailing.push(stdout.to_string());
    }
    if !stderr.is_empty() {
        trailing.push(format!("stderr: {stderr}"));
    }
    if stdout.is_empty() && stderr.is_empty() {
        trailing.push(NO_OUTPUT_TEXT.to_string());
    }
    if let Some(code) = response.returncode {
        trailing.push(format!("[exit {code}]"));
    }
    Rendering {
        headline: format!("$ {}", payload.input_text()),
        trailing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelKind;
    use crate::wire::{ChatRequest, ExecRequest};

    fn chat_request() -> PendingRequest {
        PendingRequest {
            request_id: "chat-1".to_string(),
            panel: PanelKind::Chat,
            payload: RequestPayload::Chat(ChatRequest {
                message: "hello".to_string(),
                model: "mock".to_string(),
            }),
        }
    }

    fn exec_request(cmd: &str) -> PendingRequest {
        PendingRequest {
            request_id: "terminal-1".to_string(),
            panel: PanelKind::Terminal,
            payload: RequestPayload::Exec(ExecRequest {
                cmd: cmd.to_string(),
            }),
        }
    }

    fn awaiting(user_text: &str) -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append(Role::User, user_text);
        transcript.append_pending(Role::Bot, "…");
        transcript
    }

    fn texts(transcript: &Transcript) -> Vec<&str> {
        transcript.records().iter().map(|r| r.text()).collect()
    }

    #[test]
    fn chat_reply_resolves_placeholder() {
        let mut transcript = awaiting("hello");
        let outcome = Ok(Reply::Chat(ChatResponse::reply("hi")));

        let result = reconcile(&mut transcript, &chat_request(), &outcome);

        assert_eq!(result.resolved.map(|id| id.0), Some(1));
        assert!(result.appended.is_empty());
        assert_eq!(texts(&transcript), vec!["hello", "hi"]);
        assert_eq!(transcript.pending_count(), 0);
    }

    #[test]
    fn missing_reply_uses_fallback_text() {
        let mut transcript = awaiting("hello");
        let outcome = Ok(Reply::Chat(ChatResponse::default()));

        reconcile(&mut transcript, &chat_request(), &outcome);

        assert_eq!(texts(&transcript), vec!["hello", NO_REPLY_TEXT]);
    }

    #[test]
    fn failures_are_prefixed_and_not_pending() {
        let mut transcript = awaiting("hello");
        let outcome = Err(Failure::transport("connection refused"));

        reconcile(&mut transcript, &chat_request(), &outcome);

        let last = transcript.last().expect("bot record");
        assert_eq!(last.text(), "(error) connection refused");
        assert!(!last.is_pending());

        let mut transcript = awaiting("hello");
        let outcome = Err(Failure::server("no prompt provided"));
        reconcile(&mut transcript, &chat_request(), &outcome);
        assert_eq!(
            transcript.last().expect("bot record").text(),
            "(error) no prompt provided"
        );
    }

    #[test]
    fn exec_appends_stdout_and_exit_code_after_echo() {
        let mut transcript = awaiting("ls");
        let outcome = Ok(Reply::Exec(ExecResponse {
            stdout: Some("a.txt\n".to_string()),
            returncode: Some(0),
            ..ExecResponse::default()
        }));

        let result = reconcile(&mut transcript, &exec_request("ls"), &outcome);

        assert_eq!(texts(&transcript), vec!["ls", "$ ls", "a.txt", "[exit 0]"]);
        assert_eq!(result.appended.len(), 2);
        assert!(!texts(&transcript).iter().any(|t| t.starts_with("stderr")));
        assert_eq!(transcript.pending_count(), 0);
    }

    #[test]
    fn exec_stderr_follows_stdout() {
        let mut transcript = awaiting("make");
        let outcome = Ok(Reply::Exec(ExecResponse {
            stdout: Some("building\n".to_string()),
            stderr: Some("warning: unused\n".to_string()),
            returncode: Some(2),
            error: None,
        }));

        reconcile(&mut transcript, &exec_request("make"), &outcome);

        assert_eq!(
            texts(&transcript),
            vec!["make", "$ make", "building", "stderr: warning: unused", "[exit 2]"]
        );
    }

    #[test]
    fn exec_without_output_uses_fallback() {
        let mut transcript = awaiting("true");
        let outcome = Ok(Reply::Exec(ExecResponse::default()));

        reconcile(&mut transcript, &exec_request("true"), &outcome);

        assert_eq!(texts(&transcript), vec!["true", "$ true", NO_OUTPUT_TEXT]);
    }

    #[test]
    fn error_field_in_reply_renders_as_failure() {
        let mut transcript = awaiting("hello");
        let outcome = Ok(Reply::Chat(ChatResponse::error("model offline")));
        reconcile(&mut transcript, &chat_request(), &outcome);
        assert_eq!(texts(&transcript), vec!["hello", "(error) model offline"]);

        let mut transcript = awaiting("ls");
        let outcome = Ok(Reply::Exec(ExecResponse {
            stdout: Some("partial".to_string()),
            ..ExecResponse::error("timed out")
        }));
        let result = reconcile(&mut transcript, &exec_request("ls"), &outcome);
        assert!(result.appended.is_empty());
        assert_eq!(texts(&transcript), vec!["ls", "(error) timed out"]);
        assert_eq!(transcript.pending_count(), 0);
    }

    #[test]
    fn stale_settlement_appends_nothing() {
        let mut transcript = Transcript::new();
        transcript.append(Role::User, "ls");
        let outcome = Ok(Reply::Exec(ExecResponse {
            stdout: Some("a.txt".to_string()),
            returncode: Some(0),
            ..ExecResponse::default()
        }));

        let result = reconcile(&mut transcript, &exec_request("ls"), &outcome);

        assert!(result.is_stale());
        assert!(result.appended.is_empty());
        assert_eq!(texts(&transcript), vec!["ls"]);
    }
}

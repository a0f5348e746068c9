use kamp_core::wire::ExecResponse;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no command provided")]
    Empty,
    #[error("failed to start command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone)]
pub struct ExecRunner {
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl ExecRunner {
    pub fn new(workdir: Option<PathBuf>, timeout: Duration) -> Self {
        Self { workdir, timeout }
    }

    /// Runs `cmd` through `sh -c` and captures both streams. The child is
    /// killed when the timeout elapses.
    pub async fn run(&self, cmd: &str) -> Result<ExecResponse, ExecError> {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return Err(ExecError::Empty);
        }
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        let child = command.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(event = "exec_timeout", cmd = cmd, timeout_secs = self.timeout.as_secs());
                return Err(ExecError::Timeout(self.timeout.as_secs()));
            }
        };
        let returncode = output.status.code();
        info!(event = "exec_done", cmd = cmd, returncode = ?returncode);
        Ok(ExecResponse {
            stdout: Some(capped_text(&output.stdout)),
            stderr: Some(capped_text(&output.stderr)),
            returncode,
            error: None,
        })
    }
}

fn capped_text(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_OUTPUT_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..MAX_OUTPUT_BYTES]).into_owned();
    text.push_str("\n[output truncated]");
    text
}

mod exec;
mod responder;
mod upstream;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use exec::{ExecError, ExecRunner};
use kamp_core::wire::{
    ChatResponse, ExecResponse, CHAT_ENDPOINT, DEFAULT_HUB_ADDR, DEFAULT_MODEL, EXEC_ENDPOINT,
};
use serde::Deserialize;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use upstream::{UpstreamChat, DEFAULT_UPSTREAM_URL};

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    debug: bool,
    log_dir: String,
    exec_timeout: Duration,
    workdir: Option<PathBuf>,
    upstream_url: String,
    api_key: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "kamp-hub")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value_t = 30)]
    exec_timeout: u64,
    #[arg(long, default_value = "")]
    workdir: String,
    #[arg(long, default_value = "")]
    upstream_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl ChatBody {
    fn prompt(&self) -> Option<&str> {
        [self.message.as_deref(), self.q.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    fn model(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExecBody {
    #[serde(default)]
    cmd: Option<String>,
}

struct HubState {
    exec: ExecRunner,
    upstream: Option<UpstreamChat>,
}

impl HubState {
    fn new(config: &Config) -> Self {
        let upstream = config
            .api_key
            .as_ref()
            .map(|key| UpstreamChat::new(config.upstream_url.clone(), key.clone()));
        Self {
            exec: ExecRunner::new(config.workdir.clone(), config.exec_timeout),
            upstream,
        }
    }

    async fn reply(&self, model: &str, prompt: &str) -> String {
        match &self.upstream {
            Some(upstream) if model != DEFAULT_MODEL => upstream.reply(model, prompt).await,
            _ => responder::mock_reply(prompt),
        }
    }
}

#[tokio::main]
async fn main() {
    let config = load_config();
    let _log_guard = init_logging(&config);
    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr);
        return;
    }

    let hub = Arc::new(HubState::new(&config));
    let app = build_router(hub);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err);
            return;
        }
    };

    info!(
        event = "hub_start",
        addr = %config.addr,
        upstream = config.api_key.is_some(),
        exec_timeout_secs = config.exec_timeout.as_secs()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        error!(event = "hub_error", error = %err);
    }
}

fn build_router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route(CHAT_ENDPOINT, post(api_chat))
        .route(EXEC_ENDPOINT, post(api_exec))
        .route("/health", get(|| async { "ok" }))
        .with_state(hub)
}

async fn api_chat(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
    body: Option<Json<ChatBody>>,
) -> (StatusCode, Json<ChatResponse>) {
    if !addr.ip().is_loopback() {
        return (StatusCode::FORBIDDEN, Json(ChatResponse::error("forbidden")));
    }
    let body = body.map(|Json(value)| value).unwrap_or_default();
    let Some(prompt) = body.prompt() else {
        warn!(event = "chat_rejected", reason = "empty_prompt");
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatResponse::error("no prompt provided")),
        );
    };
    let model = body.model();
    info!(event = "chat_request", model = model, prompt_chars = prompt.chars().count());
    let reply = hub.reply(model, prompt).await;
    (StatusCode::OK, Json(ChatResponse::reply(reply)))
}

async fn api_exec(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
    body: Option<Json<ExecBody>>,
) -> (StatusCode, Json<ExecResponse>) {
    if !addr.ip().is_loopback() {
        return (StatusCode::FORBIDDEN, Json(ExecResponse::error("forbidden")));
    }
    let cmd = body.and_then(|Json(value)| value.cmd).unwrap_or_default();
    match hub.exec.run(&cmd).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => {
            let status = match &err {
                ExecError::Empty => StatusCode::BAD_REQUEST,
                ExecError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                ExecError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(event = "exec_rejected", status = status.as_u16(), error = %err);
            (status, Json(ExecResponse::error(err.to_string())))
        }
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    let addr = resolve_addr(&args.addr);
    let debug = args.debug || env_true("KAMP_HUB_DEBUG");
    let log_dir = resolve_log_dir(&args.log_dir);
    let workdir = resolve_workdir(&args.workdir);
    let upstream_url = if args.upstream_url.trim().is_empty() {
        DEFAULT_UPSTREAM_URL.to_string()
    } else {
        args.upstream_url.clone()
    };
    Config {
        addr,
        debug,
        log_dir,
        exec_timeout: Duration::from_secs(args.exec_timeout.max(1)),
        workdir,
        upstream_url,
        api_key: resolve_api_key(),
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("KAMP_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

struct MultiWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: io::stdout(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stdout.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stdout.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    if std::fs::create_dir_all(&dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("kamp-hub.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    non_empty_env("KAMP_HUB_ADDR").unwrap_or_else(|| DEFAULT_HUB_ADDR.to_string())
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    non_empty_env("KAMP_LOG_DIR").unwrap_or_else(|| ".kamp/logs".to_string())
}

fn resolve_workdir(workdir_flag: &str) -> Option<PathBuf> {
    if !workdir_flag.trim().is_empty() {
        return Some(PathBuf::from(workdir_flag));
    }
    non_empty_env("KAMP_EXEC_WORKDIR").map(PathBuf::from)
}

fn resolve_api_key() -> Option<String> {
    non_empty_env("KAMP_OPENAI_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY"))
}

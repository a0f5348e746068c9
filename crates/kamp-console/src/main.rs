mod state;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use kamp_client::{HttpDispatcher, HttpDispatcherConfig, DEFAULT_BASE_URL};
use kamp_core::{wire::DEFAULT_MODEL, Dispatcher, PanelBindings, PanelConfig, PanelKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use state::{App, KeyOutcome, Settlement};
use std::{
    fs::OpenOptions,
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kamp-console", about = "Chat, assistant and terminal panels")]
struct Args {
    /// Hub base URL. Defaults to http://$KAMP_HUB_ADDR.
    #[arg(long, env = "KAMP_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, env = "KAMP_CHAT_MODEL", default_value = DEFAULT_MODEL)]
    chat_model: String,
    #[arg(long, env = "KAMP_ASSISTANT_MODEL", default_value = DEFAULT_MODEL)]
    assistant_model: String,
    /// Panels to enable, comma separated. Panels left out are shown as
    /// unavailable.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "chat,assistant,terminal"
    )]
    panels: Vec<PanelKind>,
    /// Write logs to kamp-console.log in this directory.
    #[arg(long, env = "KAMP_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_dir.as_deref());

    let base_url = resolve_base_url(args.base_url.as_deref());
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(
        HttpDispatcher::new(HttpDispatcherConfig::new(base_url.clone()))
            .with_context(|| format!("invalid hub url {base_url}"))?,
    );
    info!(event = "console_start", base_url = %base_url, panels = ?args.panels);

    let mut app = App::new(panel_layout(&args));
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, dispatcher).await;
    restore_terminal(&mut terminal)?;
    result
}

fn panel_layout(args: &Args) -> Vec<(PanelConfig, PanelBindings)> {
    PanelKind::ALL
        .iter()
        .map(|kind| {
            let config = match kind {
                PanelKind::Chat => PanelConfig::chat(args.chat_model.clone()),
                PanelKind::Assistant => PanelConfig::assistant(args.assistant_model.clone()),
                PanelKind::Terminal => PanelConfig::terminal(),
            };
            let bindings = if args.panels.contains(kind) {
                PanelBindings::complete()
            } else {
                PanelBindings::default()
            };
            (config, bindings)
        })
        .collect()
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<()> {
    let (settle_tx, mut settle_rx) = mpsc::channel::<Settlement>(32);
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        tokio::select! {
            Some(settlement) = settle_rx.recv() => {
                app.apply_settlement(settlement);
            }
            maybe_event = events.next() => {
                let event = match maybe_event {
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        warn!(event = "terminal_event_error", error = %err);
                        continue;
                    }
                    None => break,
                };
                let Event::Key(key) = event else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(key) {
                    KeyOutcome::Continue => {}
                    KeyOutcome::Quit => break,
                    KeyOutcome::Dispatch(request) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let tx = settle_tx.clone();
                        tokio::spawn(async move {
                            let outcome = dispatcher.send(&request).await;
                            let settlement = Settlement {
                                panel: request.panel,
                                request_id: request.request_id,
                                outcome,
                            };
                            if tx.send(settlement).await.is_err() {
                                warn!(event = "settlement_undelivered");
                            }
                        });
                    }
                }
            }
        }
    }
    info!(event = "console_stop");
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn init_logging(log_dir: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| non_empty_env("KAMP_LOG_LEVEL").and_then(|level| EnvFilter::try_new(level).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"));
    if env_true("KAMP_LOG_STDOUT") {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    }
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("kamp-console.log"))
            .ok()
    });
    match file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

fn resolve_base_url(flag: Option<&str>) -> String {
    if let Some(value) = flag.map(str::trim).filter(|value| !value.is_empty()) {
        return value.to_string();
    }
    match non_empty_env("KAMP_HUB_ADDR") {
        Some(addr) => format!("http://{addr}"),
        None => DEFAULT_BASE_URL.to_string(),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_true_accepts_common_spellings() {
        let key = "KAMP_CONSOLE_TEST_FLAG";
        for value in ["1", "true", "True", " yes ", "ON"] {
            std::env::set_var(key, value);
            assert!(env_true(key), "{value:?} should be truthy");
        }
        for value in ["0", "off", "no", ""] {
            std::env::set_var(key, value);
            assert!(!env_true(key), "{value:?} should be falsy");
        }
        std::env::remove_var(key);
        assert!(!env_true(key));
    }

    #[test]
    fn explicit_base_url_wins() {
        assert_eq!(
            resolve_base_url(Some(" http://127.0.0.1:9000 ")),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn panels_flag_limits_bound_panels() {
        let args = Args::parse_from(["kamp-console", "--panels", "chat,exec"]);
        let app = App::new(panel_layout(&args));

        let bound: Vec<PanelKind> = app
            .slots
            .iter()
            .filter_map(|slot| slot.controller().map(|panel| panel.kind()))
            .collect();
        assert_eq!(bound, vec![PanelKind::Chat, PanelKind::Terminal]);
        assert_eq!(app.slots.len(), 3);
    }

    #[test]
    fn models_default_to_mock() {
        let args = Args::parse_from(["kamp-console"]);
        let layout = panel_layout(&args);
        assert_eq!(layout[0].0.model, DEFAULT_MODEL);
        assert_eq!(layout[1].0.kind, PanelKind::Assistant);
        assert_eq!(layout[2].0.kind, PanelKind::Terminal);
    }
}

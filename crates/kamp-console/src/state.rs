use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use kamp_core::{
    BindError, Failure, PanelBindings, PanelConfig, PanelController, PanelKind, PendingRequest,
    Reply, SubmitRejected,
};
use tracing::{debug, info, warn};

/// Result of one dispatched request, posted back to the event loop.
#[derive(Debug)]
pub struct Settlement {
    pub panel: PanelKind,
    pub request_id: String,
    pub outcome: Result<Reply, Failure>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Quit,
    Dispatch(PendingRequest),
}

pub enum PanelSlot {
    Bound(PanelController),
    Unavailable { kind: PanelKind, reason: BindError },
}

impl PanelSlot {
    pub fn kind(&self) -> PanelKind {
        match self {
            PanelSlot::Bound(panel) => panel.kind(),
            PanelSlot::Unavailable { kind, .. } => *kind,
        }
    }

    pub fn controller(&self) -> Option<&PanelController> {
        match self {
            PanelSlot::Bound(panel) => Some(panel),
            PanelSlot::Unavailable { .. } => None,
        }
    }

    fn controller_mut(&mut self) -> Option<&mut PanelController> {
        match self {
            PanelSlot::Bound(panel) => Some(panel),
            PanelSlot::Unavailable { .. } => None,
        }
    }
}

pub struct App {
    pub slots: Vec<PanelSlot>,
    pub active: usize,
    /// Lines scrolled up from the newest record, per slot. Zero follows the
    /// tail.
    pub scroll_back: Vec<u16>,
    pub help_open: bool,
    pub status_note: Option<String>,
}

impl App {
    pub fn new(panels: Vec<(PanelConfig, PanelBindings)>) -> Self {
        let slots: Vec<PanelSlot> = panels
            .into_iter()
            .map(|(config, bindings)| {
                let kind = config.kind;
                match PanelController::bind(config, bindings) {
                    Ok(panel) => PanelSlot::Bound(panel),
                    Err(reason) => {
                        warn!(event = "panel_unbound", panel = %kind, reason = %reason);
                        PanelSlot::Unavailable { kind, reason }
                    }
                }
            })
            .collect();
        let active = slots
            .iter()
            .position(|slot| slot.controller().is_some())
            .unwrap_or(0);
        let scroll_back = vec![0; slots.len()];
        Self {
            slots,
            active,
            scroll_back,
            help_open: false,
            status_note: None,
        }
    }

    pub fn active_slot(&self) -> Option<&PanelSlot> {
        self.slots.get(self.active)
    }

    pub fn active_panel(&self) -> Option<&PanelController> {
        self.active_slot().and_then(PanelSlot::controller)
    }

    fn active_panel_mut(&mut self) -> Option<&mut PanelController> {
        self.slots
            .get_mut(self.active)
            .and_then(PanelSlot::controller_mut)
    }

    pub fn active_scroll_back(&self) -> u16 {
        self.scroll_back.get(self.active).copied().unwrap_or(0)
    }

    pub fn select_next(&mut self) {
        if !self.slots.is_empty() {
            self.active = (self.active + 1) % self.slots.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.slots.is_empty() {
            self.active = (self.active + self.slots.len() - 1) % self.slots.len();
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            return KeyOutcome::Quit;
        }
        if key.code == KeyCode::F(1) {
            self.help_open = !self.help_open;
            return KeyOutcome::Continue;
        }
        if self.help_open {
            if key.code == KeyCode::Esc {
                self.help_open = false;
            }
            return KeyOutcome::Continue;
        }

        match key.code {
            KeyCode::Tab => self.select_next(),
            KeyCode::BackTab => self.select_prev(),
            KeyCode::PageUp => self.scroll_active(5),
            KeyCode::PageDown => self.scroll_active(-5),
            KeyCode::End => self.follow_tail(),
            KeyCode::Char('l') if ctrl => self.clear_active(),
            KeyCode::Enter => {
                if let Some(request) = self.submit_active() {
                    return KeyOutcome::Dispatch(request);
                }
            }
            KeyCode::Backspace => {
                if let Some(panel) = self.active_panel_mut() {
                    panel.input_mut().backspace();
                }
            }
            KeyCode::Char(c) if !ctrl => {
                if let Some(panel) = self.active_panel_mut() {
                    panel.input_mut().push_char(c);
                }
            }
            _ => {}
        }
        KeyOutcome::Continue
    }

    pub fn submit_active(&mut self) -> Option<PendingRequest> {
        let panel = self.active_panel_mut()?;
        match panel.begin_submit() {
            Ok(request) => {
                self.status_note = Some(format!("{} sent", request.request_id));
                self.follow_tail();
                Some(request)
            }
            Err(SubmitRejected::Empty) => None,
            Err(rejected @ SubmitRejected::Busy { .. }) => {
                debug!(event = "submit_rejected", reason = %rejected);
                self.status_note = Some(rejected.to_string());
                None
            }
        }
    }

    pub fn apply_settlement(&mut self, settlement: Settlement) {
        let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.kind() == settlement.panel)
        else {
            return;
        };
        let note = match &settlement.outcome {
            Ok(_) => format!("{} settled", settlement.request_id),
            Err(failure) => format!("{} failed: {}", settlement.request_id, failure),
        };
        let Some(panel) = self.slots[index].controller_mut() else {
            return;
        };
        let reconciliation = panel.settle(&settlement.request_id, settlement.outcome);
        if reconciliation.is_stale() {
            info!(
                event = "settlement_dropped",
                panel = %settlement.panel,
                request_id = %settlement.request_id
            );
            return;
        }
        self.status_note = Some(note);
    }

    pub fn clear_active(&mut self) {
        if let Some(panel) = self.active_panel_mut() {
            panel.clear();
            let kind = panel.kind();
            self.status_note = Some(format!("{} cleared", kind.title()));
        }
        self.follow_tail();
    }

    fn scroll_active(&mut self, delta: i32) {
        if let Some(offset) = self.scroll_back.get_mut(self.active) {
            *offset = if delta >= 0 {
                offset.saturating_add(delta as u16)
            } else {
                offset.saturating_sub(delta.unsigned_abs() as u16)
            };
        }
    }

    fn follow_tail(&mut self) {
        if let Some(offset) = self.scroll_back.get_mut(self.active) {
            *offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;
    use kamp_core::wire::{ChatResponse, ExecResponse};
    use kamp_core::{InputBuffer, Role};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn all_panels() -> App {
        App::new(vec![
            (PanelConfig::chat("mock"), PanelBindings::complete()),
            (PanelConfig::assistant("mock"), PanelBindings::complete()),
            (PanelConfig::terminal(), PanelBindings::complete()),
        ])
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            assert_eq!(app.handle_key(key(KeyCode::Char(c))), KeyOutcome::Continue);
        }
    }

    fn dispatched(outcome: KeyOutcome) -> PendingRequest {
        match outcome {
            KeyOutcome::Dispatch(request) => request,
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn enter_dispatches_typed_message() {
        let mut app = all_panels();
        type_text(&mut app, "hello");

        let request = dispatched(app.handle_key(key(KeyCode::Enter)));

        assert_eq!(request.panel, PanelKind::Chat);
        let panel = app.active_panel().expect("chat panel");
        assert_eq!(panel.transcript().len(), 2);
        assert!(panel.is_awaiting());
        assert_eq!(panel.input().text(), "");
    }

    #[test]
    fn enter_on_blank_input_does_nothing() {
        let mut app = all_panels();
        type_text(&mut app, "  ");
        assert_eq!(app.handle_key(key(KeyCode::Enter)), KeyOutcome::Continue);
        assert!(app.active_panel().expect("chat").transcript().is_empty());
    }

    #[test]
    fn typing_is_ignored_while_awaiting_reply() {
        let mut app = all_panels();
        type_text(&mut app, "hi");
        dispatched(app.handle_key(key(KeyCode::Enter)));

        type_text(&mut app, "more");
        assert_eq!(app.handle_key(key(KeyCode::Enter)), KeyOutcome::Continue);

        let panel = app.active_panel().expect("chat");
        assert_eq!(panel.input().text(), "");
        assert_eq!(panel.transcript().pending_count(), 1);
    }

    #[test]
    fn panels_are_independent() {
        let mut app = all_panels();
        type_text(&mut app, "hello");
        let chat = dispatched(app.handle_key(key(KeyCode::Enter)));

        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "ls");
        let exec = dispatched(app.handle_key(key(KeyCode::Enter)));
        assert_eq!(exec.panel, PanelKind::Terminal);

        app.apply_settlement(Settlement {
            panel: PanelKind::Terminal,
            request_id: exec.request_id.clone(),
            outcome: Ok(Reply::Exec(ExecResponse {
                stdout: Some("a.txt\n".to_string()),
                returncode: Some(0),
                ..ExecResponse::default()
            })),
        });
        app.apply_settlement(Settlement {
            panel: PanelKind::Chat,
            request_id: chat.request_id.clone(),
            outcome: Ok(Reply::Chat(ChatResponse::reply("hi"))),
        });

        let chat_panel = app.slots[0].controller().expect("chat");
        let texts: Vec<_> = chat_panel
            .transcript()
            .records()
            .iter()
            .map(|r| (r.role(), r.text()))
            .collect();
        assert_eq!(texts, vec![(Role::User, "hello"), (Role::Bot, "hi")]);

        let terminal = app.slots[2].controller().expect("terminal");
        let texts: Vec<_> = terminal
            .transcript()
            .records()
            .iter()
            .map(|r| r.text())
            .collect();
        assert_eq!(texts, vec!["ls", "$ ls", "a.txt", "[exit 0]"]);
    }

    #[test]
    fn settlement_after_clear_is_dropped() {
        let mut app = all_panels();
        type_text(&mut app, "hello");
        let request = dispatched(app.handle_key(key(KeyCode::Enter)));

        app.handle_key(ctrl('l'));
        app.apply_settlement(Settlement {
            panel: PanelKind::Chat,
            request_id: request.request_id,
            outcome: Err(Failure::transport("late")),
        });

        let panel = app.active_panel().expect("chat");
        assert!(panel.transcript().is_empty());
        assert!(panel.input_enabled());
    }

    #[test]
    fn unbound_panel_is_skipped_for_initial_focus() {
        let app = App::new(vec![
            (
                PanelConfig::chat("mock"),
                PanelBindings {
                    input: None,
                    ..PanelBindings::complete()
                },
            ),
            (
                PanelConfig::terminal(),
                PanelBindings {
                    input: Some(InputBuffer::new()),
                    ..PanelBindings::complete()
                },
            ),
        ]);
        assert_eq!(app.active, 1);
        assert!(matches!(
            app.slots[0],
            PanelSlot::Unavailable {
                kind: PanelKind::Chat,
                reason: BindError::MissingInput(PanelKind::Chat)
            }
        ));
    }

    #[test]
    fn help_overlay_swallows_keys() {
        let mut app = all_panels();
        app.handle_key(key(KeyCode::F(1)));
        assert!(app.help_open);
        type_text(&mut app, "x");
        assert_eq!(app.active_panel().expect("chat").input().text(), "");
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.help_open);
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = all_panels();
        let mut event = ctrl('c');
        event.kind = KeyEventKind::Press;
        assert_eq!(app.handle_key(event), KeyOutcome::Quit);
    }

    #[test]
    fn scroll_back_saturates_and_resets_on_submit() {
        let mut app = all_panels();
        app.handle_key(key(KeyCode::PageDown));
        assert_eq!(app.active_scroll_back(), 0);
        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.active_scroll_back(), 5);
        type_text(&mut app, "hi");
        dispatched(app.handle_key(key(KeyCode::Enter)));
        assert_eq!(app.active_scroll_back(), 0);
    }
}

use crate::transport::TransportEvent;
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use sysdash_core::page::DEFAULT_LOCATION;
use sysdash_core::{Handshake, InboundMsg, Outcome, Request, StateStore};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing `<command> [args..]` for `module`.
    Command { module: String, buffer: String },
    Password { buffer: String },
}

pub struct App {
    pub store: StateStore,
    pub connected: bool,
    pub cursor: usize,
    pub input: InputMode,
    pub status_note: Option<String>,
    requests: mpsc::Sender<Request>,
    password: Option<String>,
    handshake: Handshake,
    quit: bool,
}

impl App {
    pub fn new(store: StateStore, requests: mpsc::Sender<Request>, password: Option<String>) -> Self {
        Self {
            store,
            connected: false,
            cursor: 0,
            input: InputMode::Normal,
            status_note: None,
            requests,
            password,
            handshake: Handshake::default(),
            quit: false,
        }
    }

    pub fn with_handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn apply_transport_event(&mut self, event: TransportEvent, now: DateTime<Utc>) {
        match event {
            // The server replays its state after connecting, so the mirror
            // starts over. The subscription waits for the server to speak.
            TransportEvent::Opened => {
                self.connected = true;
                self.status_note = Some("connected".to_string());
                self.store.reset_for_resubscribe();
                self.cursor = 0;
                self.handshake.opened(now);
            }
            TransportEvent::Closed => {
                self.connected = false;
                self.handshake.closed();
                self.status_note = Some("disconnected; reconnecting".to_string());
            }
            TransportEvent::Inbound(msg) => {
                if self.handshake.before_inbound(&msg) {
                    self.subscribe();
                }
                let page_changed = matches!(msg, InboundMsg::ChangePage(_));
                match self.store.apply(msg, now) {
                    Outcome::Reply(request) => self.queue(request),
                    Outcome::PasswordRequested => self.answer_password(),
                    Outcome::Changed | Outcome::Unchanged => {}
                }
                if page_changed {
                    self.cursor = 0;
                }
                self.clamp_cursor();
            }
        }
    }

    pub fn on_tick(&mut self, now: DateTime<Utc>) {
        self.store.expire_responses(now);
        if self.handshake.poll(now) {
            self.subscribe();
        }
    }

    /// Earliest moment `on_tick` has work to do.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        match (self.store.next_response_deadline(), self.handshake.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn subscribe(&mut self) {
        let request = self.store.resubscribe_request();
        self.queue(request);
    }

    fn answer_password(&mut self) {
        match self.password.clone() {
            Some(secret) => self.queue(Request::Password { secret }),
            None => {
                self.input = InputMode::Password {
                    buffer: String::new(),
                };
                self.status_note = Some("password required".to_string());
            }
        }
    }

    pub fn selected_module(&self) -> Option<String> {
        self.store
            .modules()
            .nth(self.cursor)
            .map(|module| module.name.clone())
    }

    fn clamp_cursor(&mut self) {
        let count = self.store.module_count();
        if count == 0 {
            self.cursor = 0;
        } else if self.cursor >= count {
            self.cursor = count - 1;
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let count = self.store.module_count();
        if count == 0 {
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, count as isize - 1);
        self.cursor = next as usize;
        let selected = self.selected_module();
        self.store.select(selected);
    }

    /// Queues an operator action. Actions are refused while disconnected and
    /// until the page subscription is out.
    fn dispatch(&mut self, request: Request) {
        if !self.connected {
            self.status_note = Some(format!("offline: {} not sent", request.topic()));
            return;
        }
        if self.handshake.is_pending() {
            self.status_note = Some(format!("connecting: {} not sent", request.topic()));
            return;
        }
        self.status_note = Some(format!("sent {}", request.topic()));
        self.queue(request);
    }

    fn queue(&mut self, request: Request) {
        match self.requests.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!("request_queue_full: {}", request.topic());
                self.status_note = Some(format!("busy: {} dropped", request.topic()));
            }
            Err(TrySendError::Closed(request)) => {
                warn!("request_queue_closed: {}", request.topic());
            }
        }
    }

    /// Returns `true` when the app should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match std::mem::take(&mut self.input) {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Command { module, buffer } => self.handle_command_key(key, module, buffer),
            InputMode::Password { buffer } => self.handle_password_key(key, buffer),
        }
        self.quit
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::Char('s') => self.module_action(|name| Request::Start { name }),
            KeyCode::Char('x') => self.module_action(|name| Request::Stop { name }),
            KeyCode::Char('r') => self.module_action(|name| Request::Reset { name }),
            KeyCode::Char('g') => self.dispatch(Request::Gc),
            KeyCode::Char('C') => self.dispatch(Request::Close),
            KeyCode::Char('c') => {
                if let Some(module) = self.selected_module() {
                    self.input = InputMode::Command {
                        module,
                        buffer: String::new(),
                    };
                }
            }
            KeyCode::Char('n') | KeyCode::Enter => {
                if let Some(module) = self.selected_module() {
                    let request = self.store.navigate(&module);
                    self.dispatch(request);
                }
            }
            KeyCode::Char('d') => {
                let request = self.store.navigate(DEFAULT_LOCATION);
                self.dispatch(request);
            }
            KeyCode::Char('D') => self.delete_oldest_response(),
            _ => {}
        }
    }

    fn module_action<F>(&mut self, build: F)
    where
        F: FnOnce(String) -> Request,
    {
        if let Some(name) = self.selected_module() {
            self.dispatch(build(name));
        }
    }

    /// Persistent logs are owned by the server, so deletion is a request;
    /// ephemeral entries are dropped locally.
    fn delete_oldest_response(&mut self) {
        let Some(id) = self.store.responses().entries().next().map(|e| e.id.clone()) else {
            return;
        };
        if self.store.responses().mode().is_persistent() {
            self.dispatch(Request::DeleteCachedResponse { id });
        } else {
            self.store.delete_response(&id);
        }
    }

    fn handle_command_key(&mut self, key: KeyEvent, module: String, mut buffer: String) {
        match key.code {
            KeyCode::Esc => {}
            KeyCode::Enter => {
                let line = buffer.trim();
                let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
                if !command.is_empty() {
                    self.dispatch(Request::command(&module, command, rest));
                }
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.input = InputMode::Command { module, buffer };
            }
            KeyCode::Char(ch) => {
                buffer.push(ch);
                self.input = InputMode::Command { module, buffer };
            }
            _ => self.input = InputMode::Command { module, buffer },
        }
    }

    fn handle_password_key(&mut self, key: KeyEvent, mut buffer: String) {
        match key.code {
            KeyCode::Esc => self.status_note = Some("password prompt dismissed".to_string()),
            KeyCode::Enter => {
                self.queue(Request::Password { secret: buffer });
                self.status_note = Some("password sent".to_string());
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.input = InputMode::Password { buffer };
            }
            KeyCode::Char(ch) => {
                buffer.push(ch);
                self.input = InputMode::Password { buffer };
            }
            _ => self.input = InputMode::Password { buffer },
        }
    }
}

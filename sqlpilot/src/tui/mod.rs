//! Terminal UI for the sqlpilot wizard.
//!
//! - Centered window titled with the current step
//! - Steps: select source → connect → load artifacts → chat
//! - Network calls run on worker threads and report back over a channel
//! - Modal quit confirmation
//!
//! Note: Logging is file-only in TUI mode (stdout logging is disabled) to avoid corrupting the terminal UI.

mod draw;
mod input;

use crate::api::backend::Backend;
use crate::api::chat::{stream_chat, SEND_FAILED};
use crate::api::connection::{self, CONNECT_UNREACHABLE};
use crate::api::query::{self, EXECUTE_FAILED};
use crate::api::HttpBackend;
use crate::config::AppConfig;
use crate::models::message::Role;
use crate::models::requests::ConnectionParams;
use crate::models::responses::StreamEvent;
use crate::models::state::{
    AppState, Artifact, ChatTicket, ConnectedTarget, DataSource, Operation, WizardStep,
};
use crate::render::{
    render_markdown, BlockKey, CodeBlock, CopyTracker, Highlighter, RenderedMessage,
    SystemClipboard,
};
use crate::utils::logging::mask_url_secrets;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use input::TextInput;
use log::{error, info};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) const FIELD_LABELS: [&str; 5] = ["Database Name", "User", "Password", "Host", "Port"];
const PASSWORD_FIELD: usize = 2;
const PORT_FIELD: usize = 4;
/// Focus index of the `[ Test Connection ]` button.
pub(crate) const SUBMIT_FOCUS: usize = 5;
const SCROLL_STEP: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modal {
    ConfirmQuit { yes_focused: bool },
}

#[derive(Debug, Clone)]
pub(crate) struct ConnectForm {
    pub(crate) fields: [TextInput; 5],
    pub(crate) focus: usize,
}

impl ConnectForm {
    fn new() -> Self {
        Self {
            fields: [
                TextInput::new("", false),
                TextInput::new("", false),
                TextInput::new("", true),
                TextInput::new("", false),
                TextInput::new("", false),
            ],
            focus: 0,
        }
    }

    fn params(&self) -> ConnectionParams {
        ConnectionParams {
            dbname: self.fields[0].value().to_string(),
            user: self.fields[1].value().to_string(),
            password: self.fields[2].value().to_string(),
            host: self.fields[3].value().to_string(),
            port: self.fields[4].value().to_string(),
        }
    }
}

/// Rendered form of one assistant message, valid while its content is unchanged.
#[derive(Debug, Clone)]
pub(crate) struct CachedRender {
    content: String,
    pub(crate) rendered: RenderedMessage,
}

/// Work a key press asks for, carried out by the loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Connect {
        source: DataSource,
        params: ConnectionParams,
    },
    Prepare(Artifact),
    PrepareAll(Vec<Artifact>),
    Chat(ChatTicket),
    Execute(String),
    Copy { key: BlockKey, code: String },
}

#[derive(Debug, Clone)]
pub(crate) enum UiMsg {
    ConnectFinished(Result<ConnectedTarget, String>),
    ArtifactFinished {
        artifact: Artifact,
        result: Result<(), String>,
    },
    PipelineStopped {
        unreached: Vec<Artifact>,
    },
    ChatEvent(StreamEvent),
    ChatFinished(Result<(), String>),
    ExecuteFinished(Result<String, String>),
}

pub(crate) struct TuiState {
    pub(crate) app: AppState,
    pub(crate) quit: bool,
    pub(crate) modal: Option<Modal>,
    pub(crate) source_index: usize,
    pub(crate) form: ConnectForm,
    pub(crate) chat_input: TextInput,
    pub(crate) scroll_from_bottom: u16,
    pub(crate) selected_block: Option<BlockKey>,
    pub(crate) copies: CopyTracker,
    pub(crate) clipboard: SystemClipboard,
    pub(crate) highlighter: Highlighter,
    pub(crate) rendered: Vec<Option<CachedRender>>,
    pub(crate) backend_label: String,
}

impl TuiState {
    pub(crate) fn new(cfg: &AppConfig) -> Self {
        Self {
            app: AppState::new(),
            quit: false,
            modal: None,
            source_index: 0,
            form: ConnectForm::new(),
            chat_input: TextInput::new("", false),
            scroll_from_bottom: 0,
            selected_block: None,
            copies: CopyTracker::new(cfg.copy_confirm_duration()),
            clipboard: SystemClipboard::new(),
            highlighter: Highlighter::new(&cfg.syntax_theme),
            rendered: Vec::new(),
            backend_label: mask_url_secrets(&cfg.backend_url),
        }
    }

    /// Re-render assistant messages whose content changed since the last call.
    pub(crate) fn refresh_render_cache(&mut self) {
        let messages = self.app.transcript.messages();
        self.rendered.truncate(messages.len());

        for (i, msg) in messages.iter().enumerate() {
            let fresh = match msg.role {
                Role::User => None,
                Role::Assistant => {
                    let up_to_date = matches!(
                        self.rendered.get(i),
                        Some(Some(c)) if c.content == msg.content
                    );
                    if up_to_date {
                        continue;
                    }
                    Some(CachedRender {
                        content: msg.content.clone(),
                        rendered: render_markdown(&msg.content, &self.highlighter),
                    })
                }
            };
            if i < self.rendered.len() {
                self.rendered[i] = fresh;
            } else {
                self.rendered.push(fresh);
            }
        }
    }

    pub(crate) fn rendered_message(&self, index: usize) -> Option<&RenderedMessage> {
        self.rendered
            .get(index)
            .and_then(|c| c.as_ref())
            .map(|c| &c.rendered)
    }

    /// Every code block in the transcript, oldest first.
    pub(crate) fn block_keys(&self) -> Vec<BlockKey> {
        self.rendered
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
            .flat_map(|(i, c)| c.rendered.code_blocks().map(move |b| (i, b.id)))
            .collect()
    }

    pub(crate) fn code_block(&self, key: BlockKey) -> Option<&CodeBlock> {
        self.rendered_message(key.0)?.code_block(key.1)
    }

    /// Move the selection to the next code block; from nothing, select the newest.
    fn cycle_block(&mut self) {
        let keys = self.block_keys();
        if keys.is_empty() {
            self.selected_block = None;
            return;
        }
        let next = match self
            .selected_block
            .and_then(|cur| keys.iter().position(|k| *k == cur))
        {
            Some(pos) => keys[(pos + 1) % keys.len()],
            None => keys[keys.len() - 1],
        };
        self.selected_block = Some(next);
    }

    fn selected_code(&self) -> Option<(BlockKey, String)> {
        let key = self.selected_block?;
        self.code_block(key).map(|b| (key, b.code.clone()))
    }
}

pub fn run(cfg: &AppConfig) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting TUI wizard");

    let base = cfg.backend_base()?;
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(base)?);

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, cfg, backend);
    restore_terminal(&mut terminal)?;

    result
}

fn new_smoke_state(cfg: &AppConfig, target: &str) -> TuiState {
    // Smoke-only: seeded state for deterministic page rendering in CI/tooling.
    let mut state = TuiState::new(cfg);
    let connected = ConnectedTarget {
        source: DataSource::PostgreSql,
        database: "sales".to_string(),
        host: "localhost".to_string(),
        connected_at: chrono::Utc::now(),
    };

    match target {
        "connect" => {
            state.app.select_source(DataSource::PostgreSql);
            state.form.fields[0].set("sales");
            state.form.fields[1].set("analyst");
            state.form.fields[PASSWORD_FIELD].set("password");
            state.form.fields[3].set("localhost");
            state.form.fields[PORT_FIELD].set("5432");
            state.form.focus = SUBMIT_FOCUS;
        }
        "artifacts" => {
            state.app.step = WizardStep::LoadArtifacts { target: connected };
            state.app.loaded.mark(Artifact::Schema);
            state.app.begin_artifact(Artifact::Metadata);
        }
        "chat" => {
            state.app.step = WizardStep::Chat { target: connected };
            state.app.loaded.mark(Artifact::Schema);
            state.app.loaded.mark(Artifact::Metadata);
            state.app.loaded.mark(Artifact::VectorIndex);
            state.app.transcript.push_user("Top 5 customers by revenue?");
            state.app.transcript.push_assistant(
                "Generating SQL...\n```sql\nSELECT c.name, SUM(o.total) AS revenue\nFROM customers c\nJOIN orders o ON o.customer_id = c.id\nGROUP BY c.name\nORDER BY revenue DESC\nLIMIT 5;\n```",
            );
            state.chat_input.set("and last month?");
            state.refresh_render_cache();
            state.selected_block = Some((1, 0));
            state
                .copies
                .copy_with((1, 0), "", Instant::now(), |_| Ok(()));
        }
        _ => {}
    }

    state.refresh_render_cache();
    state
}

/// Non-interactive smoke mode: render a single frame and exit.
/// Targets: select|connect|artifacts|chat
pub fn smoke(cfg: &AppConfig, target: &str) -> Result<()> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let t = target.trim().to_ascii_lowercase();
    let state = new_smoke_state(cfg, t.as_str());

    // Use an in-memory backend so this can be executed in CI/tooling without
    // manipulating the real terminal (no raw mode / alternate screen).
    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw::draw(f.size(), f, &state))?;

    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    cfg: &AppConfig,
    backend: Arc<dyn Backend>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut state = TuiState::new(cfg);
    let (tx, rx) = mpsc::channel::<UiMsg>();

    while !state.quit {
        drain_messages(&mut state, &rx);
        state.copies.expire(Instant::now());
        terminal.draw(|f| draw::draw(f.size(), f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    if let Some(action) = handle_key(&mut state, key) {
                        perform(&mut state, action, &backend, &tx);
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    info!("[PHASE: tui] [STEP: exit] User quit");
    Ok(())
}

fn drain_messages(state: &mut TuiState, rx: &mpsc::Receiver<UiMsg>) {
    let mut any = false;
    while let Ok(msg) = rx.try_recv() {
        apply_msg(state, msg);
        any = true;
    }
    if any {
        state.refresh_render_cache();
    }
}

pub(crate) fn apply_msg(state: &mut TuiState, msg: UiMsg) {
    match msg {
        UiMsg::ConnectFinished(result) => {
            let connected = result.is_ok();
            state.app.finish_connect(result);
            if connected {
                state.form.fields[PASSWORD_FIELD].clear();
            }
        }
        UiMsg::ArtifactFinished { artifact, result } => {
            state.app.finish_artifact(artifact, result);
        }
        UiMsg::PipelineStopped { unreached } => {
            state.app.release_artifacts(&unreached);
        }
        UiMsg::ChatEvent(ev) => state.app.apply_stream_event(ev),
        UiMsg::ChatFinished(result) => {
            state.app.finish_chat(result);
            state.chat_input.clear();
        }
        UiMsg::ExecuteFinished(result) => {
            let ok = result.is_ok();
            state.app.finish_execute(result);
            if ok {
                state.scroll_from_bottom = 0;
            }
        }
    }
}

fn perform(
    state: &mut TuiState,
    action: Action,
    backend: &Arc<dyn Backend>,
    tx: &mpsc::Sender<UiMsg>,
) {
    match action {
        Action::Copy { key, code } => {
            let TuiState {
                copies, clipboard, ..
            } = state;
            copies.copy_with(key, &code, Instant::now(), |text| clipboard.copy(text));
        }
        Action::Connect { source, params } => {
            let backend = Arc::clone(backend);
            spawn_worker(
                "connect",
                tx.clone(),
                vec![UiMsg::ConnectFinished(Err(CONNECT_UNREACHABLE.to_string()))],
                move |rt, tx| {
                    let res = rt.block_on(connection::connect(backend.as_ref(), source, &params));
                    let _ = tx.send(UiMsg::ConnectFinished(res));
                },
            );
        }
        Action::Prepare(artifact) => {
            let backend = Arc::clone(backend);
            spawn_worker(
                "prepare",
                tx.clone(),
                vec![UiMsg::ArtifactFinished {
                    artifact,
                    result: Err(artifact.failure_message().to_string()),
                }],
                move |rt, tx| {
                    let result = rt.block_on(connection::prepare_artifact(backend.as_ref(), artifact));
                    let _ = tx.send(UiMsg::ArtifactFinished { artifact, result });
                },
            );
        }
        Action::PrepareAll(pending) => {
            let backend = Arc::clone(backend);
            let fallback = match pending.first() {
                Some(first) => vec![
                    UiMsg::ArtifactFinished {
                        artifact: *first,
                        result: Err(first.failure_message().to_string()),
                    },
                    UiMsg::PipelineStopped {
                        unreached: pending[1..].to_vec(),
                    },
                ],
                None => Vec::new(),
            };
            spawn_worker("prepare_all", tx.clone(), fallback, move |rt, tx| {
                let unreached = rt.block_on(connection::prepare_all(
                    backend.as_ref(),
                    &pending,
                    |artifact, result| {
                        let _ = tx.send(UiMsg::ArtifactFinished { artifact, result });
                    },
                ));
                if !unreached.is_empty() {
                    let _ = tx.send(UiMsg::PipelineStopped { unreached });
                }
            });
        }
        Action::Chat(ticket) => {
            state.scroll_from_bottom = 0;
            let backend = Arc::clone(backend);
            spawn_worker(
                "chat",
                tx.clone(),
                vec![UiMsg::ChatFinished(Err(SEND_FAILED.to_string()))],
                move |rt, tx| {
                    let res = rt.block_on(stream_chat(backend.as_ref(), &ticket, |ev| {
                        let _ = tx.send(UiMsg::ChatEvent(ev));
                    }));
                    let _ = tx.send(UiMsg::ChatFinished(res));
                },
            );
        }
        Action::Execute(sql) => {
            let backend = Arc::clone(backend);
            spawn_worker(
                "execute",
                tx.clone(),
                vec![UiMsg::ExecuteFinished(Err(EXECUTE_FAILED.to_string()))],
                move |rt, tx| {
                    let res = rt.block_on(query::execute(backend.as_ref(), &sql));
                    let _ = tx.send(UiMsg::ExecuteFinished(res));
                },
            );
        }
    }
}

/// Run `job` on its own thread with a current-thread runtime. If the runtime cannot be
/// built, `on_runtime_error` is sent instead so the operation does not stay in flight.
fn spawn_worker<F>(
    label: &'static str,
    tx: mpsc::Sender<UiMsg>,
    on_runtime_error: Vec<UiMsg>,
    job: F,
) where
    F: FnOnce(&tokio::runtime::Runtime, &mpsc::Sender<UiMsg>) + Send + 'static,
{
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match rt {
            Ok(rt) => job(&rt, &tx),
            Err(e) => {
                error!(
                    "[PHASE: tui] [STEP: {}] Failed to build async runtime: {}",
                    label, e
                );
                for msg in on_runtime_error {
                    let _ = tx.send(msg);
                }
            }
        }
    });
}

fn open_quit_modal(state: &mut TuiState) {
    state.modal = Some(Modal::ConfirmQuit { yes_focused: false });
}

pub(crate) fn handle_key(state: &mut TuiState, key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Modal handling
    if let Some(Modal::ConfirmQuit { yes_focused }) = state.modal {
        match key.code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
                state.modal = Some(Modal::ConfirmQuit {
                    yes_focused: !yes_focused,
                });
            }
            KeyCode::Enter => {
                state.modal = None;
                state.quit = yes_focused;
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                state.modal = None;
                state.quit = true;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => state.modal = None,
            _ => {}
        }
        return None;
    }

    if ctrl && key.code == KeyCode::Char('c') {
        open_quit_modal(state);
        return None;
    }

    match state.app.step {
        WizardStep::SelectSource => handle_select_key(state, key.code),
        WizardStep::Connect { .. } => handle_connect_key(state, key.code),
        WizardStep::LoadArtifacts { .. } => handle_artifacts_key(state, key.code),
        WizardStep::Chat { .. } => handle_chat_key(state, key.code, ctrl),
    }
}

fn handle_select_key(state: &mut TuiState, code: KeyCode) -> Option<Action> {
    let count = DataSource::ALL.len();
    match code {
        KeyCode::Up => state.source_index = (state.source_index + count - 1) % count,
        KeyCode::Down => state.source_index = (state.source_index + 1) % count,
        KeyCode::Enter => {
            let source = DataSource::ALL[state.source_index];
            if state.app.select_source(source) {
                state.form.focus = 0;
            }
        }
        KeyCode::Esc => open_quit_modal(state),
        _ => {}
    }
    None
}

fn handle_connect_key(state: &mut TuiState, code: KeyCode) -> Option<Action> {
    let stops = SUBMIT_FOCUS + 1;
    match code {
        KeyCode::Esc => {
            state.app.back();
        }
        KeyCode::Tab | KeyCode::Down => state.form.focus = (state.form.focus + 1) % stops,
        KeyCode::BackTab | KeyCode::Up => {
            state.form.focus = (state.form.focus + stops - 1) % stops
        }
        KeyCode::Enter => {
            if state.form.focus < PORT_FIELD {
                state.form.focus += 1;
                return None;
            }
            let source = state.app.begin_connect()?;
            return Some(Action::Connect {
                source,
                params: state.form.params(),
            });
        }
        other => {
            if let Some(field) = state.form.fields.get_mut(state.form.focus) {
                field.handle_key(other);
            }
        }
    }
    None
}

fn handle_artifacts_key(state: &mut TuiState, code: KeyCode) -> Option<Action> {
    let artifact = match code {
        KeyCode::Char('s') | KeyCode::Char('S') => Artifact::Schema,
        KeyCode::Char('m') | KeyCode::Char('M') => Artifact::Metadata,
        KeyCode::Char('v') | KeyCode::Char('V') => Artifact::VectorIndex,
        KeyCode::Char('a') | KeyCode::Char('A') => {
            return state.app.begin_pipeline().map(Action::PrepareAll);
        }
        KeyCode::Enter => {
            state.app.continue_to_chat();
            return None;
        }
        _ => return None,
    };
    if state.app.begin_artifact(artifact) {
        Some(Action::Prepare(artifact))
    } else {
        None
    }
}

fn handle_chat_key(state: &mut TuiState, code: KeyCode, ctrl: bool) -> Option<Action> {
    if ctrl {
        state.refresh_render_cache();
        match code {
            KeyCode::Char('o') => state.cycle_block(),
            KeyCode::Char('y') => {
                let (key, code) = state.selected_code()?;
                return Some(Action::Copy { key, code });
            }
            KeyCode::Char('r') => {
                let (_, sql) = state.selected_code()?;
                if state.app.begin_execute(&sql) {
                    return Some(Action::Execute(sql));
                }
            }
            _ => {}
        }
        return None;
    }

    match code {
        KeyCode::Esc => open_quit_modal(state),
        KeyCode::PageUp => {
            state.scroll_from_bottom = state.scroll_from_bottom.saturating_add(SCROLL_STEP)
        }
        KeyCode::PageDown => {
            state.scroll_from_bottom = state.scroll_from_bottom.saturating_sub(SCROLL_STEP)
        }
        KeyCode::Enter => {
            let ticket = state.app.begin_chat(state.chat_input.value())?;
            state.refresh_render_cache();
            return Some(Action::Chat(ticket));
        }
        other => {
            // Input is locked while a response is streaming.
            if !state.app.operations.is_in_flight(Operation::Chat) {
                state.chat_input.handle_key(other);
            }
        }
    }
    None
}

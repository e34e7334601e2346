// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use kiosko_app::columns::{
    UpdateRequest, columns_for, format_money, reset_returns_request, toggle_paid_request,
};
use kiosko_app::edit::format_iso_date;
use kiosko_app::fetch::{DEFAULT_SEARCH_DEBOUNCE, FetchController, FetchRequest};
use kiosko_app::forms::{FormPayload, LoginInput};
use kiosko_app::paging::{DEFAULT_PAGE_SIZE, PAGE_SIZE_CHOICES, PageButton, PageWindow};
use kiosko_app::table::{DataTable, RenderedRow};
use kiosko_app::{
    AppCommand, AppEvent, AppMode, AppState, FinanceSummary, FormKind, Page, ReportKind, Route,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

/// Date window applied to listings that filter by date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePreset {
    #[default]
    Today,
    Week,
    Month,
}

impl RangePreset {
    pub const fn next(self) -> Self {
        match self {
            Self::Today => Self::Week,
            Self::Week => Self::Month,
            Self::Month => Self::Today,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Today => "hoy",
            Self::Week => "últimos 7 días",
            Self::Month => "este mes",
        }
    }

    pub fn bounds(self, today: Date) -> (Date, Date) {
        match self {
            Self::Today => (today, today),
            Self::Week => (today.saturating_sub(time::Duration::days(6)), today),
            Self::Month => (today.replace_day(1).unwrap_or(today), today),
        }
    }
}

fn uses_range(route: Route) -> bool {
    matches!(
        route,
        Route::Assignments | Route::Devolutions | Route::Cash | Route::Yape | Route::Reports
    )
}

/// Everything a runtime needs to load one page of a route's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub route: Route,
    pub mount: u64,
    pub request: FetchRequest,
    pub report: ReportKind,
    pub start: Date,
    pub end: Date,
}

/// Plain-text artifacts the user can write to the export directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    AssignmentTicket { row: usize },
    Debtors,
    CashReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiOptions {
    pub page_size: u32,
    pub search_debounce: Duration,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

pub trait AppRuntime {
    /// False once the stored tokens are gone, e.g. after a failed refresh.
    fn session_active(&mut self) -> bool;
    fn login(&mut self, input: &LoginInput) -> Result<()>;
    fn logout(&mut self) -> Result<()>;
    fn load_home(&mut self, today: Date) -> Result<FinanceSummary>;
    fn load_page(&mut self, query: &PageQuery) -> Result<Page<Value>>;
    fn apply_update(&mut self, request: &UpdateRequest) -> Result<()>;
    fn delete_row(&mut self, route: Route, row: &Value) -> Result<()>;
    fn submit_form(&mut self, payload: &FormPayload) -> Result<()>;
    fn export(&mut self, kind: ExportKind, rows: &[Value], today: Date) -> Result<PathBuf>;
    fn spawn_page_load(&mut self, query: PageQuery, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self
            .load_page(&query)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::PageLoaded {
            mount: query.mount,
            seq: query.request.seq,
            result,
        })
        .map_err(|_| anyhow!("page event channel closed"))?;
        Ok(())
    }
    fn today(&self) -> Date {
        OffsetDateTime::now_utc().date()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    PageLoaded {
        mount: u64,
        seq: u64,
        result: Result<Page<Value>, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct LoginUiState {
    username: String,
    password: String,
    field: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    kind: FormKind,
    values: Vec<String>,
    field: usize,
}

impl FormUiState {
    fn new(kind: FormKind, today: Date) -> Self {
        let mut values = vec![String::new(); kind.fields().len()];
        match kind {
            FormKind::Cash => {
                values[0] = format_iso_date(today);
                values[1] = "COMERCIO".to_owned();
                for value in values.iter_mut().skip(2) {
                    *value = "0".to_owned();
                }
            }
            FormKind::Yape => values[2] = format_iso_date(today),
            FormKind::Finance => values[0] = "INGRESO".to_owned(),
            _ => {}
        }
        Self {
            kind,
            values,
            field: 0,
        }
    }
}

/// The table screen currently on display. One is mounted at a time; leaving
/// a route tears it down.
#[derive(Debug, Clone)]
struct PageView {
    route: Route,
    mount: u64,
    fetch: FetchController<Value>,
    table: DataTable,
    selected_row: usize,
    selected_col: usize,
    range: RangePreset,
    search_input: String,
}

impl PageView {
    fn window(&self) -> PageWindow {
        self.fetch.window()
    }

    fn clamp_cursor(&mut self) {
        let rows = self.table.rows().len();
        let cols = self.table.columns().len();
        self.selected_row = self.selected_row.min(rows.saturating_sub(1));
        self.selected_col = self.selected_col.min(cols.saturating_sub(1));
    }
}

#[derive(Debug, Clone)]
struct ViewData {
    options: UiOptions,
    today: Date,
    page: Option<PageView>,
    next_mount: u64,
    login: LoginUiState,
    form: Option<FormUiState>,
    home: Option<FinanceSummary>,
    report: ReportKind,
    help_visible: bool,
    status_token: u64,
}

impl ViewData {
    fn new(options: UiOptions, today: Date) -> Self {
        Self {
            options,
            today,
            page: None,
            next_mount: 0,
            login: LoginUiState::default(),
            form: None,
            home: None,
            report: ReportKind::SalesBySeller,
            help_visible: false,
            status_token: 0,
        }
    }
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: UiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options, runtime.today());
    let (internal_tx, internal_rx) = mpsc::channel();

    if runtime.session_active() {
        dispatch_and_sync(state, runtime, &mut view_data, &internal_tx, AppCommand::SignedIn);
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);
        tick(state, runtime, &mut view_data, &internal_tx, Instant::now());

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    if let Some(page) = view_data.page.as_mut() {
        page.fetch.teardown();
    }
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::PageLoaded { mount, seq, result } => {
                apply_page_loaded(state, runtime, view_data, tx, mount, seq, result);
            }
        }
    }
}

/// Fires a debounced search whose deadline has passed.
fn tick<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    now: Instant,
) {
    let request = view_data
        .page
        .as_mut()
        .and_then(|page| page.fetch.poll(now));
    if let Some(request) = request {
        issue_fetch(state, runtime, view_data, tx, request);
    }
}

fn apply_page_loaded<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    mount: u64,
    seq: u64,
    result: Result<Page<Value>, String>,
) {
    let report = view_data.report;
    let Some(page) = view_data.page.as_mut().filter(|page| page.mount == mount) else {
        debug!(mount, seq, "discarding page for a view that is gone");
        return;
    };
    let failure = result.as_ref().err().cloned();
    if !page.fetch.on_response(seq, result) {
        debug!(route = page.route.label(), seq, "discarding stale page");
        return;
    }
    if let Some(error) = failure {
        report_failure(state, runtime, view_data, tx, "load failed", &error);
        return;
    }
    if let Some(request) = page.fetch.clamp_page() {
        debug!(route = page.route.label(), page = request.page, "page out of range after load");
        issue_fetch(state, runtime, view_data, tx, request);
        return;
    }

    let rows = page.fetch.rows().to_vec();
    let column_error = match columns_for(page.route, &rows, report) {
        Ok(columns) => {
            let changed = columns
                .iter()
                .map(|column| column.id.as_str())
                .ne(page.table.columns().iter().map(|column| column.id.as_str()));
            if changed {
                page.table.set_columns(columns);
            }
            None
        }
        Err(error) => Some(error.to_string()),
    };
    page.table.set_rows(rows);
    page.clamp_cursor();
    debug!(
        route = page.route.label(),
        seq,
        rows = page.table.rows().len(),
        "page applied"
    );
    if let Some(error) = column_error {
        emit_status(state, view_data, tx, format!("columns failed: {error}"));
    }
}

/// Surfaces a failure on the status line, or sends the user back to the
/// login screen when the session did not survive it.
fn report_failure<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    what: &str,
    error: &str,
) {
    if state.signed_in && !runtime.session_active() {
        info!("session ended; returning to login");
        dispatch_and_sync(state, runtime, view_data, tx, AppCommand::SessionExpired);
        return;
    }
    emit_status(state, view_data, tx, format!("{what}: {error}"));
}

fn issue_fetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    request: FetchRequest,
) {
    let Some(page) = view_data.page.as_ref() else {
        return;
    };
    let (start, end) = page.range.bounds(view_data.today);
    let query = PageQuery {
        route: page.route,
        mount: page.mount,
        request,
        report: view_data.report,
        start,
        end,
    };
    debug!(
        route = query.route.label(),
        seq = query.request.seq,
        page = query.request.page,
        "fetch issued"
    );
    if let Err(error) = runtime.spawn_page_load(query, tx.clone()) {
        emit_status(state, view_data, tx, format!("load failed: {error}"));
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

/// Applies a command and mounts whatever screen it leads to.
fn dispatch_and_sync<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    for event in &events {
        match event {
            AppEvent::RouteChanged(route) => mount_route(state, runtime, view_data, tx, *route),
            AppEvent::SessionChanged(false) => {
                view_data.home = None;
                view_data.form = None;
                view_data.login = LoginUiState::default();
            }
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(tx, view_data.status_token);
            }
            AppEvent::ModeChanged(mode) if !matches!(mode, AppMode::Form(_)) => {
                view_data.form = None;
            }
            _ => {}
        }
    }
}

fn mount_route<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    route: Route,
) {
    if let Some(mut previous) = view_data.page.take() {
        previous.fetch.teardown();
    }
    match route {
        Route::Home => match runtime.load_home(view_data.today) {
            Ok(summary) => view_data.home = Some(summary),
            Err(error) => {
                view_data.home = None;
                let message = format!("{error:#}");
                report_failure(state, runtime, view_data, tx, "summary failed", &message);
            }
        },
        route if route.has_table() => {
            let columns = match columns_for(route, &[], view_data.report) {
                Ok(columns) => columns,
                Err(error) => {
                    emit_status(state, view_data, tx, format!("columns failed: {error}"));
                    return;
                }
            };
            view_data.next_mount += 1;
            let mut page = PageView {
                route,
                mount: view_data.next_mount,
                fetch: FetchController::new(
                    view_data.options.page_size,
                    view_data.options.search_debounce,
                ),
                table: DataTable::new(columns),
                selected_row: 0,
                selected_col: 0,
                range: if route == Route::Reports {
                    RangePreset::Month
                } else {
                    RangePreset::Today
                },
                search_input: String::new(),
            };
            let request = page.fetch.start();
            view_data.page = Some(page);
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        _ => {}
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if state.route == Route::Login {
        handle_login_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match state.mode {
        AppMode::Form(kind) => handle_form_key(state, runtime, view_data, internal_tx, kind, key),
        AppMode::Search => handle_search_key(state, runtime, view_data, internal_tx, key),
        AppMode::Edit => handle_edit_key(state, runtime, view_data, internal_tx, key),
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn handle_login_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let login = &mut view_data.login;
    match key.code {
        KeyCode::Tab | KeyCode::Down | KeyCode::BackTab | KeyCode::Up => {
            login.field = 1 - login.field.min(1);
        }
        KeyCode::Backspace => {
            let target = if login.field == 0 {
                &mut login.username
            } else {
                &mut login.password
            };
            target.pop();
        }
        KeyCode::Char(ch) => {
            if login.field == 0 {
                login.username.push(ch);
            } else {
                login.password.push(ch);
            }
        }
        KeyCode::Enter if login.field == 0 => login.field = 1,
        KeyCode::Enter => {
            let input = LoginInput {
                username: login.username.clone(),
                password: login.password.clone(),
            };
            match runtime.login(&input) {
                Ok(()) => {
                    view_data.login = LoginUiState::default();
                    dispatch_and_sync(state, runtime, view_data, tx, AppCommand::SignedIn);
                }
                Err(error) => {
                    view_data.login.password.clear();
                    emit_status(state, view_data, tx, format!("login failed: {error:#}"));
                }
            }
        }
        _ => {}
    }
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Tab => dispatch_and_sync(state, runtime, view_data, tx, AppCommand::NextRoute),
        KeyCode::BackTab => dispatch_and_sync(state, runtime, view_data, tx, AppCommand::PrevRoute),
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Char('L') => {
            if let Err(error) = runtime.logout() {
                emit_status(state, view_data, tx, format!("logout failed: {error:#}"));
                return;
            }
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::Logout);
        }
        KeyCode::Char('i') => {
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::EnterEditMode);
        }
        KeyCode::Char('/') => {
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::EnterSearch);
        }
        KeyCode::Char('r') => {
            if state.route == Route::Home {
                mount_route(state, runtime, view_data, tx, Route::Home);
                return;
            }
            let request = view_data.page.as_mut().and_then(|page| page.fetch.refresh());
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        KeyCode::Char(']') | KeyCode::PageDown => {
            page_move(state, runtime, view_data, tx, |fetch| fetch.next_page());
        }
        KeyCode::Char('[') | KeyCode::PageUp => {
            page_move(state, runtime, view_data, tx, |fetch| fetch.prev_page());
        }
        KeyCode::Char('s') => {
            page_move(state, runtime, view_data, tx, |fetch| {
                let current = fetch.window().page_size;
                let next = PAGE_SIZE_CHOICES
                    .iter()
                    .copied()
                    .find(|size| *size > current)
                    .unwrap_or(PAGE_SIZE_CHOICES[0]);
                fetch.set_page_size(next)
            });
        }
        KeyCode::Char('d') => {
            let Some(page) = view_data.page.as_mut().filter(|page| uses_range(page.route)) else {
                emit_status(state, view_data, tx, "no date filter here");
                return;
            };
            page.range = page.range.next();
            let label = page.range.label();
            let request = page.fetch.set_page(1).or_else(|| page.fetch.refresh());
            emit_status(state, view_data, tx, format!("range: {label}"));
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        KeyCode::Char('t') if state.route == Route::Reports => {
            let position = ReportKind::ALL
                .iter()
                .position(|kind| *kind == view_data.report)
                .unwrap_or(0);
            view_data.report = ReportKind::ALL[(position + 1) % ReportKind::ALL.len()];
            emit_status(state, view_data, tx, format!("report: {}", view_data.report.label()));
            mount_route(state, runtime, view_data, tx, Route::Reports);
        }
        KeyCode::Char('x') => export(state, runtime, view_data, tx, false),
        KeyCode::Char('X') => export(state, runtime, view_data, tx, true),
        _ => {
            move_cursor(view_data, key.code);
        }
    }
}

fn page_move<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    step: impl FnOnce(&mut FetchController<Value>) -> Option<FetchRequest>,
) {
    let request = view_data.page.as_mut().and_then(|page| step(&mut page.fetch));
    if let Some(request) = request {
        issue_fetch(state, runtime, view_data, tx, request);
    }
}

fn move_cursor(view_data: &mut ViewData, code: KeyCode) -> bool {
    let Some(page) = view_data.page.as_mut() else {
        return false;
    };
    match code {
        KeyCode::Char('j') | KeyCode::Down => page.selected_row += 1,
        KeyCode::Char('k') | KeyCode::Up => page.selected_row = page.selected_row.saturating_sub(1),
        KeyCode::Char('l') | KeyCode::Right => page.selected_col += 1,
        KeyCode::Char('h') | KeyCode::Left => {
            page.selected_col = page.selected_col.saturating_sub(1)
        }
        KeyCode::Char('^') | KeyCode::Home => page.selected_col = 0,
        KeyCode::Char('$') | KeyCode::End => page.selected_col = usize::MAX,
        _ => return false,
    }
    page.clamp_cursor();
    true
}

fn export<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    summary: bool,
) {
    let Some(page) = view_data.page.as_ref() else {
        emit_status(state, view_data, tx, "nothing to export here");
        return;
    };
    let kind = match (page.route, summary) {
        (Route::Assignments, false) => ExportKind::AssignmentTicket {
            row: page.selected_row,
        },
        (Route::Assignments, true) => ExportKind::Debtors,
        (Route::Cash, _) => ExportKind::CashReport,
        _ => {
            emit_status(state, view_data, tx, "nothing to export here");
            return;
        }
    };
    if page.table.rows().is_empty() && kind != ExportKind::CashReport {
        emit_status(state, view_data, tx, "no rows to export");
        return;
    }
    let rows = page.table.rows().to_vec();
    match runtime.export(kind, &rows, view_data.today) {
        Ok(path) => {
            info!(path = %path.display(), "exported");
            emit_status(state, view_data, tx, format!("exported {}", path.display()));
        }
        Err(error) => {
            report_failure(state, runtime, view_data, tx, "export failed", &format!("{error:#}"));
        }
    }
}

fn handle_search_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(page) = view_data.page.as_mut() else {
        dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav);
        return;
    };
    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav);
            return;
        }
        KeyCode::Backspace => {
            page.search_input.pop();
        }
        KeyCode::Char(ch) => page.search_input.push(ch),
        _ => return,
    }
    let input = page.search_input.clone();
    if let Some(request) = page.fetch.set_search(&input, Instant::now()) {
        issue_fetch(state, runtime, view_data, tx, request);
    }
}

fn handle_edit_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let editing = view_data
        .page
        .as_ref()
        .is_some_and(|page| page.table.active_edit().is_some());
    if editing {
        handle_cell_editor_key(state, runtime, view_data, tx, key);
        return;
    }

    match key.code {
        KeyCode::Esc => dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav),
        KeyCode::Enter | KeyCode::Char('e') => begin_cell_edit(state, view_data, tx),
        KeyCode::Char('a') => match state.route.form() {
            Some(kind) => {
                view_data.form = Some(FormUiState::new(kind, view_data.today));
                dispatch_and_sync(state, runtime, view_data, tx, AppCommand::OpenForm(kind));
            }
            None => emit_status(state, view_data, tx, "nothing to add here"),
        },
        KeyCode::Char('D') => delete_selected(state, runtime, view_data, tx),
        KeyCode::Char('p') => {
            detail_action(state, runtime, view_data, tx, DetailAction::TogglePaid)
        }
        KeyCode::Char('r') => {
            detail_action(state, runtime, view_data, tx, DetailAction::ResetReturns)
        }
        _ => {
            move_cursor(view_data, key.code);
        }
    }
}

fn begin_cell_edit(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let Some(page) = view_data.page.as_mut() else {
        return;
    };
    let (row, col) = (page.selected_row, page.selected_col);
    if let Err(error) = page.table.begin_edit(row, col) {
        emit_status(state, view_data, tx, error.to_string());
    }
}

fn handle_cell_editor_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(page) = view_data.page.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => {
            page.table.cancel_edit();
            emit_status(state, view_data, tx, "edit canceled");
        }
        KeyCode::Enter | KeyCode::Tab => commit_cell(state, runtime, view_data, tx),
        KeyCode::Backspace => {
            if let Some(session) = page.table.active_edit_mut() {
                session.backspace();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(session) = page.table.active_edit_mut() {
                session.insert_char(ch);
            }
        }
        _ => {}
    }
}

fn commit_cell<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(page) = view_data.page.as_mut() else {
        return;
    };
    let Some(update) = page.table.commit_edit() else {
        emit_status(state, view_data, tx, "no change");
        return;
    };
    let request = match page.table.request_for(&update) {
        Ok(request) => request,
        Err(error) => {
            emit_status(state, view_data, tx, error.to_string());
            return;
        }
    };
    match runtime.apply_update(&request) {
        Ok(()) => {
            let refetch = view_data.page.as_mut().and_then(|page| {
                page.table.apply_local_patch(&update);
                page.fetch.refresh()
            });
            emit_status(state, view_data, tx, "saved");
            if let Some(request) = refetch {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        Err(error) => {
            report_failure(state, runtime, view_data, tx, "update failed", &format!("{error:#}"));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailAction {
    TogglePaid,
    ResetReturns,
}

fn detail_action<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    action: DetailAction,
) {
    let Some(page) = view_data.page.as_ref().filter(|page| page.route == Route::Devolutions) else {
        emit_status(state, view_data, tx, "payment and return resets live on devoluciones");
        return;
    };
    let (Some(column), Some(row)) = (
        page.table.columns().get(page.selected_col),
        page.table.row(page.selected_row),
    ) else {
        emit_status(state, view_data, tx, "select a product cell first");
        return;
    };
    let request = match action {
        DetailAction::TogglePaid => toggle_paid_request(column, row),
        DetailAction::ResetReturns => reset_returns_request(column, row),
    };
    let request = match request {
        Ok(request) => request,
        Err(error) => {
            emit_status(state, view_data, tx, error.to_string());
            return;
        }
    };
    match runtime.apply_update(&request) {
        Ok(()) => {
            let message = match action {
                DetailAction::TogglePaid => "payment status updated",
                DetailAction::ResetReturns => "returns reset",
            };
            emit_status(state, view_data, tx, message);
            let request = view_data.page.as_mut().and_then(|page| page.fetch.refresh());
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        Err(error) => {
            report_failure(state, runtime, view_data, tx, "update failed", &format!("{error:#}"));
        }
    }
}

fn delete_selected<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(page) = view_data.page.as_ref() else {
        return;
    };
    let Some(row) = page.table.row(page.selected_row).cloned() else {
        emit_status(state, view_data, tx, "no row selected");
        return;
    };
    match runtime.delete_row(page.route, &row) {
        Ok(()) => {
            emit_status(state, view_data, tx, "deleted");
            let request = view_data.page.as_mut().and_then(|page| page.fetch.refresh());
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        Err(error) => {
            report_failure(state, runtime, view_data, tx, "delete failed", &format!("{error:#}"));
        }
    }
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    kind: FormKind,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut().filter(|form| form.kind == kind) else {
        dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav);
        return;
    };
    let last = form.values.len().saturating_sub(1);
    match key.code {
        KeyCode::Esc => {
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav);
            emit_status(state, view_data, tx, "form canceled");
        }
        KeyCode::Tab | KeyCode::Down => form.field = (form.field + 1).min(last),
        KeyCode::BackTab | KeyCode::Up => form.field = form.field.saturating_sub(1),
        KeyCode::Backspace => {
            if let Some(value) = form.values.get_mut(form.field) {
                value.pop();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(value) = form.values.get_mut(form.field) {
                value.push(ch);
            }
        }
        KeyCode::Enter => submit_form(state, runtime, view_data, tx, kind),
        _ => {}
    }
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    kind: FormKind,
) {
    let Some(form) = view_data.form.as_ref() else {
        return;
    };
    let payload = match FormPayload::from_fields(kind, &form.values) {
        Ok(payload) => payload,
        Err(error) => {
            emit_status(state, view_data, tx, error.to_string());
            return;
        }
    };
    match runtime.submit_form(&payload) {
        Ok(()) => {
            dispatch_and_sync(state, runtime, view_data, tx, AppCommand::ExitToNav);
            emit_status(state, view_data, tx, format!("{} saved", kind.title().to_lowercase()));
            let request = view_data.page.as_mut().and_then(|page| page.fetch.refresh());
            if let Some(request) = request {
                issue_fetch(state, runtime, view_data, tx, request);
            }
        }
        Err(error) => {
            report_failure(state, runtime, view_data, tx, "save failed", &format!("{error:#}"));
        }
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    if state.signed_in {
        let selected = Route::TABS
            .iter()
            .position(|route| *route == state.route)
            .unwrap_or(0);
        let titles = Route::TABS
            .iter()
            .map(|route| route.label())
            .collect::<Vec<_>>();
        let tabs = Tabs::new(titles)
            .block(Block::default().title("kiosko").borders(Borders::ALL))
            .style(Style::default().fg(Color::White))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .select(selected);
        frame.render_widget(tabs, layout[0]);
    } else {
        let title = Paragraph::new("Sistema de Distribución")
            .block(Block::default().title("kiosko").borders(Borders::ALL));
        frame.render_widget(title, layout[0]);
    }

    match state.route {
        Route::Login => {
            let area = centered_rect(50, 40, layout[1]);
            let login = Paragraph::new(render_login_text(&view_data.login))
                .block(Block::default().title("ingresar").borders(Borders::ALL));
            frame.render_widget(login, area);
        }
        Route::Home => {
            let home = Paragraph::new(render_home_text(view_data))
                .block(Block::default().title("inicio").borders(Borders::ALL));
            frame.render_widget(home, layout[1]);
        }
        _ => render_page(frame, layout[1], state, view_data),
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let overlay = Paragraph::new(render_form_text(form)).block(
            Block::default()
                .title(form.kind.title())
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(overlay, area);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_page(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let Some(page) = view_data.page.as_ref().filter(|page| page.route == state.route) else {
        let empty = Paragraph::new(String::new())
            .block(Block::default().borders(Borders::ALL).title(state.route.label()));
        frame.render_widget(empty, area);
        return;
    };

    let banner = page.fetch.error().map(|error| format!("Error: {error}"));
    let mut constraints = Vec::new();
    if banner.is_some() {
        constraints.push(Constraint::Length(1));
    }
    constraints.push(Constraint::Min(1));
    constraints.push(Constraint::Length(1));
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let (table_area, pager_area) = (parts[parts.len() - 2], parts[parts.len() - 1]);
    if let Some(banner) = banner {
        frame.render_widget(
            Paragraph::new(banner).style(Style::default().fg(Color::Red)),
            parts[0],
        );
    }

    let rendered = page.table.render();
    let header = Row::new(rendered.headers.iter().map(|label| {
        Cell::from(label.clone()).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));
    let widths = rendered
        .widths
        .iter()
        .map(|width| Constraint::Min(*width))
        .collect::<Vec<_>>();
    let empty_message = rendered.rows.iter().find_map(|row| match row {
        RenderedRow::Empty { message, .. } => Some(*message),
        RenderedRow::Data { .. } => None,
    });
    let rows = rendered.rows.iter().enumerate().filter_map(|(row_index, row)| match row {
        RenderedRow::Empty { .. } => None,
        RenderedRow::Data { cells, .. } => {
            let selected_row = row_index == page.selected_row;
            Some(Row::new(cells.iter().enumerate().map(|(col_index, cell)| {
                let mut style = Style::default();
                if cell.editable {
                    style = style.fg(Color::Green);
                }
                if selected_row {
                    style = style.bg(Color::DarkGray);
                }
                if selected_row && col_index == page.selected_col && state.mode == AppMode::Edit {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD);
                }
                if cell.editing {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(cell.text.clone()).style(style)
            })))
        }
    });
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(page, view_data.report))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, table_area);
    // The empty message spans the whole body instead of the first column.
    if let Some(message) = empty_message.filter(|_| table_area.height > 3) {
        let body = Rect {
            x: table_area.x + 1,
            y: table_area.y + 2,
            width: table_area.width.saturating_sub(2),
            height: 1,
        };
        frame.render_widget(
            Paragraph::new(message).style(Style::default().fg(Color::DarkGray)),
            body,
        );
    }
    frame.render_widget(Paragraph::new(render_pagination_text(page.window())), pager_area);
}

fn table_title(page: &PageView, report: ReportKind) -> String {
    let mut title = if page.route == Route::Reports {
        format!("{} · {}", page.route.label(), report.label())
    } else {
        page.route.label().to_owned()
    };
    title.push_str(&format!(" · {} registros", page.window().total_count));
    if uses_range(page.route) {
        title.push_str(&format!(" · {}", page.range.label()));
    }
    if !page.fetch.search().is_empty() {
        title.push_str(&format!(" · búsqueda \"{}\"", page.fetch.search()));
    }
    if page.fetch.is_loading() {
        title.push_str(" · cargando…");
    }
    title
}

fn render_pagination_text(window: PageWindow) -> String {
    let buttons = window
        .page_buttons()
        .into_iter()
        .map(|button| match button {
            PageButton::Page(n) if n == window.page => format!("[{n}]"),
            PageButton::Page(n) => n.to_string(),
            PageButton::Ellipsis => "…".to_owned(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    let prev = if window.has_prev() { "«" } else { " " };
    let next = if window.has_next() { "»" } else { " " };
    format!(
        "{prev} {buttons} {next}  {} · {} por página",
        window.label(),
        window.page_size
    )
}

fn render_login_text(login: &LoginUiState) -> String {
    let marker = |field: usize| if login.field == field { ">" } else { " " };
    [
        format!("{} Usuario:    {}", marker(0), login.username),
        format!(
            "{} Contraseña: {}",
            marker(1),
            "*".repeat(login.password.chars().count())
        ),
        String::new(),
        "enter: ingresar · tab: cambiar campo · ctrl+q: salir".to_owned(),
    ]
    .join("\n")
}

fn render_home_text(view_data: &ViewData) -> String {
    let Some(summary) = &view_data.home else {
        return "Resumen no disponible. r: reintentar".to_owned();
    };
    [
        format!("Resumen de {:02}/{}", summary.month, summary.year),
        String::new(),
        format!("Ingresos:     {}", format_money(summary.income_month)),
        format!("Egresos:      {}", format_money(summary.expense_month)),
        format!("Balance:      {}", format_money(summary.balance_month)),
        format!("Movimientos:  {}", summary.transactions_count),
    ]
    .join("\n")
}

fn render_form_text(form: &FormUiState) -> String {
    form.kind
        .fields()
        .iter()
        .zip(&form.values)
        .enumerate()
        .map(|(index, (field, value))| {
            let marker = if index == form.field { ">" } else { " " };
            if field.hint.is_empty() || !value.is_empty() {
                format!("{marker} {}: {value}", field.label)
            } else {
                format!("{marker} {}: ({})", field.label, field.hint)
            }
        })
        .chain(std::iter::once(
            "\nenter: guardar · tab: siguiente · esc: cancelar".to_owned(),
        ))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(status) = &state.status_line {
        return status.clone();
    }
    let hint = match state.mode {
        AppMode::Nav if state.route == Route::Login => "enter: sign in",
        AppMode::Nav => "tab: next screen · i: edit · /: search · [ ]: page · ?: help",
        AppMode::Edit => "enter: edit cell · a: add · D: delete · esc: back",
        AppMode::Search => "type to search · enter/esc: done",
        AppMode::Form(_) => "enter: save · esc: cancel",
    };
    match view_data.page.as_ref().filter(|_| state.mode == AppMode::Search) {
        Some(page) => format!("search: {}_  ({hint})", page.search_input),
        None => format!("{} | {hint}", mode_label(state.mode)),
    }
}

fn mode_label(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Nav => "NAV",
        AppMode::Edit => "EDIT",
        AppMode::Search => "SEARCH",
        AppMode::Form(_) => "FORM",
    }
}

fn help_overlay_text() -> &'static str {
    "tab/shift+tab  switch screen\n\
     j k h l        move\n\
     [ ] s          previous/next page, page size\n\
     /              search (vendedores, productos, periódicos)\n\
     d              cycle date range\n\
     t              cycle report (reportes)\n\
     r              reload\n\
     i              edit mode: enter edits a cell, a adds, D deletes\n\
     p r            in edit mode on devoluciones: toggle paid, reset returns\n\
     x X            export ticket / debtors or cash report\n\
     L              sign out\n\
     ctrl+q         quit"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, ExportKind, InternalEvent, PageQuery, RangePreset, UiOptions, ViewData,
        handle_key_event, process_internal_events, render, render_pagination_text, status_text,
        tick,
    };
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use kiosko_app::columns::{DetailCell, UpdateRequest, assignment_row};
    use kiosko_app::forms::{FormPayload, LoginInput};
    use kiosko_app::paging::PageWindow;
    use kiosko_app::table::{EMPTY_MESSAGE, RenderedRow};
    use kiosko_app::{
        AppMode, AppState, DetailAssignmentId, FinanceSummary, FormKind, Page, Resource, Route,
    };
    use kiosko_testkit::{page_json, sample_assignment, sample_sellers, typed_assignment};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use time::macros::date;

    #[derive(Debug)]
    struct TestRuntime {
        session: bool,
        pages: HashMap<Route, Page<Value>>,
        fail_loads: Option<String>,
        expire_on_failure: bool,
        queries: Vec<PageQuery>,
        updates: Vec<UpdateRequest>,
        submitted: Vec<FormPayload>,
        deleted: Vec<(Route, Value)>,
        exports: Vec<ExportKind>,
        logins: Vec<LoginInput>,
    }

    impl Default for TestRuntime {
        fn default() -> Self {
            let mut pages = HashMap::new();
            pages.insert(
                Route::Sellers,
                serde_json::from_value(page_json(23, sample_sellers(3))).expect("seller page"),
            );
            let mut fixture = sample_assignment();
            if let Some(details) = fixture["detail_assignments"].as_array_mut() {
                for detail in details {
                    detail["returned_amount"] = json!(0);
                }
            }
            let assignment = typed_assignment(&fixture).expect("assignment");
            let row = assignment_row(&assignment).expect("assignment row");
            pages.insert(Route::Devolutions, Page::new(1, vec![row]));
            Self {
                session: true,
                pages,
                fail_loads: None,
                expire_on_failure: false,
                queries: Vec::new(),
                updates: Vec::new(),
                submitted: Vec::new(),
                deleted: Vec::new(),
                exports: Vec::new(),
                logins: Vec::new(),
            }
        }
    }

    impl AppRuntime for TestRuntime {
        fn session_active(&mut self) -> bool {
            self.session
        }

        fn login(&mut self, input: &LoginInput) -> anyhow::Result<()> {
            input.validate()?;
            self.logins.push(input.clone());
            self.session = true;
            Ok(())
        }

        fn logout(&mut self) -> anyhow::Result<()> {
            self.session = false;
            Ok(())
        }

        fn load_home(&mut self, _today: time::Date) -> anyhow::Result<FinanceSummary> {
            Ok(FinanceSummary {
                year: 2025,
                month: 2,
                income_month: 1500.0,
                expense_month: 320.5,
                balance_month: 1179.5,
                transactions_count: 14,
            })
        }

        fn load_page(&mut self, query: &PageQuery) -> anyhow::Result<Page<Value>> {
            self.queries.push(query.clone());
            if let Some(error) = &self.fail_loads {
                if self.expire_on_failure {
                    self.session = false;
                }
                anyhow::bail!("{error}");
            }
            Ok(self.pages.get(&query.route).cloned().unwrap_or_default())
        }

        fn apply_update(&mut self, request: &UpdateRequest) -> anyhow::Result<()> {
            self.updates.push(request.clone());
            Ok(())
        }

        fn delete_row(&mut self, route: Route, row: &Value) -> anyhow::Result<()> {
            self.deleted.push((route, row.clone()));
            Ok(())
        }

        fn submit_form(&mut self, payload: &FormPayload) -> anyhow::Result<()> {
            self.submitted.push(payload.clone());
            Ok(())
        }

        fn export(
            &mut self,
            kind: ExportKind,
            _rows: &[Value],
            _today: time::Date,
        ) -> anyhow::Result<PathBuf> {
            self.exports.push(kind);
            Ok(PathBuf::from("/tmp/ticket.txt"))
        }

        fn today(&self) -> time::Date {
            date!(2025 - 02 - 03)
        }
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn signed_in() -> Self {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                state: AppState::default(),
                runtime: TestRuntime::default(),
                view_data: ViewData::new(UiOptions::default(), date!(2025 - 02 - 03)),
                tx,
                rx,
            };
            harness.state.signed_in = true;
            harness.state.route = Route::Home;
            harness
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn key(&mut self, code: KeyCode) -> bool {
            let quit = handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                KeyEvent::new(code, KeyModifiers::NONE),
            );
            self.pump();
            quit
        }

        fn keys(&mut self, codes: &[KeyCode]) {
            for code in codes {
                self.key(*code);
            }
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.key(KeyCode::Char(ch));
            }
        }

        fn go_to(&mut self, route: Route) {
            while self.state.route != route {
                self.key(KeyCode::Tab);
            }
        }
    }

    #[test]
    fn login_signs_in_and_opens_home() {
        let mut harness = Harness::signed_in();
        harness.state = AppState::default();
        harness.runtime.session = false;

        harness.type_text("admin");
        harness.key(KeyCode::Enter);
        harness.type_text("secret");
        harness.key(KeyCode::Enter);

        assert_eq!(harness.runtime.logins.len(), 1);
        assert_eq!(harness.runtime.logins[0].username, "admin");
        assert!(harness.state.signed_in);
        assert_eq!(harness.state.route, Route::Home);
        assert_eq!(
            harness.view_data.home.as_ref().map(|home| home.transactions_count),
            Some(14)
        );
    }

    #[test]
    fn empty_login_reports_validation_error() {
        let mut harness = Harness::signed_in();
        harness.state = AppState::default();
        harness.keys(&[KeyCode::Enter, KeyCode::Enter]);
        assert!(!harness.state.signed_in);
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("username is required"))
        );
    }

    #[test]
    fn entering_a_table_route_loads_its_first_page() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);

        let query = harness.runtime.queries.last().expect("query issued");
        assert_eq!(query.route, Route::Sellers);
        assert_eq!((query.request.page, query.request.page_size), (1, 10));
        let page = harness.view_data.page.as_ref().expect("page mounted");
        assert_eq!(page.table.rows().len(), 3);
        assert_eq!(page.window().total_count, 23);
    }

    #[test]
    fn empty_listing_renders_single_message_row() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Yape);
        let rendered = harness
            .view_data
            .page
            .as_ref()
            .expect("page mounted")
            .table
            .render();
        assert_eq!(rendered.rows.len(), 1);
        assert!(matches!(
            rendered.rows[0],
            RenderedRow::Empty { message, .. } if message == EMPTY_MESSAGE
        ));
    }

    #[test]
    fn empty_listing_message_spans_the_table() -> anyhow::Result<()> {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Yape);
        let mut terminal = Terminal::new(TestBackend::new(140, 20))?;
        terminal.draw(|frame| render(frame, &harness.state, &harness.view_data))?;

        let buffer = terminal.backend().buffer();
        let width = usize::from(buffer.area.width);
        let lines = buffer
            .content
            .chunks(width)
            .map(|line| line.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>();
        assert!(
            lines.iter().any(|line| line.contains(EMPTY_MESSAGE)),
            "empty message missing from:\n{}",
            lines.join("\n")
        );
        Ok(())
    }

    #[test]
    fn refresh_after_shrink_returns_to_last_page() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.keys(&[KeyCode::Char(']'), KeyCode::Char(']')]);
        assert_eq!(harness.runtime.queries.last().map(|q| q.request.page), Some(3));

        harness.runtime.pages.insert(
            Route::Sellers,
            serde_json::from_value(page_json(5, sample_sellers(2))).expect("seller page"),
        );
        harness.key(KeyCode::Char('r'));

        assert_eq!(harness.runtime.queries.last().map(|q| q.request.page), Some(1));
        let page = harness.view_data.page.as_ref().expect("page mounted");
        assert_eq!(page.window().page, 1);
        assert_eq!(page.window().label(), "Página 1 de 1");
        assert_eq!(page.table.rows().len(), 2);
    }

    #[test]
    fn next_page_key_requests_page_two() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.key(KeyCode::Char(']'));
        let query = harness.runtime.queries.last().expect("query issued");
        assert_eq!(query.request.page, 2);

        harness.keys(&[KeyCode::Char(']'), KeyCode::Char(']')]);
        assert_eq!(harness.runtime.queries.last().map(|q| q.request.page), Some(3));
    }

    #[test]
    fn stale_page_response_is_ignored() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        let (mount, stale_seq) = {
            let page = harness.view_data.page.as_ref().expect("page mounted");
            (page.mount, harness.runtime.queries.last().expect("query").request.seq)
        };
        harness.key(KeyCode::Char('r'));

        harness
            .tx
            .send(InternalEvent::PageLoaded {
                mount,
                seq: stale_seq,
                result: Ok(Page::new(0, Vec::new())),
            })
            .expect("send");
        harness.pump();
        let page = harness.view_data.page.as_ref().expect("page mounted");
        assert_eq!(page.table.rows().len(), 3);
    }

    #[test]
    fn search_waits_for_debounce() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        let before = harness.runtime.queries.len();

        harness.key(KeyCode::Char('/'));
        assert_eq!(harness.state.mode, AppMode::Search);
        harness.type_text("ana");
        assert_eq!(harness.runtime.queries.len(), before);

        tick(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            Instant::now() + Duration::from_millis(350),
        );
        harness.pump();
        let query = harness.runtime.queries.last().expect("search issued");
        assert_eq!(query.request.search.as_deref(), Some("ana"));
        assert_eq!(query.request.page, 1);
        assert_eq!(harness.runtime.queries.len(), before + 1);
    }

    #[test]
    fn inline_edit_patches_single_field_and_refetches() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        let phone_col = harness
            .view_data
            .page
            .as_ref()
            .and_then(|page| page.table.columns().position("phone"))
            .expect("phone column");
        let loads = harness.runtime.queries.len();

        harness.key(KeyCode::Char('i'));
        for _ in 0..phone_col {
            harness.key(KeyCode::Char('l'));
        }
        harness.key(KeyCode::Enter);
        for _ in 0..12 {
            harness.key(KeyCode::Backspace);
        }
        harness.type_text("911222333");
        harness.key(KeyCode::Enter);

        assert_eq!(harness.runtime.updates.len(), 1);
        match &harness.runtime.updates[0] {
            UpdateRequest::Patch {
                resource,
                field,
                value,
                ..
            } => {
                assert_eq!(*resource, Resource::Sellers);
                assert_eq!(field, "phone");
                assert_eq!(value, &json!("911222333"));
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert_eq!(harness.runtime.queries.len(), loads + 1);
    }

    #[test]
    fn read_only_column_refuses_edit() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.keys(&[KeyCode::Char('i'), KeyCode::Enter]);
        let page = harness.view_data.page.as_ref().expect("page mounted");
        assert!(page.table.active_edit().is_none());
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|status| status.contains("read-only"))
        );
    }

    #[test]
    fn unchanged_edit_sends_nothing() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        let name_col = harness
            .view_data
            .page
            .as_ref()
            .and_then(|page| page.table.columns().position("name"))
            .expect("name column");
        harness.key(KeyCode::Char('i'));
        for _ in 0..name_col {
            harness.key(KeyCode::Char('l'));
        }
        harness.keys(&[KeyCode::Enter, KeyCode::Enter]);
        assert!(harness.runtime.updates.is_empty());
        assert_eq!(harness.state.status_line.as_deref(), Some("no change"));
    }

    #[test]
    fn failed_load_after_session_loss_returns_to_login() {
        let mut harness = Harness::signed_in();
        harness.runtime.fail_loads = Some("session expired -- sign in again".to_owned());
        harness.runtime.expire_on_failure = true;
        harness.key(KeyCode::Tab);

        assert!(!harness.state.signed_in);
        assert_eq!(harness.state.route, Route::Login);
        assert!(harness.view_data.page.is_none());
    }

    #[test]
    fn failed_load_keeps_route_and_shows_banner() {
        let mut harness = Harness::signed_in();
        harness.runtime.fail_loads = Some("server error (500): boom".to_owned());
        harness.go_to(Route::Sellers);

        assert_eq!(harness.state.route, Route::Sellers);
        let page = harness.view_data.page.as_ref().expect("page mounted");
        assert_eq!(page.fetch.error(), Some("server error (500): boom"));
    }

    #[test]
    fn seller_form_submits_payload() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.keys(&[KeyCode::Char('i'), KeyCode::Char('a')]);
        assert_eq!(harness.state.mode, AppMode::Form(FormKind::Seller));

        harness.type_text("Rosa");
        harness.key(KeyCode::Tab);
        harness.type_text("Flores");
        harness.key(KeyCode::Tab);
        harness.type_text("45678912");
        harness.key(KeyCode::Tab);
        harness.type_text("912345678");
        harness.key(KeyCode::Enter);

        assert_eq!(harness.runtime.submitted.len(), 1);
        assert_eq!(harness.state.mode, AppMode::Nav);
        assert!(harness.view_data.form.is_none());
    }

    #[test]
    fn invalid_form_stays_open() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.keys(&[KeyCode::Char('i'), KeyCode::Char('a')]);
        harness.type_text("Rosa");
        harness.key(KeyCode::Enter);

        assert!(harness.runtime.submitted.is_empty());
        assert_eq!(harness.state.mode, AppMode::Form(FormKind::Seller));
        assert!(harness.view_data.form.is_some());
    }

    fn devolution_cell(harness: &Harness) -> (usize, DetailCell) {
        let page = harness.view_data.page.as_ref().expect("page mounted");
        let (index, column) = page
            .table
            .columns()
            .iter()
            .enumerate()
            .find(|(_, column)| column.id.starts_with("return-"))
            .expect("product column");
        let path = column.detail_path().expect("detail path");
        let detail = DetailCell::at(&page.table.rows()[0], path).expect("detail in cell");
        (index, detail)
    }

    #[test]
    fn devolution_cell_toggles_paid_status() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Devolutions);
        let (column, detail) = devolution_cell(&harness);

        harness.key(KeyCode::Char('i'));
        for _ in 0..column {
            harness.key(KeyCode::Char('l'));
        }
        harness.key(KeyCode::Char('p'));

        assert_eq!(
            harness.runtime.updates,
            vec![UpdateRequest::Patch {
                resource: Resource::DetailAssignments,
                id: detail.id,
                field: "status".to_owned(),
                value: json!("FINISHED"),
            }]
        );
    }

    #[test]
    fn devolution_edit_registers_return() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Devolutions);
        let (column, detail) = devolution_cell(&harness);
        assert!(detail.pending() >= 1);

        harness.key(KeyCode::Char('i'));
        for _ in 0..column {
            harness.key(KeyCode::Char('l'));
        }
        harness.keys(&[KeyCode::Enter, KeyCode::Backspace]);
        harness.type_text("1");
        harness.key(KeyCode::Enter);

        assert_eq!(
            harness.runtime.updates,
            vec![UpdateRequest::RegisterDevolution {
                detail_id: DetailAssignmentId::new(detail.id),
                quantity: 1,
            }]
        );
    }

    #[test]
    fn reports_default_to_month_range_and_cycle_kind() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Reports);
        let first = harness.runtime.queries.last().cloned().expect("query");
        assert_eq!((first.start, first.end), (date!(2025 - 02 - 01), date!(2025 - 02 - 03)));

        harness.key(KeyCode::Char('t'));
        let second = harness.runtime.queries.last().cloned().expect("query");
        assert_ne!(first.report, second.report);
    }

    #[test]
    fn range_presets_bound_dates() {
        let today = date!(2025 - 02 - 03);
        assert_eq!(RangePreset::Today.bounds(today), (today, today));
        assert_eq!(RangePreset::Week.bounds(today), (date!(2025 - 01 - 28), today));
        assert_eq!(RangePreset::Month.next(), RangePreset::Today);
    }

    #[test]
    fn export_on_assignments_uses_selected_row() {
        let mut harness = Harness::signed_in();
        harness
            .runtime
            .pages
            .insert(Route::Assignments, Page::new(1, vec![json!({"id": 1})]));
        harness.go_to(Route::Assignments);
        harness.key(KeyCode::Char('x'));
        harness.key(KeyCode::Char('X'));
        assert_eq!(
            harness.runtime.exports,
            vec![ExportKind::AssignmentTicket { row: 0 }, ExportKind::Debtors]
        );
    }

    #[test]
    fn logout_returns_to_login() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.key(KeyCode::Char('L'));
        assert!(!harness.state.signed_in);
        assert_eq!(harness.state.route, Route::Login);
        assert!(!harness.runtime.session);
    }

    #[test]
    fn ctrl_q_quits() {
        let mut harness = Harness::signed_in();
        let quit = handle_key_event(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
        );
        assert!(quit);
    }

    #[test]
    fn pagination_text_marks_current_page() {
        let text = render_pagination_text(PageWindow {
            page: 25,
            page_size: 20,
            total_count: 1000,
        });
        assert!(text.contains("1 … 24 [25] 26 … 50"));
        assert!(text.contains("Página 25 de 50"));
        assert!(text.starts_with('«'));
    }

    #[test]
    fn status_text_shows_search_draft() {
        let mut harness = Harness::signed_in();
        harness.go_to(Route::Sellers);
        harness.key(KeyCode::Char('/'));
        harness.type_text("lu");
        harness.state.status_line = None;
        assert!(status_text(&harness.state, &harness.view_data).starts_with("search: lu_"));
    }
}

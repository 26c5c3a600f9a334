use std::collections::{HashMap, HashSet};
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use crate::capture::{self, CaptureError, CapturedFrame, PLACEHOLDER_CAPTION};
use crate::data::{AlertService, ThumbnailService};
use crate::feed::{FeedItem, FeedState, PosterState};
use crate::logging;
use crate::player;
use crate::rating;
use crate::realtime::ChangeEvent;
use crate::supabase::{AlertRecord, ThumbnailRecord};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_TEXT_DIMMED: Color = Color::Rgb(108, 112, 134);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_TERM_BADGE: Color = Color::Rgb(250, 179, 135);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TOOLTIP_DELAY: Duration = Duration::from_secs(3);
const COLLAPSED_CARD_ROWS: usize = 4;

pub struct Options {
    pub status_message: String,
    pub alert_service: Option<Arc<dyn AlertService>>,
    pub thumbnail_service: Option<Arc<dyn ThumbnailService>>,
    pub realtime_events: Option<Receiver<ChangeEvent>>,
    pub page_size: usize,
    pub video_command: Vec<String>,
    pub config_path: String,
    pub preview_records: Vec<AlertRecord>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Replace,
    Append,
}

struct PendingLoad {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
    mode: LoadMode,
}

#[derive(Debug, Clone, PartialEq)]
enum Placeholder {
    None,
    Empty,
    Error(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StatusKind {
    Info,
    Error,
}

enum InputMode {
    Normal,
    Filter(String),
}

enum AsyncResponse {
    Alerts {
        request_id: u64,
        result: Result<Vec<AlertRecord>>,
    },
    Thumbnail {
        video_id: String,
        result: Option<ThumbnailRecord>,
    },
    ThumbnailSaved {
        video_id: String,
        result: Result<()>,
    },
    Frame {
        video_id: String,
        result: Result<CapturedFrame, CaptureError>,
    },
}

struct ActivePlayback {
    id: String,
    session: player::Session,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    status_message: String,
    status_kind: StatusKind,
    state: FeedState,
    placeholder: Placeholder,
    selected: usize,
    selected_since: Instant,
    tooltip_visible: bool,
    scroll: usize,
    view_height: u16,
    input_mode: InputMode,
    load_more_available: bool,
    alert_service: Option<Arc<dyn AlertService>>,
    thumbnail_service: Option<Arc<dyn ThumbnailService>>,
    realtime_events: Option<Receiver<ChangeEvent>>,
    page_size: usize,
    video_command: Vec<String>,
    config_path: String,
    playback: Option<ActivePlayback>,
    pending_load: Option<PendingLoad>,
    pending_thumbs: HashMap<String, Arc<AtomicBool>>,
    pending_captures: HashSet<String>,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut state = FeedState::new();
        if !opts.preview_records.is_empty() {
            state.append(opts.preview_records);
        }

        Self {
            status_message: opts.status_message,
            status_kind: StatusKind::Info,
            state,
            placeholder: Placeholder::None,
            selected: 0,
            selected_since: Instant::now(),
            tooltip_visible: false,
            scroll: 0,
            view_height: 0,
            input_mode: InputMode::Normal,
            load_more_available: false,
            alert_service: opts.alert_service,
            thumbnail_service: opts.thumbnail_service,
            realtime_events: opts.realtime_events,
            page_size: opts.page_size.max(1),
            video_command: opts.video_command,
            config_path: opts.config_path,
            playback: None,
            pending_load: None,
            pending_thumbs: HashMap::new(),
            pending_captures: HashSet::new(),
            response_tx,
            response_rx,
            next_request_id: 1,
            spinner: Spinner::new(),
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        if self.alert_service.is_some() {
            self.load_first_page();
        }

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.set_status(format!("Error: {err}"), StatusKind::Error);
                            }
                        }
                    }
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.tick();
            }
        }

        Ok(())
    }

    fn tick(&mut self) {
        if self.is_loading() {
            if self.spinner.advance() {
                self.mark_dirty();
            }
        } else {
            self.spinner.reset();
        }

        if !self.tooltip_visible
            && self.selected_since.elapsed() >= TOOLTIP_DELAY
            && !self.visible_rows().is_empty()
        {
            self.tooltip_visible = true;
            self.mark_dirty();
        }

        if let Some(playback) = &mut self.playback {
            if let Some(status) = playback.session.try_status() {
                logging::debug(format!("player for {} exited: {status:?}", playback.id));
                self.playback = None;
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pending_load.is_some() || !self.pending_captures.is_empty()
    }

    fn set_status(&mut self, message: impl Into<String>, kind: StatusKind) {
        self.status_message = message.into();
        self.status_kind = kind;
        self.mark_dirty();
    }

    fn visible_rows(&self) -> Vec<usize> {
        self.state.visible_rows()
    }

    fn selected_item_index(&self) -> Option<usize> {
        let rows = self.visible_rows();
        rows.get(self.selected.min(rows.len().saturating_sub(1)))
            .copied()
    }

    // ----- async plumbing -----

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed |= self.drain_realtime();
        changed
    }

    fn drain_realtime(&mut self) -> bool {
        let Some(events) = &self.realtime_events else {
            return false;
        };
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        let changed = !drained.is_empty();
        for event in drained {
            self.apply_change_event(event);
        }
        changed
    }

    /// Single funnel for backend change notifications. Inserts render
    /// immediately; update and delete fall back to a full first-page reload,
    /// the simplest reconciliation that cannot diverge. An incremental
    /// patch strategy would slot in here without touching the channel
    /// consumption above.
    fn apply_change_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(record) => {
                if self.state.index_of(&record.id).is_some() {
                    logging::debug(format!("realtime: insert for loaded row {}", record.id));
                    return;
                }
                let id = record.id.clone();
                let has_video = record.url_video.is_some();
                self.state.prepend(*record);
                self.placeholder = Placeholder::None;
                if has_video {
                    self.queue_thumbnail_lookup(&id);
                }
                self.set_status("New alert received", StatusKind::Info);
            }
            ChangeEvent::Update => {
                self.set_status("Alert updated — reloading feed", StatusKind::Info);
                self.load_first_page();
            }
            ChangeEvent::Delete => {
                self.set_status("Alert deleted — reloading feed", StatusKind::Info);
                self.load_first_page();
            }
        }
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Alerts { request_id, result } => {
                let Some(pending) = &self.pending_load else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != request_id {
                    return;
                }
                let mode = pending.mode;
                self.pending_load = None;
                match mode {
                    LoadMode::Replace => self.apply_first_page(result),
                    LoadMode::Append => self.apply_more(result),
                }
                self.mark_dirty();
            }
            AsyncResponse::Thumbnail { video_id, result } => {
                let Some(flag) = self.pending_thumbs.remove(&video_id) else {
                    return;
                };
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                // The card may have been removed while the lookup ran; a
                // late result is a no-op, never an error.
                let Some(index) = self.state.index_of(&video_id) else {
                    return;
                };
                if let Some(record) = result {
                    if let Some(item) = self.state.item_mut(index) {
                        item.poster = PosterState::Stored {
                            offset_seconds: record.timestamp,
                        };
                        logging::debug(format!("thumbnail restored for {video_id}"));
                        self.mark_dirty();
                    }
                }
            }
            AsyncResponse::ThumbnailSaved { video_id, result } => match result {
                Ok(()) => {
                    self.set_status("Frame captured and saved", StatusKind::Info);
                }
                Err(err) => {
                    // The poster stays as applied; only the persistence
                    // failed.
                    logging::error(format!("thumbnail save for {video_id} failed: {err:#}"));
                    self.set_status(
                        format!("Failed to save thumbnail: {err:#}"),
                        StatusKind::Error,
                    );
                }
            },
            AsyncResponse::Frame { video_id, result } => {
                self.pending_captures.remove(&video_id);
                match result {
                    Ok(frame) => self.apply_captured_frame(&video_id, frame),
                    Err(err) => {
                        self.set_status(
                            format!("Could not capture frame: {err}"),
                            StatusKind::Error,
                        );
                    }
                }
                self.mark_dirty();
            }
        }
    }

    fn apply_first_page(&mut self, result: Result<Vec<AlertRecord>>) {
        match result {
            Ok(rows) => {
                let fetched = rows.len();
                if fetched == 0 {
                    self.placeholder = Placeholder::Empty;
                    self.load_more_available = false;
                    self.set_status("No alerts available yet", StatusKind::Info);
                    return;
                }
                let with_video: Vec<String> = rows
                    .iter()
                    .filter(|row| row.url_video.is_some())
                    .map(|row| row.id.clone())
                    .collect();
                self.state.append(rows);
                self.placeholder = Placeholder::None;
                self.load_more_available = fetched == self.page_size;
                self.selected = 0;
                self.scroll = 0;
                for id in with_video {
                    self.queue_thumbnail_lookup(&id);
                }
                self.set_status(format!("Loaded {fetched} alerts"), StatusKind::Info);
            }
            Err(err) => {
                self.placeholder = Placeholder::Error(format!("{err:#}"));
                self.set_status(format!("Failed to load alerts: {err:#}"), StatusKind::Error);
            }
        }
    }

    fn apply_more(&mut self, result: Result<Vec<AlertRecord>>) {
        match result {
            Ok(rows) => {
                let fetched = rows.len();
                if fetched == 0 {
                    self.load_more_available = false;
                    self.set_status("No more alerts", StatusKind::Info);
                    return;
                }
                let with_video: Vec<String> = rows
                    .iter()
                    .filter(|row| row.url_video.is_some())
                    .map(|row| row.id.clone())
                    .collect();
                let added = self.state.append(rows);
                if fetched < self.page_size {
                    self.load_more_available = false;
                }
                for id in with_video {
                    self.queue_thumbnail_lookup(&id);
                }
                self.set_status(
                    format!("Loaded {added} more alerts — {} total", self.state.len()),
                    StatusKind::Info,
                );
            }
            Err(err) => {
                self.set_status(
                    format!("Failed to load more alerts: {err:#}"),
                    StatusKind::Error,
                );
            }
        }
    }

    /// Starts (or restarts) the first-page load. Any in-flight load is
    /// cancelled first, so a stale response can never land on the freshly
    /// reset state.
    fn load_first_page(&mut self) {
        let Some(service) = self.alert_service.clone() else {
            self.set_status(
                format!(
                    "Configure the backend in {} to load alerts.",
                    self.config_path
                ),
                StatusKind::Error,
            );
            return;
        };

        if let Some(pending) = self.pending_load.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        self.cancel_thumbnail_lookups();
        self.stop_playback();

        self.state.reset();
        self.placeholder = Placeholder::None;
        self.selected = 0;
        self.scroll = 0;
        self.load_more_available = false;

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_load = Some(PendingLoad {
            request_id,
            cancel_flag: cancel_flag.clone(),
            mode: LoadMode::Replace,
        });
        self.spinner.reset();
        self.set_status("Loading alerts…", StatusKind::Info);

        let tx = self.response_tx.clone();
        let page_size = self.page_size;
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.fetch_page(page_size, 0);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Alerts { request_id, result });
        });
    }

    fn load_more(&mut self) {
        if self.pending_load.is_some() {
            return;
        }
        if !self.load_more_available {
            self.set_status("No more alerts", StatusKind::Info);
            return;
        }
        let Some(service) = self.alert_service.clone() else {
            return;
        };

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_load = Some(PendingLoad {
            request_id,
            cancel_flag: cancel_flag.clone(),
            mode: LoadMode::Append,
        });
        self.spinner.reset();
        self.set_status("Loading more alerts…", StatusKind::Info);

        let tx = self.response_tx.clone();
        let page_size = self.page_size;
        let offset = self.state.offset();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.fetch_page(page_size, offset);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Alerts { request_id, result });
        });
    }

    fn queue_thumbnail_lookup(&mut self, video_id: &str) {
        let Some(service) = self.thumbnail_service.clone() else {
            return;
        };
        if self.pending_thumbs.contains_key(video_id) {
            return;
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.pending_thumbs
            .insert(video_id.to_string(), flag.clone());

        let tx = self.response_tx.clone();
        let id = video_id.to_string();
        thread::spawn(move || {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.load(&id).unwrap_or_default();
            if flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Thumbnail {
                video_id: id,
                result,
            });
        });
    }

    fn cancel_thumbnail_lookups(&mut self) {
        for flag in self.pending_thumbs.values() {
            flag.store(true, Ordering::SeqCst);
        }
        self.pending_thumbs.clear();
    }

    fn stop_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            let _ = playback.session.stop_blocking();
        }
    }

    // ----- user actions -----

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if let InputMode::Filter(_) = self.input_mode {
            return self.handle_filter_key(code);
        }

        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc => {
                self.collapse_expanded();
            }
            KeyCode::Char('r') => {
                // Refresh is disabled while a first-page load is running.
                let replacing = matches!(
                    &self.pending_load,
                    Some(pending) if pending.mode == LoadMode::Replace
                );
                if !replacing {
                    self.load_first_page();
                }
            }
            KeyCode::Char('m') => self.load_more(),
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('g') => self.jump_selection(0),
            KeyCode::Char('G') => {
                let last = self.visible_rows().len().saturating_sub(1);
                self.jump_selection(last);
            }
            KeyCode::Enter => self.toggle_expanded_selected(),
            KeyCode::Char('h') => self.toggle_hidden_selected(),
            KeyCode::Char('H') => {
                let showing = self.state.toggle_show_hidden();
                let message = if showing {
                    format!(
                        "Showing {} hidden alerts (dimmed)",
                        self.state.hidden_count()
                    )
                } else {
                    "Hidden alerts are out of view again".to_string()
                };
                self.set_status(message, StatusKind::Info);
            }
            KeyCode::Char('s') => {
                let order = self.state.toggle_sort();
                self.clamp_selection();
                self.set_status(format!("Sorted: {}", order.label()), StatusKind::Info);
            }
            KeyCode::Char('/') => {
                let current = self.state.filter().unwrap_or_default().to_string();
                self.input_mode = InputMode::Filter(current);
                self.mark_dirty();
            }
            KeyCode::Char('c') => self.capture_selected(),
            KeyCode::Char('v') => self.play_selected(),
            _ => {}
        }
        Ok(false)
    }

    fn handle_filter_key(&mut self, code: KeyCode) -> Result<bool> {
        let InputMode::Filter(buffer) = &mut self.input_mode else {
            return Ok(false);
        };
        match code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.mark_dirty();
            }
            KeyCode::Enter => {
                let text = buffer.clone();
                self.input_mode = InputMode::Normal;
                self.apply_filter(&text);
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.mark_dirty();
            }
            KeyCode::Char(ch) => {
                buffer.push(ch);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn apply_filter(&mut self, text: &str) {
        let active = self.state.toggle_filter(text);
        self.clamp_selection();
        let visible = self.visible_rows().len();
        let message = match active {
            Some(filter) => format!("Filtered by \"{filter}\" — {visible} alerts"),
            None => format!("Showing all alerts ({})", self.state.len()),
        };
        self.set_status(message, StatusKind::Info);
    }

    fn move_selection(&mut self, delta: isize) {
        let rows = self.visible_rows();
        if rows.is_empty() {
            self.set_status("No alerts to select", StatusKind::Info);
            return;
        }
        let last = rows.len() - 1;
        let current = self.selected.min(last) as isize;
        let next = (current + delta).clamp(0, last as isize) as usize;
        self.jump_selection(next);
    }

    fn jump_selection(&mut self, index: usize) {
        let rows = self.visible_rows();
        if rows.is_empty() {
            return;
        }
        self.selected = index.min(rows.len() - 1);
        self.selected_since = Instant::now();
        self.tooltip_visible = false;
        self.ensure_selected_visible(rows.len());
        self.mark_dirty();
    }

    fn clamp_selection(&mut self) {
        let rows = self.visible_rows();
        if !rows.is_empty() && self.selected >= rows.len() {
            self.selected = rows.len() - 1;
        }
        self.selected_since = Instant::now();
        self.tooltip_visible = false;
        self.mark_dirty();
    }

    fn ensure_selected_visible(&mut self, row_count: usize) {
        let per_screen = (self.view_height as usize / COLLAPSED_CARD_ROWS).max(1);
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.selected >= self.scroll + per_screen {
            self.scroll = self.selected + 1 - per_screen;
        }
        self.scroll = self.scroll.min(row_count.saturating_sub(1));
    }

    fn toggle_expanded_selected(&mut self) {
        let Some(index) = self.selected_item_index() else {
            return;
        };
        let collapsed = self.state.toggle_expanded(index);
        self.pause_collapsed_players(&collapsed);
        self.mark_dirty();
    }

    fn collapse_expanded(&mut self) -> bool {
        let expanded: Vec<usize> = self
            .state
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| item.expanded)
            .map(|(idx, _)| idx)
            .collect();
        if expanded.is_empty() {
            return false;
        }
        for &index in &expanded {
            self.state.toggle_expanded(index);
        }
        self.pause_collapsed_players(&expanded);
        self.mark_dirty();
        true
    }

    fn pause_collapsed_players(&mut self, collapsed: &[usize]) {
        let Some(playback) = &self.playback else {
            return;
        };
        for &index in collapsed {
            if let Some(item) = self.state.item(index) {
                if item.id() == playback.id {
                    if let Err(err) = playback.session.pause_and_rewind() {
                        logging::debug(format!("player pause failed: {err:#}"));
                    }
                }
            }
        }
    }

    fn toggle_hidden_selected(&mut self) {
        let Some(index) = self.selected_item_index() else {
            return;
        };
        let Some(item) = self.state.item(index) else {
            return;
        };
        if item.hidden {
            self.state.set_hidden(index, false);
            self.set_status("Alert visible again", StatusKind::Info);
        } else {
            let owned = [index];
            self.pause_collapsed_players(&owned);
            self.state.set_hidden(index, true);
            self.set_status(
                "Alert hidden — press H to review hidden alerts",
                StatusKind::Info,
            );
        }
        self.clamp_selection();
    }

    fn capture_selected(&mut self) {
        let Some(index) = self.selected_item_index() else {
            return;
        };
        let Some(item) = self.state.item(index) else {
            return;
        };
        let Some(url) = item.card.video_url.clone() else {
            self.set_status("No video attached to this alert", StatusKind::Error);
            return;
        };
        let id = item.id().to_string();
        if self.pending_captures.contains(&id) {
            self.set_status("Capture already in progress", StatusKind::Info);
            return;
        }

        let offset_seconds = self
            .playback
            .as_ref()
            .filter(|playback| playback.id == id)
            .and_then(|playback| playback.session.query_time_pos())
            .unwrap_or(0.0);

        self.pending_captures.insert(id.clone());
        self.set_status("Capturing frame…", StatusKind::Info);

        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = capture::capture_frame(&url, offset_seconds);
            let _ = tx.send(AsyncResponse::Frame {
                video_id: id,
                result,
            });
        });
    }

    /// Applies a captured frame as the card poster immediately, then
    /// persists it. Persistence failure is reported but never reverts the
    /// poster.
    fn apply_captured_frame(&mut self, video_id: &str, frame: CapturedFrame) {
        let Some(index) = self.state.index_of(video_id) else {
            return;
        };
        let offset_seconds = frame.offset_seconds;
        if let Some(item) = self.state.item_mut(index) {
            item.poster = PosterState::Captured {
                offset_seconds,
                placeholder: frame.placeholder,
            };
        }
        if frame.placeholder {
            self.set_status(
                format!("Frame captured — {PLACEHOLDER_CAPTION}"),
                StatusKind::Info,
            );
        } else {
            self.set_status("Frame captured", StatusKind::Info);
        }

        let Some(service) = self.thumbnail_service.clone() else {
            return;
        };
        let record = ThumbnailRecord::new(video_id, frame.to_data_url(), offset_seconds);
        let tx = self.response_tx.clone();
        let id = video_id.to_string();
        thread::spawn(move || {
            let result = service.save(record);
            let _ = tx.send(AsyncResponse::ThumbnailSaved {
                video_id: id,
                result,
            });
        });
    }

    fn play_selected(&mut self) {
        let Some(index) = self.selected_item_index() else {
            return;
        };
        let Some(item) = self.state.item(index) else {
            return;
        };
        let Some(url) = item.card.video_url.clone() else {
            self.set_status("No video attached to this alert", StatusKind::Error);
            return;
        };
        let id = item.id().to_string();
        let title = item.card.program_name.clone();

        if let Some(playback) = &self.playback {
            if playback.id == id {
                self.set_status("Video is already playing", StatusKind::Info);
                return;
            }
        }
        self.stop_playback();

        match player::spawn(player::LaunchOptions {
            command: &self.video_command,
            url: &url,
            title: &title,
        }) {
            Ok(session) => {
                self.playback = Some(ActivePlayback { id, session });
                self.set_status(format!("Playing {title}"), StatusKind::Info);
            }
            Err(err) => {
                self.set_status(format!("Failed to play video: {err:#}"), StatusKind::Error);
            }
        }
    }

    // ----- drawing -----

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_status(frame, layout[0]);
        self.draw_feed(frame, layout[1]);
        self.draw_footer(frame, layout[2]);
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let color = match self.status_kind {
            StatusKind::Info => COLOR_TEXT_PRIMARY,
            StatusKind::Error => COLOR_ERROR,
        };
        let status = Paragraph::new(text).style(
            Style::default()
                .fg(color)
                .bg(COLOR_PANEL_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status, area);
    }

    fn feed_title(&self) -> String {
        let mut title = format!(" Alertas ({}) ", self.state.len());
        if let Some(filter) = self.state.filter() {
            title.push_str(&format!("· filter: {filter} "));
        }
        title.push_str(&format!("· {} ", self.state.sort().label()));
        if self.state.show_hidden() && self.state.hidden_count() > 0 {
            title.push_str(&format!("· {} hidden shown ", self.state.hidden_count()));
        }
        title
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if self.is_loading() {
                COLOR_BORDER_FOCUSED
            } else {
                COLOR_BORDER_IDLE
            }))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
            .title(Span::styled(
                self.feed_title(),
                Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD),
            ));
        let inner = block.inner(area);
        self.view_height = inner.height;
        frame.render_widget(block, area);

        match &self.placeholder {
            Placeholder::Empty => {
                self.draw_placeholder(
                    frame,
                    inner,
                    COLOR_TEXT_SECONDARY,
                    vec![
                        "No hay alertas disponibles".to_string(),
                        String::new(),
                        "The alert table returned no rows. Check that the".to_string(),
                        "video analysis pipeline is inserting data.".to_string(),
                    ],
                );
                return;
            }
            Placeholder::Error(message) => {
                let mut lines = vec!["Error de conexión".to_string(), String::new()];
                lines.extend(
                    wrap(message, inner.width.saturating_sub(4).max(20) as usize)
                        .into_iter()
                        .map(|line| line.into_owned()),
                );
                self.draw_placeholder(frame, inner, COLOR_ERROR, lines);
                return;
            }
            Placeholder::None => {}
        }

        let rows = self.visible_rows();
        if rows.is_empty() {
            let message = if self.state.is_empty() {
                "Nothing loaded yet — press r to refresh."
            } else {
                "No alerts match the active filter."
            };
            self.draw_placeholder(
                frame,
                inner,
                COLOR_TEXT_SECONDARY,
                vec![message.to_string()],
            );
            return;
        }

        self.selected = self.selected.min(rows.len() - 1);
        self.ensure_selected_visible(rows.len());
        let width = inner.width.max(1) as usize;

        let mut items: Vec<ListItem> = Vec::new();
        let mut used_height = 0usize;
        for (row_position, &item_index) in rows.iter().enumerate().skip(self.scroll) {
            let Some(item) = self.state.item(item_index) else {
                continue;
            };
            let selected = row_position == self.selected;
            let lines = card_lines(
                item,
                width,
                selected,
                selected && self.tooltip_visible,
                self.state.show_hidden(),
            );
            let height = lines.len() + 1;
            if used_height > 0 && used_height + height > inner.height as usize {
                break;
            }
            used_height += height;
            let mut lines = lines;
            lines.push(Line::default());
            items.push(ListItem::new(lines));
        }

        frame.render_widget(List::new(items), inner);
    }

    fn draw_placeholder(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        color: Color,
        lines: Vec<String>,
    ) {
        let text: Vec<Line> = lines
            .into_iter()
            .map(|line| Line::from(Span::styled(line, Style::default().fg(color))))
            .collect();
        let placeholder = Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(COLOR_PANEL_BG));
        let vertical_pad = area.height.saturating_sub(4) / 2;
        let centered = Rect {
            x: area.x,
            y: area.y + vertical_pad,
            width: area.width,
            height: area.height.saturating_sub(vertical_pad),
        };
        frame.render_widget(placeholder, centered);
    }

    fn draw_footer(&self, frame: &mut Frame<'_>, area: Rect) {
        let text = match &self.input_mode {
            InputMode::Filter(buffer) => {
                format!("Filter: {buffer}█  (Enter apply · Esc cancel · same text toggles off)")
            }
            InputMode::Normal => {
                let mut parts = vec![
                    "j/k move".to_string(),
                    "Enter expand".to_string(),
                    "r refresh".to_string(),
                ];
                if self.load_more_available {
                    parts.push("m load more".to_string());
                }
                parts.push("/ filter".to_string());
                parts.push("s sort".to_string());
                parts.push("v play".to_string());
                parts.push("c capture".to_string());
                parts.push("h hide".to_string());
                let hidden = self.state.hidden_count();
                if hidden > 0 {
                    parts.push(format!("H hidden ({hidden})"));
                }
                parts.push("q quit".to_string());
                parts.join(" · ")
            }
        };
        let footer = Paragraph::new(text)
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, area);
    }
}

fn card_lines(
    item: &FeedItem,
    width: usize,
    selected: bool,
    tooltip: bool,
    showing_hidden: bool,
) -> Vec<Line<'static>> {
    let dimmed = item.hidden && showing_hidden;
    let background = if selected {
        COLOR_PANEL_SELECTED_BG
    } else {
        COLOR_PANEL_BG
    };
    let primary = if dimmed {
        COLOR_TEXT_DIMMED
    } else if selected {
        COLOR_ACCENT
    } else {
        COLOR_TEXT_PRIMARY
    };
    let secondary = if dimmed {
        COLOR_TEXT_DIMMED
    } else {
        COLOR_TEXT_SECONDARY
    };
    let base = Style::default().bg(background);

    let mut lines = Vec::new();

    // Header: match headline, detection date, poster/hidden affordances.
    let mut header = Vec::new();
    header.push(Span::styled(
        "● ",
        base.fg(if dimmed { COLOR_TEXT_DIMMED } else { COLOR_ERROR }),
    ));
    header.push(Span::styled(
        format!("Coincidencia: {}", item.card.headline_term),
        base.fg(primary).add_modifier(Modifier::BOLD),
    ));
    header.push(Span::styled(
        format!("  {}", item.card.short_date),
        base.fg(secondary),
    ));
    if item.poster.is_captured() {
        header.push(Span::styled("  ✓ frame", base.fg(COLOR_SUCCESS)));
    } else if item.has_video() {
        header.push(Span::styled("  ▸ video", base.fg(secondary)));
    }
    if item.hidden {
        header.push(Span::styled("  (oculto)", base.fg(COLOR_TEXT_DIMMED)));
    }
    lines.push(Line::from(header));

    // Program / rating / airtime.
    lines.push(Line::from(vec![
        Span::styled("  PROGRAMA ", base.fg(secondary)),
        Span::styled(
            format!(
                "{} → Rating: +{}",
                item.card.program_name,
                rating::format_rating(item.card.rating)
            ),
            base.fg(primary),
        ),
        Span::styled("   HORARIO ", base.fg(secondary)),
        Span::styled(item.card.time_label.clone(), base.fg(primary)),
    ]));

    if !item.card.terms.is_empty() {
        let badges = item
            .card
            .terms
            .iter()
            .map(|term| format!("[{term}]"))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(Line::from(vec![
            Span::styled("  Términos: ", base.fg(secondary)),
            Span::styled(
                badges,
                base.fg(if dimmed { COLOR_TEXT_DIMMED } else { COLOR_TERM_BADGE }),
            ),
        ]));
    }

    if tooltip && !item.expanded {
        for wrapped in wrap(&item.card.tooltip, width.saturating_sub(4).max(20)) {
            lines.push(Line::from(Span::styled(
                format!("  » {wrapped}"),
                base.fg(secondary).add_modifier(Modifier::ITALIC),
            )));
        }
    }

    if item.expanded {
        lines.push(Line::from(Span::styled(
            "  ── Resumen Ejecutivo ──".to_string(),
            base.fg(COLOR_ACCENT),
        )));
        let summary = &item.card.summary;
        for (label, value) in [
            ("Tema principal", &summary.tema),
            ("Contexto", &summary.contexto),
            ("Puntos clave", &summary.puntos),
            ("Relevancia", &summary.relevancia),
        ] {
            let text = if value.is_empty() {
                crate::format::MISSING
            } else {
                value.as_str()
            };
            push_labeled(&mut lines, label, text, width, base, primary, secondary);
        }

        if let Some(transcription) = &item.card.transcription {
            lines.push(Line::from(Span::styled(
                "  ── Transcripción ──".to_string(),
                base.fg(COLOR_ACCENT),
            )));
            for wrapped in wrap(transcription, width.saturating_sub(4).max(20)) {
                lines.push(Line::from(Span::styled(
                    format!("  {wrapped}"),
                    base.fg(secondary),
                )));
            }
        }

        if let Some(url) = &item.card.video_url {
            let mut video_line = vec![
                Span::styled("  Video: ".to_string(), base.fg(secondary)),
                Span::styled(truncate_to_width(url, width.saturating_sub(12)), base.fg(COLOR_ACCENT)),
            ];
            if let PosterState::Captured {
                placeholder: true, ..
            } = item.poster
            {
                video_line.push(Span::styled(
                    format!("  ({PLACEHOLDER_CAPTION})"),
                    base.fg(COLOR_TEXT_DIMMED),
                ));
            }
            lines.push(Line::from(video_line));
        }
    }

    lines
}

fn push_labeled(
    lines: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    width: usize,
    base: Style,
    primary: Color,
    secondary: Color,
) {
    let prefix = format!("  {label}: ");
    let available = width.saturating_sub(prefix.width()).max(20);
    let mut first = true;
    for wrapped in wrap(value, available) {
        if first {
            lines.push(Line::from(vec![
                Span::styled(prefix.clone(), base.fg(secondary)),
                Span::styled(wrapped.into_owned(), base.fg(primary)),
            ]));
            first = false;
        } else {
            lines.push(Line::from(Span::styled(
                format!("  {wrapped}"),
                base.fg(primary),
            )));
        }
    }
    if first {
        lines.push(Line::from(Span::styled(prefix, base.fg(secondary))));
    }
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if out.width() + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MockAlertService, MockThumbnailService};
    use anyhow::anyhow;

    struct FailingAlertService;

    impl AlertService for FailingAlertService {
        fn fetch_page(&self, _limit: usize, _offset: usize) -> Result<Vec<AlertRecord>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn record(id: &str, day: u32) -> AlertRecord {
        AlertRecord {
            id: id.to_string(),
            fecha_detencion: Some(format!("2025-08-{day:02}T10:00:00Z")),
            contexto: Some(format!("contexto {id}")),
            ..AlertRecord::default()
        }
    }

    fn model_with(service: Arc<dyn AlertService>, page_size: usize) -> Model {
        Model::new(Options {
            status_message: String::new(),
            alert_service: Some(service),
            thumbnail_service: Some(Arc::new(MockThumbnailService::default())),
            realtime_events: None,
            page_size,
            video_command: vec!["mpv".into(), "%URL%".into()],
            config_path: "~/.config/medios-tui/config.yaml".into(),
            preview_records: Vec::new(),
        })
    }

    impl Model {
        fn pump_one(&mut self) {
            let message = self
                .response_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("async response");
            self.handle_async_response(message);
        }
    }

    #[test]
    fn first_page_load_populates_state_and_affordance() {
        let records: Vec<AlertRecord> = (1..=25).map(|n| record(&n.to_string(), 1)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);

        model.load_first_page();
        assert!(model.pending_load.is_some());
        model.pump_one();

        assert!(model.pending_load.is_none());
        assert_eq!(model.state.len(), 20);
        assert_eq!(model.state.offset(), 20);
        assert!(model.load_more_available);
        assert_eq!(model.placeholder, Placeholder::None);
    }

    #[test]
    fn short_page_hides_load_more() {
        let records: Vec<AlertRecord> = (1..=7).map(|n| record(&n.to_string(), 1)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);

        model.load_first_page();
        model.pump_one();

        assert_eq!(model.state.len(), 7);
        assert!(!model.load_more_available);
    }

    #[test]
    fn empty_first_page_shows_placeholder_without_error() {
        let mut model = model_with(Arc::new(MockAlertService::new(Vec::new())), 20);

        model.load_first_page();
        model.pump_one();

        assert_eq!(model.placeholder, Placeholder::Empty);
        assert!(matches!(model.status_kind, StatusKind::Info));
        assert!(model.pending_load.is_none());
    }

    #[test]
    fn failed_first_page_shows_error_placeholder_and_reenables_controls() {
        let mut model = model_with(Arc::new(FailingAlertService), 20);

        model.load_first_page();
        model.pump_one();

        match &model.placeholder {
            Placeholder::Error(message) => assert!(message.contains("connection refused")),
            other => panic!("expected error placeholder, got {other:?}"),
        }
        assert!(matches!(model.status_kind, StatusKind::Error));
        // Both controls are usable again.
        assert!(model.pending_load.is_none());
        assert_eq!(model.state.offset(), 0);
    }

    #[test]
    fn load_more_past_the_end_keeps_the_feed() {
        let records: Vec<AlertRecord> = (1..=5).map(|n| record(&n.to_string(), 1)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 5);

        model.load_first_page();
        model.pump_one();
        assert!(model.load_more_available);
        assert_eq!(model.state.offset(), 5);

        model.load_more();
        model.pump_one();

        assert_eq!(model.state.len(), 5);
        assert_eq!(model.state.offset(), 5);
        assert!(!model.load_more_available);
        assert_eq!(model.status_message, "No more alerts");
    }

    #[test]
    fn load_more_appends_and_advances_offset() {
        let records: Vec<AlertRecord> = (1..=8).map(|n| record(&n.to_string(), 1)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 5);

        model.load_first_page();
        model.pump_one();
        model.load_more();
        model.pump_one();

        assert_eq!(model.state.len(), 8);
        assert_eq!(model.state.offset(), 8);
        assert!(!model.load_more_available); // short second page
    }

    #[test]
    fn stale_responses_are_discarded() {
        let records: Vec<AlertRecord> = (1..=3).map(|n| record(&n.to_string(), 1)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);

        model.load_first_page();
        let first_request = model.pending_load.as_ref().unwrap().request_id;
        // A newer load supersedes the first one before it resolves.
        model.load_first_page();
        let second_request = model.pending_load.as_ref().unwrap().request_id;
        assert_ne!(first_request, second_request);

        model.handle_async_response(AsyncResponse::Alerts {
            request_id: first_request,
            result: Ok(vec![record("stale", 2)]),
        });
        assert!(model.state.is_empty());
        assert!(model.pending_load.is_some());

        model.handle_async_response(AsyncResponse::Alerts {
            request_id: second_request,
            result: Ok(vec![record("fresh", 3)]),
        });
        assert_eq!(model.state.len(), 1);
        assert_eq!(model.state.item(0).unwrap().id(), "fresh");

        // Drain the threads' real responses so nothing leaks between tests.
        while model.response_rx.try_recv().is_ok() {}
    }

    #[test]
    fn realtime_insert_prepends_and_notifies() {
        let records: Vec<AlertRecord> = (1..=3).map(|n| record(&n.to_string(), n)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);
        model.load_first_page();
        model.pump_one();

        model.apply_change_event(ChangeEvent::Insert(Box::new(record("nuevo", 1))));

        assert_eq!(model.state.len(), 4);
        let rows = model.visible_rows();
        assert_eq!(model.state.item(rows[0]).unwrap().id(), "nuevo");
        assert_eq!(model.status_message, "New alert received");
        // The offset only tracks fetched pages.
        assert_eq!(model.state.offset(), 3);
    }

    #[test]
    fn realtime_update_triggers_full_reload() {
        let records: Vec<AlertRecord> = (1..=3).map(|n| record(&n.to_string(), n)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);
        model.load_first_page();
        model.pump_one();
        assert_eq!(model.state.len(), 3);

        model.apply_change_event(ChangeEvent::Update);
        // The store was reset and a replace load is in flight.
        assert!(model.state.is_empty());
        assert!(matches!(
            model.pending_load.as_ref().map(|p| p.mode),
            Some(LoadMode::Replace)
        ));
        model.pump_one();
        assert_eq!(model.state.len(), 3);
    }

    #[test]
    fn late_thumbnail_for_removed_card_is_a_noop() {
        let mut model = model_with(Arc::new(MockAlertService::new(Vec::new())), 20);
        model.pending_thumbs.insert(
            "gone".to_string(),
            Arc::new(AtomicBool::new(false)),
        );
        model.handle_async_response(AsyncResponse::Thumbnail {
            video_id: "gone".to_string(),
            result: Some(ThumbnailRecord::new("gone", "data:...".into(), 3.0)),
        });
        assert!(model.pending_thumbs.is_empty());
        assert!(model.state.is_empty());
    }

    #[test]
    fn stored_thumbnail_upgrades_poster_state() {
        let mut with_video = record("1", 1);
        with_video.url_video = Some("https://cdn.example.com/clip.mp4".to_string());
        let mut model = model_with(Arc::new(MockAlertService::new(vec![with_video])), 20);
        model.load_first_page();
        model.pump_one();
        // The lookup was queued; answer it directly.
        assert!(model.pending_thumbs.contains_key("1"));
        model.handle_async_response(AsyncResponse::Thumbnail {
            video_id: "1".to_string(),
            result: Some(ThumbnailRecord::new("1", "data:...".into(), 7.5)),
        });
        assert_eq!(
            model.state.item(0).unwrap().poster,
            PosterState::Stored { offset_seconds: 7.5 }
        );
    }

    #[test]
    fn save_failure_keeps_the_applied_poster() {
        let mut with_video = record("1", 1);
        with_video.url_video = Some("https://cdn.example.com/clip.mp4".to_string());
        let mut model = model_with(Arc::new(MockAlertService::new(vec![with_video])), 20);
        model.load_first_page();
        model.pump_one();

        let frame = CapturedFrame {
            jpeg: vec![0xff, 0xd8],
            width: 320,
            height: 180,
            offset_seconds: 4.0,
            placeholder: false,
        };
        model.apply_captured_frame("1", frame);
        assert_eq!(
            model.state.item(0).unwrap().poster,
            PosterState::Captured {
                offset_seconds: 4.0,
                placeholder: false
            }
        );

        model.handle_async_response(AsyncResponse::ThumbnailSaved {
            video_id: "1".to_string(),
            result: Err(anyhow!("upstream rejected the write")),
        });
        assert!(matches!(model.status_kind, StatusKind::Error));
        assert_eq!(
            model.state.item(0).unwrap().poster,
            PosterState::Captured {
                offset_seconds: 4.0,
                placeholder: false
            }
        );
        // Drain the background save the earlier pump queued, if any.
        while model.response_rx.try_recv().is_ok() {}
    }

    #[test]
    fn filter_toggle_round_trip() {
        let records: Vec<AlertRecord> = (1..=3).map(|n| record(&n.to_string(), n)).collect();
        let mut model = model_with(Arc::new(MockAlertService::new(records)), 20);
        model.load_first_page();
        model.pump_one();

        model.apply_filter("contexto 2");
        assert_eq!(model.visible_rows().len(), 1);
        model.apply_filter("contexto 2");
        assert_eq!(model.visible_rows().len(), 3);
    }
}

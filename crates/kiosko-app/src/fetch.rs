// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};
use tracing::debug;

use crate::Page;
use crate::paging::PageWindow;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Loading,
    Loaded,
    Error(String),
}

/// One list request to issue; the sequence number identifies its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub seq: u64,
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
}

/// Drives paginated loading for one table: page moves, debounced search,
/// and stale-response suppression. Callers perform the I/O and feed results
/// back through [`FetchController::on_response`].
#[derive(Debug, Clone)]
pub struct FetchController<T> {
    window: PageWindow,
    debounce: Duration,
    search: String,
    pending_search: Option<(String, Instant)>,
    seq: u64,
    in_flight: Option<u64>,
    state: FetchState,
    rows: Vec<T>,
    torn_down: bool,
}

impl<T> FetchController<T> {
    pub fn new(page_size: u32, debounce: Duration) -> Self {
        Self {
            window: PageWindow {
                page: 1,
                page_size: page_size.max(1),
                total_count: 0,
            },
            debounce,
            search: String::new(),
            pending_search: None,
            seq: 0,
            in_flight: None,
            state: FetchState::Idle,
            rows: Vec::new(),
            torn_down: false,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn window(&self) -> PageWindow {
        self.window
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn is_loading(&self) -> bool {
        self.state == FetchState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            FetchState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn search_deadline(&self) -> Option<Instant> {
        self.pending_search.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn start(&mut self) -> Option<FetchRequest> {
        self.issue()
    }

    pub fn refresh(&mut self) -> Option<FetchRequest> {
        self.issue()
    }

    /// Jumps to `page`; out-of-range pages are ignored.
    pub fn set_page(&mut self, page: u32) -> Option<FetchRequest> {
        if !self.window.contains(page) {
            return None;
        }
        self.pending_search = None;
        self.window.page = page;
        self.issue()
    }

    pub fn next_page(&mut self) -> Option<FetchRequest> {
        if !self.window.has_next() {
            return None;
        }
        self.set_page(self.window.page + 1)
    }

    pub fn prev_page(&mut self) -> Option<FetchRequest> {
        if !self.window.has_prev() {
            return None;
        }
        self.set_page(self.window.page - 1)
    }

    /// Changing the page size returns to the first page.
    pub fn set_page_size(&mut self, page_size: u32) -> Option<FetchRequest> {
        let page_size = page_size.max(1);
        if page_size == self.window.page_size {
            return None;
        }
        self.window.page_size = page_size;
        self.window.page = 1;
        self.issue()
    }

    /// Records a new search term. Non-empty terms wait for the debounce to
    /// elapse (see [`FetchController::poll`]); clearing the term refetches
    /// the current page right away.
    pub fn set_search(&mut self, term: &str, now: Instant) -> Option<FetchRequest> {
        let term = term.trim();
        if term.is_empty() {
            self.pending_search = None;
            if self.search.is_empty() {
                return None;
            }
            self.search.clear();
            return self.issue();
        }
        self.pending_search = Some((term.to_owned(), now + self.debounce));
        None
    }

    /// Fires a debounced search once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<FetchRequest> {
        let (_, deadline) = self.pending_search.as_ref()?;
        if now < *deadline {
            return None;
        }
        let (term, _) = self.pending_search.take()?;
        self.search = term;
        self.window.page = 1;
        self.issue()
    }

    /// Applies a response. Returns false when the response is stale (a newer
    /// request was issued since) or the controller has been torn down.
    pub fn on_response(&mut self, seq: u64, result: Result<Page<T>, String>) -> bool {
        if self.torn_down || self.in_flight != Some(seq) {
            debug!(seq, latest = self.seq, torn_down = self.torn_down, "dropping response");
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(page) => {
                self.window.total_count = page.count;
                self.rows = page.results;
                self.state = FetchState::Loaded;
            }
            Err(message) => {
                self.state = FetchState::Error(message);
            }
        }
        true
    }

    /// Pulls the page back inside the collection after it shrank, e.g. a
    /// delete emptied the last page. Yields the refetch when the page moved.
    pub fn clamp_page(&mut self) -> Option<FetchRequest> {
        let last = self.window.total_pages().max(1);
        if self.window.page <= last || self.in_flight.is_some() {
            return None;
        }
        self.window.page = last;
        self.issue()
    }

    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.pending_search = None;
        self.in_flight = None;
    }

    fn issue(&mut self) -> Option<FetchRequest> {
        if self.torn_down {
            return None;
        }
        self.seq += 1;
        self.in_flight = Some(self.seq);
        self.state = FetchState::Loading;
        Some(FetchRequest {
            seq: self.seq,
            page: self.window.page,
            page_size: self.window.page_size,
            search: (!self.search.is_empty()).then(|| self.search.clone()),
        })
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::app::{ChanError, Result};
use crate::domain::{BoardDescriptor, BoardPage, BoardPages, ChanBoard, PostDescriptor, ThreadDescriptor};
use crate::manager::{BoardManager, SiteManager};
use crate::sync::LatestSignal;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LAST_PAGE_NOTIFY_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct PagesState {
    pages: HashMap<BoardDescriptor, BoardPages>,
    in_flight: HashSet<BoardDescriptor>,
    /// Stamped when a fetch starts rather than when it succeeds, so a failing
    /// board is retried at most once per update interval.
    last_attempt: HashMap<BoardDescriptor, Instant>,
    last_alert: HashMap<ThreadDescriptor, Instant>,
}

/// Caches board page indexes and refreshes them lazily in the background.
pub struct PageRequestManager {
    site_manager: Arc<SiteManager>,
    board_manager: Arc<BoardManager>,
    state: Mutex<PagesState>,
    update_interval: Duration,
    notify_interval: Duration,
    updates: LatestSignal,
}

impl PageRequestManager {
    pub fn new(site_manager: Arc<SiteManager>, board_manager: Arc<BoardManager>) -> Self {
        Self::with_intervals(
            site_manager,
            board_manager,
            DEFAULT_UPDATE_INTERVAL,
            DEFAULT_LAST_PAGE_NOTIFY_INTERVAL,
        )
    }

    pub fn with_intervals(
        site_manager: Arc<SiteManager>,
        board_manager: Arc<BoardManager>,
        update_interval: Duration,
        notify_interval: Duration,
    ) -> Self {
        Self {
            site_manager,
            board_manager,
            state: Mutex::new(PagesState::default()),
            update_interval,
            notify_interval,
            updates: LatestSignal::new(),
        }
    }

    /// Page currently holding `thread`, from cache. A missing or stale cache
    /// schedules a background fetch; the cached value is still returned.
    pub fn get_page(self: &Arc<Self>, thread: &ThreadDescriptor) -> Option<BoardPage> {
        let (page, needs_update) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let page = state
                .pages
                .get(&thread.board)
                .and_then(|pages| pages.find_page(thread.thread_no))
                .cloned();
            let needs_update = match state.last_attempt.get(&thread.board) {
                Some(at) => at.elapsed() >= self.update_interval,
                None => true,
            };
            (page, needs_update)
        };

        if needs_update {
            self.request_board(&thread.board);
        }

        page
    }

    pub fn get_page_for_post(self: &Arc<Self>, op: &PostDescriptor) -> Option<BoardPage> {
        self.get_page(&op.thread)
    }

    /// True when `thread` sits on its board's last page and no alert was
    /// raised for it within the notify interval.
    pub fn can_alert_about_last_page(self: &Arc<Self>, thread: &ThreadDescriptor) -> bool {
        let Some(page) = self.get_page(thread) else {
            return false;
        };

        if !page.is_on_last_page() {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match state.last_alert.get(thread) {
            Some(at) if now.duration_since(*at) < self.notify_interval => false,
            _ => {
                state.last_alert.insert(thread.clone(), now);
                true
            }
        }
    }

    pub fn force_update_for_board(self: &Arc<Self>, board: &BoardDescriptor) {
        self.request_board(board);
    }

    pub fn listen_for_pages_updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn request_board(self: &Arc<Self>, board: &BoardDescriptor) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.in_flight.insert(board.clone()) {
                debug!("Pages of {} are already being fetched", board);
                return;
            }
            state.last_attempt.insert(board.clone(), Instant::now());
        }

        let this = self.clone();
        let board = board.clone();

        tokio::spawn(async move {
            let result = this.fetch_pages(&board).await;

            let mut state = this.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight.remove(&board);

            match result {
                Ok(pages) => {
                    debug!("Fetched {} pages of {}", pages.pages.len(), board);
                    state.pages.insert(board, pages);
                    drop(state);
                    this.updates.notify();
                }
                Err(e) => warn!("Failed to fetch pages of {}: {}", board, e),
            }
        });
    }

    async fn fetch_pages(&self, board: &BoardDescriptor) -> Result<BoardPages> {
        let site = self
            .site_manager
            .by_site_descriptor(&board.site)?
            .ok_or_else(|| ChanError::SiteNotFound(board.site.to_string()))?;

        let chan_board = self
            .board_manager
            .by_board_descriptor(board)
            .unwrap_or_else(|| ChanBoard::new(board.clone(), board.board_code.clone()));

        site.actions().pages(&chan_board).await.into_result()
    }
}

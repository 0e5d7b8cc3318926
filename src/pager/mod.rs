use thiserror::Error;

use crate::api::{PageRequest, PageResponse, UserRecord};

/// Lifecycle of the page fetch machine. There is no retained error phase: a
/// failed fetch drops back to the last known-good phase and recovery takes a
/// fresh, explicit fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagerPhase {
    Idle,
    Loading,
    Loaded,
}

/// Issued by [`Pager::begin`], one per fetch, strictly increasing. Only the
/// most recently issued ticket may apply its response; anything older is a
/// stale response and gets discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug, Error)]
#[error("page {page} is out of range (valid: 1..={max})")]
pub struct PageOutOfRange {
    pub page: u32,
    pub max: u32,
}

/// The records of the most recent successful fetch, replaced atomically.
#[derive(Clone, Debug, Default)]
pub struct PageCache {
    pub users: Vec<UserRecord>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationSnapshot {
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Pagination state machine. Tracks the current page (1-indexed), the
/// server-reported totals, and the active filter values. The server is the
/// sole source of truth for totals; nothing is computed locally.
pub struct Pager {
    phase: PagerPhase,
    page_size: u32,
    current_page: u32,
    total_pages: Option<u32>,
    total_count: u64,
    courses: Vec<String>,
    cache: PageCache,
    last_issued: u64,
    last_applied: u64,
}

impl Pager {
    pub fn new(page_size: u32) -> Self {
        Self {
            phase: PagerPhase::Idle,
            page_size,
            current_page: 1,
            total_pages: None,
            total_count: 0,
            courses: Vec::new(),
            cache: PageCache::default(),
            last_issued: 0,
            last_applied: 0,
        }
    }

    pub fn phase(&self) -> PagerPhase {
        self.phase
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn filter(&self) -> &[String] {
        &self.courses
    }

    /// Ids of the records currently on screen, in display order.
    pub fn page_ids(&self) -> Vec<u64> {
        self.cache.users.iter().map(|u| u.user_id).collect()
    }

    /// Before the first load only page 1 is requestable; afterwards the
    /// valid range is `1..=max(total_pages, 1)`.
    pub fn can_request(&self, page: u32) -> bool {
        match self.total_pages {
            None => page == 1,
            Some(total) => page >= 1 && page <= total.max(1),
        }
    }

    /// Replaces the active filter values and forces the next fetch back to
    /// page 1: page validity depends on the filtered result count, so the
    /// old totals are no longer trustworthy.
    pub fn set_filter(&mut self, courses: Vec<String>) {
        self.courses = courses;
        self.current_page = 1;
        self.total_pages = None;
    }

    /// Starts a fetch for `page`, handing out the request parameters and the
    /// ticket that the response must present to [`Pager::apply`].
    pub fn begin(&mut self, page: u32) -> Result<(FetchTicket, PageRequest), PageOutOfRange> {
        if !self.can_request(page) {
            return Err(PageOutOfRange {
                page,
                max: self.total_pages.unwrap_or(1).max(1),
            });
        }
        self.last_issued += 1;
        self.phase = PagerPhase::Loading;
        Ok((
            FetchTicket(self.last_issued),
            PageRequest {
                page,
                per_page: self.page_size,
                courses: self.courses.clone(),
            },
        ))
    }

    /// Applies a fetch response. Returns false and leaves all state untouched
    /// when the ticket is not the latest issued one (stale response).
    pub fn apply(&mut self, ticket: FetchTicket, response: PageResponse) -> bool {
        if ticket.0 != self.last_issued {
            return false;
        }
        self.last_applied = ticket.0;
        self.current_page = response.pagination.page;
        self.total_pages = Some(response.pagination.total_pages);
        self.total_count = response.pagination.total;
        self.cache = PageCache {
            users: response.users,
            page: response.pagination.page,
            total_pages: response.pagination.total_pages,
            total_count: response.pagination.total,
        };
        self.phase = PagerPhase::Loaded;
        true
    }

    /// Records a failed fetch. Pagination state and cache stay at the last
    /// known-good values; only the phase leaves `Loading`. A stale failure
    /// (superseded ticket) is ignored entirely.
    pub fn fail(&mut self, ticket: FetchTicket) -> bool {
        if ticket.0 != self.last_issued {
            return false;
        }
        self.phase = if self.last_applied == 0 {
            PagerPhase::Idle
        } else {
            PagerPhase::Loaded
        };
        true
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        let total_pages = self.total_pages.unwrap_or(0);
        PaginationSnapshot {
            page: self.current_page,
            total_pages,
            total_count: self.total_count,
            has_previous: self.current_page > 1,
            has_next: total_pages > 0 && self.current_page < total_pages,
        }
    }
}

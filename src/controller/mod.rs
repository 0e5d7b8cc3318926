use thiserror::Error;

use crate::api::{ApiError, ListApi};
use crate::events::{ControllerEvent, EventSink};
use crate::export::ExportArtifact;
use crate::pager::{PageOutOfRange, Pager, PaginationSnapshot};
use crate::selection::SelectionStore;
use crate::storage::StateSlot;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no users selected, nothing to export")]
    EmptySelection,

    #[error(transparent)]
    PageOutOfRange(#[from] PageOutOfRange),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Keeps the durable cross-page selection consistent with the server-paginated
/// record stream, and reconciles both with the per-page select-all control.
///
/// Generic over the list service and the durable slot so it runs headless in
/// tests: every state change goes out through [`EventSink`] and the rendering
/// layer is free to not exist.
pub struct Controller<A: ListApi, S: StateSlot> {
    api: A,
    selection: SelectionStore<S>,
    pager: Pager,
    events: EventSink,
}

impl<A: ListApi, S: StateSlot> Controller<A, S> {
    pub fn new(api: A, slot: S, page_size: u32, events: EventSink) -> Self {
        Self {
            api,
            selection: SelectionStore::new(slot),
            pager: Pager::new(page_size),
            events,
        }
    }

    /// Loads the persisted selection (degrading to empty on a bad slot) and
    /// fetches the first page.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        if let Err(e) = self.selection.load() {
            self.events.emit(ControllerEvent::StorageDegraded {
                message: e.to_string(),
            });
        }
        self.emit_selection_changed();
        self.request_page(1).await
    }

    /// Fetches `page` with the current filter. On success the page cache and
    /// pagination fields are replaced atomically; on failure everything stays
    /// at the last known-good state and the error is surfaced as an event.
    pub async fn request_page(&mut self, page: u32) -> Result<(), ControllerError> {
        let (ticket, request) = self.pager.begin(page)?;
        self.events.emit(ControllerEvent::PageLoading { page });
        match self.api.fetch_page(&request).await {
            Ok(response) => {
                if self.pager.apply(ticket, response) {
                    self.events.emit(ControllerEvent::PageReplaced {
                        users: self.pager.cache().users.clone(),
                        selected_ids: self.selected_on_page(),
                        pagination: self.pager.snapshot(),
                    });
                    self.events.emit(ControllerEvent::PaginationChanged {
                        pagination: self.pager.snapshot(),
                    });
                    self.emit_selection_changed();
                }
                Ok(())
            }
            Err(e) => {
                self.pager.fail(ticket);
                self.events.emit(ControllerEvent::FetchFailed {
                    message: e.to_string(),
                });
                Err(ControllerError::Api(e))
            }
        }
    }

    pub async fn next_page(&mut self) -> Result<(), ControllerError> {
        let snapshot = self.pager.snapshot();
        if !snapshot.has_next {
            return Err(PageOutOfRange {
                page: snapshot.page + 1,
                max: snapshot.total_pages.max(1),
            }
            .into());
        }
        self.request_page(snapshot.page + 1).await
    }

    pub async fn previous_page(&mut self) -> Result<(), ControllerError> {
        let snapshot = self.pager.snapshot();
        if !snapshot.has_previous {
            return Err(PageOutOfRange {
                page: 0,
                max: snapshot.total_pages.max(1),
            }
            .into());
        }
        self.request_page(snapshot.page - 1).await
    }

    /// Sets the filter the very first fetch will use. Meant to be called
    /// before [`Controller::start`]; does not fetch anything itself.
    pub fn seed_filter(&mut self, courses: Vec<String>) {
        self.pager.set_filter(courses);
    }

    /// Replaces the filter values and fetches page 1. An empty list means no
    /// filter; values are passed through to the server verbatim.
    pub async fn apply_filter(
        &mut self,
        courses: Vec<String>,
    ) -> Result<(), ControllerError> {
        self.pager.set_filter(courses);
        self.request_page(1).await
    }

    /// Selects or deselects one id, persisting write-through. A failed
    /// persist is reported and swallowed: the in-memory selection stays
    /// authoritative for the session.
    pub fn toggle(&mut self, id: u64, selected: bool) {
        if let Err(e) = self.selection.toggle(id, selected) {
            self.events.emit(ControllerEvent::StorageDegraded {
                message: e.to_string(),
            });
        }
        self.emit_selection_changed();
    }

    /// Select/deselect every record on the current page. Page-scoped by
    /// construction: ids not on this page are never touched, so selections
    /// made on other pages survive.
    pub fn toggle_all_on_page(&mut self, selected: bool) {
        for id in self.pager.page_ids() {
            self.toggle(id, selected);
        }
    }

    /// True iff every record on the current page is selected. An empty page
    /// is never "fully selected" (the select-all control is disabled then).
    pub fn is_page_fully_selected(&self) -> bool {
        let ids = self.pager.page_ids();
        !ids.is_empty() && ids.iter().all(|id| self.selection.contains(*id))
    }

    pub fn selected_count(&self) -> usize {
        self.selection.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.selection.contains(id)
    }

    pub fn pagination(&self) -> PaginationSnapshot {
        self.pager.snapshot()
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Sends the full selection snapshot to the export endpoint. Preconditions
    /// are checked before any request goes out; a failed export leaves the
    /// selection intact and nothing is downloaded.
    pub async fn export(&self) -> Result<ExportArtifact, ControllerError> {
        if self.selection.is_empty() {
            self.events.emit(ControllerEvent::ExportFailed {
                message: "no users selected, nothing to export".to_string(),
            });
            return Err(ControllerError::EmptySelection);
        }
        let ids = self.selection.snapshot_ids();
        match self.api.export_users(&ids).await {
            Ok(bytes) => Ok(ExportArtifact::new(bytes)),
            Err(e) => {
                self.events.emit(ControllerEvent::ExportFailed {
                    message: e.to_string(),
                });
                Err(ControllerError::Api(e))
            }
        }
    }

    fn selected_on_page(&self) -> Vec<u64> {
        self.pager
            .page_ids()
            .into_iter()
            .filter(|id| self.selection.contains(*id))
            .collect()
    }

    fn emit_selection_changed(&self) {
        self.events.emit(ControllerEvent::SelectionChanged {
            selected_total: self.selection.len(),
            selected_on_page: self.selected_on_page(),
            page_fully_selected: self.is_page_fully_selected(),
        });
    }
}

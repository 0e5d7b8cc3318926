use tokio::sync::mpsc;

use crate::api::UserRecord;
use crate::pager::PaginationSnapshot;

/// State-change notifications for the rendering layer. Each variant carries
/// enough data to redraw without querying the controller back.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    PageLoading {
        page: u32,
    },
    PageReplaced {
        users: Vec<UserRecord>,
        selected_ids: Vec<u64>,
        pagination: PaginationSnapshot,
    },
    PaginationChanged {
        pagination: PaginationSnapshot,
    },
    SelectionChanged {
        selected_total: usize,
        selected_on_page: Vec<u64>,
        page_fully_selected: bool,
    },
    FetchFailed {
        message: String,
    },
    ExportFailed {
        message: String,
    },
    StorageDegraded {
        message: String,
    },
}

/// Sender half of the controller's notification channel. Emitting never
/// fails: with no receiver attached (headless use, tests) events are
/// silently dropped.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ControllerEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

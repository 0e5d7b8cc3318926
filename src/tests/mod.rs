use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{ApiError, ListApi, PageInfo, PageRequest, PageResponse, UserRecord};
use crate::controller::{Controller, ControllerError};
use crate::events::{ControllerEvent, EventSink};
use crate::pager::{Pager, PagerPhase};
use crate::selection::SelectionStore;
use crate::storage::{FileSlot, StateSlot, StorageError};

const NO_COURSE: &str = "Sin curso";

fn make_user(id: u64) -> UserRecord {
    let course_codes = match id % 3 {
        0 => String::new(),
        1 => "MAT101".to_string(),
        _ => "MAT101, FIS201".to_string(),
    };
    let num_courses = if course_codes.is_empty() {
        0
    } else {
        course_codes.split(", ").count() as u32
    };
    UserRecord {
        user_id: id,
        name: format!("User {id}"),
        email: format!("user{id}@example.edu"),
        created_at: "2023-01-15".to_string(),
        last_login: "2024-06-01".to_string(),
        num_courses,
        course_codes,
    }
}

fn matches_filter(user: &UserRecord, courses: &[String]) -> bool {
    if courses.is_empty() {
        return true;
    }
    courses.iter().any(|course| {
        if course == NO_COURSE {
            user.num_courses == 0
        } else {
            user.course_codes.split(", ").any(|c| c == course)
        }
    })
}

#[derive(Default)]
struct MockState {
    users: Vec<UserRecord>,
    requests: Mutex<Vec<PageRequest>>,
    exports: Mutex<Vec<Vec<u64>>>,
    fail_fetch: AtomicBool,
}

/// In-memory stand-in for the remote list service, with the same pagination
/// and course-filter semantics as the real server.
#[derive(Clone, Default)]
struct MockApi {
    state: Arc<MockState>,
}

impl MockApi {
    fn with_users(count: u64) -> Self {
        Self {
            state: Arc::new(MockState {
                users: (1..=count).map(make_user).collect(),
                ..MockState::default()
            }),
        }
    }

    fn fail_fetches(&self, fail: bool) {
        self.state.fail_fetch.store(fail, Ordering::SeqCst);
    }

    fn page_requests(&self) -> Vec<PageRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    fn export_requests(&self) -> Vec<Vec<u64>> {
        self.state.exports.lock().unwrap().clone()
    }
}

impl ListApi for MockApi {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, ApiError> {
        self.state.requests.lock().unwrap().push(request.clone());
        if self.state.fail_fetch.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                url: "mock://api/users".to_string(),
                status: 503,
            });
        }
        let filtered: Vec<UserRecord> = self
            .state
            .users
            .iter()
            .filter(|u| matches_filter(u, &request.courses))
            .cloned()
            .collect();
        let total = filtered.len() as u64;
        let per_page = request.per_page.max(1);
        let total_pages = total.div_ceil(u64::from(per_page)) as u32;
        let start = (request.page.saturating_sub(1) * per_page) as usize;
        let users: Vec<UserRecord> = filtered
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();
        Ok(PageResponse {
            users,
            pagination: PageInfo {
                page: request.page,
                per_page,
                total,
                total_pages,
            },
        })
    }

    async fn fetch_courses(&self) -> Result<Vec<String>, ApiError> {
        let mut courses: Vec<String> = self
            .state
            .users
            .iter()
            .flat_map(|u| u.course_codes.split(", "))
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        courses.sort();
        courses.insert(0, NO_COURSE.to_string());
        Ok(courses)
    }

    async fn export_users(&self, ids: &[u64]) -> Result<Vec<u8>, ApiError> {
        self.state.exports.lock().unwrap().push(ids.to_vec());
        Ok(b"user_id,name,email\n".to_vec())
    }
}

#[derive(Default)]
struct MemorySlotState {
    data: Mutex<Vec<u64>>,
    fail_save: AtomicBool,
}

#[derive(Clone, Default)]
struct MemorySlot {
    state: Arc<MemorySlotState>,
}

impl MemorySlot {
    fn fail_saves(&self, fail: bool) {
        self.state.fail_save.store(fail, Ordering::SeqCst);
    }

    fn stored(&self) -> Vec<u64> {
        self.state.data.lock().unwrap().clone()
    }
}

impl StateSlot for MemorySlot {
    fn load(&self) -> Result<Vec<u64>, StorageError> {
        Ok(self.state.data.lock().unwrap().clone())
    }

    fn save(&self, ids: &[u64]) -> Result<(), StorageError> {
        if self.state.fail_save.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                path: "memory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "slot unavailable"),
            });
        }
        *self.state.data.lock().unwrap() = ids.to_vec();
        Ok(())
    }
}

fn controller_with(
    count: u64,
    page_size: u32,
) -> (Controller<MockApi, MemorySlot>, MockApi, MemorySlot) {
    let api = MockApi::with_users(count);
    let slot = MemorySlot::default();
    let controller = Controller::new(
        api.clone(),
        slot.clone(),
        page_size,
        EventSink::disconnected(),
    );
    (controller, api, slot)
}

fn page_response(page: u32, total: u64, per_page: u32) -> PageResponse {
    let total_pages = total.div_ceil(u64::from(per_page)) as u32;
    let start = u64::from((page - 1) * per_page);
    let end = (start + u64::from(per_page)).min(total);
    PageResponse {
        users: (start + 1..=end).map(make_user).collect(),
        pagination: PageInfo {
            page,
            per_page,
            total,
            total_pages,
        },
    }
}

#[test]
fn randomized_toggle_sequences_match_reference_set() {
    let slot = MemorySlot::default();
    let mut store = SelectionStore::new(slot.clone());
    let mut reference: HashSet<u64> = HashSet::new();

    // xorshift keeps the sequence deterministic across runs
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    for _ in 0..2000 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let id = seed % 40;
        let selected = (seed >> 8) % 2 == 0;
        store.toggle(id, selected).unwrap();
        if selected {
            reference.insert(id);
        } else {
            reference.remove(&id);
        }
    }

    assert_eq!(store.len(), reference.len());
    for id in 0..40 {
        assert_eq!(store.contains(id), reference.contains(&id), "id {id}");
    }
    // the durable copy is never older than the last returned toggle
    assert_eq!(slot.stored(), store.snapshot_ids());
}

#[tokio::test]
async fn selection_survives_page_navigation() {
    let (mut controller, _, _) = controller_with(120, 50);
    controller.start().await.unwrap();

    controller.toggle(5, true);
    controller.request_page(2).await.unwrap();
    assert!(controller.contains(5));

    controller.request_page(1).await.unwrap();
    assert!(controller.contains(5));
    assert!(controller.pager().page_ids().contains(&5));
}

#[tokio::test]
async fn toggle_all_on_page_round_trips() {
    let (mut controller, _, _) = controller_with(120, 50);
    controller.start().await.unwrap();

    // selections made on other pages beforehand
    controller.toggle(60, true);
    controller.toggle(110, true);
    let page_len = controller.pager().page_ids().len();
    assert_eq!(page_len, 50);

    controller.toggle_all_on_page(true);
    assert!(controller.is_page_fully_selected());
    assert_eq!(controller.selected_count(), page_len + 2);

    controller.toggle_all_on_page(false);
    assert!(!controller.is_page_fully_selected());
    assert!(controller
        .pager()
        .page_ids()
        .iter()
        .all(|id| !controller.contains(*id)));
    // off-page selections are untouched
    assert!(controller.contains(60));
    assert!(controller.contains(110));
    assert_eq!(controller.selected_count(), 2);
}

#[tokio::test]
async fn changing_filter_always_requests_page_one() {
    let (mut controller, api, _) = controller_with(200, 50);
    controller.start().await.unwrap();
    controller.request_page(3).await.unwrap();
    assert_eq!(controller.pagination().page, 3);

    controller
        .apply_filter(vec!["MAT101".to_string()])
        .await
        .unwrap();

    let last = api.page_requests().last().cloned().unwrap();
    assert_eq!(last.page, 1);
    assert_eq!(last.courses, vec!["MAT101".to_string()]);
    assert_eq!(controller.pagination().page, 1);
}

#[tokio::test]
async fn filtered_pages_only_contain_matching_users() {
    let (mut controller, _, _) = controller_with(90, 50);
    controller.start().await.unwrap();
    controller
        .apply_filter(vec![NO_COURSE.to_string()])
        .await
        .unwrap();

    let cache = controller.pager().cache();
    assert!(!cache.users.is_empty());
    assert!(cache.users.iter().all(|u| u.num_courses == 0));
}

#[test]
fn stale_response_cannot_overwrite_newer_page() {
    let mut pager = Pager::new(50);

    let (first, _) = pager.begin(1).unwrap();
    assert!(pager.apply(first, page_response(1, 500, 50)));

    let (older, _) = pager.begin(2).unwrap();
    let (newer, _) = pager.begin(3).unwrap();

    assert!(pager.apply(newer, page_response(3, 500, 50)));
    // page 2's response arrives after page 3's and must be discarded
    assert!(!pager.apply(older, page_response(2, 500, 50)));

    assert_eq!(pager.cache().page, 3);
    assert_eq!(pager.snapshot().page, 3);
    assert_eq!(pager.phase(), PagerPhase::Loaded);
}

#[test]
fn page_requests_are_clamped_to_known_range() {
    let mut pager = Pager::new(50);

    // before the first load only page 1 is requestable
    assert!(pager.begin(2).is_err());
    let (ticket, request) = pager.begin(1).unwrap();
    assert_eq!(request.page, 1);
    assert!(pager.apply(ticket, page_response(1, 120, 50)));

    assert!(pager.begin(3).is_ok());
    assert!(pager.begin(0).is_err());
    assert!(pager.begin(4).is_err());
}

#[test]
fn empty_result_keeps_page_one_requestable() {
    let mut pager = Pager::new(50);
    let (ticket, _) = pager.begin(1).unwrap();
    assert!(pager.apply(ticket, page_response(1, 0, 50)));

    assert_eq!(pager.snapshot().page, 1);
    assert!(!pager.snapshot().has_next);
    assert!(!pager.snapshot().has_previous);
    assert!(pager.begin(1).is_ok());
    assert!(pager.begin(2).is_err());
}

#[tokio::test]
async fn failed_fetch_leaves_state_unchanged() {
    let (mut controller, api, _) = controller_with(120, 50);
    controller.start().await.unwrap();

    api.fail_fetches(true);
    let result = controller.request_page(2).await;
    assert!(matches!(result, Err(ControllerError::Api(_))));
    assert_eq!(controller.pagination().page, 1);
    assert_eq!(controller.pager().cache().page, 1);
    assert_eq!(controller.pager().phase(), PagerPhase::Loaded);

    // recovery takes a fresh, explicit fetch
    api.fail_fetches(false);
    controller.request_page(2).await.unwrap();
    assert_eq!(controller.pagination().page, 2);
}

#[tokio::test]
async fn export_with_empty_selection_sends_no_request() {
    let (mut controller, api, _) = controller_with(10, 50);
    controller.start().await.unwrap();

    let result = controller.export().await;
    assert!(matches!(result, Err(ControllerError::EmptySelection)));
    assert!(api.export_requests().is_empty());
}

#[tokio::test]
async fn export_sends_exactly_the_selected_ids() {
    let (mut controller, api, _) = controller_with(120, 50);
    controller.start().await.unwrap();
    controller.toggle(7, true);
    controller.toggle(42, true);

    let artifact = controller.export().await.unwrap();

    let exports = api.export_requests();
    assert_eq!(exports.len(), 1);
    let sent: HashSet<u64> = exports[0].iter().copied().collect();
    assert_eq!(sent, HashSet::from([7, 42]));
    assert!(!artifact.bytes.is_empty());
    assert!(artifact.filename.starts_with("backup_users_"));
    assert!(artifact.filename.ends_with(".csv"));
}

#[tokio::test]
async fn persist_failure_keeps_in_memory_selection() {
    let (mut controller, _, slot) = controller_with(50, 50);
    controller.start().await.unwrap();

    slot.fail_saves(true);
    controller.toggle(9, true);
    assert!(controller.contains(9));
    assert_eq!(slot.stored(), Vec::<u64>::new());

    // the next successful persist writes the authoritative in-memory set
    slot.fail_saves(false);
    controller.toggle(10, true);
    assert_eq!(slot.stored(), vec![9, 10]);
}

#[tokio::test]
async fn empty_page_is_never_fully_selected() {
    let (mut controller, _, _) = controller_with(0, 50);
    controller.start().await.unwrap();
    assert!(!controller.is_page_fully_selected());
    controller.toggle_all_on_page(true);
    assert_eq!(controller.selected_count(), 0);
}

#[tokio::test]
async fn events_carry_enough_data_to_redraw() {
    let api = MockApi::with_users(120);
    let slot = MemorySlot::default();
    let (sink, mut rx) = EventSink::channel();
    let mut controller = Controller::new(api, slot, 50, sink);
    controller.toggle(3, true);
    controller.start().await.unwrap();

    let mut saw_replaced = false;
    let mut saw_pagination = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            ControllerEvent::PageReplaced {
                users,
                selected_ids,
                pagination,
            } => {
                saw_replaced = true;
                assert_eq!(users.len(), 50);
                assert_eq!(selected_ids, vec![3]);
                assert_eq!(pagination.total_count, 120);
            }
            ControllerEvent::PaginationChanged { pagination } => {
                saw_pagination = true;
                assert_eq!(pagination.total_pages, 3);
                assert!(pagination.has_next);
                assert!(!pagination.has_previous);
            }
            _ => {}
        }
    }
    assert!(saw_replaced);
    assert!(saw_pagination);
}

#[test]
fn malformed_state_file_degrades_to_empty_selection() {
    let path = std::env::temp_dir().join(format!(
        "pagepick-test-malformed-{}.json",
        std::process::id()
    ));
    std::fs::write(&path, "definitely not json").unwrap();

    let mut store = SelectionStore::new(FileSlot::new(&path));
    assert!(store.load().is_err());
    assert_eq!(store.len(), 0);

    // still usable: the next toggle persists a fresh, valid slot
    store.toggle(1, true).unwrap();
    let reloaded = FileSlot::new(&path).load().unwrap();
    assert_eq!(reloaded, vec![1]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn file_slot_round_trips_and_leaves_no_temp_file() {
    let dir = std::env::temp_dir().join(format!("pagepick-test-slot-{}", std::process::id()));
    let path = dir.join("selection.json");
    let slot = FileSlot::new(&path);

    assert_eq!(slot.load().unwrap(), Vec::<u64>::new());
    slot.save(&[7, 42, 1067]).unwrap();
    assert_eq!(slot.load().unwrap(), vec![7, 42, 1067]);
    assert!(!path.with_extension("json.tmp").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

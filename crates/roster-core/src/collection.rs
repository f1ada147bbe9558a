//! A reusable collection screen: one instance per list (employees, vacant
//! positions, archive), generic over the row type.
//!
//! The view owns the search text, filters, sort and pagination, folds them
//! into a [`CanonicalQuery`] on every change and hands it to its
//! [`FetchGate`]. Each issued fetch gets a ticket; a result is applied only
//! if its ticket is still the newest one issued, so a slow response can
//! never overwrite fresher rows.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{CollectionSource, Page, PageInfo};
use crate::bulk::{BulkMutationCoordinator, BulkMutationPlan, BulkOutcome};
use crate::config::{BulkConfig, FetchConfig, RosterConfig};
use crate::error::{ApiError, QueryError};
use crate::fetch::{FetchGate, FetchMode, IssueFn, ScheduleOutcome};
use crate::lock;
use crate::model::{EmployeeId, Keyed, TagId, Tagged};
use crate::query::{CanonicalQuery, FilterValue, Pagination, QueryBuilder};
use crate::selection::{SelectAllEffect, SelectionSet, VisibleSelection};
use crate::sort::{SortEntry, SortState};

/// What happened to a fetch result on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The newest fetch failed; rows were kept and the error recorded.
    Failed,
    /// A newer fetch was issued after this one; the result was dropped.
    Stale,
    TornDown,
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot<R> {
    pub rows: Vec<R>,
    pub page_info: Option<PageInfo>,
    pub last_error: Option<ApiError>,
    pub loading: bool,
    /// Increments every time a result is applied.
    pub version: u64,
}

struct Displayed<R: Keyed> {
    rows: Vec<R>,
    page_info: Option<PageInfo>,
    last_error: Option<ApiError>,
    issued_ticket: u64,
    applied_ticket: u64,
    version: u64,
    selection: SelectionSet<R::Key>,
    /// Last seen version of every visible or selected row, so plans can be
    /// built for selections spanning pages.
    index: BTreeMap<R::Key, R>,
    torn_down: bool,
}

impl<R: Keyed + Clone> Displayed<R> {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            page_info: None,
            last_error: None,
            issued_ticket: 0,
            applied_ticket: 0,
            version: 0,
            selection: SelectionSet::new(),
            index: BTreeMap::new(),
            torn_down: false,
        }
    }

    fn begin(&mut self) -> u64 {
        self.issued_ticket += 1;
        self.issued_ticket
    }

    fn apply(&mut self, ticket: u64, result: Result<Page<R>, ApiError>) -> ApplyOutcome {
        if self.torn_down {
            return ApplyOutcome::TornDown;
        }
        if ticket != self.issued_ticket {
            return ApplyOutcome::Stale;
        }
        self.applied_ticket = ticket;
        self.version += 1;

        match result {
            Ok(page) => {
                self.rows = page.results;
                self.page_info = Some(page.pagination);
                self.last_error = None;
                self.reindex();
                ApplyOutcome::Applied
            }
            Err(error) => {
                self.last_error = Some(error);
                ApplyOutcome::Failed
            }
        }
    }

    fn reindex(&mut self) {
        let selection = &self.selection;
        self.index.retain(|key, _| selection.is_selected(key));
        for row in &self.rows {
            self.index.insert(row.key(), row.clone());
        }
    }

    fn visible_keys(&self) -> Vec<R::Key> {
        self.rows.iter().map(Keyed::key).collect()
    }

    const fn loading(&self) -> bool {
        self.issued_ticket != self.applied_ticket
    }
}

type Shared<R> = Arc<Mutex<Displayed<R>>>;

pub struct CollectionView<S: CollectionSource> {
    source: Arc<S>,
    settings: FetchConfig,
    bulk: BulkConfig,
    search: String,
    filters: BTreeMap<String, FilterValue>,
    sort: SortState,
    pagination: Pagination,
    gate: FetchGate,
    shared: Shared<S::Row>,
    changes: Arc<watch::Sender<u64>>,
}

impl<S: CollectionSource> CollectionView<S> {
    #[must_use]
    pub fn new(source: Arc<S>, config: &RosterConfig) -> Self {
        let settings = &config.fetch;
        let shared: Shared<S::Row> = Arc::new(Mutex::new(Displayed::new()));
        let (changes, _) = watch::channel(0);
        let changes = Arc::new(changes);
        let gate = FetchGate::new(issue_fn(
            Arc::clone(&source),
            Arc::clone(&shared),
            Arc::clone(&changes),
        ));

        Self {
            source,
            settings: settings.clone(),
            bulk: config.bulk.clone(),
            search: String::new(),
            filters: BTreeMap::new(),
            sort: SortState::new(),
            pagination: Pagination::first_page(settings.default_page_size).unwrap_or_default(),
            gate,
            shared,
            changes,
        }
    }

    #[must_use]
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The canonical query for the current state.
    #[must_use]
    pub fn query(&self) -> CanonicalQuery {
        QueryBuilder::build(&self.search, &self.filters, &self.sort, self.pagination)
    }

    // -----------------------------------------------------------------------
    // Query state
    // -----------------------------------------------------------------------

    /// Initial load.
    pub fn load(&self) -> ScheduleOutcome {
        self.schedule(FetchMode::Immediate)
    }

    /// Search box keystroke; debounced.
    pub fn set_search(&mut self, text: impl Into<String>) -> ScheduleOutcome {
        self.search = text.into();
        self.pagination = self.pagination.reset();
        self.schedule(FetchMode::Debounced(self.settings.search_debounce()))
    }

    /// Enter in the search box or a picked suggestion; immediate.
    pub fn submit_search(&self) -> ScheduleOutcome {
        self.schedule(FetchMode::Immediate)
    }

    /// Set a filter; an empty value removes it. Debounced so checkbox
    /// bursts coalesce.
    pub fn set_filter(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> ScheduleOutcome {
        let key = key.into();
        let value = value.into();
        if value.is_empty() {
            self.filters.remove(&key);
        } else {
            self.filters.insert(key, value);
        }
        self.pagination = self.pagination.reset();
        self.schedule(FetchMode::Debounced(self.settings.filter_debounce()))
    }

    pub fn clear_filter(&mut self, key: &str) -> ScheduleOutcome {
        self.filters.remove(key);
        self.pagination = self.pagination.reset();
        self.schedule(FetchMode::Debounced(self.settings.filter_debounce()))
    }

    /// The "reset filters" button; immediate.
    pub fn clear_filters(&mut self) -> ScheduleOutcome {
        self.filters.clear();
        self.search.clear();
        self.pagination = self.pagination.reset();
        self.schedule(FetchMode::Immediate)
    }

    /// Column header click; immediate.
    pub fn toggle_sort(&mut self, field: &str, with_modifier: bool) -> ScheduleOutcome {
        self.sort.toggle(field, with_modifier);
        self.pagination = self.pagination.reset();
        self.schedule(FetchMode::Immediate)
    }

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPagination`] for page 0.
    pub fn set_page(&mut self, page: u32) -> Result<ScheduleOutcome, QueryError> {
        self.pagination = Pagination::new(page, self.pagination.page_size())?;
        Ok(self.schedule(FetchMode::Immediate))
    }

    /// # Errors
    ///
    /// Returns an error for a zero size or one above `max_page_size`.
    pub fn set_page_size(&mut self, page_size: u32) -> Result<ScheduleOutcome, QueryError> {
        if page_size > self.settings.max_page_size {
            return Err(QueryError::PageSizeTooLarge {
                page_size,
                max: self.settings.max_page_size,
            });
        }
        self.pagination = Pagination::first_page(page_size)?;
        Ok(self.schedule(FetchMode::Immediate))
    }

    /// Re-fetch the current query even if nothing changed.
    pub fn refresh(&self) -> ScheduleOutcome {
        self.schedule(FetchMode::Refresh)
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    #[must_use]
    pub const fn filters(&self) -> &BTreeMap<String, FilterValue> {
        &self.filters
    }

    #[must_use]
    pub fn sort(&self) -> &[SortEntry] {
        self.sort.entries()
    }

    #[must_use]
    pub const fn sort_state(&self) -> &SortState {
        &self.sort
    }

    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        self.pagination
    }

    // -----------------------------------------------------------------------
    // Displayed rows
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> ViewSnapshot<S::Row> {
        let shared = lock(&self.shared);
        ViewSnapshot {
            rows: shared.rows.clone(),
            page_info: shared.page_info,
            last_error: shared.last_error.clone(),
            loading: shared.loading(),
            version: shared.version,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        lock(&self.shared).loading() || self.gate.has_pending()
    }

    /// Receiver that changes every time a fetch result is applied.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn toggle_selected(&self, key: <S::Row as Keyed>::Key) -> bool {
        lock(&self.shared).selection.toggle(key)
    }

    /// Header checkbox: select-all-or-none over the visible rows.
    pub fn toggle_select_all_visible(&self) -> SelectAllEffect {
        let mut shared = lock(&self.shared);
        let visible = shared.visible_keys();
        shared.selection.select_all(&visible)
    }

    pub fn clear_selection(&self) {
        let mut shared = lock(&self.shared);
        shared.selection.clear();
        shared.reindex();
    }

    #[must_use]
    pub fn is_selected(&self, key: &<S::Row as Keyed>::Key) -> bool {
        lock(&self.shared).selection.is_selected(key)
    }

    #[must_use]
    pub fn selected_keys(&self) -> Vec<<S::Row as Keyed>::Key> {
        lock(&self.shared).selection.to_vec()
    }

    #[must_use]
    pub fn selection_len(&self) -> usize {
        lock(&self.shared).selection.len()
    }

    #[must_use]
    pub fn visible_selection_state(&self) -> VisibleSelection {
        let shared = lock(&self.shared);
        shared.selection.visible_state(&shared.visible_keys())
    }

    /// Last seen rows for the selected keys, including other pages.
    #[must_use]
    pub fn selected_rows(&self) -> Vec<S::Row> {
        let shared = lock(&self.shared);
        shared
            .selection
            .ids()
            .filter_map(|key| shared.index.get(key).cloned())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Bulk actions
    // -----------------------------------------------------------------------

    /// Execute `plan`; clear the selection on full success and refresh
    /// whenever at least one step committed.
    pub async fn run_bulk(
        &self,
        coordinator: &BulkMutationCoordinator,
        plan: &BulkMutationPlan,
    ) -> BulkOutcome {
        let outcome = coordinator.execute(plan).await;
        if outcome.is_complete_success() {
            self.clear_selection();
        }
        if outcome.any_committed() {
            self.refresh();
        }
        outcome
    }

    /// Stop fetching: cancel the pending timer and drop in-flight results.
    pub fn teardown(&self) {
        self.gate.teardown();
        lock(&self.shared).torn_down = true;
    }

    fn schedule(&self, mode: FetchMode) -> ScheduleOutcome {
        self.gate.schedule(self.query(), mode)
    }
}

impl<S> CollectionView<S>
where
    S: CollectionSource,
    S::Row: Keyed<Key = EmployeeId> + Tagged,
{
    /// Tag-replace plan for the current selection, settling for the
    /// configured `bulk.settle_delay_ms` before the add.
    #[must_use]
    pub fn plan_tag_replace(&self, target: TagId) -> BulkMutationPlan {
        let shared = lock(&self.shared);
        let holders: Vec<(EmployeeId, Option<TagId>)> = shared
            .selection
            .ids()
            .map(|id| {
                let current = shared.index.get(id).and_then(Tagged::current_tag);
                if !shared.index.contains_key(id) {
                    debug!(employee = %id, "selected row not indexed; assuming no tag");
                }
                (*id, current)
            })
            .collect();
        BulkMutationPlan::replace_tag(target, holders, self.bulk.settle_delay())
    }

    #[must_use]
    pub fn selected_employee_ids(&self) -> BTreeSet<EmployeeId> {
        lock(&self.shared).selection.ids().copied().collect()
    }
}

impl<S: CollectionSource> Drop for CollectionView<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn issue_fn<S: CollectionSource>(
    source: Arc<S>,
    shared: Shared<S::Row>,
    changes: Arc<watch::Sender<u64>>,
) -> IssueFn {
    Arc::new(move |query: CanonicalQuery| {
        let ticket = lock(&shared).begin();
        debug!(ticket, query = %query.serialized(), "issuing collection fetch");

        let Ok(runtime) = Handle::try_current() else {
            warn!(ticket, "no async runtime; collection fetch skipped");
            let mut displayed = lock(&shared);
            displayed.apply(ticket, Err(ApiError::Transport("no async runtime".to_string())));
            changes.send_replace(displayed.version);
            return;
        };

        let source = Arc::clone(&source);
        let shared = Arc::clone(&shared);
        let changes = Arc::clone(&changes);
        runtime.spawn(async move {
            let result = source.fetch_page(&query).await;
            let mut displayed = lock(&shared);
            match displayed.apply(ticket, result) {
                ApplyOutcome::Applied | ApplyOutcome::Failed => {
                    changes.send_replace(displayed.version);
                }
                ApplyOutcome::Stale => {
                    debug!(
                        ticket,
                        newest = displayed.issued_ticket,
                        "dropped stale collection result"
                    );
                }
                ApplyOutcome::TornDown => {
                    debug!(ticket, "view torn down; dropped collection result");
                }
            }
        });
    })
}

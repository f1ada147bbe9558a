//! Cascading cache of lookup lists.
//!
//! Each [`PoolKind`] has one slot holding an immutable [`PoolSnapshot`]
//! behind an `Arc`. Readers clone the `Arc`; writers swap it, so nobody ever
//! observes a half-populated list. Dependent pools (departments, units) are
//! scoped to one parent at a time: changing the parent clears the pool and
//! every pool below it before anything is fetched, and results that arrive
//! for a parent that is no longer selected are dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ReferenceSource;
use crate::config::ReferenceConfig;
use crate::error::{ApiError, ReferenceError};
use crate::lock;
use crate::model::{PoolKind, ReferenceId, ReferenceNode};

/// An immutable view of one lookup list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub kind: PoolKind,
    /// Selected parent for dependent pools, always `None` for root pools.
    pub parent: Option<ReferenceId>,
    pub nodes: Vec<ReferenceNode>,
    /// `None` until a fetch for this kind and parent has landed.
    pub fetched_at: Option<Instant>,
}

impl PoolSnapshot {
    const fn empty(kind: PoolKind, parent: Option<ReferenceId>) -> Self {
        Self {
            kind,
            parent,
            nodes: Vec::new(),
            fetched_at: None,
        }
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.fetched_at.is_some()
    }

    #[must_use]
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() >= stale_after)
    }

    #[must_use]
    pub fn get(&self, id: ReferenceId) -> Option<&ReferenceNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &ReferenceNode> {
        self.nodes.iter().filter(|node| node.is_active)
    }
}

struct PoolSlot {
    snapshot: Arc<PoolSnapshot>,
    /// Bumped whenever the slot is cleared; fetches dispatched under an
    /// older epoch are discarded on arrival.
    epoch: u64,
    refreshing: bool,
}

struct CacheState {
    pools: BTreeMap<PoolKind, PoolSlot>,
    tasks: Vec<JoinHandle<()>>,
    torn_down: bool,
}

impl CacheState {
    fn slot(&mut self, kind: PoolKind) -> &mut PoolSlot {
        self.pools.entry(kind).or_insert_with(|| PoolSlot {
            snapshot: Arc::new(PoolSnapshot::empty(kind, None)),
            epoch: 0,
            refreshing: false,
        })
    }

    fn reset(&mut self, kind: PoolKind, parent: Option<ReferenceId>) {
        let slot = self.slot(kind);
        slot.snapshot = Arc::new(PoolSnapshot::empty(kind, parent));
        slot.epoch += 1;
        slot.refreshing = false;
    }

    /// Reset `kind` under `parent` and every pool that depends on it.
    fn cascade_clear(&mut self, kind: PoolKind, parent: Option<ReferenceId>) {
        self.reset(kind, parent);
        let mut next = kind.child_kind();
        while let Some(child) = next {
            self.reset(child, None);
            next = child.child_kind();
        }
    }

    fn is_current(&mut self, kind: PoolKind, parent: Option<ReferenceId>, epoch: u64) -> bool {
        if self.torn_down {
            return false;
        }
        let slot = self.slot(kind);
        slot.epoch == epoch && slot.snapshot.parent == parent
    }

    fn install(
        &mut self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
        nodes: Vec<ReferenceNode>,
    ) -> Arc<PoolSnapshot> {
        let snapshot = Arc::new(PoolSnapshot {
            kind,
            parent,
            nodes,
            fetched_at: Some(Instant::now()),
        });
        let slot = self.slot(kind);
        slot.snapshot = Arc::clone(&snapshot);
        slot.refreshing = false;
        snapshot
    }
}

/// Shared lookup-list cache with an explicit lifecycle: build it with
/// [`ReferenceCache::new`], hand out `Arc`s to consumers, call
/// [`ReferenceCache::teardown`] when the owning screen goes away.
pub struct ReferenceCache {
    source: Arc<dyn ReferenceSource>,
    state: Arc<Mutex<CacheState>>,
    stale_after: Duration,
}

impl ReferenceCache {
    #[must_use]
    pub fn new(source: Arc<dyn ReferenceSource>, config: &ReferenceConfig) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState {
                pools: BTreeMap::new(),
                tasks: Vec::new(),
                torn_down: false,
            })),
            stale_after: config.stale_after(),
        }
    }

    /// Return the pool, fetching it if it has never been loaded.
    ///
    /// A loaded but stale pool is returned as-is and refreshed in the
    /// background. Dependent pools resolve against their selected parent and
    /// are empty while no parent is selected.
    ///
    /// # Errors
    ///
    /// Returns the collaborator error if a blocking fetch fails.
    pub async fn fetch_all(&self, kind: PoolKind) -> Result<Arc<PoolSnapshot>, ApiError> {
        if kind.is_root() {
            return self.load(kind, None).await;
        }
        match self.selected_parent(kind) {
            Some(parent) => self.fetch_children(kind, parent).await,
            None => Ok(self.snapshot(kind)),
        }
    }

    /// Return the children of `parent` in the dependent pool `kind`.
    ///
    /// If `parent` differs from the current selection, the pool and its
    /// descendants are cleared before the fetch is dispatched.
    ///
    /// # Errors
    ///
    /// Returns the collaborator error if the fetch fails while `parent` is
    /// still selected. Failures for a superseded parent are dropped.
    pub async fn fetch_children(
        &self,
        kind: PoolKind,
        parent: ReferenceId,
    ) -> Result<Arc<PoolSnapshot>, ApiError> {
        if kind.is_root() {
            warn!(pool = %kind, %parent, "root pool has no parent; fetching whole list");
            return self.load(kind, None).await;
        }
        self.select_parent(kind, Some(parent));
        self.load(kind, Some(parent)).await
    }

    /// Load every root pool.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first fetch error.
    pub async fn preload_roots(&self) -> Result<(), ApiError> {
        for kind in PoolKind::ALL.into_iter().filter(|kind| kind.is_root()) {
            self.load(kind, None).await?;
        }
        Ok(())
    }

    /// Point the dependent pool `kind` at a new parent, or at none.
    ///
    /// Clears `kind` and every pool below it synchronously. Returns `false`
    /// (and changes nothing) if the parent is unchanged or `kind` is a root.
    pub fn select_parent(&self, kind: PoolKind, parent: Option<ReferenceId>) -> bool {
        if kind.is_root() {
            warn!(pool = %kind, "select_parent on a root pool ignored");
            return false;
        }
        let mut state = lock(&self.state);
        if state.slot(kind).snapshot.parent == parent {
            return false;
        }
        state.cascade_clear(kind, parent);
        debug!(pool = %kind, parent = ?parent, "parent changed; cleared dependent pools");
        true
    }

    /// Drop the children of `parent_id` held by the pool below `parent_kind`.
    pub fn clear_children_of(&self, parent_kind: PoolKind, parent_id: ReferenceId) {
        let Some(child) = parent_kind.child_kind() else {
            return;
        };
        let mut state = lock(&self.state);
        if state.slot(child).snapshot.parent == Some(parent_id) {
            state.cascade_clear(child, Some(parent_id));
            debug!(pool = %child, parent = %parent_id, "cleared children");
        }
    }

    /// Forget the cached list for `kind`; the next access fetches again.
    pub fn invalidate(&self, kind: PoolKind) {
        let mut state = lock(&self.state);
        let parent = state.slot(kind).snapshot.parent;
        state.reset(kind, parent);
        debug!(pool = %kind, "invalidated");
    }

    pub fn invalidate_all(&self) {
        let mut state = lock(&self.state);
        let kinds: Vec<(PoolKind, Option<ReferenceId>)> = state
            .pools
            .iter()
            .map(|(kind, slot)| (*kind, slot.snapshot.parent))
            .collect();
        for (kind, parent) in kinds {
            state.reset(kind, parent);
        }
    }

    #[must_use]
    pub fn snapshot(&self, kind: PoolKind) -> Arc<PoolSnapshot> {
        Arc::clone(&lock(&self.state).slot(kind).snapshot)
    }

    #[must_use]
    pub fn selected_parent(&self, kind: PoolKind) -> Option<ReferenceId> {
        lock(&self.state).slot(kind).snapshot.parent
    }

    /// Active entries only, for dropdowns.
    #[must_use]
    pub fn active_options(&self, kind: PoolKind) -> Vec<ReferenceNode> {
        self.snapshot(kind).active().cloned().collect()
    }

    /// Check that `id` is a current, active entry of `kind` and, when
    /// `expected_parent` is given, a genuine child of it. Local only.
    ///
    /// # Errors
    ///
    /// Returns the [`ReferenceError`] describing why the value is unusable.
    pub fn validate(
        &self,
        kind: PoolKind,
        id: ReferenceId,
        expected_parent: Option<ReferenceId>,
    ) -> Result<ReferenceNode, ReferenceError> {
        let snapshot = self.snapshot(kind);
        if !snapshot.is_loaded() {
            return Err(ReferenceError::NotLoaded { kind });
        }
        let node = snapshot
            .get(id)
            .ok_or(ReferenceError::Unknown { kind, id })?;
        if !node.is_active {
            return Err(ReferenceError::Inactive { kind, id });
        }
        if let Some(expected) = expected_parent {
            if node.parent_id != Some(expected) {
                return Err(ReferenceError::ParentMismatch {
                    kind,
                    id,
                    expected,
                    actual: node.parent_id,
                });
            }
        }
        Ok(node.clone())
    }

    #[must_use]
    pub fn is_valid(
        &self,
        kind: PoolKind,
        id: ReferenceId,
        expected_parent: Option<ReferenceId>,
    ) -> bool {
        self.validate(kind, id, expected_parent).is_ok()
    }

    /// Abort background refreshes and stop accepting results.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        state.torn_down = true;
        for task in state.tasks.drain(..) {
            task.abort();
        }
        info!("reference cache torn down");
    }

    async fn load(
        &self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
    ) -> Result<Arc<PoolSnapshot>, ApiError> {
        let epoch = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return Ok(Arc::clone(&state.slot(kind).snapshot));
            }
            let stale_after = self.stale_after;
            let slot = state.slot(kind);
            let snapshot = Arc::clone(&slot.snapshot);
            if snapshot.is_loaded() {
                if snapshot.is_stale(stale_after) && !slot.refreshing {
                    slot.refreshing = true;
                    let epoch = slot.epoch;
                    self.spawn_refresh(&mut state, kind, parent, epoch);
                }
                return Ok(snapshot);
            }
            slot.epoch
        };

        debug!(pool = %kind, parent = ?parent, "fetching reference pool");
        let result = self.source.fetch_pool(kind, parent).await;

        let mut state = lock(&self.state);
        if !state.is_current(kind, parent, epoch) {
            debug!(pool = %kind, parent = ?parent, "dropping result for superseded parent");
            return Ok(Arc::clone(&state.slot(kind).snapshot));
        }
        let nodes = retain_children(kind, parent, result?);
        Ok(state.install(kind, parent, nodes))
    }

    fn spawn_refresh(
        &self,
        state: &mut CacheState,
        kind: PoolKind,
        parent: Option<ReferenceId>,
        epoch: u64,
    ) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(pool = %kind, "no async runtime; skipping background refresh");
            state.slot(kind).refreshing = false;
            return;
        };

        state.tasks.retain(|task| !task.is_finished());
        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.state);
        debug!(pool = %kind, parent = ?parent, "refreshing stale pool in background");
        state.tasks.push(runtime.spawn(async move {
            let result = source.fetch_pool(kind, parent).await;
            let mut state = lock(&shared);
            if !state.is_current(kind, parent, epoch) {
                debug!(pool = %kind, "dropping superseded background refresh");
                return;
            }
            match result {
                Ok(nodes) => {
                    state.install(kind, parent, retain_children(kind, parent, nodes));
                }
                Err(error) => {
                    warn!(pool = %kind, %error, "background refresh failed; keeping stale list");
                    state.slot(kind).refreshing = false;
                }
            }
        }));
    }
}

impl Drop for ReferenceCache {
    fn drop(&mut self) {
        for task in lock(&self.state).tasks.drain(..) {
            task.abort();
        }
    }
}

/// Keep only nodes that really belong to `parent`.
fn retain_children(
    kind: PoolKind,
    parent: Option<ReferenceId>,
    mut nodes: Vec<ReferenceNode>,
) -> Vec<ReferenceNode> {
    let Some(parent) = parent else {
        return nodes;
    };
    let before = nodes.len();
    nodes.retain(|node| node.parent_id == Some(parent));
    if nodes.len() != before {
        warn!(
            pool = %kind,
            %parent,
            dropped = before - nodes.len(),
            "server returned entries for another parent"
        );
    }
    nodes
}

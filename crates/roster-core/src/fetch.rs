//! Debounced, deduplicating fetch gate.
//!
//! One gate serves one logical collection. It remembers the serialized form
//! of the last query it issued and owns at most one pending debounce timer.
//! Scheduling a new query always cancels the pending timer first, and a
//! torn-down gate never issues again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lock;
use crate::query::CanonicalQuery;

/// Callback invoked when a query should actually hit the network.
pub type IssueFn = Arc<dyn Fn(CanonicalQuery) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Wait for a quiet period before issuing (typing, checkbox bursts).
    Debounced(Duration),
    /// Issue now (Enter, page change, sort click).
    Immediate,
    /// Issue now even if identical to the last issued query.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Issued,
    Scheduled,
    /// Identical to the last issued query; nothing to do.
    Suppressed,
    TornDown,
}

#[derive(Default)]
struct GateState {
    last_issued: Option<String>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
    torn_down: bool,
}

impl GateState {
    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

pub struct FetchGate {
    state: Arc<Mutex<GateState>>,
    on_issue: IssueFn,
}

impl FetchGate {
    #[must_use]
    pub fn new(on_issue: IssueFn) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            on_issue,
        }
    }

    /// Decide whether `query` warrants a fetch.
    ///
    /// A query serializing identically to the last issued one is suppressed
    /// unless `mode` is [`FetchMode::Refresh`]; suppression still cancels any
    /// pending timer, whose query no longer reflects the caller's state.
    /// Immediate issues run `on_issue` synchronously on the calling task.
    pub fn schedule(&self, query: CanonicalQuery, mode: FetchMode) -> ScheduleOutcome {
        let serialized = query.serialized();
        let mut state = lock(&self.state);
        if state.torn_down {
            debug!(query = %serialized, "fetch gate torn down; ignoring schedule");
            return ScheduleOutcome::TornDown;
        }

        let duplicate = state.last_issued.as_deref() == Some(serialized.as_str());
        state.cancel_pending();

        if duplicate && mode != FetchMode::Refresh {
            debug!(query = %serialized, "suppressed duplicate query");
            return ScheduleOutcome::Suppressed;
        }

        let delay = match mode {
            FetchMode::Debounced(delay) => delay,
            FetchMode::Immediate | FetchMode::Refresh => {
                state.last_issued = Some(serialized);
                drop(state);
                (self.on_issue)(query);
                return ScheduleOutcome::Issued;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(query = %serialized, "no async runtime for debounce timer; issuing now");
            state.last_issued = Some(serialized);
            drop(state);
            (self.on_issue)(query);
            return ScheduleOutcome::Issued;
        };

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let on_issue = Arc::clone(&self.on_issue);
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = lock(&shared);
                if state.torn_down || state.generation != generation {
                    return;
                }
                state.pending = None;
                state.last_issued = Some(serialized);
            }
            on_issue(query);
        }));
        ScheduleOutcome::Scheduled
    }

    /// Serialized form of the last issued query.
    #[must_use]
    pub fn last_issued(&self) -> Option<String> {
        lock(&self.state).last_issued.clone()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        lock(&self.state)
            .pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the pending timer and refuse all further schedules.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        state.torn_down = true;
        state.cancel_pending();
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        lock(&self.state).torn_down
    }
}

impl Drop for FetchGate {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterValue, Pagination, QueryBuilder};
    use crate::sort::SortState;
    use std::collections::BTreeMap;

    fn query(search: &str) -> CanonicalQuery {
        QueryBuilder::build(search, &BTreeMap::new(), &SortState::new(), Pagination::default())
    }

    fn recording_gate() -> (FetchGate, Arc<Mutex<Vec<String>>>) {
        let issued = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&issued);
        let gate = FetchGate::new(Arc::new(move |q: CanonicalQuery| {
            let search = q.search().unwrap_or_default().to_string();
            sink.lock().expect("lock").push(search);
        }));
        (gate, issued)
    }

    fn issued(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("lock").clone()
    }

    const DELAY: FetchMode = FetchMode::Debounced(Duration::from_millis(300));

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_a_burst_into_the_last_query() {
        let (gate, log) = recording_gate();
        for text in ["j", "jo", "joh", "john"] {
            assert_eq!(gate.schedule(query(text), DELAY), ScheduleOutcome::Scheduled);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(issued(&log).is_empty());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(issued(&log), vec!["john"]);
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn identical_debounced_queries_issue_once() {
        let (gate, log) = recording_gate();
        gate.schedule(query("ann"), DELAY);
        tokio::time::sleep(Duration::from_millis(400)).await;
        for _ in 0..5 {
            assert_eq!(gate.schedule(query(" ann "), DELAY), ScheduleOutcome::Suppressed);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(issued(&log), vec!["ann"]);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_issued_query_cancels_pending_timer() {
        let (gate, log) = recording_gate();
        gate.schedule(query("jo"), FetchMode::Immediate);
        gate.schedule(query("joh"), DELAY);
        assert!(gate.has_pending());
        assert_eq!(gate.schedule(query("jo"), DELAY), ScheduleOutcome::Suppressed);
        assert!(!gate.has_pending());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(issued(&log), vec!["jo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_issues_synchronously_and_cancels_timer() {
        let (gate, log) = recording_gate();
        gate.schedule(query("draft"), DELAY);
        assert_eq!(gate.schedule(query("final"), FetchMode::Immediate), ScheduleOutcome::Issued);
        assert_eq!(issued(&log), vec!["final"]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(issued(&log), vec!["final"]);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_duplicate_is_suppressed_but_refresh_is_not() {
        let (gate, log) = recording_gate();
        gate.schedule(query("x"), FetchMode::Immediate);
        assert_eq!(gate.schedule(query("x"), FetchMode::Immediate), ScheduleOutcome::Suppressed);
        assert_eq!(gate.schedule(query("x"), FetchMode::Refresh), ScheduleOutcome::Issued);
        assert_eq!(issued(&log), vec!["x", "x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_timer() {
        let (gate, log) = recording_gate();
        gate.schedule(query("late"), DELAY);
        gate.teardown();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(issued(&log).is_empty());
        assert_eq!(gate.schedule(query("later"), FetchMode::Immediate), ScheduleOutcome::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_gate_cancels_pending_timer() {
        let (gate, log) = recording_gate();
        gate.schedule(query("late"), DELAY);
        drop(gate);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(issued(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_is_a_new_query() {
        let (gate, log) = recording_gate();
        let mut filters = BTreeMap::new();
        gate.schedule(query(""), FetchMode::Immediate);
        filters.insert("department".to_string(), FilterValue::from("eng"));
        let filtered =
            QueryBuilder::build("", &filters, &SortState::new(), Pagination::default());
        assert_eq!(gate.schedule(filtered, DELAY), ScheduleOutcome::Scheduled);
        tokio::time::sleep(Duration::from_millis(301)).await;
        assert_eq!(issued(&log).len(), 2);
        assert!(gate.last_issued().is_some_and(|q| q.contains("department")));
    }

    #[test]
    fn without_runtime_debounce_degrades_to_immediate() {
        let (gate, log) = recording_gate();
        assert_eq!(gate.schedule(query("offline"), DELAY), ScheduleOutcome::Issued);
        assert_eq!(issued(&log), vec!["offline"]);
    }
}

//! One seeded run: drive a [`CollectionView`], a [`ReferenceCache`] and a
//! [`BulkMutationCoordinator`] through the races an admin UI produces and
//! check each phase against the backend's call log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use roster_core::api::{MutationSink, ReferenceSource};
use roster_core::bulk::{BulkMutationCoordinator, Mutation};
use roster_core::collection::CollectionView;
use roster_core::config::RosterConfig;
use roster_core::model::{EmployeeId, Keyed, PoolKind, ReferenceId, TagId};
use roster_core::reference::ReferenceCache;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::backend::{BUSINESS_FUNCTIONS, SimBackend, TAG_IDS};
use crate::faults::{FaultConfig, FaultInjector};
use crate::oracle::{InvariantViolation, OracleResult};
use crate::rng::DeterministicRng;

const SORTABLE: [&str; 4] = ["first_name", "last_name", "email", "id"];
const SAMPLE_EVERY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub employee_count: u64,
    pub page_size: u32,
    /// Longest keystroke burst typed into the search box.
    pub burst_len: usize,
    /// Header clicks fired in the racing-sort phase.
    pub sort_clicks: usize,
    /// Business-function switches in the cascade phase.
    pub parent_switches: usize,
    pub settle_delay_ms: u64,
    pub faults: FaultConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            employee_count: 40,
            page_size: 10,
            burst_len: 6,
            sort_clicks: 6,
            parent_switches: 4,
            settle_delay_ms: 500,
            faults: FaultConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Core settings for this run: defaults overlaid with the scenario's
    /// page size and settle delay, then env overrides and validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting settings are out of range.
    pub fn core_config(&self) -> Result<RosterConfig> {
        let mut core = RosterConfig::default();
        core.fetch.default_page_size = self.page_size;
        core.bulk.settle_delay_ms = self.settle_delay_ms;
        core.apply_env(|key| std::env::var(key).ok());
        core.validate()?;
        Ok(core)
    }
}

/// What a run did, for campaign statistics and replay output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub oracle: OracleResult,
    pub fetches: usize,
    pub pool_calls: usize,
    pub mutations: usize,
    pub faults_injected: u64,
    pub bulk_summary: String,
    /// The bulk run committed some steps and then failed.
    pub bulk_partial: bool,
}

struct Harness {
    rng: DeterministicRng,
    backend: Arc<SimBackend>,
    view: CollectionView<SimBackend>,
    core: RosterConfig,
    faults: FaultConfig,
}

impl Harness {
    /// Long enough for any pending debounce plus the slowest response.
    const fn quiet(&self) -> Duration {
        let fetch = &self.core.fetch;
        let debounce = if fetch.search_debounce_ms > fetch.filter_debounce_ms {
            fetch.search_debounce_ms
        } else {
            fetch.filter_debounce_ms
        };
        Duration::from_millis(debounce + self.faults.max_latency_ms + 50)
    }

    async fn settle_view(&self) {
        sleep(self.quiet()).await;
    }
}

/// Run every phase for `config.seed`. Must be called on a runtime with a
/// paused clock for the run to replay exactly.
///
/// # Errors
///
/// Returns an error if the harness itself is misconfigured (invalid page
/// size or fault bounds). Invariant violations are reported in
/// [`ScenarioReport::oracle`].
pub async fn run_scenario(config: &ScenarioConfig) -> Result<ScenarioReport> {
    config.faults.validate()?;
    let core = config.core_config()?;
    let mut rng = DeterministicRng::new(config.seed);
    let faults = FaultInjector::new(config.faults, rng.fork(0xFA17));
    let backend = Arc::new(SimBackend::seeded(config.employee_count, &mut rng, faults));

    let mut view = CollectionView::new(Arc::clone(&backend), &core);
    view.set_page_size(config.page_size)?;

    let mut harness = Harness {
        rng,
        backend: Arc::clone(&backend),
        view,
        core,
        faults: config.faults,
    };
    info!(seed = config.seed, employees = config.employee_count, "scenario start");
    harness.settle_view().await;

    let oracle = debounce_burst(&mut harness, config.burst_len).await;
    let oracle = oracle.merge(racing_sorts(&mut harness, config.sort_clicks).await);
    let oracle = oracle.merge(reference_cascade(&mut harness, config.parent_switches).await);
    let bulk = cross_page_tag_replace(&mut harness).await?;
    let oracle = oracle.merge(bulk.oracle);
    let oracle = oracle.merge(teardown_mid_flight(&mut harness).await);

    let report = ScenarioReport {
        oracle,
        fetches: backend.fetch_count(),
        pool_calls: backend.pool_calls().len(),
        mutations: backend.mutations().len(),
        faults_injected: backend.faults().injected(),
        bulk_summary: bulk.summary,
        bulk_partial: bulk.partial,
    };
    if report.oracle.passed {
        info!(seed = config.seed, fetches = report.fetches, "scenario passed");
    } else {
        warn!(
            seed = config.seed,
            violations = report.oracle.violations.len(),
            "scenario failed"
        );
    }
    Ok(report)
}

// ── Phases ────────────────────────────────────────────────────────────────────

/// Type a prefix of a name one key at a time inside the debounce window,
/// repeat the final text and press enter, then tick tag checkboxes inside
/// the filter window.
async fn debounce_burst(h: &mut Harness, burst_len: usize) -> OracleResult {
    let mut result = OracleResult::pass();
    let name = h
        .rng
        .pick(&["aysel", "bruno", "chen", "dara", "elif", "farid"])
        .copied()
        .unwrap_or("dara");
    let longest = u64::try_from(burst_len.max(1)).unwrap_or(1);
    let len = usize::try_from(h.rng.between(1, longest))
        .unwrap_or(1)
        .min(name.len());
    let text = &name[..len];
    let window = h.core.fetch.search_debounce_ms.saturating_sub(1);

    let before = h.backend.fetch_count();
    for end in 1..=len {
        h.view.set_search(&text[..end]);
        if end < len {
            sleep(Duration::from_millis(h.rng.between(0, window))).await;
        }
    }
    h.settle_view().await;

    let issued: Vec<Option<String>> = h.backend.fetches()[before..]
        .iter()
        .map(|q| q.search().map(str::to_string))
        .collect();
    result.check(issued == [Some(text.to_string())], || {
        InvariantViolation::DebounceLeak {
            final_search: text.to_string(),
            issued: issued.clone(),
        }
    });
    debug!(search = text, fetches = issued.len(), "debounce burst done");

    let before = h.backend.fetch_count();
    for _ in 0..3 {
        h.view.set_search(text);
        sleep(Duration::from_millis(h.rng.between(0, window))).await;
    }
    h.view.submit_search();
    h.settle_view().await;
    let extra = h.backend.fetch_count() - before;
    result.check(extra == 0, || InvariantViolation::DuplicateFetch {
        query: h.view.query().serialized(),
        extra,
    });

    let before = h.backend.fetch_count();
    let window = h.core.fetch.filter_debounce_ms.saturating_sub(1);
    let mut tags: Vec<String> = Vec::new();
    for tag in TAG_IDS {
        if tags.is_empty() || h.rng.hit_rate_percent(60) {
            tags.push(tag.to_string());
        }
        h.view.set_filter("tag", tags.clone());
        sleep(Duration::from_millis(h.rng.between(0, window))).await;
    }
    h.settle_view().await;
    let issued: Vec<Vec<String>> = h.backend.fetches()[before..]
        .iter()
        .map(|q| q.filter("tag").map(<[String]>::to_vec).unwrap_or_default())
        .collect();
    result.check(issued == [tags.clone()], || InvariantViolation::FilterBurstLeak {
        final_values: tags.clone(),
        issued: issued.clone(),
    });
    result
}

/// Fire header clicks faster than responses arrive; once quiet, the rows
/// shown must answer the current query.
async fn racing_sorts(h: &mut Harness, clicks: usize) -> OracleResult {
    let mut result = OracleResult::pass();
    h.view.clear_filters();
    for _ in 0..clicks {
        let field = h.rng.pick(&SORTABLE).copied().unwrap_or("id");
        let modifier = h.rng.hit_rate_percent(40);
        h.view.toggle_sort(field, modifier);
        sleep(Duration::from_millis(h.rng.between(0, 40))).await;
    }
    h.settle_view().await;

    let snapshot = h.view.snapshot();
    if let Some(error) = &snapshot.last_error {
        debug!(%error, "newest sort fetch failed; row check skipped");
        return result;
    }
    let query = h.view.query();
    let expected: Vec<EmployeeId> = h
        .backend
        .evaluate(&query)
        .results
        .iter()
        .map(Keyed::key)
        .collect();
    let shown: Vec<EmployeeId> = snapshot.rows.iter().map(Keyed::key).collect();
    result.check(expected == shown, || InvariantViolation::StaleRowsShown {
        query: query.serialized(),
        expected: expected.clone(),
        shown: shown.clone(),
    });
    result
}

/// Switch the business function on a form repeatedly while department and
/// unit lists load, sampling the pools throughout.
async fn reference_cascade(h: &mut Harness, switches: usize) -> OracleResult {
    let mut result = OracleResult::pass();
    let cache = Arc::new(ReferenceCache::new(
        Arc::clone(&h.backend) as Arc<dyn ReferenceSource>,
        &h.core.reference,
    ));
    if let Err(error) = cache.preload_roots().await {
        debug!(%error, "root preload failed");
    }

    // Always exercise A -> B -> A, then wander.
    let first = h.rng.pick(&BUSINESS_FUNCTIONS).copied().unwrap_or(1);
    let second = BUSINESS_FUNCTIONS
        .iter()
        .copied()
        .find(|bf| *bf != first)
        .unwrap_or(first + 1);
    let mut sequence = vec![first, second, first];
    while sequence.len() < switches {
        sequence.push(h.rng.pick(&BUSINESS_FUNCTIONS).copied().unwrap_or(1));
    }

    let mut tasks = Vec::new();
    let mut at = Duration::ZERO;
    let mut last = None;
    for bf in sequence {
        let bf = ReferenceId(bf);
        at += Duration::from_millis(h.rng.between(1, h.faults.max_latency_ms.max(1)));
        last = Some(bf);
        let cache = Arc::clone(&cache);
        let pick = usize::from(h.rng.hit_rate_percent(50));
        tasks.push(tokio::spawn(async move {
            sleep(at).await;
            let Ok(departments) = cache.fetch_children(PoolKind::Department, bf).await else {
                return;
            };
            let options: Vec<ReferenceId> = departments.active().map(|n| n.id).collect();
            let Some(department) = options.get(pick).or_else(|| options.first()) else {
                return;
            };
            if let Err(error) = cache.fetch_children(PoolKind::Unit, *department).await {
                debug!(%error, %department, "unit fetch failed");
            }
        }));
    }

    let horizon =
        Instant::now() + at + 3 * Duration::from_millis(h.faults.max_latency_ms) + SAMPLE_EVERY;
    while Instant::now() < horizon {
        for pool in [PoolKind::Department, PoolKind::Unit] {
            check_pool_scope(&cache, pool, &mut result);
        }
        sleep(SAMPLE_EVERY).await;
    }
    for task in tasks {
        if let Err(error) = task.await {
            warn!(%error, "cascade task panicked");
        }
    }

    let departments = cache.snapshot(PoolKind::Department);
    result.check(departments.parent == last, || InvariantViolation::PoolScopeDrift {
        pool: PoolKind::Department,
        selected: last,
        scoped_to: departments.parent,
    });
    let units = cache.snapshot(PoolKind::Unit);
    if let (Some(department), true) = (units.parent, departments.is_loaded()) {
        result.check(departments.get(department).is_some(), || {
            InvariantViolation::PoolScopeDrift {
                pool: PoolKind::Unit,
                selected: departments.parent,
                scoped_to: units.parent,
            }
        });
    }

    if let Some(current) = last {
        let stale_bf = BUSINESS_FUNCTIONS
            .iter()
            .copied()
            .find(|bf| *bf != current.0)
            .unwrap_or(current.0 + 1);
        let stale = ReferenceId(stale_bf * 10 + 1);
        result.check(
            !cache.is_valid(PoolKind::Department, stale, Some(current)),
            || InvariantViolation::StaleSelectionAccepted {
                pool: PoolKind::Department,
                id: stale,
                parent: current,
            },
        );
    }
    cache.teardown();
    result
}

fn check_pool_scope(cache: &ReferenceCache, pool: PoolKind, result: &mut OracleResult) {
    let snapshot = cache.snapshot(pool);
    let selected = cache.selected_parent(pool);
    result.check(snapshot.parent == selected, || InvariantViolation::PoolScopeDrift {
        pool,
        selected,
        scoped_to: snapshot.parent,
    });
    for node in &snapshot.nodes {
        result.check(node.parent_id == snapshot.parent, || {
            InvariantViolation::PoolMixedParents {
                pool,
                scoped_to: snapshot.parent,
                node: node.id,
                node_parent: node.parent_id,
            }
        });
    }
}

struct BulkPhase {
    oracle: OracleResult,
    summary: String,
    partial: bool,
}

/// Select all on page 1, page forward, select all on page 2, then replace
/// everyone's tag with one target tag.
async fn cross_page_tag_replace(h: &mut Harness) -> Result<BulkPhase> {
    let mut result = OracleResult::pass();
    h.view.toggle_select_all_visible();
    h.view.set_page(2)?;
    h.settle_view().await;
    h.view.toggle_select_all_visible();

    let selected = h.view.selected_employee_ids();
    let target = TagId(h.rng.pick(&TAG_IDS).copied().unwrap_or(1));
    let plan = h.view.plan_tag_replace(target);
    if let Some(add) = plan.steps().last() {
        let planned = add.mutation == Mutation::AddTag { tag: target };
        for id in &selected {
            result.check(planned && add.target_ids.contains(id), || {
                InvariantViolation::SelectionNotPlanned { employee: *id }
            });
        }
    }

    let coordinator =
        BulkMutationCoordinator::new(Arc::clone(&h.backend) as Arc<dyn MutationSink>);
    let outcome = h.view.run_bulk(&coordinator, &plan).await;
    let records = h.backend.mutations();

    for record in records.iter().filter(|r| r.is_conflict()) {
        if let Err(error) = &record.outcome {
            result.record(InvariantViolation::TagConflict {
                message: error.to_string(),
            });
        }
    }
    let committed = records.iter().filter(|r| r.outcome.is_ok()).count();
    result.check(outcome.succeeded_steps == committed, || {
        InvariantViolation::OutcomeMismatch {
            claimed: outcome.succeeded_steps,
            committed,
        }
    });
    if let Some(failure) = &outcome.first_failure {
        result.check(records.len() == failure.step_index + 1, || {
            InvariantViolation::StepAfterFailure {
                failed_step: failure.step_index,
                issued_steps: records.len(),
            }
        });
    }
    let last_removal = records
        .iter()
        .filter(|r| matches!(r.mutation, Mutation::RemoveTag { .. }))
        .map(|r| r.finished)
        .max();
    let add = records
        .iter()
        .find(|r| r.mutation == Mutation::AddTag { tag: target });
    if let (Some(removed), Some(add)) = (last_removal, add) {
        let gap = add.started.saturating_duration_since(removed);
        let settle = h.core.bulk.settle_delay();
        result.check(gap >= settle, || InvariantViolation::AddBeforeSettle { gap, settle });
    }

    let selected_after = h.view.selection_len();
    if outcome.is_complete_success() {
        for id in &selected {
            let actual = h.backend.employee(*id).and_then(|e| e.tag);
            result.check(actual == Some(target), || InvariantViolation::TargetTagMissing {
                employee: *id,
                expected: target,
                actual,
            });
        }
    }
    let selection_ok = if outcome.is_complete_success() {
        selected_after == 0
    } else {
        selected_after == selected.len()
    };
    result.check(selection_ok, || InvariantViolation::SelectionAfterBulk {
        succeeded: outcome.is_complete_success(),
        selected_before: selected.len(),
        selected_after,
    });

    let summary = outcome.summary();
    debug!(selected = selected.len(), %target, summary = %summary, "bulk replace done");
    h.settle_view().await;
    Ok(BulkPhase {
        oracle: result,
        summary,
        partial: outcome.is_partial(),
    })
}

/// Leave the list while a refresh is in flight and a search is pending.
async fn teardown_mid_flight(h: &mut Harness) -> OracleResult {
    let mut result = OracleResult::pass();
    let before = h.backend.fetch_count();
    h.view.refresh();
    h.view.set_search("zz");
    h.view.teardown();
    let version_before = h.view.snapshot().version;

    h.settle_view().await;
    let fetches = h.backend.fetch_count() - before;
    result.check(fetches == 1, || InvariantViolation::FetchAfterTeardown {
        fetches: fetches.saturating_sub(1),
    });
    let version_after = h.view.snapshot().version;
    result.check(version_after == version_before, || {
        InvariantViolation::ResultAfterTeardown {
            version_before,
            version_after,
        }
    });
    result
}

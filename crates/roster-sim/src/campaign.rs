//! Campaign runner: many seeds, one paused runtime per seed, with the first
//! failing seed kept for replay.

use std::ops::Range;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::faults::FaultConfig;
use crate::oracle::InvariantViolation;
use crate::scenario::{ScenarioConfig, ScenarioReport, run_scenario};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub employee_count: u64,
    pub page_size: u32,
    pub burst_len: usize,
    pub sort_clicks: usize,
    pub parent_switches: usize,
    pub settle_delay_ms: u64,
    pub faults: FaultConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let scenario = ScenarioConfig::default();
        Self {
            seed_range: 0..100,
            employee_count: scenario.employee_count,
            page_size: scenario.page_size,
            burst_len: scenario.burst_len,
            sort_clicks: scenario.sort_clicks,
            parent_switches: scenario.parent_switches,
            settle_delay_ms: scenario.settle_delay_ms,
            faults: scenario.faults,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn scenario_for_seed(&self, seed: u64) -> ScenarioConfig {
        ScenarioConfig {
            seed,
            employee_count: self.employee_count,
            page_size: self.page_size,
            burst_len: self.burst_len,
            sort_clicks: self.sort_clicks,
            parent_switches: self.parent_switches,
            settle_delay_ms: self.settle_delay_ms,
            faults: self.faults,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.employee_count == 0 {
            bail!("employee_count must be > 0");
        }
        if self.page_size == 0 {
            bail!("page_size must be > 0");
        }
        if self.burst_len == 0 {
            bail!("burst_len must be > 0");
        }
        self.faults.validate()?;
        self.scenario_for_seed(self.seed_range.start)
            .core_config()
            .map(|_| ())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds in which at least one fault was injected.
    pub faulted_seeds: usize,
    /// Seeds whose bulk replace stopped part-way.
    pub partial_bulk_seeds: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a seed's harness fails
/// to run.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        faulted_seeds: 0,
        partial_bulk_seeds: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let run = replay_seed(seed, config)?;
        if run.faults_injected > 0 {
            report.faulted_seeds += 1;
        }
        if run.bulk_partial {
            report.partial_bulk_seeds += 1;
        }

        if run.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: run.oracle.violations.iter().map(format_violation).collect(),
            });
        }
        debug!(seed, passed = run.oracle.passed, "seed finished");
    }

    info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        faulted = report.faulted_seeds,
        "campaign finished"
    );
    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the harness itself fails. The inner
/// `Result` distinguishes pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let report = replay_seed(seed, config)?;
    if report.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(report.oracle.violations))
    }
}

/// Run one seed on a fresh single-threaded runtime with a paused clock and
/// return the full report.
///
/// # Errors
///
/// Returns an error when config validation, runtime construction or the
/// scenario harness fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<ScenarioReport> {
    config.validate()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .context("failed to build simulation runtime")?;
    runtime.block_on(run_scenario(&config.scenario_for_seed(seed)))
}

/// Format an invariant violation into a human-readable string.
fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::DebounceLeak {
            final_search,
            issued,
        } => format!(
            "DebounceLeak: burst ending in {final_search:?} issued {} fetches ({issued:?})",
            issued.len()
        ),
        InvariantViolation::FilterBurstLeak {
            final_values,
            issued,
        } => format!(
            "FilterBurstLeak: toggles ending in {final_values:?} issued {} fetches ({issued:?})",
            issued.len()
        ),
        InvariantViolation::DuplicateFetch { query, extra } => {
            format!("DuplicateFetch: {query} fetched {extra} extra time(s)")
        }
        InvariantViolation::StaleRowsShown {
            query,
            expected,
            shown,
        } => format!("StaleRowsShown: {query} expected {expected:?} but showed {shown:?}"),
        InvariantViolation::PoolMixedParents {
            pool,
            scoped_to,
            node,
            node_parent,
        } => format!(
            "PoolMixedParents: {pool} scoped to {scoped_to:?} holds {node} of {node_parent:?}"
        ),
        InvariantViolation::PoolScopeDrift {
            pool,
            selected,
            scoped_to,
        } => format!("PoolScopeDrift: {pool} selected {selected:?} but scoped to {scoped_to:?}"),
        InvariantViolation::StaleSelectionAccepted { pool, id, parent } => {
            format!("StaleSelectionAccepted: {pool} {id} validated under {parent}")
        }
        InvariantViolation::TagConflict { message } => format!("TagConflict: {message}"),
        InvariantViolation::AddBeforeSettle { gap, settle } => {
            format!("AddBeforeSettle: add started {gap:?} after removals, settle is {settle:?}")
        }
        InvariantViolation::OutcomeMismatch { claimed, committed } => format!(
            "OutcomeMismatch: outcome claims {claimed} committed steps, backend accepted {committed}"
        ),
        InvariantViolation::StepAfterFailure {
            failed_step,
            issued_steps,
        } => format!(
            "StepAfterFailure: step {failed_step} failed but {issued_steps} steps were issued"
        ),
        InvariantViolation::TargetTagMissing {
            employee,
            expected,
            actual,
        } => format!("TargetTagMissing: employee {employee} has {actual:?}, expected {expected}"),
        InvariantViolation::SelectionAfterBulk {
            succeeded,
            selected_before,
            selected_after,
        } => format!(
            "SelectionAfterBulk: succeeded={succeeded} selection {selected_before} -> {selected_after}"
        ),
        InvariantViolation::SelectionNotPlanned { employee } => {
            format!("SelectionNotPlanned: employee {employee} missing from the add step")
        }
        InvariantViolation::FetchAfterTeardown { fetches } => {
            format!("FetchAfterTeardown: {fetches} fetch(es) issued after teardown")
        }
        InvariantViolation::ResultAfterTeardown {
            version_before,
            version_after,
        } => format!(
            "ResultAfterTeardown: view version moved {version_before} -> {version_after}"
        ),
    }
}

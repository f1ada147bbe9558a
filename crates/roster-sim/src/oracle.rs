use std::time::Duration;

use roster_core::model::{EmployeeId, PoolKind, ReferenceId, TagId};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of checking one or more invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl Default for OracleResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }

    pub fn record(&mut self, violation: InvariantViolation) {
        self.passed = false;
        self.violations.push(violation);
    }

    /// Record the violation built by `violation` unless `holds`.
    pub fn check(&mut self, holds: bool, violation: impl FnOnce() -> InvariantViolation) {
        if !holds {
            self.record(violation());
        }
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A burst of edits inside the debounce window reached the backend more
    /// than once, or not with the final text.
    DebounceLeak {
        /// Text of the last edit in the burst.
        final_search: String,
        /// Search term of every fetch the burst produced.
        issued: Vec<Option<String>>,
    },

    /// A burst of filter toggles reached the backend more than once, or not
    /// with the final selection.
    FilterBurstLeak {
        final_values: Vec<String>,
        issued: Vec<Vec<String>>,
    },

    /// A query identical to the last issued one was fetched again.
    DuplicateFetch {
        query: String,
        /// Extra fetches beyond the first.
        extra: usize,
    },

    /// After the dust settled, the rows on screen were not the answer to
    /// the current query.
    StaleRowsShown {
        query: String,
        expected: Vec<EmployeeId>,
        shown: Vec<EmployeeId>,
    },

    /// A dependent pool held a node whose parent is not the pool's scope.
    PoolMixedParents {
        pool: PoolKind,
        scoped_to: Option<ReferenceId>,
        node: ReferenceId,
        node_parent: Option<ReferenceId>,
    },

    /// A dependent pool's snapshot was scoped to a parent other than the
    /// one selected.
    PoolScopeDrift {
        pool: PoolKind,
        selected: Option<ReferenceId>,
        scoped_to: Option<ReferenceId>,
    },

    /// A form value from the previous parent validated under the new one.
    StaleSelectionAccepted {
        pool: PoolKind,
        id: ReferenceId,
        parent: ReferenceId,
    },

    /// The backend rejected an add because an employee still held another
    /// tag.
    TagConflict { message: String },

    /// The add step started before every removal finished plus the settle
    /// delay.
    AddBeforeSettle { gap: Duration, settle: Duration },

    /// The outcome's committed step count disagrees with what the backend
    /// accepted.
    OutcomeMismatch { claimed: usize, committed: usize },

    /// A step was issued after an earlier step failed.
    StepAfterFailure { failed_step: usize, issued_steps: usize },

    /// A plan reported as fully applied left an employee without the target
    /// tag.
    TargetTagMissing {
        employee: EmployeeId,
        expected: TagId,
        actual: Option<TagId>,
    },

    /// Selection was cleared after a failure, or kept after full success.
    SelectionAfterBulk {
        succeeded: bool,
        selected_before: usize,
        selected_after: usize,
    },

    /// A selected id on another page was not part of the plan.
    SelectionNotPlanned { employee: EmployeeId },

    /// A fetch was issued after the view was torn down.
    FetchAfterTeardown { fetches: usize },

    /// A result was applied after the view was torn down.
    ResultAfterTeardown { version_before: u64, version_after: u64 },
}

//! Bulk mutation plans and their sequential executor.
//!
//! A plan is data: an ordered list of steps, each one network call over a
//! set of employees. [`BulkMutationCoordinator::execute`] runs the steps
//! strictly one after another and stops at the first failure, reporting how
//! far it got.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::MutationSink;
use crate::error::ApiError;
use crate::model::{EmployeeId, ReferenceId, TagId};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOperation {
    Remove,
    Add,
    Update,
}

impl fmt::Display for StepOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => f.write_str("remove"),
            Self::Add => f.write_str("add"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// The remote operation a step performs; doubles as the step payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    AddTag { tag: TagId },
    RemoveTag { tag: TagId },
    SetStatus { status: ReferenceId },
    AssignLineManager { manager: EmployeeId },
    SoftDelete,
    HardDelete,
    Restore,
}

impl Mutation {
    #[must_use]
    pub const fn operation(self) -> StepOperation {
        match self {
            Self::AddTag { .. } | Self::Restore => StepOperation::Add,
            Self::RemoveTag { .. } | Self::SoftDelete | Self::HardDelete => StepOperation::Remove,
            Self::SetStatus { .. } | Self::AssignLineManager { .. } => StepOperation::Update,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddTag { tag } => write!(f, "add tag {tag}"),
            Self::RemoveTag { tag } => write!(f, "remove tag {tag}"),
            Self::SetStatus { status } => write!(f, "set status {status}"),
            Self::AssignLineManager { manager } => write!(f, "assign line manager {manager}"),
            Self::SoftDelete => f.write_str("archive"),
            Self::HardDelete => f.write_str("delete permanently"),
            Self::Restore => f.write_str("restore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub mutation: Mutation,
    pub target_ids: Vec<EmployeeId>,
    /// Pause observed before this step starts.
    #[serde(default)]
    pub settle_before: Option<Duration>,
}

impl PlanStep {
    #[must_use]
    pub const fn new(mutation: Mutation, target_ids: Vec<EmployeeId>) -> Self {
        Self {
            mutation,
            target_ids,
            settle_before: None,
        }
    }

    #[must_use]
    pub const fn operation(&self) -> StepOperation {
        self.mutation.operation()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkMutationPlan {
    steps: Vec<PlanStep>,
}

impl BulkMutationPlan {
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step. Steps with no targets are skipped.
    pub fn push(&mut self, step: PlanStep) {
        if step.target_ids.is_empty() {
            return;
        }
        self.steps.push(step);
    }

    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replace whatever tag each selected employee holds with `target`.
    ///
    /// `holders` pairs each selected id with its current tag. One removal
    /// step is emitted per distinct current tag (in tag id order, untagged
    /// employees excluded), then one add step over the whole selection. The
    /// add step carries `settle` when any removal precedes it.
    #[must_use]
    pub fn replace_tag(
        target: TagId,
        holders: impl IntoIterator<Item = (EmployeeId, Option<TagId>)>,
        settle: Duration,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let mut everyone = Vec::new();
        let mut by_tag: BTreeMap<TagId, Vec<EmployeeId>> = BTreeMap::new();

        for (id, current) in holders {
            if !seen.insert(id) {
                continue;
            }
            everyone.push(id);
            if let Some(tag) = current {
                by_tag.entry(tag).or_default().push(id);
            }
        }

        let mut plan = Self::new();
        for (tag, ids) in by_tag {
            plan.push(PlanStep::new(Mutation::RemoveTag { tag }, ids));
        }
        let had_removals = !plan.is_empty();
        let mut add = PlanStep::new(Mutation::AddTag { tag: target }, everyone);
        if had_removals && !settle.is_zero() {
            add.settle_before = Some(settle);
        }
        plan.push(add);
        plan
    }

    /// A plan with a single step applying `mutation` to every id.
    #[must_use]
    pub fn single(mutation: Mutation, ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        let ids: BTreeSet<EmployeeId> = ids.into_iter().collect();
        let mut plan = Self::new();
        plan.push(PlanStep::new(mutation, ids.into_iter().collect()));
        plan
    }

    #[must_use]
    pub fn add_tag(tag: TagId, ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::AddTag { tag }, ids)
    }

    #[must_use]
    pub fn remove_tag(tag: TagId, ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::RemoveTag { tag }, ids)
    }

    #[must_use]
    pub fn change_status(status: ReferenceId, ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::SetStatus { status }, ids)
    }

    #[must_use]
    pub fn assign_line_manager(
        manager: EmployeeId,
        ids: impl IntoIterator<Item = EmployeeId>,
    ) -> Self {
        Self::single(Mutation::AssignLineManager { manager }, ids)
    }

    #[must_use]
    pub fn soft_delete(ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::SoftDelete, ids)
    }

    #[must_use]
    pub fn hard_delete(ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::HardDelete, ids)
    }

    #[must_use]
    pub fn restore(ids: impl IntoIterator<Item = EmployeeId>) -> Self {
        Self::single(Mutation::Restore, ids)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The step that stopped a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Zero-based index into the plan.
    pub step_index: usize,
    pub mutation: Mutation,
    pub target_count: usize,
    pub error: ApiError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub total_steps: usize,
    /// Steps committed server-side, always a prefix of the plan.
    pub succeeded_steps: usize,
    pub first_failure: Option<StepFailure>,
    /// Server messages from successful steps, in order.
    pub messages: Vec<String>,
}

impl BulkOutcome {
    #[must_use]
    pub const fn is_complete_success(&self) -> bool {
        self.first_failure.is_none()
    }

    /// Some steps committed and a later one failed.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.first_failure.is_some() && self.succeeded_steps > 0
    }

    #[must_use]
    pub const fn any_committed(&self) -> bool {
        self.succeeded_steps > 0
    }

    /// The single user-facing message for this bulk action.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.first_failure {
            None if self.total_steps == 0 => "Nothing to update.".to_string(),
            None => match self.messages.last() {
                Some(message) => message.clone(),
                None => format!(
                    "Bulk update applied ({0} of {0} steps).",
                    self.total_steps
                ),
            },
            Some(failure) => {
                let step = format!(
                    "step {} of {} ({}, {} employees)",
                    failure.step_index + 1,
                    self.total_steps,
                    failure.mutation,
                    failure.target_count
                );
                if self.succeeded_steps == 0 {
                    format!("Bulk update failed at {step}: {}", failure.error)
                } else {
                    format!(
                        "Bulk update partially applied: {} of {} steps succeeded; {step} failed: {}",
                        self.succeeded_steps, self.total_steps, failure.error
                    )
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct BulkMutationCoordinator {
    sink: Arc<dyn MutationSink>,
}

impl BulkMutationCoordinator {
    #[must_use]
    pub fn new(sink: Arc<dyn MutationSink>) -> Self {
        Self { sink }
    }

    /// Run `plan` step by step, awaiting each call before starting the next.
    /// Execution stops at the first failed step.
    pub async fn execute(&self, plan: &BulkMutationPlan) -> BulkOutcome {
        let total_steps = plan.len();
        let mut outcome = BulkOutcome {
            total_steps,
            succeeded_steps: 0,
            first_failure: None,
            messages: Vec::new(),
        };

        for (step_index, step) in plan.steps().iter().enumerate() {
            if let Some(settle) = step.settle_before {
                debug!(step = step_index, ?settle, "settling before step");
                tokio::time::sleep(settle).await;
            }

            match self.sink.apply(&step.mutation, &step.target_ids).await {
                Ok(ack) => {
                    debug!(
                        step = step_index,
                        mutation = %step.mutation,
                        targets = step.target_ids.len(),
                        "bulk step applied"
                    );
                    outcome.succeeded_steps += 1;
                    outcome.messages.extend(ack.message);
                }
                Err(error) => {
                    warn!(
                        step = step_index,
                        mutation = %step.mutation,
                        targets = step.target_ids.len(),
                        code = %error.code(),
                        %error,
                        "bulk step failed; remaining steps skipped"
                    );
                    outcome.first_failure = Some(StepFailure {
                        step_index,
                        mutation: step.mutation,
                        target_count: step.target_ids.len(),
                        error,
                    });
                    break;
                }
            }
        }

        info!(
            succeeded = outcome.succeeded_steps,
            total = total_steps,
            failed = outcome.first_failure.is_some(),
            "bulk plan finished"
        );
        outcome
    }
}

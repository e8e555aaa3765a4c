//! Run results.

use crate::error::{ErrorKind, SyncError};
use crate::reconciler::RecordAction;
use crate::registry::SyncMode;
use serde::Serialize;
use std::time::Duration;
use tidesync_protocol::{RecordId, Timestamp};
use uuid::Uuid;

/// Per-action record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    /// Records created locally.
    pub created: u64,
    /// Records overwritten locally.
    pub updated: u64,
    /// Records removed locally.
    pub deleted: u64,
    /// Records that needed no change.
    pub skipped: u64,
}

impl ActionCounts {
    /// Counts one action.
    pub fn record(&mut self, action: RecordAction) {
        match action {
            RecordAction::Created => self.created += 1,
            RecordAction::Updated => self.updated += 1,
            RecordAction::Deleted => self.deleted += 1,
            RecordAction::Skipped => self.skipped += 1,
        }
    }

    /// Takes back one counted action that was later undone.
    pub fn retract(&mut self, action: RecordAction) {
        let counter = match action {
            RecordAction::Created => &mut self.created,
            RecordAction::Updated => &mut self.updated,
            RecordAction::Deleted => &mut self.deleted,
            RecordAction::Skipped => &mut self.skipped,
        };
        *counter = counter.saturating_sub(1);
    }

    /// Adds another set of counters to this one.
    pub fn merge(&mut self, other: &ActionCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }

    /// Records that changed the store.
    pub fn changes(&self) -> u64 {
        self.created + self.updated + self.deleted
    }

    /// All records processed.
    pub fn total(&self) -> u64 {
        self.changes() + self.skipped
    }
}

/// Why an entity pass failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    /// Error classification.
    pub kind: ErrorKind,
    /// Rendered error.
    pub message: String,
    /// Record being reconciled when the pass stopped, if any.
    pub record: Option<RecordId>,
}

impl EntityFailure {
    /// Captures an error that was not tied to a specific record.
    pub fn from_error(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            record: None,
        }
    }

    /// Attaches the record that failed.
    pub fn with_record(mut self, record: RecordId) -> Self {
        self.record = Some(record);
        self
    }
}

/// A record the pass skipped because it could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Identifier as received (may be blank).
    pub record: RecordId,
    /// Remote modification time.
    pub updated_at: Timestamp,
    /// Why it was rejected.
    pub message: String,
}

/// Result of one entity pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityOutcome {
    /// Entity name.
    pub entity_name: String,
    /// Scheduling mode at the time of the run.
    pub mode: SyncMode,
    /// Watermark used as the fetch lower bound (`None` for explicit bundles
    /// and empty stores).
    pub since: Option<Timestamp>,
    /// Records received from the transport or the bundle.
    pub received: usize,
    /// What reconciliation did.
    pub counts: ActionCounts,
    /// Records skipped as unreconcilable; the pass carried on past them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedRecord>,
    /// Records whose writes were undone after the pass stopped, so that
    /// they are fetched again by the next run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverted: Vec<RecordId>,
    /// Set if the pass stopped early.
    pub failure: Option<EntityFailure>,
    /// Wall time of the pass.
    #[serde(skip)]
    pub duration: Duration,
}

impl EntityOutcome {
    pub(crate) fn new(entity_name: &str, mode: SyncMode) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            mode,
            since: None,
            received: 0,
            counts: ActionCounts::default(),
            rejected: Vec::new(),
            reverted: Vec::new(),
            failure: None,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the pass finished without error.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every entity pass succeeded.
    Completed,
    /// At least one entity pass failed; see [`SyncRun::failed`].
    PartiallyFailed,
}

/// Aggregate result returned by a run.
///
/// Sequential entities appear first in registration order, followed by
/// concurrent entities in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    /// Identifier used to correlate log lines of this run.
    pub run_id: Uuid,
    /// One outcome per attempted entity.
    pub entities: Vec<EntityOutcome>,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// Wall time of the run.
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncRun {
    pub(crate) fn new(run_id: Uuid, entities: Vec<EntityOutcome>, duration: Duration) -> Self {
        let outcome = if entities.iter().all(EntityOutcome::is_success) {
            RunOutcome::Completed
        } else {
            RunOutcome::PartiallyFailed
        };
        Self {
            run_id,
            entities,
            outcome,
            duration,
        }
    }

    /// Returns true if every entity succeeded.
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Outcome for a named entity.
    pub fn entity(&self, name: &str) -> Option<&EntityOutcome> {
        self.entities.iter().find(|e| e.entity_name == name)
    }

    /// Names of all attempted entities.
    pub fn attempted(&self) -> impl Iterator<Item = &str> + '_ {
        self.entities.iter().map(|e| e.entity_name.as_str())
    }

    /// Names of entities that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &str> + '_ {
        self.entities
            .iter()
            .filter(|e| e.is_success())
            .map(|e| e.entity_name.as_str())
    }

    /// Entities that failed, with the reason.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &EntityFailure)> + '_ {
        self.entities
            .iter()
            .filter_map(|e| e.failure.as_ref().map(|f| (e.entity_name.as_str(), f)))
    }

    /// Records rejected across all entities, with their entity name.
    pub fn rejected(&self) -> impl Iterator<Item = (&str, &RejectedRecord)> + '_ {
        self.entities.iter().flat_map(|e| {
            e.rejected
                .iter()
                .map(move |r| (e.entity_name.as_str(), r))
        })
    }

    /// Counters summed over all entities.
    pub fn totals(&self) -> ActionCounts {
        let mut totals = ActionCounts::default();
        for entity in &self.entities {
            totals.merge(&entity.counts);
        }
        totals
    }
}

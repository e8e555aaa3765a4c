//! Applying remote records to the local store.
//!
//! The remote version always wins: the fetch was already filtered to
//! records newer than the local watermark, so timestamps are not compared
//! again here.

use crate::error::{SyncError, SyncResult};
use crate::registry::EntityDescriptor;
use serde::Serialize;
use std::fmt;
use tidesync_protocol::RemoteRecord;
use tidesync_store::{LocalRecord, LocalStore};

/// What reconciling one record did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    /// A new local record was created.
    Created,
    /// An existing local record was overwritten.
    Updated,
    /// A local record was removed.
    Deleted,
    /// Nothing changed (deletion of a record that is not stored).
    Skipped,
}

impl RecordAction {
    /// Short verb for logs and observer output.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordAction::Created => "create",
            RecordAction::Updated => "update",
            RecordAction::Deleted => "delete",
            RecordAction::Skipped => "skip",
        }
    }

    /// Returns true if the action wrote to the store.
    pub fn is_change(&self) -> bool {
        !matches!(self, RecordAction::Skipped)
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for one record, computed before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Action that [`RecordReconciler::execute`] will take.
    pub action: RecordAction,
    /// The local record found under the same identifier, if any.
    pub local: Option<LocalRecord>,
}

/// Applies remote records of one entity to its storage path.
pub struct RecordReconciler<'a, S: LocalStore + ?Sized> {
    store: &'a S,
    descriptor: &'a EntityDescriptor,
}

impl<'a, S: LocalStore + ?Sized> RecordReconciler<'a, S> {
    /// Creates a reconciler writing through `descriptor`'s storage path.
    pub fn new(store: &'a S, descriptor: &'a EntityDescriptor) -> Self {
        Self { store, descriptor }
    }

    fn validate(&self, record: &RemoteRecord) -> SyncResult<()> {
        if record.identifier.is_empty() {
            return Err(SyncError::Reconciliation(format!(
                "record in '{}' has no identifier",
                self.descriptor.name()
            )));
        }
        if record.entity_name != self.descriptor.name() {
            return Err(SyncError::Reconciliation(format!(
                "record '{}' belongs to '{}', not '{}'",
                record.identifier,
                record.entity_name,
                self.descriptor.name()
            )));
        }
        Ok(())
    }

    /// Decides what to do with `record` without writing anything.
    pub fn plan(&self, record: &RemoteRecord) -> SyncResult<ReconcilePlan> {
        self.validate(record)?;
        let local = self
            .store
            .find(self.descriptor.storage_path(), &record.identifier)?;

        let action = match (record.deleted, local.is_some()) {
            (true, true) => RecordAction::Deleted,
            (true, false) => RecordAction::Skipped,
            (false, false) => RecordAction::Created,
            (false, true) => RecordAction::Updated,
        };
        Ok(ReconcilePlan { action, local })
    }

    /// Carries out a plan produced by [`plan`](Self::plan).
    pub fn execute(&self, record: &RemoteRecord, plan: ReconcilePlan) -> SyncResult<RecordAction> {
        match (plan.action, plan.local) {
            (RecordAction::Deleted, Some(local)) => self.store.delete(&local)?,
            (RecordAction::Updated, Some(local)) => {
                self.store
                    .update(&local, &record.attributes, record.updated_at)?;
            }
            (RecordAction::Created, _) => {
                self.store.create(
                    self.descriptor.storage_path(),
                    &record.identifier,
                    &record.attributes,
                    record.updated_at,
                )?;
            }
            (RecordAction::Skipped, _) => {}
            (action, None) => {
                return Err(SyncError::Reconciliation(format!(
                    "cannot {} record '{}' without a local copy",
                    action, record.identifier
                )))
            }
        }
        Ok(plan.action)
    }

    /// Undoes a create or update that [`execute`](Self::execute) carried
    /// out, restoring `previous` (the plan's local record).
    ///
    /// Deletes and skips are left alone: neither raises the stored
    /// maximum, and a re-fetched tombstone reconciles to a skip.
    pub fn revert(
        &self,
        record: &RemoteRecord,
        action: RecordAction,
        previous: Option<&LocalRecord>,
    ) -> SyncResult<()> {
        let path = self.descriptor.storage_path();
        let current = self.store.find(path, &record.identifier)?;
        match (action, previous, current) {
            (RecordAction::Created, _, Some(current)) => self.store.delete(&current)?,
            (RecordAction::Updated, Some(previous), Some(current)) => {
                self.store
                    .update(&current, &previous.attributes, previous.updated_at)?;
            }
            (RecordAction::Updated, Some(previous), None) => {
                self.store.create(
                    path,
                    &previous.identifier,
                    &previous.attributes,
                    previous.updated_at,
                )?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Plans and executes in one step.
    pub fn apply(&self, record: &RemoteRecord) -> SyncResult<RecordAction> {
        let plan = self.plan(record)?;
        self.execute(record, plan)
    }
}

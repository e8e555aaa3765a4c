//! Run orchestration.
//!
//! A run has two phases. Sequential entities go first, one at a time, in
//! registration order. Concurrent entities follow as independent passes on
//! scoped worker threads. Each pass is:
//!
//! 1. claim the entity (at most one active pass per entity)
//! 2. watermark from the local store
//! 3. fetch records newer than the watermark
//! 4. reconcile them in ascending `updated_at` order
//!
//! A record that cannot be reconciled (blank identifier, wrong entity) is
//! skipped and listed in [`EntityOutcome::rejected`]; the pass carries on.
//!
//! Any other error stops the pass at the failing record and is recorded in
//! the [`SyncRun`]; other passes carry on. Creates and updates this pass made
//! at or above the failing record's `updated_at` are reverted, so the stored
//! maximum stays below it and the next run fetches it again. Older records
//! stay applied.

use crate::config::{Parallelism, RunMode, SyncConfig, SyncOptions};
use crate::error::{SyncError, SyncResult};
use crate::observer::ObserverNotifier;
use crate::reconciler::{RecordAction, RecordReconciler};
use crate::registry::{EntityDescriptor, EntityRegistry};
use crate::run::{EntityFailure, EntityOutcome, RejectedRecord, SyncRun};
use crate::transport::RemoteTransport;
use crate::watermark::WatermarkTracker;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use tidesync_protocol::{RemoteRecord, Timestamp};
use tidesync_store::{LocalRecord, LocalStore};
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

/// Entities that currently have a pass in flight.
///
/// Shared by every run of an engine so overlapping runs cannot reconcile
/// the same entity twice.
#[derive(Debug, Default)]
pub struct ActivePasses {
    entities: Mutex<HashSet<String>>,
}

impl ActivePasses {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `entity_name` has a pass in flight.
    pub fn is_active(&self, entity_name: &str) -> bool {
        self.entities.lock().contains(entity_name)
    }

    /// Number of passes in flight.
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    /// Returns true if no pass is in flight.
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    fn claim(&self, entity_name: &str) -> SyncResult<PassGuard<'_>> {
        if !self.entities.lock().insert(entity_name.to_string()) {
            return Err(SyncError::PassInProgress(entity_name.to_string()));
        }
        Ok(PassGuard {
            active: self,
            entity_name: entity_name.to_string(),
        })
    }
}

struct PassGuard<'a> {
    active: &'a ActivePasses,
    entity_name: String,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.active.entities.lock().remove(&self.entity_name);
    }
}

enum RecordSource<'p> {
    Remote,
    Provided(&'p [RemoteRecord]),
}

impl<'p> RecordSource<'p> {
    fn for_entity(mode: &'p RunMode, entity_name: &str) -> Self {
        match mode {
            RunMode::RegistryDriven => RecordSource::Remote,
            RunMode::Explicit(payload) => {
                RecordSource::Provided(payload.get(entity_name).unwrap_or_default())
            }
        }
    }
}

/// A create or update made by the current pass, kept until the pass ends.
struct Written<'r> {
    record: &'r RemoteRecord,
    action: RecordAction,
    previous: Option<LocalRecord>,
}

/// Runs entity passes over a store and a transport.
pub struct SyncScheduler<'a, S: LocalStore + ?Sized, T: RemoteTransport + ?Sized> {
    store: &'a S,
    transport: &'a T,
    notifier: &'a ObserverNotifier,
    config: &'a SyncConfig,
    active: &'a ActivePasses,
}

impl<'a, S: LocalStore + ?Sized, T: RemoteTransport + ?Sized> SyncScheduler<'a, S, T> {
    /// Creates a scheduler.
    pub fn new(
        store: &'a S,
        transport: &'a T,
        notifier: &'a ObserverNotifier,
        config: &'a SyncConfig,
        active: &'a ActivePasses,
    ) -> Self {
        Self {
            store,
            transport,
            notifier,
            config,
            active,
        }
    }

    /// Executes one run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] before any work if the registry
    /// is empty or an explicit bundle names an unregistered entity. Every
    /// other failure is recorded per entity in the returned [`SyncRun`].
    pub fn run(&self, registry: &EntityRegistry, options: &SyncOptions) -> SyncResult<SyncRun> {
        validate(registry, &options.mode)?;

        let selected = |d: &&EntityDescriptor| match &options.mode {
            RunMode::RegistryDriven => true,
            RunMode::Explicit(payload) => payload.contains(d.name()),
        };
        let sequential: Vec<&EntityDescriptor> =
            registry.sequential_entities().filter(selected).collect();
        let concurrent: Vec<&EntityDescriptor> =
            registry.concurrent_entities().filter(selected).collect();

        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        let _enter = span.enter();
        let started = Instant::now();
        info!(
            sequential = sequential.len(),
            concurrent = concurrent.len(),
            explicit = options.is_explicit(),
            "sync run starting"
        );

        self.notifier.run_start();
        let mut outcomes = Vec::with_capacity(sequential.len() + concurrent.len());

        if !sequential.is_empty() {
            let names: Vec<String> = sequential.iter().map(|d| d.name().to_string()).collect();
            self.notifier.sequential_start(&names);
            for descriptor in &sequential {
                outcomes.push(self.run_entity(descriptor, &options.mode));
            }
            self.notifier.sequential_end(&names);
        }

        match options.parallelism {
            Parallelism::Serial => {
                for descriptor in &concurrent {
                    outcomes.push(self.run_entity(descriptor, &options.mode));
                }
            }
            Parallelism::Declared => {
                outcomes.extend(self.run_concurrent(&concurrent, &options.mode));
            }
        }

        let run = SyncRun::new(run_id, outcomes, started.elapsed());
        let totals = run.totals();
        info!(
            outcome = ?run.outcome,
            created = totals.created,
            updated = totals.updated,
            deleted = totals.deleted,
            skipped = totals.skipped,
            failed = run.failed().count(),
            elapsed_ms = run.duration.as_millis() as u64,
            "sync run finished"
        );
        self.notifier.run_end(&run);
        Ok(run)
    }

    fn run_concurrent(
        &self,
        entities: &[&EntityDescriptor],
        mode: &RunMode,
    ) -> Vec<EntityOutcome> {
        if entities.is_empty() {
            return Vec::new();
        }

        let workers = self.config.max_parallel_passes.min(entities.len());
        let next = AtomicUsize::new(0);
        let outcomes = Mutex::new(Vec::with_capacity(entities.len()));
        let span = Span::current();
        debug!(workers, entities = entities.len(), "starting concurrent passes");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let _enter = span.enter();
                    while let Some(descriptor) = entities.get(next.fetch_add(1, Ordering::SeqCst))
                    {
                        let outcome = self.run_entity(descriptor, mode);
                        outcomes.lock().push(outcome);
                    }
                });
            }
        });

        outcomes.into_inner()
    }

    fn run_entity(&self, descriptor: &EntityDescriptor, mode: &RunMode) -> EntityOutcome {
        let name = descriptor.name();
        let started = Instant::now();
        let mut outcome = EntityOutcome::new(name, descriptor.mode());

        self.notifier.entity_start(name);
        let source = RecordSource::for_entity(mode, name);
        if let Err(failure) = self.pass(descriptor, source, &mut outcome) {
            warn!(
                entity = name,
                kind = ?failure.kind,
                record = ?failure.record,
                error = %failure.message,
                "entity pass failed"
            );
            outcome.failure = Some(failure);
        }
        outcome.duration = started.elapsed();
        debug!(
            entity = name,
            received = outcome.received,
            changes = outcome.counts.changes(),
            "entity pass finished"
        );
        self.notifier.entity_end(name, &outcome);
        outcome
    }

    fn pass(
        &self,
        descriptor: &EntityDescriptor,
        source: RecordSource<'_>,
        outcome: &mut EntityOutcome,
    ) -> Result<(), EntityFailure> {
        let name = descriptor.name();
        let _guard = self
            .active
            .claim(name)
            .map_err(|e| EntityFailure::from_error(&e))?;

        let mut records = match source {
            RecordSource::Remote => {
                let mark = WatermarkTracker::new(self.store)
                    .max_updated(descriptor)
                    .map_err(|e| EntityFailure::from_error(&e))?;
                outcome.since = mark.max_updated;
                debug!(entity = name, since = ?mark.max_updated, "fetching");
                self.transport
                    .fetch(name, mark.max_updated)
                    .map_err(|e| EntityFailure::from_error(&e))?
            }
            RecordSource::Provided(records) => records.to_vec(),
        };
        outcome.received = records.len();

        if self.config.sort_by_updated {
            records.sort_by_key(|r| r.updated_at);
        }

        let reconciler = RecordReconciler::new(self.store, descriptor);
        let mut written = Vec::new();
        for record in &records {
            match self.reconcile(&reconciler, name, record) {
                Ok((action, previous)) => {
                    outcome.counts.record(action);
                    if matches!(action, RecordAction::Created | RecordAction::Updated) {
                        written.push(Written {
                            record,
                            action,
                            previous,
                        });
                    }
                    self.notifier.element_end(name, record, action);
                }
                Err(SyncError::Reconciliation(message)) => {
                    warn!(
                        entity = name,
                        record = %record.identifier,
                        updated_at = %record.updated_at,
                        error = %message,
                        "record rejected"
                    );
                    outcome.rejected.push(RejectedRecord {
                        record: record.identifier.clone(),
                        updated_at: record.updated_at,
                        message,
                    });
                }
                Err(err) => {
                    let failure =
                        EntityFailure::from_error(&err).with_record(record.identifier.clone());
                    return Err(self.revert_from(
                        &reconciler,
                        record.updated_at,
                        &written,
                        outcome,
                        failure,
                    ));
                }
            }
        }
        Ok(())
    }

    fn reconcile(
        &self,
        reconciler: &RecordReconciler<'_, S>,
        name: &str,
        record: &RemoteRecord,
    ) -> SyncResult<(RecordAction, Option<LocalRecord>)> {
        let plan = reconciler.plan(record)?;
        let action = plan.action;
        let previous = plan.local.clone();
        self.notifier.element_start(name, record, action);
        reconciler.execute(record, plan)?;
        Ok((action, previous))
    }

    /// Undoes this pass's writes at or above `failed_at`, newest first.
    fn revert_from(
        &self,
        reconciler: &RecordReconciler<'_, S>,
        failed_at: Timestamp,
        written: &[Written<'_>],
        outcome: &mut EntityOutcome,
        mut failure: EntityFailure,
    ) -> EntityFailure {
        for entry in written
            .iter()
            .rev()
            .filter(|w| w.record.updated_at >= failed_at)
        {
            let id = &entry.record.identifier;
            match reconciler.revert(entry.record, entry.action, entry.previous.as_ref()) {
                Ok(()) => {
                    debug!(entity = outcome.entity_name.as_str(), record = %id, "write reverted");
                    outcome.counts.retract(entry.action);
                    outcome.reverted.push(id.clone());
                }
                Err(err) => {
                    warn!(
                        entity = outcome.entity_name.as_str(),
                        record = %id,
                        error = %err,
                        "cannot revert write"
                    );
                    failure.message =
                        format!("{}; reverting '{}' failed: {}", failure.message, id, err);
                }
            }
        }
        failure
    }
}

fn validate(registry: &EntityRegistry, mode: &RunMode) -> SyncResult<()> {
    if registry.is_empty() {
        return Err(SyncError::configuration("no entities registered"));
    }
    if let RunMode::Explicit(payload) = mode {
        if let Some(unknown) = payload.entity_names().find(|n| registry.get(n).is_none()) {
            return Err(SyncError::configuration(format!(
                "payload names unregistered entity '{}'",
                unknown
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SyncMode;
    use crate::transport::MockTransport;
    use serde_json::json;
    use tidesync_protocol::{Attributes, EntityPayload, RecordId, Timestamp};
    use tidesync_store::{MemoryStore, StoragePath};

    struct Fixture {
        store: MemoryStore,
        transport: MockTransport,
        notifier: ObserverNotifier,
        config: SyncConfig,
        active: ActivePasses,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                transport: MockTransport::new(),
                notifier: ObserverNotifier::new(),
                config: SyncConfig::new().with_max_parallel_passes(2),
                active: ActivePasses::new(),
            }
        }

        fn scheduler(&self) -> SyncScheduler<'_, MemoryStore, MockTransport> {
            SyncScheduler::new(
                &self.store,
                &self.transport,
                &self.notifier,
                &self.config,
                &self.active,
            )
        }
    }

    fn record(entity: &str, id: &str, ts: i64) -> RemoteRecord {
        let attributes: Attributes = [("v".to_string(), json!(ts))].into();
        RemoteRecord::upsert(entity, id, ts, attributes)
    }

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with("accounts", "accounts", SyncMode::Sequential)
            .unwrap()
            .with("tags", "tags", SyncMode::Concurrent)
            .unwrap()
    }

    #[test]
    fn empty_registry_is_rejected() {
        let fx = Fixture::new();
        let err = fx
            .scheduler()
            .run(&EntityRegistry::new(), &SyncOptions::registry_driven())
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(fx.transport.fetch_log().is_empty());
    }

    #[test]
    fn registry_run_pulls_every_entity() {
        let fx = Fixture::new();
        fx.transport
            .set_records("accounts", vec![record("accounts", "a2", 2), record("accounts", "a1", 1)]);
        fx.transport.set_records("tags", vec![record("tags", "t1", 5)]);

        let run = fx
            .scheduler()
            .run(&registry(), &SyncOptions::registry_driven())
            .unwrap();

        assert!(run.is_completed());
        assert_eq!(run.entities[0].entity_name, "accounts");
        assert_eq!(run.entity("accounts").unwrap().counts.created, 2);
        assert_eq!(run.entity("tags").unwrap().counts.created, 1);
        assert!(fx.active.is_empty());
    }

    #[test]
    fn second_run_fetches_above_watermark() {
        let fx = Fixture::new();
        fx.transport.set_records("tags", vec![record("tags", "t1", 5)]);
        let scheduler = fx.scheduler();
        scheduler.run(&registry(), &SyncOptions::registry_driven()).unwrap();
        let run = scheduler.run(&registry(), &SyncOptions::registry_driven()).unwrap();

        let tags = run.entity("tags").unwrap();
        assert_eq!(tags.since, Some(Timestamp::new(5)));
        assert_eq!(tags.received, 0);
        assert_eq!(tags.counts.total(), 0);
    }

    #[test]
    fn unreconcilable_record_is_rejected_and_the_pass_continues() {
        let fx = Fixture::new();
        let mut bad = record("accounts", "bad", 3);
        bad.identifier = RecordId::new("");
        fx.transport.set_records(
            "accounts",
            vec![bad, record("accounts", "a4", 4), record("accounts", "a1", 1)],
        );

        let run = fx
            .scheduler()
            .run(&registry(), &SyncOptions::registry_driven())
            .unwrap();

        let accounts = run.entity("accounts").unwrap();
        assert!(accounts.is_success());
        assert_eq!(accounts.counts.created, 2);
        assert_eq!(accounts.rejected.len(), 1);
        assert_eq!(accounts.rejected[0].updated_at, Timestamp::new(3));
        let path = StoragePath::new("accounts").unwrap();
        assert_eq!(fx.store.max_updated(&path).unwrap(), Some(Timestamp::new(4)));
        assert!(run.entity("tags").unwrap().is_success());
    }

    #[test]
    fn explicit_mode_skips_transport_and_unlisted_entities() {
        let fx = Fixture::new();
        let payload = EntityPayload::new().with("tags", vec![record("tags", "t1", 1)]);

        let run = fx
            .scheduler()
            .run(&registry(), &SyncOptions::explicit(payload))
            .unwrap();

        assert_eq!(run.attempted().collect::<Vec<_>>(), vec!["tags"]);
        assert_eq!(run.entity("tags").unwrap().since, None);
        assert!(fx.transport.fetch_log().is_empty());
    }

    #[test]
    fn explicit_mode_rejects_unknown_entity() {
        let fx = Fixture::new();
        let payload = EntityPayload::new().with("ghosts", vec![record("ghosts", "g", 1)]);
        let err = fx
            .scheduler()
            .run(&registry(), &SyncOptions::explicit(payload))
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn busy_entity_is_reported_not_reconciled() {
        let fx = Fixture::new();
        fx.transport.set_records("tags", vec![record("tags", "t1", 1)]);
        let _held = fx.active.claim("tags").unwrap();

        let run = fx
            .scheduler()
            .run(&registry(), &SyncOptions::registry_driven())
            .unwrap();

        let tags = run.entity("tags").unwrap();
        assert_eq!(tags.failure.as_ref().unwrap().kind, crate::error::ErrorKind::Busy);
        assert_eq!(fx.transport.fetch_count("tags"), 0);
        assert!(run.entity("accounts").unwrap().is_success());
    }

    #[test]
    fn guard_releases_claim() {
        let active = ActivePasses::new();
        {
            let _guard = active.claim("a").unwrap();
            assert!(active.is_active("a"));
            assert!(matches!(active.claim("a"), Err(SyncError::PassInProgress(_))));
        }
        assert!(!active.is_active("a"));
        assert_eq!(active.len(), 0);
    }
}

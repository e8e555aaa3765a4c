//! End-to-end tests for the sync engine.
//!
//! These run full registry-driven and explicit runs against the reference
//! stores and the mock transport, and check store contents, run reports and
//! the observer event stream.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tidesync_engine::{
    CallbackObserver, ErrorKind, MockTransport, Parallelism, RecordAction, RunOutcome, SyncConfig, SyncEngine,
    SyncError, SyncMode, SyncOptions,
};
use tidesync_protocol::{EntityPayload, RecordId, RemoteRecord, Timestamp};
use tidesync_store::{FileStore, LocalStore, MemoryStore};
use tidesync_testkit::prelude::*;

fn observed(
    engine: &SyncEngine<impl LocalStore, impl tidesync_engine::RemoteTransport>,
) -> Arc<RecordingObserver> {
    let observer = Arc::new(RecordingObserver::new());
    engine.add_observer(observer.clone());
    observer
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn sequential_entities_run_in_registration_order_without_overlap() {
    let engine = memory_engine(Default::default());
    for name in ["currencies", "accounts", "transactions"] {
        engine.register(name, name, SyncMode::Sequential).unwrap();
        engine
            .transport()
            .set_records(name, vec![record(name, "1", 1), record(name, "2", 2)]);
    }
    let observer = observed(&engine);

    let run = engine.sync().unwrap();
    assert!(run.is_completed());

    let events = observer.events();
    assert_eq!(events.first(), Some(&ObservedEvent::RunStart));
    assert_eq!(
        events[1],
        ObservedEvent::SequentialStart(vec![
            "currencies".into(),
            "accounts".into(),
            "transactions".into()
        ])
    );

    // Every entity's events are contiguous: nothing else starts before it ends.
    let mut current: Option<String> = None;
    let mut order = Vec::new();
    for event in &events {
        match event {
            ObservedEvent::EntityStart(name) => {
                assert!(current.is_none(), "{} started while {:?} active", name, current);
                current = Some(name.clone());
                order.push(name.clone());
            }
            ObservedEvent::EntityEnd { entity, .. } => {
                assert_eq!(current.as_deref(), Some(entity.as_str()));
                current = None;
            }
            ObservedEvent::ElementStart { entity, .. } | ObservedEvent::ElementEnd { entity, .. } => {
                assert_eq!(current.as_deref(), Some(entity.as_str()));
            }
            _ => {}
        }
    }
    assert_eq!(order, vec!["currencies", "accounts", "transactions"]);
    assert_eq!(events.last(), Some(&ObservedEvent::RunEnd { completed: true }));
}

#[test]
fn sequential_phase_precedes_concurrent_entities() {
    let engine = memory_engine(Default::default());
    engine.register("tags", "tags", SyncMode::Concurrent).unwrap();
    engine.register("accounts", "accounts", SyncMode::Sequential).unwrap();
    engine.register("icons", "icons", SyncMode::Concurrent).unwrap();
    let observer = observed(&engine);

    engine.sync().unwrap();

    let events = observer.events();
    let phase_end = events
        .iter()
        .position(|e| matches!(e, ObservedEvent::SequentialEnd(_)))
        .unwrap();
    let first_concurrent = events
        .iter()
        .position(|e| matches!(e, ObservedEvent::EntityStart(n) if n != "accounts"))
        .unwrap();
    assert!(phase_end < first_concurrent);
}

#[test]
fn records_are_applied_oldest_first() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().set_records(
        "accounts",
        vec![
            record("accounts", "c", 30),
            record("accounts", "a", 10),
            record("accounts", "b", 20),
        ],
    );
    let observer = observed(&engine);

    engine.sync().unwrap();

    let ids: Vec<_> = observer.elements("accounts").into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn element_callbacks_carry_the_planned_action() {
    let engine = memory_engine(accounts_and_tags());
    engine.apply_payload(EntityPayload::new().with("tags", vec![record("tags", "t1", 1)])).unwrap();
    let observer = observed(&engine);

    engine
        .apply_payload(EntityPayload::new().with(
            "tags",
            vec![record("tags", "t1", 2), record("tags", "t2", 3), tombstone("tags", "t9", 4)],
        ))
        .unwrap();

    let starts: Vec<_> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ObservedEvent::ElementStart { id, action, .. } => Some((id, action)),
            _ => None,
        })
        .collect();
    let expected = vec![
        ("t1".to_string(), RecordAction::Updated),
        ("t2".to_string(), RecordAction::Created),
        ("t9".to_string(), RecordAction::Skipped),
    ];
    assert_eq!(starts, expected);
    assert_eq!(observer.elements("tags"), expected);
}

// ============================================================================
// Watermarks and idempotence
// ============================================================================

#[test]
fn watermark_reflects_only_local_records() {
    let engine = memory_engine(accounts_and_tags());
    let store = engine.store();
    store
        .create(
            &storage_path("meta/tags"),
            &RecordId::new("t1"),
            &attrs(&[]),
            Timestamp::new(100),
        )
        .unwrap();
    // Unrelated data under another path must not move the watermark.
    store
        .create(
            &storage_path("elsewhere"),
            &RecordId::new("x"),
            &attrs(&[]),
            Timestamp::new(9_000),
        )
        .unwrap();
    // The transport knows newer records; they do not count until applied.
    engine.transport().set_records("tags", vec![record("tags", "t2", 500)]);

    assert_eq!(
        engine.watermark("tags").unwrap().max_updated,
        Some(Timestamp::new(100))
    );

    engine.sync().unwrap();
    let fetches: Vec<_> = engine
        .transport()
        .fetch_log()
        .into_iter()
        .filter(|(name, _)| name == "tags")
        .collect();
    assert_eq!(fetches, vec![("tags".to_string(), Some(Timestamp::new(100)))]);
    assert_eq!(
        engine.watermark("tags").unwrap().max_updated,
        Some(Timestamp::new(500))
    );
}

#[test]
fn second_identical_run_changes_nothing() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().set_records(
        "accounts",
        vec![record("accounts", "a1", 1), record("accounts", "a2", 2)],
    );
    engine.transport().set_records("tags", vec![record("tags", "t1", 7)]);

    let first = engine.sync().unwrap();
    assert_eq!(first.totals().created, 3);
    let before = engine.store().records(&storage_path("ledger/accounts")).unwrap();

    let second = engine.sync().unwrap();
    assert!(second.is_completed());
    assert_eq!(second.totals().total(), 0);
    assert_eq!(
        engine.store().records(&storage_path("ledger/accounts")).unwrap(),
        before
    );
    assert_eq!(second.entity("accounts").unwrap().since, Some(Timestamp::new(2)));
}

#[test]
fn empty_store_fetches_everything() {
    let engine = memory_engine(accounts_and_tags());
    engine.sync().unwrap();
    assert!(engine
        .transport()
        .fetch_log()
        .iter()
        .all(|(_, since)| since.is_none()));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn delete_round_trip() {
    let engine = memory_engine(accounts_and_tags());
    let path = storage_path("meta/tags");
    engine.transport().push_record(record("tags", "t1", 1));
    engine.sync().unwrap();
    assert!(engine.store().find(&path, &RecordId::new("t1")).unwrap().is_some());

    engine.transport().push_record(tombstone("tags", "t1", 2));
    let run = engine.sync().unwrap();
    assert_eq!(run.entity("tags").unwrap().counts.deleted, 1);
    assert!(engine.store().find(&path, &RecordId::new("t1")).unwrap().is_none());

    // Deleting again is a no-op.
    let run = engine
        .apply_payload(EntityPayload::new().with("tags", vec![tombstone("tags", "t1", 3)]))
        .unwrap();
    assert_eq!(run.entity("tags").unwrap().counts.skipped, 1);
    assert_eq!(engine.store().count(&path).unwrap(), 0);
}

#[test]
fn remote_version_overwrites_local_attributes() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().push_record(RemoteRecord::upsert(
        "accounts",
        "a1",
        1,
        attrs(&[("name", json!("Checking")), ("balance", json!(10))]),
    ));
    engine.sync().unwrap();

    engine.transport().push_record(RemoteRecord::upsert(
        "accounts",
        "a1",
        2,
        attrs(&[("name", json!("Savings"))]),
    ));
    let run = engine.sync().unwrap();
    assert_eq!(run.entity("accounts").unwrap().counts.updated, 1);

    let local = engine
        .store()
        .find(&storage_path("ledger/accounts"), &RecordId::new("a1"))
        .unwrap()
        .unwrap();
    assert_eq!(local.attributes, attrs(&[("name", json!("Savings"))]));
    assert_eq!(local.updated_at, Timestamp::new(2));
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn failed_entity_does_not_abort_the_run() {
    let engine = memory_engine(Default::default());
    for name in ["a", "b", "c"] {
        engine.register(name, name, SyncMode::Sequential).unwrap();
        engine.transport().set_records(name, vec![record(name, "1", 1)]);
    }
    engine
        .transport()
        .fail_entity("b", SyncError::transport_retryable("timeout"));
    let observer = observed(&engine);

    let run = engine.sync().unwrap();

    assert_eq!(run.outcome, RunOutcome::PartiallyFailed);
    assert_eq!(run.succeeded().collect::<Vec<_>>(), vec!["a", "c"]);
    let failed: Vec<_> = run.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "b");
    assert_eq!(failed[0].1.kind, ErrorKind::Transport);
    assert_eq!(
        observer.entity_ends(),
        vec![
            ("a".to_string(), true),
            ("b".to_string(), false),
            ("c".to_string(), true)
        ]
    );
    assert_eq!(
        observer.events().last(),
        Some(&ObservedEvent::RunEnd { completed: false })
    );
}

#[test]
fn storage_failure_is_retried_by_the_next_run() {
    let store = FaultyStore::new(MemoryStore::new());
    store.reject_record("a2");
    let engine = SyncEngine::with_registry(
        SyncConfig::new(),
        store,
        MockTransport::new(),
        accounts_and_tags(),
    );
    engine.transport().set_records(
        "accounts",
        vec![
            record("accounts", "a1", 1),
            record("accounts", "a2", 2),
            record("accounts", "a3", 3),
        ],
    );

    let run = engine.sync().unwrap();
    let accounts = run.entity("accounts").unwrap();
    let failure = accounts.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Storage);
    assert_eq!(failure.record, Some(RecordId::new("a2")));
    assert_eq!(accounts.counts.created, 1);
    assert_eq!(
        engine.watermark("accounts").unwrap().max_updated,
        Some(Timestamp::new(1))
    );

    engine.store().heal();
    let run = engine.sync().unwrap();
    assert!(run.is_completed());
    assert_eq!(run.entity("accounts").unwrap().counts.created, 2);
    assert_eq!(
        engine.store().count(&storage_path("ledger/accounts")).unwrap(),
        3
    );
}

#[test]
fn tied_timestamps_are_reverted_when_one_write_fails() {
    let store = FaultyStore::new(MemoryStore::new());
    store.reject_record("a2");
    let engine = SyncEngine::with_registry(
        SyncConfig::new(),
        store,
        MockTransport::new(),
        accounts_and_tags(),
    );
    engine.transport().set_records(
        "accounts",
        vec![
            record("accounts", "a0", 3),
            record("accounts", "a1", 5),
            record("accounts", "a2", 5),
        ],
    );

    let run = engine.sync().unwrap();
    let accounts = run.entity("accounts").unwrap();
    assert_eq!(
        accounts.failure.as_ref().unwrap().record,
        Some(RecordId::new("a2"))
    );
    assert_eq!(accounts.reverted, vec![RecordId::new("a1")]);
    assert_eq!(accounts.counts.created, 1);
    assert_eq!(
        engine.watermark("accounts").unwrap().max_updated,
        Some(Timestamp::new(3))
    );

    engine.store().heal();
    let run = engine.sync().unwrap();
    let accounts = run.entity("accounts").unwrap();
    assert!(run.is_completed());
    assert_eq!(accounts.since, Some(Timestamp::new(3)));
    assert_eq!(accounts.counts.created, 2);
    assert_eq!(
        engine.store().count(&storage_path("ledger/accounts")).unwrap(),
        3
    );
}

#[test]
fn reverted_update_restores_the_previous_version() {
    let store = FaultyStore::new(MemoryStore::new());
    let engine = SyncEngine::with_registry(
        SyncConfig::new(),
        store,
        MockTransport::new(),
        accounts_and_tags(),
    );
    engine
        .transport()
        .set_records("accounts", vec![record("accounts", "a1", 1)]);
    engine.sync().unwrap();

    engine.store().reject_record("a2");
    engine.transport().set_records(
        "accounts",
        vec![record("accounts", "a1", 7), record("accounts", "a2", 7)],
    );
    let run = engine.sync().unwrap();
    assert!(!run.is_completed());

    let a1 = engine
        .store()
        .find(&storage_path("ledger/accounts"), &RecordId::new("a1"))
        .unwrap()
        .unwrap();
    assert_eq!(a1.updated_at, Timestamp::new(1));
    assert_eq!(a1.attributes["rev"], json!(1));
    assert_eq!(run.entity("accounts").unwrap().counts.updated, 0);
}

#[test]
fn unreconcilable_record_is_skipped_and_reported() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().set_records(
        "accounts",
        vec![
            record("accounts", "a1", 1),
            record("accounts", "", 2),
            record("accounts", "a3", 3),
        ],
    );
    engine.transport().set_records("tags", vec![record("tags", "t1", 1)]);
    let observer = observed(&engine);

    let run = engine.sync().unwrap();
    let accounts = run.entity("accounts").unwrap();
    assert!(run.is_completed());
    assert_eq!(accounts.counts.created, 2);
    assert_eq!(accounts.rejected.len(), 1);
    assert_eq!(accounts.rejected[0].updated_at, Timestamp::new(2));
    assert_eq!(run.rejected().count(), 1);
    assert_eq!(
        observer.elements("accounts"),
        vec![
            ("a1".to_string(), RecordAction::Created),
            ("a3".to_string(), RecordAction::Created)
        ]
    );
    assert!(run.entity("tags").unwrap().is_success());

    let run = engine.sync().unwrap();
    assert_eq!(run.entity("accounts").unwrap().received, 0);
    assert_eq!(
        engine.store().count(&storage_path("ledger/accounts")).unwrap(),
        2
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_entities_are_reported_and_isolated() {
    let registry = tidesync_engine::EntityRegistry::new()
        .with("c1", "shared/c1", SyncMode::Concurrent)
        .unwrap()
        .with("c2", "shared/c2", SyncMode::Concurrent)
        .unwrap();
    let engine = memory_engine(registry);
    engine.transport().set_records(
        "c1",
        (0..20).map(|i| record("c1", &format!("r{}", i), i)).collect(),
    );
    engine.transport().set_records(
        "c2",
        (0..20).map(|i| record("c2", &format!("r{}", i), i + 100)).collect(),
    );

    let run = engine.sync().unwrap();

    let mut attempted: Vec<_> = run.attempted().collect();
    attempted.sort_unstable();
    assert_eq!(attempted, vec!["c1", "c2"]);
    assert!(run.is_completed());

    let c1 = engine.store().records(&storage_path("shared/c1")).unwrap();
    let c2 = engine.store().records(&storage_path("shared/c2")).unwrap();
    assert_eq!(c1.len(), 20);
    assert_eq!(c2.len(), 20);
    assert!(c1.iter().all(|r| r.updated_at.value() < 100));
    assert!(c2.iter().all(|r| r.updated_at.value() >= 100));
}

#[test]
fn concurrent_entities_overlap() {
    let registry = tidesync_engine::EntityRegistry::new()
        .with("slow", "slow", SyncMode::Concurrent)
        .unwrap()
        .with("fast", "fast", SyncMode::Concurrent)
        .unwrap();
    let transport = GatedTransport::new(MockTransport::new());
    transport.inner().set_records("fast", vec![record("fast", "f1", 1)]);
    transport.close("slow");
    let engine = SyncEngine::with_registry(
        SyncConfig::new().with_max_parallel_passes(2),
        MemoryStore::new(),
        transport,
        registry,
    );

    std::thread::scope(|scope| {
        let handle = scope.spawn(|| engine.sync());
        assert!(engine
            .transport()
            .wait_until_blocked("slow", Duration::from_secs(5)));
        // "fast" finishes while "slow" is still held open.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.store().count(&storage_path("fast")).unwrap() == 0 {
            assert!(std::time::Instant::now() < deadline, "fast pass never ran");
            std::thread::sleep(Duration::from_millis(5));
        }
        engine.transport().open("slow");
        let run = handle.join().unwrap().unwrap();
        assert!(run.is_completed());
    });
}

#[test]
fn overlapping_runs_never_share_an_entity() {
    let transport = GatedTransport::new(MockTransport::new());
    transport.inner().set_records("tags", vec![record("tags", "t1", 1)]);
    transport.close("tags");
    let engine = SyncEngine::with_registry(
        SyncConfig::new(),
        MemoryStore::new(),
        transport,
        accounts_and_tags(),
    );

    std::thread::scope(|scope| {
        let first = scope.spawn(|| engine.sync());
        assert!(engine
            .transport()
            .wait_until_blocked("tags", Duration::from_secs(5)));

        let second = engine.sync().unwrap();
        let tags = second.entity("tags").unwrap();
        assert_eq!(tags.failure.as_ref().unwrap().kind, ErrorKind::Busy);
        assert!(second.entity("accounts").unwrap().is_success());

        engine.transport().open("tags");
        let first = first.join().unwrap().unwrap();
        assert!(first.is_completed());
    });
    assert_eq!(engine.transport().inner().fetch_count("tags"), 1);
}

#[test]
fn serial_parallelism_runs_on_the_calling_thread_in_registration_order() {
    let engine = memory_engine(Default::default());
    engine.register("icons", "icons", SyncMode::Concurrent).unwrap();
    engine.register("accounts", "accounts", SyncMode::Sequential).unwrap();
    engine.register("tags", "tags", SyncMode::Concurrent).unwrap();
    let observer = observed(&engine);

    let run = engine
        .run(SyncOptions::registry_driven().with_parallelism(Parallelism::Serial))
        .unwrap();

    assert_eq!(observer.entity_starts(), vec!["accounts", "icons", "tags"]);
    assert_eq!(run.attempted().collect::<Vec<_>>(), vec!["accounts", "icons", "tags"]);
}

// ============================================================================
// Run modes
// ============================================================================

#[test]
fn empty_registry_is_a_configuration_error() {
    let engine = memory_engine(Default::default());
    let observer = observed(&engine);

    let err = engine.sync().unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    assert!(observer.events().is_empty());
    assert!(engine.transport().fetch_log().is_empty());
}

#[test]
fn explicit_bundle_bypasses_transport_and_watermarks() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().set_records("accounts", vec![record("accounts", "remote", 1)]);
    let observer = observed(&engine);

    let run = engine
        .apply_payload(EntityPayload::new().with("tags", vec![record("tags", "t1", 5)]))
        .unwrap();

    assert!(engine.transport().fetch_log().is_empty());
    assert_eq!(run.attempted().collect::<Vec<_>>(), vec!["tags"]);
    assert_eq!(observer.entity_starts(), vec!["tags"]);
    // No sequential entity in the bundle, so no sequential phase.
    assert_eq!(
        observer.count(|e| matches!(e, ObservedEvent::SequentialStart(_))),
        0
    );
}

#[test]
fn explicit_bundle_with_unknown_entity_is_rejected() {
    let engine = memory_engine(accounts_and_tags());
    let err = engine
        .apply_payload(EntityPayload::new().with("ghosts", vec![record("ghosts", "g", 1)]))
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
}

#[test]
fn registry_changes_apply_to_later_runs() {
    let engine = memory_engine(accounts_and_tags());
    engine.sync().unwrap();
    engine
        .register("tags", "meta/labels", SyncMode::Sequential)
        .unwrap();

    let registry = engine.registry();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("tags").unwrap().mode(), SyncMode::Sequential);

    let observer = observed(&engine);
    engine.sync().unwrap();
    assert_eq!(
        observer.events()[1],
        ObservedEvent::SequentialStart(vec!["accounts".into(), "tags".into()])
    );
}

#[test]
fn entities_cannot_share_a_storage_path() {
    let engine = memory_engine(Default::default());
    engine.register("c1", "shared", SyncMode::Concurrent).unwrap();
    let err = engine
        .register("c2", "shared", SyncMode::Concurrent)
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));

    engine.transport().set_records("c1", vec![record("c1", "x", 10)]);
    engine.transport().set_records("c2", vec![record("c2", "x", 1)]);
    let run = engine.sync().unwrap();

    assert_eq!(run.attempted().collect::<Vec<_>>(), vec!["c1"]);
    let stored = engine.store().records(&storage_path("shared")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].updated_at, Timestamp::new(10));
}

#[test]
fn run_started_from_a_callback_is_refused() {
    let engine = Arc::new(memory_engine(accounts_and_tags()));
    let nested: Arc<parking_lot::Mutex<Option<Result<(), String>>>> = Default::default();
    let slot = Arc::clone(&nested);
    let handle = Arc::downgrade(&engine);
    engine.add_observer(Arc::new(CallbackObserver::new().on_run_start(move || {
        if let Some(engine) = handle.upgrade() {
            let result = engine.sync().map(|_| ()).map_err(|e| e.to_string());
            *slot.lock() = Some(result);
        }
    })));

    let run = engine.sync().unwrap();
    assert!(run.is_completed());
    let nested = nested.lock().clone().unwrap();
    assert!(nested.unwrap_err().contains("observer callback"));
    assert_eq!(engine.stats().runs_completed, 1);
}

// ============================================================================
// Scenario
// ============================================================================

#[test]
fn accounts_and_tags_scenario() {
    let engine = memory_engine(accounts_and_tags());
    engine.transport().set_records(
        "accounts",
        vec![
            RemoteRecord::upsert("accounts", "A1", 100, attrs(&[("name", json!("Checking"))])),
            RemoteRecord::upsert("accounts", "A2", 110, attrs(&[("name", json!("Savings"))])),
        ],
    );
    engine.transport().set_records(
        "tags",
        vec![
            RemoteRecord::upsert("tags", "T1", 50, attrs(&[("label", json!("food"))])),
            RemoteRecord::upsert("tags", "T2", 40, attrs(&[("label", json!("rent"))])),
            RemoteRecord::upsert("tags", "T3", 45, attrs(&[("label", json!("travel"))])),
        ],
    );
    let observer = observed(&engine);

    let run = engine.sync().unwrap();

    assert!(run.is_completed());
    assert_eq!(run.entity("accounts").unwrap().counts.created, 2);
    assert_eq!(run.entity("tags").unwrap().counts.created, 3);
    assert_eq!(
        engine.watermark("accounts").unwrap().max_updated,
        Some(Timestamp::new(110))
    );
    assert_eq!(
        engine.watermark("tags").unwrap().max_updated,
        Some(Timestamp::new(50))
    );
    assert_eq!(observer.entity_starts(), vec!["accounts", "tags"]);
    assert_eq!(engine.stats().totals.created, 5);

    // The server deletes A2 and renames T1.
    engine.transport().push_record(tombstone("accounts", "A2", 120));
    engine.transport().push_record(RemoteRecord::upsert(
        "tags",
        "T1",
        60,
        attrs(&[("label", json!("groceries"))]),
    ));
    let run = engine.sync().unwrap();
    assert_eq!(run.entity("accounts").unwrap().since, Some(Timestamp::new(110)));
    assert_eq!(run.entity("accounts").unwrap().counts.deleted, 1);
    assert_eq!(run.entity("tags").unwrap().counts.updated, 1);
    assert_eq!(
        engine.store().count(&storage_path("ledger/accounts")).unwrap(),
        1
    );
}

// ============================================================================
// File store
// ============================================================================

#[test]
fn file_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileStore::open(dir.path(), true).unwrap();
        let engine = SyncEngine::with_registry(
            SyncConfig::new(),
            store,
            MockTransport::new(),
            accounts_and_tags(),
        );
        engine.transport().set_records(
            "accounts",
            vec![record("accounts", "a1", 10), record("accounts", "a2", 20)],
        );
        assert!(engine.sync().unwrap().is_completed());
        assert!(dir.path().join("ledger/accounts.json").exists());
    }

    // A fresh engine over the same directory resumes from the stored watermark.
    let store = FileStore::open(dir.path(), false).unwrap();
    let engine = SyncEngine::with_registry(
        SyncConfig::new(),
        store,
        MockTransport::new(),
        accounts_and_tags(),
    );
    let run = engine.sync().unwrap();
    assert_eq!(run.entity("accounts").unwrap().since, Some(Timestamp::new(20)));
}

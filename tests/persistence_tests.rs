use chrono::{Duration, TimeZone, Utc};
use desk_sync::config::SyncConfig;
use desk_sync::model::{ChatMessage, ChatSession, Event, EventKind, SessionId, StoredSession};
use desk_sync::notify::{Notification, Notifier};
use desk_sync::persistence::{
    FileStorage, KeyValueStorage, MemoryStorage, PersistenceAdapter, SaveOutcome, DEFAULT_STORAGE_KEY,
};
use tempfile::TempDir;

fn config(max_sessions: usize, full_event_sessions: usize) -> SyncConfig {
    SyncConfig {
        max_sessions,
        full_event_sessions,
        ..SyncConfig::default()
    }
}

/// Session `s{n}` with a chunky event payload, updated `updated_offset`
/// minutes after a fixed base time.
fn heavy_session(n: usize, updated_offset: i64) -> StoredSession {
    let base = Utc.with_ymd_and_hms(2026, 2, 11, 9, 0, 0).unwrap();
    let mut session = ChatSession::new(SessionId::new(format!("s{n}")), base);
    session.updated_at = base + Duration::minutes(updated_offset);

    let events = (0..20)
        .map(|i| Event::pending(format!("s{n}-call-{i}"), EventKind::bash("x".repeat(500)), base))
        .collect();
    StoredSession::new(session)
        .with_messages(vec![ChatMessage::user(format!("s{n}-m1"), "run the batch job")])
        .with_events(events)
}

// ============================================================================
// Round trip and retention
// ============================================================================

#[test]
fn save_then_load_round_trips() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &SyncConfig::default(), Notifier::disabled());
    let sessions: Vec<_> = (0..3).map(|n| heavy_session(n, n as i64)).collect();

    let outcome = adapter.save(&sessions).unwrap();
    let loaded = adapter.load();

    assert_eq!(outcome, SaveOutcome::Saved { retained: 3 });
    assert_eq!(loaded.len(), 3);
    for (original, loaded) in sessions.iter().zip(&loaded) {
        assert_eq!(loaded.id(), original.id());
        assert_eq!(loaded.session.name, original.session.name);
        assert_eq!(loaded.messages, original.messages);
        assert_eq!(loaded.events, original.events);
    }
}

#[test]
fn ceiling_drops_oldest_by_insertion_order() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &config(3, 3), Notifier::disabled());
    // s0 is the most recently updated but the first inserted; it still goes.
    let sessions: Vec<_> = (0..5).map(|n| heavy_session(n, 100 - n as i64)).collect();

    adapter.save(&sessions).unwrap();

    let ids: Vec<_> = adapter.load().iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["s2", "s3", "s4"]);
}

#[test]
fn save_one_replaces_in_place_or_appends() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &SyncConfig::default(), Notifier::disabled());
    adapter.save(&[heavy_session(0, 0), heavy_session(1, 0)]).unwrap();

    let mut changed = heavy_session(0, 5);
    changed.session.name = "Renamed".into();
    adapter.save_one(changed).unwrap();
    adapter.save_one(heavy_session(2, 0)).unwrap();

    let loaded = adapter.load();
    let ids: Vec<_> = loaded.iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["s0", "s1", "s2"]);
    assert_eq!(loaded[0].session.name, "Renamed");
}

#[test]
fn ordered_save_inserts_missing_session_ahead_of_later_ones() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &SyncConfig::default(), Notifier::disabled());
    adapter.save(&[heavy_session(1, 0), heavy_session(2, 0)]).unwrap();
    let order: Vec<_> = (0..3).map(|n| SessionId::new(format!("s{n}"))).collect();

    adapter.save_one_ordered(heavy_session(0, 0), &order).unwrap();
    adapter.save_one_ordered(heavy_session(3, 0), &order).unwrap();

    let ids: Vec<_> = adapter.load().iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["s0", "s1", "s2", "s3"]);
}

#[test]
fn ordered_save_at_ceiling_evicts_the_older_record() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &config(2, 2), Notifier::disabled());
    adapter.save(&[heavy_session(1, 0), heavy_session(2, 0)]).unwrap();
    let order: Vec<_> = (0..3).map(|n| SessionId::new(format!("s{n}"))).collect();

    adapter.save_one_ordered(heavy_session(0, 0), &order).unwrap();

    let ids: Vec<_> = adapter.load().iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[test]
fn delete_and_clear() {
    let mut adapter = PersistenceAdapter::new(MemoryStorage::new(), &SyncConfig::default(), Notifier::disabled());
    adapter.save(&[heavy_session(0, 0), heavy_session(1, 0)]).unwrap();

    assert!(adapter.delete(&SessionId::new("s0")).unwrap());
    assert!(!adapter.delete(&SessionId::new("s0")).unwrap());
    assert_eq!(adapter.load().len(), 1);

    adapter.clear().unwrap();
    assert!(adapter.load().is_empty());
}

#[test]
fn corrupt_content_loads_as_empty() {
    let mut storage = MemoryStorage::new();
    storage.set(DEFAULT_STORAGE_KEY, "{ definitely not an array").unwrap();
    let adapter = PersistenceAdapter::new(storage, &SyncConfig::default(), Notifier::disabled());

    assert!(adapter.load().is_empty());
}

#[test]
fn legacy_records_are_migrated_on_load() {
    let mut storage = MemoryStorage::new();
    storage
        .set(
            DEFAULT_STORAGE_KEY,
            r#"[{"id": "old", "name": "Legacy", "messages": [{"id": "m1", "role": "user", "content": "hi"}]}]"#,
        )
        .unwrap();
    let adapter = PersistenceAdapter::new(storage, &SyncConfig::default(), Notifier::disabled());

    let loaded = adapter.load();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].schema_version, desk_sync::model::SCHEMA_VERSION);
    assert_eq!(loaded[0].session.message_ids.len(), 1);
    assert!(loaded[0].events.is_empty());
}

// ============================================================================
// Degradation cascade
// ============================================================================

#[test]
fn quota_exceeded_compacts_with_warning_before_clear() {
    let (notifier, notices) = Notifier::channel();
    let mut adapter = PersistenceAdapter::new(MemoryStorage::with_capacity(20_000), &config(6, 1), notifier);
    // s3 is the most recently touched of the three that survive halving.
    let sessions = vec![
        heavy_session(0, 0),
        heavy_session(1, 1),
        heavy_session(2, 2),
        heavy_session(3, 50),
        heavy_session(4, 4),
        heavy_session(5, 5),
    ];

    let outcome = adapter.save(&sessions).unwrap();

    assert_eq!(
        outcome,
        SaveOutcome::Compacted {
            retained: 3,
            stripped: 2
        }
    );
    let loaded = adapter.load();
    let ids: Vec<_> = loaded.iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["s3", "s4", "s5"]);
    assert_eq!(loaded[0].events.len(), 20);
    assert!(loaded[1].events.is_empty());
    assert!(loaded[2].events.is_empty());
    // Stripped sessions keep their index
    assert_eq!(loaded[1].session.event_ids.len(), 20);
    assert_eq!(loaded[2].messages.len(), 1);

    let received: Vec<_> = notices.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], Notification::StorageQuotaWarning { .. }));
}

#[test]
fn clears_everything_when_compaction_does_not_fit() {
    let (notifier, notices) = Notifier::channel();
    let mut storage = MemoryStorage::with_capacity(1_000);
    storage.set(DEFAULT_STORAGE_KEY, "[]").unwrap();
    let mut adapter = PersistenceAdapter::new(storage, &config(6, 1), notifier);
    let sessions: Vec<_> = (0..4).map(|n| heavy_session(n, n as i64)).collect();

    let outcome = adapter.save(&sessions).unwrap();

    assert_eq!(outcome, SaveOutcome::Cleared);
    assert!(adapter.load().is_empty());
    let received: Vec<_> = notices.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], Notification::StorageQuotaError { .. }));
}

#[test]
fn small_save_emits_no_notification() {
    let (notifier, notices) = Notifier::channel();
    let mut adapter = PersistenceAdapter::new(MemoryStorage::with_capacity(100_000), &SyncConfig::default(), notifier);

    adapter.save(&[heavy_session(0, 0)]).unwrap();

    assert_eq!(notices.try_iter().count(), 0);
}

#[test]
fn non_quota_error_is_returned_without_degrading() {
    let tmpdir = TempDir::new().unwrap();
    // A regular file where the storage directory should be
    let blocker = tmpdir.path().join("data");
    std::fs::write(&blocker, "not a directory").unwrap();

    let (notifier, notices) = Notifier::channel();
    let mut adapter = PersistenceAdapter::new(FileStorage::new(&blocker), &SyncConfig::default(), notifier);

    let err = adapter.save(&[heavy_session(0, 0)]).unwrap_err();

    assert!(!err.is_quota_exceeded());
    assert_eq!(notices.try_iter().count(), 0);
}

#[test]
fn file_storage_round_trip_through_adapter() {
    let tmpdir = TempDir::new().unwrap();
    let data_dir = tmpdir.path().join("desk-sync");
    let sessions = vec![heavy_session(0, 0), heavy_session(1, 1)];

    {
        let mut adapter = PersistenceAdapter::new(FileStorage::new(&data_dir), &SyncConfig::default(), Notifier::disabled());
        adapter.save(&sessions).unwrap();
    }

    assert!(data_dir.join("desk-sync_sessions.json").exists());
    let adapter = PersistenceAdapter::new(FileStorage::new(&data_dir), &SyncConfig::default(), Notifier::disabled());
    assert_eq!(adapter.load(), sessions);
}

#[test]
fn file_storage_quota_triggers_cascade() {
    let tmpdir = TempDir::new().unwrap();
    let storage = FileStorage::new(tmpdir.path()).with_quota(Some(20_000));
    let (notifier, notices) = Notifier::channel();
    let mut adapter = PersistenceAdapter::new(storage, &config(6, 1), notifier);
    let sessions: Vec<_> = (0..6).map(|n| heavy_session(n, n as i64)).collect();

    let outcome = adapter.save(&sessions).unwrap();

    assert!(matches!(outcome, SaveOutcome::Compacted { retained: 3, .. }));
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notification::StorageQuotaWarning { .. }
    ));
}

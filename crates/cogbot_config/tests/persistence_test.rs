//! Integration tests for the config store's persistence behavior
//!
//! These run real stores against temp directories, including the background
//! flush and reconcile tasks with short timers.

use std::path::Path;
use std::time::{Duration, SystemTime};

use cogbot_config::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::tempdir;

fn manual(dir: &Path) -> StoreOptions {
    StoreOptions::new(dir)
        .with_save_delay(Duration::from_secs(3600))
        .with_reload_interval(Duration::from_secs(3600))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Poll until `check` holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_values_survive_reopen() {
    let dir = tempdir().unwrap();

    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    store.set(Scope::Guild(1), "prefix", "?").unwrap();
    store
        .set_user(2, "reminders", json!([{"at": "09:00", "text": "stretch"}]))
        .unwrap();
    store.set_global("maintenance", false).unwrap();
    let report = store.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.written.len(), 3);
    drop(store);

    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    assert_eq!(store.get(Scope::Guild(1), "prefix"), Some(json!("?")));
    assert_eq!(
        store.get_user(2, "reminders"),
        Some(json!([{"at": "09:00", "text": "stretch"}]))
    );
    assert_eq!(store.get_global_or("maintenance", true), json!(false));
    assert!(store.dirty_scopes().is_empty());
    store.shutdown().await;
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let dir = tempdir().unwrap();
    let store = ConfigStore::open(manual(dir.path())).await.unwrap();

    let ctx_a = ContextIds::new(Some(111), Some(5));
    let ctx_b = ContextIds::new(Some(222), Some(5));
    let guild_a = Scope::resolve(ScopeKind::Guild, Some(&ctx_a));
    let guild_b = Scope::resolve(ScopeKind::Guild, Some(&ctx_b));

    store.set(guild_a, "k", "v1").unwrap();
    store.set(guild_b, "k", "v2").unwrap();
    store.flush().await;

    assert_eq!(read_json(&dir.path().join("111.json")), json!({"k": "v1"}));
    assert_eq!(read_json(&dir.path().join("222.json")), json!({"k": "v2"}));
    assert_eq!(store.get_global("k"), None);
    assert_eq!(read_json(&dir.path().join("global.json")), json!({}));
    store.shutdown().await;
}

#[tokio::test]
async fn test_direct_message_context_falls_back_to_global() {
    let dir = tempdir().unwrap();
    let store = ConfigStore::open(manual(dir.path())).await.unwrap();

    let dm = ContextIds::user(5);
    let scope = Scope::resolve(ScopeKind::Guild, Some(&dm));
    store.set(scope, "greeting", "hi").unwrap();

    assert_eq!(store.get_global("greeting"), Some(json!("hi")));
    store.shutdown().await;
}

#[tokio::test]
async fn test_defaults_are_never_persisted() {
    let dir = tempdir().unwrap();
    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    let guild = Scope::Guild(3);
    store.set(guild, "present", 1).unwrap();
    store.flush().await;

    assert_eq!(store.get_or(guild, "missing_key", 42), json!(42));
    assert_eq!(store.get_or(guild, "missing_key", 42), json!(42));
    assert!(!store.is_dirty(guild));

    store.shutdown().await;
    assert_eq!(read_json(&dir.path().join("3.json")), json!({"present": 1}));
}

#[tokio::test]
async fn test_rapid_writes_coalesce_into_one_flush() {
    let dir = tempdir().unwrap();
    let options = StoreOptions::new(dir.path())
        .with_save_delay(Duration::from_millis(200))
        .with_reload_interval(Duration::from_secs(3600));
    let store = ConfigStore::open(options).await.unwrap();
    let writes_at_open = store.stats().bucket_writes;

    let guild = Scope::Guild(77);
    for i in 0..10 {
        store.set(guild, "counter", i).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.stats().bucket_writes, writes_at_open);
    assert!(!dir.path().join("77.json").exists());

    assert!(eventually(|| !store.is_dirty(guild)).await);
    assert_eq!(store.stats().bucket_writes, writes_at_open + 1);
    assert_eq!(read_json(&dir.path().join("77.json")), json!({"counter": 9}));
    store.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_writes() {
    let dir = tempdir().unwrap();
    let store = ConfigStore::open(manual(dir.path())).await.unwrap();

    store.set_user(9, "timezone", "Europe/Oslo").unwrap();
    assert!(!dir.path().join("user_9.json").exists());

    let report = store.shutdown().await;
    assert_eq!(report.written, vec![Scope::User(9)]);
    assert_eq!(
        read_json(&dir.path().join("user_9.json")),
        json!({"timezone": "Europe/Oslo"})
    );
}

#[tokio::test]
async fn test_superadmins_roundtrip_with_external_edit() {
    let dir = tempdir().unwrap();
    let options = StoreOptions::new(dir.path())
        .with_save_delay(Duration::from_secs(3600))
        .with_reload_interval(Duration::from_millis(50));
    let store = ConfigStore::open(options).await.unwrap();

    store.set_global("superadmins", [42]).unwrap();
    store.flush().await;
    let global = dir.path().join("global.json");
    assert_eq!(read_json(&global), json!({"superadmins": [42]}));

    std::fs::write(&global, r#"{"superadmins": [42, 99]}"#).unwrap();
    std::fs::File::options()
        .write(true)
        .open(&global)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    assert!(eventually(|| store.get_global("superadmins") == Some(json!([42, 99]))).await);
    assert!(store.stats().reloads >= 1);
    store.shutdown().await;
}

#[tokio::test]
async fn test_external_edit_discards_unflushed_change() {
    let dir = tempdir().unwrap();
    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    let guild = Scope::Guild(31);

    store.set(guild, "a", 1).unwrap();
    let path = dir.path().join("31.json");
    std::fs::write(&path, r#"{"a": 2}"#).unwrap();

    let report = store.reconcile().await;
    assert_eq!(report.reloaded, vec![guild]);
    assert_eq!(store.get(guild, "a"), Some(json!(2)));
    assert!(!store.is_dirty(guild));

    // nothing left to write, so the file keeps the external value
    store.shutdown().await;
    assert_eq!(read_json(&path), json!({"a": 2}));
}

#[tokio::test]
async fn test_corrupt_file_is_rewritten_clean() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("user_4.json"), "not json at all").unwrap();

    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    assert_eq!(store.dirty_scopes(), vec![Scope::User(4)]);
    assert_eq!(store.get_user(4, "anything"), None);

    store.shutdown().await;
    assert_eq!(read_json(&dir.path().join("user_4.json")), json!({}));
}

#[tokio::test]
async fn test_unrelated_files_are_left_alone() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("notes.json"), "{oops").unwrap();

    let store = ConfigStore::open(manual(dir.path())).await.unwrap();
    let report = store.reconcile().await;
    assert!(report.failed.is_empty());
    assert_eq!(store.stats().parse_failures, 0);
    store.shutdown().await;

    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.json")).unwrap(),
        "{oops"
    );
}

//! The in-memory view of every bucket, its dirty tracking, and the public
//! get/set surface used by command handlers.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigStoreError, Result};
use crate::options::StoreOptions;
use crate::scheduler::BackgroundTasks;
use crate::scope::Scope;
use crate::stats::{StatCounters, StoreStats};
use crate::writer::{self, Bucket};

#[derive(Debug, Default)]
pub(crate) struct BucketEntry {
    pub(crate) data: Bucket,
    /// Bumped on every in-memory mutation; lets a flush tell whether the
    /// bucket changed while its snapshot was being written.
    pub(crate) generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) buckets: HashMap<Scope, BucketEntry>,
    pub(crate) dirty: HashSet<Scope>,
    /// Last on-disk mtime this process has seen or produced per bucket
    pub(crate) mtimes: HashMap<Scope, SystemTime>,
}

/// A dirty bucket captured for writing
#[derive(Debug)]
pub(crate) struct PendingWrite {
    pub(crate) scope: Scope,
    pub(crate) data: Bucket,
    pub(crate) generation: u64,
}

/// Outcome of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Buckets committed to disk
    pub written: Vec<Scope>,
    /// Buckets whose write failed; they stay dirty and are retried
    pub failed: Vec<Scope>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub(crate) struct StoreInner {
    pub(crate) options: StoreOptions,
    pub(crate) state: Mutex<State>,
    pub(crate) flush_signal: Notify,
    flush_gate: tokio::sync::Mutex<()>,
    writes_in_flight: AtomicUsize,
    pub(crate) stats: StatCounters,
}

/// Marks a physical write as in progress for as long as it lives
pub(crate) struct WriteGuard<'a>(&'a AtomicUsize);

impl<'a> WriteGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StoreInner {
    fn new(options: StoreOptions) -> Self {
        Self {
            options,
            state: Mutex::new(State::default()),
            flush_signal: Notify::new(),
            flush_gate: tokio::sync::Mutex::new(()),
            writes_in_flight: AtomicUsize::new(0),
            stats: StatCounters::default(),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.options.dir
    }

    pub(crate) fn write_in_progress(&self) -> bool {
        self.writes_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Load every bucket file present at startup.
    async fn load_all(&self) -> Result<usize> {
        let dir = self.dir().to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || {
            writer::scan_dir(&dir).map(|files| {
                files
                    .into_iter()
                    .map(|file| (file.scope, writer::read_bucket(&file.path), file.modified))
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| ConfigStoreError::TaskFailed {
            task: "initial load",
            cause: e,
        })??;

        let count = loaded.len();
        let mut needs_flush = false;
        {
            let mut state = self.state.lock();
            for (scope, result, scanned_at) in loaded {
                match result {
                    Ok((data, modified)) => {
                        state.buckets.insert(scope, BucketEntry { data, generation: 0 });
                        state.mtimes.insert(scope, modified);
                    }
                    Err(e) if e.is_parse() => {
                        error!(bucket = %scope, error = ?e, "corrupt bucket file, starting from an empty bucket");
                        self.stats.record_parse_failure();
                        state.buckets.insert(scope, BucketEntry::default());
                        state.mtimes.insert(scope, scanned_at);
                        state.dirty.insert(scope);
                        needs_flush = true;
                    }
                    Err(e) => {
                        warn!(bucket = %scope, error = ?e, "could not read bucket file, will retry on access");
                    }
                }
            }
        }
        if needs_flush {
            self.flush_signal.notify_one();
        }
        Ok(count)
    }

    /// Make sure `global.json` exists, writing an empty bucket if needed.
    async fn ensure_global_on_disk(&self) -> Result<()> {
        if self.state.lock().mtimes.contains_key(&Scope::Global) {
            return Ok(());
        }

        let data = {
            let mut state = self.state.lock();
            state.buckets.entry(Scope::Global).or_default().data.clone()
        };
        let dir = self.dir().to_path_buf();
        let _writing = WriteGuard::enter(&self.writes_in_flight);
        let modified =
            tokio::task::spawn_blocking(move || writer::write_bucket(&dir, Scope::Global, &data))
                .await
                .map_err(|e| ConfigStoreError::TaskFailed {
                    task: "global bucket write",
                    cause: e,
                })??;
        self.stats.record_write();
        self.state.lock().mtimes.insert(Scope::Global, modified);
        Ok(())
    }

    /// Bring a bucket into the cache if it isn't there yet.
    ///
    /// A missing file yields a clean empty bucket. A corrupt file yields an
    /// empty bucket marked dirty so the next flush rewrites it.
    ///
    /// This reads the file on the calling thread: the get/set surface is
    /// synchronous. Only buckets whose file appeared after `open` and before
    /// the next reconcile pass get here with a file to read; everything else
    /// was already loaded off the runtime.
    pub(crate) fn ensure_loaded(&self, scope: Scope) {
        if self.state.lock().buckets.contains_key(&scope) {
            return;
        }

        let loaded = writer::read_bucket_if_exists(self.dir(), scope);
        let corrupt_mtime = match &loaded {
            Err(e) if e.is_parse() => std::fs::metadata(writer::bucket_path(self.dir(), scope))
                .and_then(|m| m.modified())
                .ok(),
            _ => None,
        };

        let mut state = self.state.lock();
        if state.buckets.contains_key(&scope) {
            return;
        }
        match loaded {
            Ok(Some((data, modified))) => {
                debug!(bucket = %scope, "loaded bucket on first access");
                state.buckets.insert(scope, BucketEntry { data, generation: 0 });
                state.mtimes.insert(scope, modified);
            }
            Ok(None) => {
                state.buckets.insert(scope, BucketEntry::default());
            }
            Err(e) if e.is_parse() => {
                error!(bucket = %scope, error = ?e, "corrupt bucket file, starting from an empty bucket");
                self.stats.record_parse_failure();
                state.buckets.insert(scope, BucketEntry::default());
                if let Some(modified) = corrupt_mtime {
                    state.mtimes.insert(scope, modified);
                }
                state.dirty.insert(scope);
                drop(state);
                self.flush_signal.notify_one();
            }
            Err(e) => {
                // unreadable, not absent: keep it out of the dirty set so the
                // file is never clobbered with an empty document
                warn!(bucket = %scope, error = ?e, "could not read bucket file, using an empty bucket");
                state.buckets.insert(scope, BucketEntry::default());
            }
        }
    }

    fn read<R>(&self, scope: Scope, f: impl FnOnce(&Bucket) -> R) -> R {
        self.ensure_loaded(scope);
        let mut state = self.state.lock();
        f(&state.buckets.entry(scope).or_default().data)
    }

    /// Apply `f`; if it reports a change the bucket is marked dirty and the
    /// debounced flush is (re)armed.
    fn mutate(&self, scope: Scope, f: impl FnOnce(&mut Bucket) -> bool) -> bool {
        self.ensure_loaded(scope);
        let changed = {
            let mut state = self.state.lock();
            let entry = state.buckets.entry(scope).or_default();
            let changed = f(&mut entry.data);
            if changed {
                entry.generation += 1;
                state.dirty.insert(scope);
            }
            changed
        };
        if changed {
            self.flush_signal.notify_one();
        }
        changed
    }

    /// Capture every dirty bucket. Dirtiness is only cleared once the
    /// write is confirmed, in [`StoreInner::finish_flush`].
    pub(crate) fn snapshot_dirty(&self) -> Vec<PendingWrite> {
        let state = self.state.lock();
        let mut pending: Vec<_> = state
            .dirty
            .iter()
            .map(|scope| {
                let entry = state.buckets.get(scope);
                PendingWrite {
                    scope: *scope,
                    data: entry.map(|e| e.data.clone()).unwrap_or_default(),
                    generation: entry.map(|e| e.generation).unwrap_or_default(),
                }
            })
            .collect();
        pending.sort_by_key(|p| p.scope);
        pending
    }

    /// Mark a write as in progress, then capture the dirty buckets.
    ///
    /// The guard is entered before the state lock is taken, so a reconcile
    /// pass can't merge a file between the snapshot and its write. Keep it
    /// alive until [`StoreInner::finish_flush`] returns.
    pub(crate) fn begin_flush(&self) -> (WriteGuard<'_>, Vec<PendingWrite>) {
        let writing = WriteGuard::enter(&self.writes_in_flight);
        (writing, self.snapshot_dirty())
    }

    pub(crate) fn finish_flush(
        &self,
        outcomes: Vec<(PendingWrite, Result<SystemTime>)>,
    ) -> FlushReport {
        let mut report = FlushReport::default();
        let mut state = self.state.lock();

        for (pending, result) in outcomes {
            let scope = pending.scope;
            match result {
                Ok(modified) => {
                    self.stats.record_write();
                    state.mtimes.insert(scope, modified);
                    let unchanged = state
                        .buckets
                        .get(&scope)
                        .is_some_and(|entry| entry.generation == pending.generation);
                    if unchanged {
                        state.dirty.remove(&scope);
                    } else {
                        debug!(bucket = %scope, "bucket changed while flushing, keeping it dirty");
                    }
                    report.written.push(scope);
                }
                Err(e) => {
                    self.stats.record_write_failure();
                    error!(bucket = %scope, error = ?e, "failed to flush bucket, will retry");
                    report.failed.push(scope);
                }
            }
        }

        report
    }

    /// Write every dirty bucket to disk.
    ///
    /// Failures are logged per bucket and never abort the rest of the batch.
    pub(crate) async fn flush_dirty(&self) -> FlushReport {
        let _gate = self.flush_gate.lock().await;

        let (_writing, pending) = self.begin_flush();
        if pending.is_empty() {
            return FlushReport::default();
        }

        let scopes: Vec<Scope> = pending.iter().map(|p| p.scope).collect();
        let dir = self.dir().to_path_buf();
        let outcomes = tokio::task::spawn_blocking(move || write_pending(&dir, pending)).await;

        match outcomes {
            Ok(outcomes) => {
                let report = self.finish_flush(outcomes);
                debug!(
                    written = report.written.len(),
                    failed = report.failed.len(),
                    "flushed dirty buckets"
                );
                report
            }
            Err(e) => {
                error!(error = ?e, "flush task failed, buckets stay dirty");
                for _ in &scopes {
                    self.stats.record_write_failure();
                }
                FlushReport {
                    written: Vec::new(),
                    failed: scopes,
                }
            }
        }
    }
}

/// Blocking: write each pending bucket, keeping every result.
pub(crate) fn write_pending(
    dir: &Path,
    pending: Vec<PendingWrite>,
) -> Vec<(PendingWrite, Result<SystemTime>)> {
    pending
        .into_iter()
        .map(|p| {
            let result = writer::write_bucket(dir, p.scope, &p.data);
            (p, result)
        })
        .collect()
}

/// Scoped, persistent key-value configuration.
///
/// Reads and writes hit memory only; dirty buckets are written to
/// `<dir>/<bucket>.json` after a quiet period, and edits made to those
/// files by anything else are merged back in on a timer. Construct one per
/// process (or per test) with [`ConfigStore::open`] and share it behind an
/// `Arc`. Call [`ConfigStore::shutdown`] before exiting so the last writes
/// land on disk.
pub struct ConfigStore {
    inner: Arc<StoreInner>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("dir", &self.inner.options.dir)
            .field("dirty", &self.dirty_scopes())
            .finish()
    }
}

impl ConfigStore {
    /// Open the store: load what's on disk, make sure the global bucket
    /// exists, and start the flush and reconciliation tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        tokio::fs::create_dir_all(&options.dir)
            .await
            .map_err(|e| ConfigStoreError::DirectoryUnavailable {
                path: options.dir.clone(),
                cause: e,
            })?;

        let inner = Arc::new(StoreInner::new(options));
        let loaded = inner.load_all().await?;
        inner.ensure_global_on_disk().await?;

        let tasks = BackgroundTasks::spawn(&inner);
        info!(
            dir = %inner.dir().display(),
            buckets = loaded,
            save_delay = ?inner.options.save_delay,
            reload_interval = ?inner.options.reload_interval,
            "config store ready"
        );

        Ok(Self {
            inner,
            tasks: Mutex::new(Some(tasks)),
        })
    }

    pub fn dir(&self) -> &Path {
        self.inner.dir()
    }

    pub fn bucket_path(&self, scope: Scope) -> PathBuf {
        writer::bucket_path(self.inner.dir(), scope)
    }

    /// Value stored under `key`, if any. Never writes anything.
    pub fn get(&self, scope: Scope, key: &str) -> Option<Value> {
        self.inner.read(scope, |bucket| bucket.get(key).cloned())
    }

    /// Value under `key`, or `default`. The default is not stored.
    pub fn get_or(&self, scope: Scope, key: &str, default: impl Into<Value>) -> Value {
        self.get(scope, key).unwrap_or_else(|| default.into())
    }

    /// Value under `key` decoded as `T`; `None` if absent or shaped differently.
    pub fn get_as<T: DeserializeOwned>(&self, scope: Scope, key: &str) -> Option<T> {
        let value = self.get(scope, key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(bucket = %scope, key, error = %e, "stored value has an unexpected shape");
                None
            }
        }
    }

    /// Store `value` under `key` and schedule a flush.
    ///
    /// The value is converted to JSON here, so an unserializable value
    /// fails at the call site instead of at flush time.
    pub fn set(&self, scope: Scope, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| ConfigStoreError::NotSerializable {
            key: key.clone(),
            cause: e,
        })?;
        self.inner.mutate(scope, |bucket| {
            bucket.insert(key, value);
            true
        });
        Ok(())
    }

    /// Remove `key`; returns whether it was present.
    pub fn rem(&self, scope: Scope, key: &str) -> bool {
        self.inner.mutate(scope, |bucket| bucket.remove(key).is_some())
    }

    pub fn has(&self, scope: Scope, key: &str) -> bool {
        self.inner.read(scope, |bucket| bucket.contains_key(key))
    }

    /// Keys in a bucket, sorted
    pub fn keys(&self, scope: Scope) -> Vec<String> {
        let mut keys = self.inner.read(scope, |bucket| bucket.keys().cloned().collect::<Vec<_>>());
        keys.sort();
        keys
    }

    /// Copy of a whole bucket
    pub fn bucket(&self, scope: Scope) -> Bucket {
        self.inner.read(scope, |bucket| bucket.clone())
    }

    pub fn get_global(&self, key: &str) -> Option<Value> {
        self.get(Scope::Global, key)
    }

    pub fn get_global_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get_or(Scope::Global, key, default)
    }

    pub fn set_global(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        self.set(Scope::Global, key, value)
    }

    pub fn rem_global(&self, key: &str) -> bool {
        self.rem(Scope::Global, key)
    }

    pub fn has_global(&self, key: &str) -> bool {
        self.has(Scope::Global, key)
    }

    pub fn get_user(&self, user_id: u64, key: &str) -> Option<Value> {
        self.get(Scope::User(user_id), key)
    }

    pub fn get_user_or(&self, user_id: u64, key: &str, default: impl Into<Value>) -> Value {
        self.get_or(Scope::User(user_id), key, default)
    }

    pub fn set_user(&self, user_id: u64, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        self.set(Scope::User(user_id), key, value)
    }

    pub fn rem_user(&self, user_id: u64, key: &str) -> bool {
        self.rem(Scope::User(user_id), key)
    }

    pub fn has_user(&self, user_id: u64, key: &str) -> bool {
        self.has(Scope::User(user_id), key)
    }

    pub fn is_dirty(&self, scope: Scope) -> bool {
        self.inner.state.lock().dirty.contains(&scope)
    }

    pub fn dirty_scopes(&self) -> Vec<Scope> {
        let mut dirty: Vec<_> = self.inner.state.lock().dirty.iter().copied().collect();
        dirty.sort();
        dirty
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.stats.snapshot()
    }

    /// Write all dirty buckets now.
    ///
    /// Any debounce still pending afterwards finds nothing to do.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush_dirty().await
    }

    /// Run one reconciliation pass now instead of waiting for the timer.
    pub async fn reconcile(&self) -> crate::reconcile::ReconcileReport {
        self.inner.reconcile().await
    }

    /// Stop both background tasks, then flush whatever is still dirty.
    ///
    /// The store stays usable in memory afterwards, but nothing is flushed
    /// or reloaded automatically any more.
    pub async fn shutdown(&self) -> FlushReport {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.stop().await;
        }

        let report = self.flush().await;
        info!(stats = ?self.stats(), failed = report.failed.len(), "config store shut down");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Options with timers far enough out that tests drive flushes by hand
    fn manual_options(dir: &Path) -> StoreOptions {
        StoreOptions::new(dir)
            .with_save_delay(Duration::from_secs(3600))
            .with_reload_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_open_creates_global_file() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("global.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({}));
        assert!(store.dirty_scopes().is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_rejects_zero_reload_interval() {
        let dir = tempdir().unwrap();
        let options = manual_options(dir.path()).with_reload_interval(Duration::ZERO);

        let err = ConfigStore::open(options).await.unwrap_err();
        assert!(matches!(err, ConfigStoreError::InvalidOptions { field: "reload_interval_ms", .. }));
        assert!(!dir.path().join("global.json").exists());
    }

    #[tokio::test]
    async fn test_get_does_not_persist_default() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        let guild = Scope::Guild(1);

        assert_eq!(store.get_or(guild, "missing_key", 42), json!(42));
        assert_eq!(store.get_or(guild, "missing_key", 42), json!(42));
        assert!(!store.is_dirty(guild));
        assert!(!store.has(guild, "missing_key"));

        store.flush().await;
        assert!(!dir.path().join("1.json").exists());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_rem_has() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        let user = Scope::User(555);

        store.set(user, "theme", "dark").unwrap();
        assert!(store.has(user, "theme"));
        assert!(store.is_dirty(user));
        assert_eq!(store.get_as::<String>(user, "theme").as_deref(), Some("dark"));
        assert_eq!(store.get_as::<u64>(user, "theme"), None);

        assert!(store.rem(user, "theme"));
        assert!(!store.rem(user, "theme"));
        assert!(!store.has(user, "theme"));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_rem_missing_key_stays_clean() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();

        assert!(!store.rem(Scope::Guild(3), "nothing"));
        assert!(!store.is_dirty(Scope::Guild(3)));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_rejects_unserializable_value() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();

        // maps with non-string keys have no JSON form
        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1u8], "x");
        let err = store.set_global("bad", &bad).unwrap_err();
        assert!(matches!(err, ConfigStoreError::NotSerializable { ref key, .. } if key == "bad"));
        assert!(!store.is_dirty(Scope::Global));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_during_flush_keeps_bucket_dirty() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        let guild = Scope::Guild(9);

        store.set(guild, "a", 1).unwrap();
        let pending = store.inner.snapshot_dirty();
        assert_eq!(pending.len(), 1);

        // lands between the snapshot and the write completing
        store.set(guild, "a", 2).unwrap();

        let outcomes = write_pending(dir.path(), pending);
        let report = store.inner.finish_flush(outcomes);
        assert_eq!(report.written, vec![guild]);
        assert!(store.is_dirty(guild));

        let report = store.flush().await;
        assert_eq!(report.written, vec![guild]);
        assert!(!store.is_dirty(guild));

        let content = std::fs::read_to_string(dir.path().join("9.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({"a": 2}));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconcile_waits_for_flush_in_progress() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        let guild = Scope::Guild(9);
        let path = dir.path().join("9.json");

        store.set(guild, "a", 1).unwrap();
        let (writing, pending) = store.inner.begin_flush();

        // an outside edit lands after the snapshot but before the write
        std::fs::write(&path, r#"{"a": 2}"#).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let report = store.reconcile().await;
        assert!(report.skipped);
        assert!(report.reloaded.is_empty());
        assert_eq!(store.get(guild, "a"), Some(json!(1)));

        let outcomes = write_pending(dir.path(), pending);
        let report = store.inner.finish_flush(outcomes);
        drop(writing);
        assert_eq!(report.written, vec![guild]);

        // memory and disk agree once the flush is done
        let report = store.reconcile().await;
        assert!(report.reloaded.is_empty());
        assert!(!store.is_dirty(guild));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({"a": 1}));
        assert_eq!(store.get(guild, "a"), Some(json!(1)));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_write_stays_dirty() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        store.set_global("k", "v").unwrap();

        let pending = store.inner.snapshot_dirty();
        let outcomes = write_pending(&dir.path().join("gone"), pending);
        let report = store.inner.finish_flush(outcomes);

        assert_eq!(report.failed, vec![Scope::Global]);
        assert!(store.is_dirty(Scope::Global));
        assert_eq!(store.stats().write_failures, 1);

        assert!(store.shutdown().await.is_clean());
        assert!(!store.is_dirty(Scope::Global));
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty_and_dirty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("77.json"), "{\"half\": ").unwrap();

        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        assert!(store.keys(Scope::Guild(77)).is_empty());
        assert!(store.is_dirty(Scope::Guild(77)));
        assert_eq!(store.stats().parse_failures, 1);

        store.flush().await;
        let content = std::fs::read_to_string(dir.path().join("77.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({}));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_created_after_open_loads_on_first_access() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();

        std::fs::write(dir.path().join("user_12.json"), r#"{"tz": "UTC"}"#).unwrap();
        assert!(store.has_user(12, "tz"));
        assert_eq!(store.get_user(12, "tz"), Some(json!("UTC")));
        assert!(!store.is_dirty(Scope::User(12)));

        // the recorded mtime keeps the next pass from reloading it again
        let report = store.reconcile().await;
        assert!(report.reloaded.is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_keys_are_sorted() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(manual_options(dir.path())).await.unwrap();
        let guild = Scope::Guild(4);
        store.set(guild, "zeta", 1).unwrap();
        store.set(guild, "alpha", 2).unwrap();
        store.set(guild, "mid", 3).unwrap();

        assert_eq!(store.keys(guild), vec!["alpha", "mid", "zeta"]);
        store.shutdown().await;
    }
}

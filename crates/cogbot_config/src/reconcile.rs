//! Absorbing edits made to bucket files by anything other than this process.
//!
//! The file always wins. A bucket with unflushed local changes is replaced
//! wholesale by the file's contents and every key whose value differed is
//! logged as a conflict.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConfigStoreError, Result};
use crate::scope::Scope;
use crate::store::{BucketEntry, StoreInner};
use crate::writer::{self, Bucket};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Buckets replaced with the file's contents
    pub reloaded: Vec<Scope>,
    /// Keys whose unflushed value was discarded in favor of the file
    pub conflicts: Vec<Conflict>,
    /// Buckets whose changed file could not be read or parsed this pass
    pub failed: Vec<Scope>,
    /// True when the pass was skipped because a flush was writing
    pub skipped: bool,
}

/// One key where memory and file disagreed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub scope: Scope,
    pub key: String,
    /// The discarded in-memory value
    pub memory: Value,
    /// The value taken from the file
    pub file: Value,
}

/// Keys present on both sides with different values, sorted by key.
pub(crate) fn conflicting_keys(scope: Scope, memory: &Bucket, file: &Bucket) -> Vec<Conflict> {
    let mut conflicts: Vec<Conflict> = memory
        .iter()
        .filter_map(|(key, mem_value)| {
            let file_value = file.get(key)?;
            (file_value != mem_value).then(|| Conflict {
                scope,
                key: key.clone(),
                memory: mem_value.clone(),
                file: file_value.clone(),
            })
        })
        .collect();
    conflicts.sort_by(|a, b| a.key.cmp(&b.key));
    conflicts
}

type ChangedFile = (Scope, Result<(Bucket, SystemTime)>);

/// Blocking: read every bucket file that is unknown or newer than `known`.
fn read_changed(dir: &Path, known: &HashMap<Scope, SystemTime>) -> Result<Vec<ChangedFile>> {
    let changed = writer::scan_dir(dir)?
        .into_iter()
        .filter(|file| known.get(&file.scope).is_none_or(|seen| file.modified > *seen))
        .map(|file| (file.scope, writer::read_bucket(&file.path)))
        .collect();
    Ok(changed)
}

impl StoreInner {
    /// One reconciliation pass. Never fails; problems are logged and the
    /// affected buckets are retried on the next pass.
    pub(crate) async fn reconcile(&self) -> ReconcileReport {
        if self.write_in_progress() {
            debug!("flush in progress, skipping reconcile pass");
            return ReconcileReport {
                skipped: true,
                ..Default::default()
            };
        }

        let known = self.state.lock().mtimes.clone();
        let dir = self.dir().to_path_buf();
        let changed = tokio::task::spawn_blocking(move || read_changed(&dir, &known))
            .await
            .map_err(|e| ConfigStoreError::TaskFailed {
                task: "reconcile scan",
                cause: e,
            })
            .and_then(|scanned| scanned);

        let changed = match changed {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = ?e, "could not scan config directory");
                return ReconcileReport::default();
            }
        };
        if changed.is_empty() {
            return ReconcileReport::default();
        }

        self.merge_changed(changed)
    }

    fn merge_changed(&self, changed: Vec<ChangedFile>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut state = self.state.lock();

        // a flush may have started while the files were being read
        if self.write_in_progress() {
            debug!("flush started during reconcile pass, discarding reads");
            report.skipped = true;
            return report;
        }

        for (scope, loaded) in changed {
            let (data, modified) = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    if e.is_parse() {
                        self.stats.record_parse_failure();
                    }
                    warn!(bucket = %scope, error = ?e, "could not reload changed bucket file, retrying next pass");
                    report.failed.push(scope);
                    continue;
                }
            };

            // our own flush already recorded this write (or a newer one)
            if state.mtimes.get(&scope).is_some_and(|seen| *seen >= modified) {
                continue;
            }

            if state.dirty.remove(&scope) {
                let memory = state
                    .buckets
                    .get(&scope)
                    .map(|entry| &entry.data)
                    .cloned()
                    .unwrap_or_default();
                let conflicts = conflicting_keys(scope, &memory, &data);
                for conflict in &conflicts {
                    warn!(
                        bucket = %scope,
                        key = %conflict.key,
                        memory = %conflict.memory,
                        file = %conflict.file,
                        "config merge conflict; keeping file value"
                    );
                }
                self.stats.record_conflicts(conflicts.len());
                report.conflicts.extend(conflicts);
            }

            let entry = state.buckets.entry(scope).or_insert_with(BucketEntry::default);
            entry.data = data;
            entry.generation += 1;
            state.mtimes.insert(scope, modified);

            self.stats.record_reload();
            info!(bucket = %scope, "reloaded bucket changed on disk");
            report.reloaded.push(scope);
        }

        report
    }
}

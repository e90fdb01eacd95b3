//! Cogbot Config - Scoped Configuration Store
//!
//! This crate keeps the bot's settings: one JSON document per bucket
//! (global, per guild, per user), cached in memory, written to disk
//! atomically after a quiet period, and reloaded when something else edits
//! the files.

pub mod access;
pub mod error;
pub mod options;
pub mod reconcile;
mod scheduler;
pub mod scope;
pub mod stats;
pub mod store;
pub mod writer;

pub use access::{AccessContext, DenyReason, GrantOutcome};
pub use error::{ConfigStoreError, Result};
pub use options::StoreOptions;
pub use reconcile::{Conflict, ReconcileReport};
pub use scope::{ContextIds, Scope, ScopeKind};
pub use stats::StoreStats;
pub use store::{ConfigStore, FlushReport};
pub use writer::Bucket;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        AccessContext, Bucket, ConfigStore, ConfigStoreError, ContextIds, FlushReport,
        GrantOutcome, ReconcileReport, Result, Scope, ScopeKind, StoreOptions, StoreStats,
    };
}

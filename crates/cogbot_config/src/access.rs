//! Bot-level permissions kept in the config store.
//!
//! Superadmins live in the global bucket under `superadmins`; per-guild bot
//! admins live in each guild bucket under `admins`. Both are lists of user
//! ids. Older files may hold a bare id or ids as strings, so reads normalize
//! and write the cleaned list back.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::scope::Scope;
use crate::store::ConfigStore;

pub const SUPERADMINS_KEY: &str = "superadmins";
pub const ADMINS_KEY: &str = "admins";

/// Who is asking, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessContext {
    pub user_id: u64,
    /// `None` in direct messages
    pub guild_id: Option<u64>,
    /// Whether the member holds the guild's Administrator permission
    pub guild_administrator: bool,
}

impl AccessContext {
    pub fn direct(user_id: u64) -> Self {
        Self {
            user_id,
            guild_id: None,
            guild_administrator: false,
        }
    }

    pub fn in_guild(user_id: u64, guild_id: u64, guild_administrator: bool) -> Self {
        Self {
            user_id,
            guild_id: Some(guild_id),
            guild_administrator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The command only makes sense inside a guild
    GuildOnly,
    NotSuperadmin,
    NotAdmin,
    /// The guild already has admins; new ones must be added by one of them
    AdminsAlreadyClaimed,
    /// Superadmin is first come, first served
    SuperadminAlreadyClaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum GrantOutcome {
    Granted,
    AlreadyHeld,
    Revoked,
    NotHeld,
    Denied(DenyReason),
}

/// Normalize a stored id list. Returns the ids and whether the stored form
/// differed from the normalized one.
fn normalize_ids(stored: Option<Value>) -> (Vec<u64>, bool) {
    let Some(stored) = stored else {
        return (Vec::new(), false);
    };

    let (items, mut changed) = match stored {
        Value::Array(items) => (items, false),
        Value::Null => (Vec::new(), true),
        scalar => (vec![scalar], true),
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = match &item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => {
                changed = true;
                s.trim().parse::<u64>().ok()
            }
            _ => None,
        };
        match id {
            Some(id) => ids.push(id),
            None => {
                changed = true;
                warn!(value = %item, "dropping unparseable id from access list");
            }
        }
    }
    (ids, changed)
}

fn load_ids(store: &ConfigStore, scope: Scope, key: &str) -> Result<Vec<u64>> {
    let (ids, changed) = normalize_ids(store.get(scope, key));
    if changed {
        info!(bucket = %scope, key, "rewriting normalized access list");
        store.set(scope, key, &ids)?;
    }
    Ok(ids)
}

/// Global superadmin ids, normalized.
pub fn superadmins(store: &ConfigStore) -> Result<Vec<u64>> {
    load_ids(store, Scope::Global, SUPERADMINS_KEY)
}

/// Bot admins of one guild, normalized.
pub fn guild_admins(store: &ConfigStore, guild_id: u64) -> Result<Vec<u64>> {
    load_ids(store, Scope::Guild(guild_id), ADMINS_KEY)
}

pub fn is_superadmin(store: &ConfigStore, user_id: u64) -> Result<bool> {
    Ok(superadmins(store)?.contains(&user_id))
}

/// Superadmins everywhere; listed bot admins and guild administrators
/// inside their guild; nobody in direct messages otherwise.
pub fn is_admin(store: &ConfigStore, ctx: &AccessContext) -> Result<bool> {
    if is_superadmin(store, ctx.user_id)? {
        return Ok(true);
    }
    let Some(guild_id) = ctx.guild_id else {
        return Ok(false);
    };
    if guild_admins(store, guild_id)?.contains(&ctx.user_id) {
        return Ok(true);
    }
    Ok(ctx.guild_administrator)
}

/// Become a superadmin. Only possible while nobody holds the role.
pub fn claim_superadmin(store: &ConfigStore, user_id: u64) -> Result<GrantOutcome> {
    let mut ids = superadmins(store)?;
    if ids.contains(&user_id) {
        return Ok(GrantOutcome::AlreadyHeld);
    }
    if !ids.is_empty() {
        warn!(user_id, "superadmin claim refused, role already claimed");
        return Ok(GrantOutcome::Denied(DenyReason::SuperadminAlreadyClaimed));
    }
    ids.push(user_id);
    store.set_global(SUPERADMINS_KEY, &ids)?;
    info!(user_id, "superadmin claimed");
    Ok(GrantOutcome::Granted)
}

pub fn add_superadmin(store: &ConfigStore, caller: u64, target: u64) -> Result<GrantOutcome> {
    let mut ids = superadmins(store)?;
    if !ids.contains(&caller) {
        warn!(caller, target, "unauthorized superadmin grant");
        return Ok(GrantOutcome::Denied(DenyReason::NotSuperadmin));
    }
    if ids.contains(&target) {
        return Ok(GrantOutcome::AlreadyHeld);
    }
    ids.push(target);
    store.set_global(SUPERADMINS_KEY, &ids)?;
    info!(caller, target, "superadmin added");
    Ok(GrantOutcome::Granted)
}

/// Become a bot admin of the current guild.
///
/// Superadmins always may. Guild administrators may only while the guild
/// has no bot admins yet; after that an existing admin has to add them.
pub fn claim_admin(store: &ConfigStore, ctx: &AccessContext) -> Result<GrantOutcome> {
    let Some(guild_id) = ctx.guild_id else {
        return Ok(GrantOutcome::Denied(DenyReason::GuildOnly));
    };

    let is_super = is_superadmin(store, ctx.user_id)?;
    if !is_super && !ctx.guild_administrator {
        warn!(user_id = ctx.user_id, guild_id, "unauthorized admin claim");
        return Ok(GrantOutcome::Denied(DenyReason::NotAdmin));
    }

    let mut admins = guild_admins(store, guild_id)?;
    if admins.contains(&ctx.user_id) {
        return Ok(GrantOutcome::AlreadyHeld);
    }
    if !is_super && !admins.is_empty() {
        return Ok(GrantOutcome::Denied(DenyReason::AdminsAlreadyClaimed));
    }

    admins.push(ctx.user_id);
    store.set(Scope::Guild(guild_id), ADMINS_KEY, &admins)?;
    info!(user_id = ctx.user_id, guild_id, "guild admin claimed");
    Ok(GrantOutcome::Granted)
}

pub fn add_admin(store: &ConfigStore, ctx: &AccessContext, target: u64) -> Result<GrantOutcome> {
    let Some(guild_id) = ctx.guild_id else {
        return Ok(GrantOutcome::Denied(DenyReason::GuildOnly));
    };
    if !is_admin(store, ctx)? {
        warn!(caller = ctx.user_id, target, guild_id, "unauthorized admin grant");
        return Ok(GrantOutcome::Denied(DenyReason::NotAdmin));
    }

    let mut admins = guild_admins(store, guild_id)?;
    if admins.contains(&target) {
        return Ok(GrantOutcome::AlreadyHeld);
    }
    admins.push(target);
    store.set(Scope::Guild(guild_id), ADMINS_KEY, &admins)?;
    info!(caller = ctx.user_id, target, guild_id, "guild admin added");
    Ok(GrantOutcome::Granted)
}

pub fn remove_admin(store: &ConfigStore, ctx: &AccessContext, target: u64) -> Result<GrantOutcome> {
    let Some(guild_id) = ctx.guild_id else {
        return Ok(GrantOutcome::Denied(DenyReason::GuildOnly));
    };
    if !is_admin(store, ctx)? {
        warn!(caller = ctx.user_id, target, guild_id, "unauthorized admin removal");
        return Ok(GrantOutcome::Denied(DenyReason::NotAdmin));
    }

    let mut admins = guild_admins(store, guild_id)?;
    let before = admins.len();
    admins.retain(|id| *id != target);
    if admins.len() == before {
        return Ok(GrantOutcome::NotHeld);
    }
    store.set(Scope::Guild(guild_id), ADMINS_KEY, &admins)?;
    info!(caller = ctx.user_id, target, guild_id, "guild admin removed");
    Ok(GrantOutcome::Revoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    async fn store() -> (TempDir, ConfigStore) {
        let dir = tempdir().unwrap();
        let options = StoreOptions::new(dir.path())
            .with_save_delay(Duration::from_secs(3600))
            .with_reload_interval(Duration::from_secs(3600));
        let store = ConfigStore::open(options).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_normalize_ids() {
        assert_eq!(normalize_ids(None), (vec![], false));
        assert_eq!(normalize_ids(Some(json!([1, 2]))), (vec![1, 2], false));
        assert_eq!(normalize_ids(Some(json!(42))), (vec![42], true));
        assert_eq!(normalize_ids(Some(json!(["7", 8, "nope", null]))), (vec![7, 8], true));
    }

    #[tokio::test]
    async fn test_superadmins_are_normalized_and_written_back() {
        let (_dir, store) = store().await;
        store.set_global(SUPERADMINS_KEY, "42").unwrap();
        store.flush().await;

        assert_eq!(superadmins(&store).unwrap(), vec![42]);
        assert_eq!(store.get_global(SUPERADMINS_KEY), Some(json!([42])));
        assert!(store.is_dirty(Scope::Global));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_reading_clean_list_stays_clean() {
        let (_dir, store) = store().await;
        store.set_global(SUPERADMINS_KEY, [1u64, 2]).unwrap();
        store.flush().await;

        assert!(is_superadmin(&store, 2).unwrap());
        assert!(!is_superadmin(&store, 3).unwrap());
        assert!(!store.is_dirty(Scope::Global));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_claim_superadmin_is_first_come() {
        let (_dir, store) = store().await;
        assert_eq!(claim_superadmin(&store, 1).unwrap(), GrantOutcome::Granted);
        assert_eq!(claim_superadmin(&store, 1).unwrap(), GrantOutcome::AlreadyHeld);
        assert_eq!(
            claim_superadmin(&store, 2).unwrap(),
            GrantOutcome::Denied(DenyReason::SuperadminAlreadyClaimed)
        );

        assert_eq!(
            add_superadmin(&store, 2, 3).unwrap(),
            GrantOutcome::Denied(DenyReason::NotSuperadmin)
        );
        assert_eq!(add_superadmin(&store, 1, 2).unwrap(), GrantOutcome::Granted);
        assert_eq!(superadmins(&store).unwrap(), vec![1, 2]);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_claim_admin_rules() {
        let (_dir, store) = store().await;
        let guild = 500;

        let dm = AccessContext::direct(10);
        assert_eq!(
            claim_admin(&store, &dm).unwrap(),
            GrantOutcome::Denied(DenyReason::GuildOnly)
        );

        let member = AccessContext::in_guild(10, guild, false);
        assert_eq!(
            claim_admin(&store, &member).unwrap(),
            GrantOutcome::Denied(DenyReason::NotAdmin)
        );

        let first = AccessContext::in_guild(11, guild, true);
        assert_eq!(claim_admin(&store, &first).unwrap(), GrantOutcome::Granted);

        let second = AccessContext::in_guild(12, guild, true);
        assert_eq!(
            claim_admin(&store, &second).unwrap(),
            GrantOutcome::Denied(DenyReason::AdminsAlreadyClaimed)
        );

        claim_superadmin(&store, 99).unwrap();
        let superadmin = AccessContext::in_guild(99, guild, false);
        assert_eq!(claim_admin(&store, &superadmin).unwrap(), GrantOutcome::Granted);
        assert_eq!(guild_admins(&store, guild).unwrap(), vec![11, 99]);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_and_remove_admin() {
        let (_dir, store) = store().await;
        let guild = 600;
        let owner = AccessContext::in_guild(1, guild, true);
        let outsider = AccessContext::in_guild(2, guild, false);

        assert_eq!(
            add_admin(&store, &outsider, 2).unwrap(),
            GrantOutcome::Denied(DenyReason::NotAdmin)
        );
        assert_eq!(add_admin(&store, &owner, 2).unwrap(), GrantOutcome::Granted);
        assert_eq!(add_admin(&store, &owner, 2).unwrap(), GrantOutcome::AlreadyHeld);

        // listed admins count even without the guild permission
        assert!(is_admin(&store, &outsider).unwrap());
        assert!(!is_admin(&store, &AccessContext::direct(2)).unwrap());

        assert_eq!(remove_admin(&store, &owner, 2).unwrap(), GrantOutcome::Revoked);
        assert_eq!(remove_admin(&store, &owner, 2).unwrap(), GrantOutcome::NotHeld);
        assert!(!is_admin(&store, &outsider).unwrap());
        store.shutdown().await;
    }
}

//! Bucket identities and the rules for resolving a caller's context to one

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigStoreError;

const GLOBAL_STEM: &str = "global";
const USER_STEM_PREFIX: &str = "user_";

/// Identifies one bucket: the global bucket, one guild, or one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Guild(u64),
    User(u64),
}

/// Which namespace a lookup should land in once a context is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    #[default]
    Guild,
    User,
}

/// The identities a command invocation carries.
///
/// Direct messages have no guild; some system contexts have no user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextIds {
    pub guild_id: Option<u64>,
    pub user_id: Option<u64>,
}

impl ContextIds {
    pub fn new(guild_id: Option<u64>, user_id: Option<u64>) -> Self {
        Self { guild_id, user_id }
    }

    pub fn guild(guild_id: u64) -> Self {
        Self {
            guild_id: Some(guild_id),
            user_id: None,
        }
    }

    pub fn user(user_id: u64) -> Self {
        Self {
            guild_id: None,
            user_id: Some(user_id),
        }
    }
}

impl Scope {
    /// Resolve a context and a scope hint to a bucket.
    ///
    /// Anything that cannot be scoped falls back to [`Scope::Global`] rather
    /// than failing, so a missing guild (a DM) never breaks a caller.
    pub fn resolve(kind: ScopeKind, context: Option<&ContextIds>) -> Scope {
        let Some(context) = context else {
            return Scope::Global;
        };

        match kind {
            ScopeKind::Global => Scope::Global,
            ScopeKind::User => context.user_id.map(Scope::User).unwrap_or(Scope::Global),
            ScopeKind::Guild => context.guild_id.map(Scope::Guild).unwrap_or(Scope::Global),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::Guild(_) => ScopeKind::Guild,
            Scope::User(_) => ScopeKind::User,
        }
    }

    /// File name without extension: `global`, `<guild_id>` or `user_<user_id>`
    pub fn file_stem(&self) -> String {
        match self {
            Scope::Global => GLOBAL_STEM.to_string(),
            Scope::Guild(id) => id.to_string(),
            Scope::User(id) => format!("{USER_STEM_PREFIX}{id}"),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    /// Inverse of [`Scope::file_stem`]; `None` for files that are not buckets.
    pub fn from_file_stem(stem: &str) -> Option<Scope> {
        if stem == GLOBAL_STEM {
            return Some(Scope::Global);
        }
        if let Some(id) = stem.strip_prefix(USER_STEM_PREFIX) {
            return parse_id(id).map(Scope::User);
        }
        parse_id(stem).map(Scope::Guild)
    }
}

fn parse_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Guild(id) => write!(f, "guild:{}", id),
            Scope::User(id) => write!(f, "user:{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = ConfigStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigStoreError::InvalidScope {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("global") {
            return Ok(Scope::Global);
        }

        let (kind, id) = trimmed.split_once(':').ok_or_else(invalid)?;
        let id = parse_id(id.trim()).ok_or_else(invalid)?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "guild" => Ok(Scope::Guild(id)),
            "user" => Ok(Scope::User(id)),
            _ => Err(invalid()),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = ConfigStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ScopeKind::Global),
            "guild" => Ok(ScopeKind::Guild),
            "user" => Ok(ScopeKind::User),
            _ => Err(ConfigStoreError::InvalidScope {
                input: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_without_context_is_global() {
        assert_eq!(Scope::resolve(ScopeKind::Guild, None), Scope::Global);
        assert_eq!(Scope::resolve(ScopeKind::User, None), Scope::Global);
    }

    #[test]
    fn test_resolve_global_ignores_context() {
        let ctx = ContextIds::new(Some(1), Some(2));
        assert_eq!(Scope::resolve(ScopeKind::Global, Some(&ctx)), Scope::Global);
    }

    #[test]
    fn test_resolve_guild_and_dm_fallback() {
        let in_guild = ContextIds::new(Some(123), Some(7));
        let in_dm = ContextIds::user(7);
        assert_eq!(
            Scope::resolve(ScopeKind::Guild, Some(&in_guild)),
            Scope::Guild(123)
        );
        assert_eq!(Scope::resolve(ScopeKind::Guild, Some(&in_dm)), Scope::Global);
    }

    #[test]
    fn test_resolve_user() {
        let ctx = ContextIds::new(Some(123), Some(555));
        assert_eq!(Scope::resolve(ScopeKind::User, Some(&ctx)), Scope::User(555));
        // no user identity degrades to global instead of failing
        let ctx = ContextIds::guild(123);
        assert_eq!(Scope::resolve(ScopeKind::User, Some(&ctx)), Scope::Global);
    }

    #[test]
    fn test_file_stems() {
        assert_eq!(Scope::Global.file_name(), "global.json");
        assert_eq!(Scope::Guild(42).file_name(), "42.json");
        assert_eq!(Scope::User(555).file_name(), "user_555.json");

        for scope in [Scope::Global, Scope::Guild(42), Scope::User(555)] {
            assert_eq!(Scope::from_file_stem(&scope.file_stem()), Some(scope));
        }
    }

    #[test]
    fn test_unknown_file_stems_are_ignored() {
        assert_eq!(Scope::from_file_stem("notes"), None);
        assert_eq!(Scope::from_file_stem("user_"), None);
        assert_eq!(Scope::from_file_stem("user_abc"), None);
        assert_eq!(Scope::from_file_stem("-12"), None);
        assert_eq!(Scope::from_file_stem(""), None);
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!("guild:99".parse::<Scope>().unwrap(), Scope::Guild(99));
        assert_eq!("User:5".parse::<Scope>().unwrap(), Scope::User(5));
        assert_eq!(Scope::Guild(99).to_string(), "guild:99");

        assert!("guild".parse::<Scope>().is_err());
        assert!("channel:1".parse::<Scope>().is_err());
        assert!("guild:x".parse::<Scope>().is_err());
    }

    #[test]
    fn test_parse_scope_kind() {
        assert_eq!("USER".parse::<ScopeKind>().unwrap(), ScopeKind::User);
        assert_eq!(ScopeKind::default(), ScopeKind::Guild);
        assert!("everywhere".parse::<ScopeKind>().is_err());
    }
}

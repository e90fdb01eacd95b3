//! Application settings loaded from `cogbot.toml`
//!
//! ```toml
//! [store]
//! dir = "configs"
//! save_delay_ms = 5000
//! reload_interval_ms = 2000
//!
//! [discord]
//! token_env = "DISCORD_TOKEN"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use cogbot_config::StoreOptions;
use miette::SourceSpan;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CogbotError, Result};

const CRATES: [&str; 3] = ["cogbot_config", "cogbot_discord", "cogbot_main"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub store: StoreOptions,
    #[serde(default)]
    pub discord: DiscordSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Bot token; prefer `token_env` so the token stays out of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            token: None,
            token_env: default_token_env(),
        }
    }
}

impl DiscordSettings {
    pub fn resolve_token(&self) -> Result<String> {
        self.resolve_token_with(|name| std::env::var(name).ok())
    }

    fn resolve_token_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        self.token
            .clone()
            .or_else(|| lookup(&self.token_env))
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| CogbotError::MissingToken {
                env_var: self.token_env.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LoggingSettings {
    /// Filter directives: our crates at the configured level (or debug),
    /// everything else at warn.
    pub fn filter_directives(&self, debug: bool) -> String {
        let level = if debug { "debug" } else { self.level.as_str() };
        let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
        directives.push("warn".to_string());
        directives.join(",")
    }
}

/// Standard settings locations, in search order
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Project-specific settings
    paths.push(PathBuf::from("cogbot.toml"));

    // User config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("cogbot").join("config.toml"));
    }

    paths
}

/// Load settings from a file. A relative store dir is resolved against the
/// file's own directory.
pub async fn load_settings(path: &Path) -> Result<AppSettings> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CogbotError::SettingsUnreadable {
                path: path.to_path_buf(),
                cause: e,
            })?;

    let settings: AppSettings = match toml::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            return Err(CogbotError::SettingsParse {
                span: e.span().map(SourceSpan::from),
                content,
                cause: e,
                path: path.to_path_buf(),
            });
        }
    };

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(AppSettings {
        store: settings.store.resolve_dir(base_dir),
        ..settings
    })
}

/// Load from the first standard location that exists, or defaults.
pub async fn load_from_standard_locations() -> Result<(AppSettings, Option<PathBuf>)> {
    for path in config_paths() {
        if path.exists() {
            let settings = load_settings(&path).await?;
            return Ok((settings, Some(path)));
        }
        debug!(path = %path.display(), "no settings file");
    }
    Ok((AppSettings::default(), None))
}

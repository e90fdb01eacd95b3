use cogbot_config::ConfigStoreError;
use cogbot_discord::DiscordError;
use miette::{Diagnostic, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CogbotError {
    #[error("Settings file could not be read")]
    #[diagnostic(
        code(cogbot::main::settings_unreadable),
        help("Check that {} exists and is readable", path.display())
    )]
    SettingsUnreadable {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("Settings parse error")]
    #[diagnostic(
        code(cogbot::main::settings_parse_error),
        help("Fix the syntax error in {}", path.display())
    )]
    SettingsParse {
        #[source_code]
        content: String,
        #[label("error occurred here")]
        span: Option<SourceSpan>,
        #[source]
        cause: toml::de::Error,
        path: PathBuf,
    },

    #[error("No Discord token configured")]
    #[diagnostic(
        code(cogbot::main::missing_token),
        help("Set {env_var} (a .env file works) or put `token` under [discord] in the settings file")
    )]
    MissingToken { env_var: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] ConfigStoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Discord(#[from] DiscordError),
}

pub type Result<T> = std::result::Result<T, CogbotError>;

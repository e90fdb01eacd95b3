use cogbot_config::ConfigStoreError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DiscordError {
    #[error("Discord client could not be created")]
    #[diagnostic(
        code(cogbot::discord::client_build_failed),
        help("Check that your Discord bot token is valid and has not been regenerated")
    )]
    ClientBuildFailed {
        #[source]
        cause: serenity::Error,
    },

    #[error("Discord gateway connection ended with an error")]
    #[diagnostic(code(cogbot::discord::gateway_failed))]
    GatewayFailed {
        #[source]
        cause: serenity::Error,
    },

    #[error("Command registration failed")]
    #[diagnostic(
        code(cogbot::discord::command_registration_failed),
        help("Failed to register {command_count} slash commands")
    )]
    CommandRegistrationFailed {
        command_count: usize,
        #[source]
        cause: serenity::Error,
    },

    #[error("Interaction response failed")]
    #[diagnostic(
        code(cogbot::discord::response_failed),
        help("Failed to answer /{command_name}")
    )]
    ResponseFailed {
        command_name: String,
        #[source]
        cause: serenity::Error,
    },

    #[error("Invalid command input")]
    #[diagnostic(code(cogbot::discord::invalid_input), help("{reason}"))]
    InvalidInput { command_name: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] ConfigStoreError),
}

pub type Result<T> = std::result::Result<T, DiscordError>;

impl DiscordError {
    pub fn invalid_input(command_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            command_name: command_name.into(),
            reason: reason.into(),
        }
    }
}

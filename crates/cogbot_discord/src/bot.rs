use std::sync::Arc;

use cogbot_config::{AccessContext, ConfigStore, Scope};
use serenity::{
    all::{Command, CreateInteractionResponse, CreateInteractionResponseMessage},
    async_trait,
    client::{Client, Context, EventHandler},
    model::{
        application::{CommandInteraction, Interaction},
        gateway::{GatewayIntents, Ready},
        guild::Guild,
    },
};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::error::{DiscordError, Result};

/// Key seeded into every guild bucket so the files are readable by humans
pub const GUILD_NAME_KEY: &str = "guild_name";

/// Event handler exposing the config store over slash commands
#[derive(Clone)]
pub struct ConfigBot {
    store: Arc<ConfigStore>,
}

impl ConfigBot {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Build a gateway client for this handler.
    pub async fn into_client(self, token: &str) -> Result<Client> {
        Client::builder(token, GatewayIntents::GUILDS)
            .event_handler(self)
            .await
            .map_err(|e| DiscordError::ClientBuildFailed { cause: e })
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let access = access_context(command);
        let name = command.data.name.as_str();

        let reply = if name == "config" {
            match commands::parse_config_request(&command.data.options) {
                Ok(request) => commands::execute_config(&self.store, &access, request)?,
                Err(DiscordError::InvalidInput { reason, .. }) => reason,
                Err(e) => return Err(e),
            }
        } else {
            match commands::parse_admin_command(name, &command.data.options) {
                Ok(Some(admin)) => commands::execute_admin(&self.store, &access, admin)?,
                Ok(None) => {
                    warn!(command = name, "unknown command");
                    return Ok(());
                }
                Err(DiscordError::InvalidInput { reason, .. }) => reason,
                Err(e) => return Err(e),
            }
        };

        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(reply)
                        .ephemeral(true),
                ),
            )
            .await
            .map_err(|e| DiscordError::ResponseFailed {
                command_name: name.to_string(),
                cause: e,
            })
    }
}

/// Caller identity as the access helpers understand it
fn access_context(command: &CommandInteraction) -> AccessContext {
    let user_id = command.user.id.get();
    match command.guild_id {
        Some(guild_id) => {
            let administrator = command
                .member
                .as_ref()
                .and_then(|m| m.permissions)
                .is_some_and(|p| p.administrator());
            AccessContext::in_guild(user_id, guild_id.get(), administrator)
        }
        None => AccessContext::direct(user_id),
    }
}

#[async_trait]
impl EventHandler for ConfigBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        let commands = commands::create_commands();
        let count = commands.len();
        match Command::set_global_commands(&ctx.http, commands).await {
            Ok(registered) => info!(count = registered.len(), "registered slash commands"),
            Err(e) => {
                let err = DiscordError::CommandRegistrationFailed {
                    command_count: count,
                    cause: e,
                };
                error!(error = ?err, "cannot register slash commands");
            }
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let scope = Scope::Guild(guild.id.get());
        if self.store.has(scope, GUILD_NAME_KEY) {
            return;
        }
        match self.store.set(scope, GUILD_NAME_KEY, &guild.name) {
            Ok(()) => debug!(bucket = %scope, name = %guild.name, "seeded guild bucket"),
            Err(e) => error!(bucket = %scope, error = ?e, "failed to seed guild bucket"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            info!(
                command = %command.data.name,
                user = %command.user.name,
                guild_id = ?command.guild_id,
                "received slash command"
            );
            if let Err(e) = self.handle_command(&ctx, &command).await {
                error!(command = %command.data.name, error = ?e, "command failed");
            }
        }
    }
}

//! Slash command definitions and the store operations behind them
//!
//! Parsing turns serenity's option tree into plain request types; execution
//! takes those requests plus the caller's [`AccessContext`] and returns the
//! reply text, so everything except the network round trip is testable.

use cogbot_config::access::{self, AccessContext, DenyReason, GrantOutcome};
use cogbot_config::{ConfigStore, Scope, ScopeKind};
use serde_json::Value;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::application::{CommandDataOption, CommandDataOptionValue, CommandOptionType},
};
use tracing::info;

use crate::error::{DiscordError, Result};

/// Discord rejects message content above 2000 characters
const MAX_REPLY_LEN: usize = 1900;

pub const COMMAND_NAMES: [&str; 6] = [
    "config",
    "claimsuper",
    "addsuperadmin",
    "claimadmin",
    "addadmin",
    "removeadmin",
];

fn scope_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::String,
        "scope",
        "Which settings to use (default: this server)",
    )
    .required(false)
    .add_string_choice("server", "guild")
    .add_string_choice("me", "user")
    .add_string_choice("global", "global")
}

fn key_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "key", "Setting name").required(true)
}

fn user_option(description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::User, "user", description).required(true)
}

/// Create all slash commands for registration
pub fn create_commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("config")
            .description("View or change bot settings")
            .dm_permission(true)
            .add_option(
                CreateCommandOption::new(CommandOptionType::SubCommand, "list", "List setting names")
                    .add_sub_option(scope_option()),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::SubCommand, "get", "Show a setting")
                    .add_sub_option(key_option())
                    .add_sub_option(scope_option()),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::SubCommand, "set", "Change a setting")
                    .add_sub_option(key_option())
                    .add_sub_option(
                        CreateCommandOption::new(
                            CommandOptionType::String,
                            "value",
                            "New value (JSON, or plain text)",
                        )
                        .required(true),
                    )
                    .add_sub_option(scope_option()),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::SubCommand, "rem", "Remove a setting")
                    .add_sub_option(key_option())
                    .add_sub_option(scope_option()),
            ),
        CreateCommand::new("claimsuper")
            .description("Claim bot superadmin (only while nobody holds it)")
            .dm_permission(true),
        CreateCommand::new("addsuperadmin")
            .description("Make another user a bot superadmin")
            .dm_permission(true)
            .add_option(user_option("User to promote")),
        CreateCommand::new("claimadmin")
            .description("Claim bot admin for this server")
            .dm_permission(false),
        CreateCommand::new("addadmin")
            .description("Make a member a bot admin for this server")
            .dm_permission(false)
            .add_option(user_option("Member to promote")),
        CreateCommand::new("removeadmin")
            .description("Remove a member's bot admin role for this server")
            .dm_permission(false)
            .add_option(user_option("Member to demote")),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    List,
    Get { key: String },
    Set { key: String, value: Value },
    Rem { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    pub action: ConfigAction,
    pub scope: ScopeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    ClaimSuper,
    AddSuperadmin { target: u64 },
    ClaimAdmin,
    AddAdmin { target: u64 },
    RemoveAdmin { target: u64 },
}

/// Interpret user input as JSON, falling back to the raw text.
///
/// `42`, `true`, `[1, 2]` and `{"a": 1}` keep their JSON types; anything
/// that doesn't parse, like `hello world`, is stored as a string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn find<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a CommandDataOptionValue> {
    options.iter().find(|o| o.name == name).map(|o| &o.value)
}

fn required_str(options: &[CommandDataOption], command: &str, name: &str) -> Result<String> {
    find(options, name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DiscordError::invalid_input(command, format!("Missing option '{name}'")))
}

/// Parse the `/config <sub>` option tree.
pub fn parse_config_request(options: &[CommandDataOption]) -> Result<ConfigRequest> {
    let Some(sub) = options.first() else {
        return Err(DiscordError::invalid_input("config", "Missing subcommand"));
    };
    let CommandDataOptionValue::SubCommand(args) = &sub.value else {
        return Err(DiscordError::invalid_input("config", "Missing subcommand"));
    };

    let scope = match find(args, "scope").and_then(|v| v.as_str()) {
        Some(raw) => raw.parse::<ScopeKind>()?,
        None => ScopeKind::default(),
    };

    let action = match sub.name.as_str() {
        "list" => ConfigAction::List,
        "get" => ConfigAction::Get {
            key: required_str(args, "config", "key")?,
        },
        "set" => ConfigAction::Set {
            key: required_str(args, "config", "key")?,
            value: parse_value(&required_str(args, "config", "value")?),
        },
        "rem" => ConfigAction::Rem {
            key: required_str(args, "config", "key")?,
        },
        other => {
            return Err(DiscordError::invalid_input(
                "config",
                format!("Unknown subcommand '{other}'"),
            ));
        }
    };

    Ok(ConfigRequest { action, scope })
}

/// Parse one of the admin commands; `None` for names that aren't ours.
pub fn parse_admin_command(name: &str, options: &[CommandDataOption]) -> Result<Option<AdminCommand>> {
    let target = || match find(options, "user") {
        Some(CommandDataOptionValue::User(id)) => Ok(id.get()),
        _ => Err(DiscordError::invalid_input(name, "Missing option 'user'")),
    };

    let command = match name {
        "claimsuper" => AdminCommand::ClaimSuper,
        "addsuperadmin" => AdminCommand::AddSuperadmin { target: target()? },
        "claimadmin" => AdminCommand::ClaimAdmin,
        "addadmin" => AdminCommand::AddAdmin { target: target()? },
        "removeadmin" => AdminCommand::RemoveAdmin { target: target()? },
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// Pick the bucket for a request, or the reason the caller may not touch it.
fn authorize(
    store: &ConfigStore,
    ctx: &AccessContext,
    kind: ScopeKind,
) -> Result<std::result::Result<Scope, &'static str>> {
    let scope = match kind {
        ScopeKind::User => Ok(Scope::User(ctx.user_id)),
        ScopeKind::Global if access::is_superadmin(store, ctx.user_id)? => Ok(Scope::Global),
        ScopeKind::Global => Err("Only bot superadmins can manage global settings."),
        ScopeKind::Guild => match ctx.guild_id {
            None => Err("Server settings can only be managed inside a server."),
            Some(guild_id) if access::is_admin(store, ctx)? => Ok(Scope::Guild(guild_id)),
            Some(_) => Err("You need to be a bot admin on this server to manage its settings."),
        },
    };
    Ok(scope)
}

fn show(value: &Value) -> String {
    format!("`{}`", value)
}

fn truncate_reply(mut reply: String) -> String {
    if reply.len() > MAX_REPLY_LEN {
        let mut cut = MAX_REPLY_LEN;
        while !reply.is_char_boundary(cut) {
            cut -= 1;
        }
        reply.truncate(cut);
        reply.push_str("…");
    }
    reply
}

/// Run a `/config` request and return the reply text.
pub fn execute_config(store: &ConfigStore, ctx: &AccessContext, request: ConfigRequest) -> Result<String> {
    let scope = match authorize(store, ctx, request.scope)? {
        Ok(scope) => scope,
        Err(denied) => return Ok(denied.to_string()),
    };

    let reply = match request.action {
        ConfigAction::List => {
            let keys = store.keys(scope);
            if keys.is_empty() {
                "No config keys set.".to_string()
            } else {
                format!("Config keys: {}", keys.join(", "))
            }
        }
        ConfigAction::Get { key } => match store.get(scope, &key) {
            Some(value) => format!("{key}: {}", show(&value)),
            None => format!("{key} is not set."),
        },
        ConfigAction::Set { key, value } => {
            let reply = format!("Set {key} to {}", show(&value));
            store.set(scope, key.as_str(), value)?;
            info!(bucket = %scope, key = %key, user_id = ctx.user_id, "config value set");
            reply
        }
        ConfigAction::Rem { key } => {
            if store.rem(scope, &key) {
                info!(bucket = %scope, key = %key, user_id = ctx.user_id, "config value removed");
                format!("Removed {key}.")
            } else {
                format!("{key} was not set.")
            }
        }
    };

    Ok(truncate_reply(reply))
}

fn denial(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::GuildOnly => "This command cannot be used in direct messages.",
        DenyReason::NotSuperadmin => "Only bot superadmins can do that.",
        DenyReason::NotAdmin => "You lack admin privileges on this server.",
        DenyReason::AdminsAlreadyClaimed => {
            "There are already admins for this server. Ask one of them to run /addadmin for you."
        }
        DenyReason::SuperadminAlreadyClaimed => "Superadmin has already been claimed.",
    }
}

/// Run an admin command and return the reply text.
pub fn execute_admin(store: &ConfigStore, ctx: &AccessContext, command: AdminCommand) -> Result<String> {
    let mention = |id: u64| format!("<@{id}>");

    let reply = match command {
        AdminCommand::ClaimSuper => match access::claim_superadmin(store, ctx.user_id)? {
            GrantOutcome::Granted => "Superadmin claimed.".to_string(),
            GrantOutcome::AlreadyHeld => "You are already a bot superadmin.".to_string(),
            GrantOutcome::Denied(reason) => denial(reason).to_string(),
            _ => "Nothing changed.".to_string(),
        },
        AdminCommand::AddSuperadmin { target } => {
            match access::add_superadmin(store, ctx.user_id, target)? {
                GrantOutcome::Granted => format!("{} has been added as a bot superadmin.", mention(target)),
                GrantOutcome::AlreadyHeld => format!("{} is already a bot superadmin.", mention(target)),
                GrantOutcome::Denied(reason) => denial(reason).to_string(),
                _ => "Nothing changed.".to_string(),
            }
        }
        AdminCommand::ClaimAdmin => match access::claim_admin(store, ctx)? {
            GrantOutcome::Granted => "You are now a bot admin.".to_string(),
            GrantOutcome::AlreadyHeld => "You are already a bot admin.".to_string(),
            GrantOutcome::Denied(reason) => denial(reason).to_string(),
            _ => "Nothing changed.".to_string(),
        },
        AdminCommand::AddAdmin { target } => match access::add_admin(store, ctx, target)? {
            GrantOutcome::Granted => format!("{} has been added as a bot admin.", mention(target)),
            GrantOutcome::AlreadyHeld => format!("{} is already a bot admin.", mention(target)),
            GrantOutcome::Denied(reason) => denial(reason).to_string(),
            _ => "Nothing changed.".to_string(),
        },
        AdminCommand::RemoveAdmin { target } => match access::remove_admin(store, ctx, target)? {
            GrantOutcome::Revoked => format!("{} is no longer a bot admin.", mention(target)),
            GrantOutcome::NotHeld => format!("{} is not a bot admin.", mention(target)),
            GrantOutcome::Denied(reason) => denial(reason).to_string(),
            _ => "Nothing changed.".to_string(),
        },
    };

    Ok(reply)
}

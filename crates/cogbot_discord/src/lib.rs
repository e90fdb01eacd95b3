//! Cogbot Discord - Config Commands
//!
//! This crate exposes the config store to Discord users through slash
//! commands, and seeds guild buckets as the bot joins servers.

pub mod bot;
pub mod commands;
pub mod error;

pub use bot::ConfigBot;
pub use commands::{AdminCommand, ConfigAction, ConfigRequest, create_commands, parse_value};
pub use error::{DiscordError, Result};

// Re-export serenity for convenience
pub use serenity;

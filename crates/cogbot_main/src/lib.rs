//! Cogbot Main - Application Wiring
//!
//! Settings, CLI definitions and the store maintenance commands used by the
//! `cogbot` binary.

pub mod cli;
pub mod error;
pub mod settings;

pub use cli::{Cli, Commands, run_store_command};
pub use error::{CogbotError, Result};
pub use settings::{AppSettings, DiscordSettings, LoggingSettings};

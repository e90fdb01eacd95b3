use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cogbot_config::{ConfigStore, Scope};
use cogbot_discord::parse_value;

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "cogbot")]
#[command(about = "Discord bot with a scoped, file-backed config store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file path
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect to Discord and serve commands (default)
    Run,
    /// Print a value as JSON
    Get {
        /// `global`, `guild:<id>` or `user:<id>`
        scope: Scope,
        key: String,
    },
    /// Store a value (parsed as JSON, otherwise kept as text)
    Set {
        scope: Scope,
        key: String,
        value: String,
    },
    /// Remove a key
    Rem { scope: Scope, key: String },
    /// List the keys in a bucket
    Keys { scope: Scope },
    /// Show store counters
    Stats,
}

/// Run a maintenance command against an open store and return what to print.
///
/// Writes land on disk when the caller shuts the store down; a running bot
/// sharing the directory picks them up on its next reconcile pass.
pub fn run_store_command(store: &ConfigStore, command: &Commands) -> Result<String> {
    let output = match command {
        Commands::Run => String::new(),
        Commands::Get { scope, key } => match store.get(*scope, key) {
            Some(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            None => format!("{key} is not set in {scope}"),
        },
        Commands::Set { scope, key, value } => {
            let value = parse_value(value);
            store.set(*scope, key.as_str(), &value)?;
            format!("{scope}: {key} = {value}")
        }
        Commands::Rem { scope, key } => {
            if store.rem(*scope, key) {
                format!("{scope}: removed {key}")
            } else {
                format!("{key} is not set in {scope}")
            }
        }
        Commands::Keys { scope } => store.keys(*scope).join("\n"),
        Commands::Stats => {
            let stats = store.stats();
            serde_json::to_string_pretty(&stats).unwrap_or_else(|_| format!("{stats:?}"))
        }
    };
    Ok(output)
}

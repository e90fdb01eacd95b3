use std::sync::Arc;

use clap::Parser;
use cogbot_config::ConfigStore;
use cogbot_discord::{ConfigBot, DiscordError};
use cogbot_main::{AppSettings, Cli, Commands, run_store_command, settings};
use miette::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .rgb_colors(miette::RgbColors::Preferred)
                .with_cause_chain()
                .with_syntax_highlighting(miette::highlighters::SyntectHighlighter::default())
                .color(true)
                .context_lines(3)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();

    let (settings, source) = match &cli.config {
        Some(path) => (settings::load_settings(path).await?, Some(path.clone())),
        None => settings::load_from_standard_locations().await?,
    };

    // Initialize tracing
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.filter_directives(cli.debug)));

    fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .compact()
        .init();

    match &source {
        Some(path) => info!("Loaded settings from: {:?}", path),
        None => info!("No settings file found, using defaults"),
    }

    let store = Arc::new(ConfigStore::open(settings.store.clone()).await?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(&settings, store).await,
        command => {
            let output = run_store_command(&store, &command);
            let report = store.shutdown().await;
            let output = output?;
            if !output.is_empty() {
                println!("{output}");
            }
            if !report.is_clean() {
                return Err(miette::miette!(
                    "Failed to write {} bucket(s) to {}",
                    report.failed.len(),
                    store.dir().display()
                ));
            }
            Ok(())
        }
    }
}

/// Serve slash commands until the gateway stops or Ctrl-C, then flush.
async fn run_bot(settings: &AppSettings, store: Arc<ConfigStore>) -> Result<()> {
    let token = settings.discord.resolve_token()?;
    let mut client = ConfigBot::new(Arc::clone(&store))
        .into_client(&token)
        .await?;
    let shard_manager = client.shard_manager.clone();

    info!("Starting Discord bot...");
    let result = tokio::select! {
        res = client.start() => res.map_err(|e| DiscordError::GatewayFailed { cause: e }),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
            Ok(())
        }
    };

    let report = store.shutdown().await;
    if !report.is_clean() {
        error!(failed = ?report.failed, "some config buckets could not be saved");
    }

    result?;
    Ok(())
}

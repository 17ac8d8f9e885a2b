use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pregen_core::config::mode_from_env;
use pregen_core::PregenConfig;
use pregen_discord::{DiscordAdapter, DiscordSession};
use pregen_engine::{Engine, EngineOptions, FileStore};

mod cli;
mod handlers;
mod watch;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pregen=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mode = match cli.command {
        Some(command) => command.mode(),
        None => mode_from_env()?,
    };

    let config = PregenConfig::load(cli.config.as_deref())?;
    let token = config.require_token()?.to_string();
    let client_id = config.require_client_id()?;
    info!(%mode, cache = %config.cache.dir, "starting");

    let session = Arc::new(DiscordSession::new(&token, client_id, config.bot.guild_id));
    let store = Arc::new(FileStore::new(&config.cache.dir));
    let engine = Arc::new(Engine::new(
        EngineOptions::from_config(mode, &config),
        handlers::sources(),
        store,
        session,
    )
    .with_events(handlers::events()));

    let report = engine.prepare().await?;
    println!("{report}");

    if !mode.stays_resident() {
        info!("build complete");
        return Ok(());
    }

    if mode.watches_sources() {
        watch::spawn(
            Arc::clone(&engine),
            Path::new(&config.watch.root),
            &[Path::new(&config.cache.dir), Path::new("target")],
        )?;
    }

    let adapter = DiscordAdapter::new(&token, engine.dispatcher(), engine.listeners())?;
    adapter.run().await;
    Ok(())
}

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use smartnotes::capture::DeviceRegistry;
use smartnotes::cli::{App, Cli};
use smartnotes::{logging, Config, FilesystemBackend, Profile, SqliteBackend, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev {
        Profile::Dev
    } else {
        Profile::Prod
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path, profile)?,
        None => Config::load_with_profile(profile)?,
    };
    logging::init(&config.log_level);

    let db_path = config.get_database_path();
    let media = Arc::new(FilesystemBackend::new(config.get_media_dir()));
    let backend = Arc::new(SqliteBackend::new(
        db_path.to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
        media,
    )?);

    let app = App {
        engine: SyncEngine::new(backend.clone(), backend.clone()),
        session: backend,
        devices: DeviceRegistry::new(),
    };
    app.run(cli.command).await?;

    Ok(())
}

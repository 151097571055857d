use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod catalog_client;
use catalog_client::SpotifyClient;

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod credentials;
use credentials::StoreCredentialProvider;

mod library_store;
use library_store::{LibraryStore, SqliteLibraryStore};

mod refresh;
use refresh::RefreshScheduler;

mod resolver;
use resolver::EntityResolver;

mod sqlite_persistence;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite library database file.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the remote catalog API.
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// Timeout in seconds for catalog requests.
    #[clap(long, default_value_t = 30)]
    pub api_timeout_sec: u64,

    /// Seconds between refresh cycles.
    #[clap(long, default_value_t = 300)]
    pub poll_interval_secs: u64,

    /// Run a single refresh cycle and exit.
    #[clap(long)]
    pub once: bool,
}

async fn run_cycle(scheduler: &RefreshScheduler, store: &Arc<SqliteLibraryStore>) {
    let user_ids = match store.list_user_ids() {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to list users: {:#}", e);
            return;
        }
    };
    if user_ids.is_empty() {
        info!("No users registered yet, nothing to refresh");
        return;
    }

    let cycles = user_ids.iter().map(|user_id| async move {
        if let Err(e) = scheduler.refresh_all(user_id).await {
            error!("Refresh cycle failed for {}: {:#}", user_id, e);
        }
    });
    futures::future::join_all(cycles).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        api_base_url: cli_args.api_base_url.clone(),
        api_timeout_sec: cli_args.api_timeout_sec,
        poll_interval_secs: cli_args.poll_interval_secs,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite library database at {:?}...", app_config.db_path);
    let store = Arc::new(SqliteLibraryStore::new(&app_config.db_path)?);

    let client = Arc::new(SpotifyClient::new(
        &app_config.api_base_url,
        Duration::from_secs(app_config.api_timeout_sec),
    )?);
    let resolver = Arc::new(EntityResolver::new(client, store.clone()));
    let credentials = Arc::new(StoreCredentialProvider::new(
        store.clone() as Arc<dyn LibraryStore>
    ));
    let scheduler = RefreshScheduler::new(resolver, credentials, app_config.ttl.clone());

    let cancel = tokio_util::sync::CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        ctrlc_cancel.cancel();
    })
    .context("Failed to install shutdown handler")?;

    if cli_args.once {
        run_cycle(&scheduler, &store).await;
        return Ok(());
    }

    info!(
        "Polling every {} seconds, press Ctrl+C to stop",
        app_config.poll_interval_secs
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(app_config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_cycle(&scheduler, &store).await,
        }
    }

    info!("Stopped");
    Ok(())
}

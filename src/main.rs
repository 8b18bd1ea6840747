//! Krompir Launcher - Manage, launch and download builds of Skakavi Krompir
//!
//! A terminal launcher that keeps a list of installed game builds, runs one
//! of them at a time under supervision, captures its output, and fetches new
//! builds from the published releases.

mod core;
mod persistence;
mod platform;
mod shell;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::settings::default_data_directory;
use crate::core::{AppState, Settings};

/// Application name constant
pub const APP_NAME: &str = "KrompirLauncher";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_FILTER: &str = "krompir_launcher=info";
const VERBOSE_FILTER: &str = "krompir_launcher=debug";

/// Command-line options
#[derive(Parser, Debug)]
#[command(name = "krompir-launcher")]
#[command(about = "Manage, launch and download builds of Skakavi Krompir")]
#[command(version = APP_VERSION)]
struct Cli {
    /// Directory holding settings, the instance list and downloaded builds
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Override the releases endpoint
    #[arg(long = "releases-url")]
    releases_url: Option<String>,

    /// Enable debug output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter_handle = init_logging(cli.verbose);
    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Only one launcher may write the instance list at a time
    let instance = SingleInstance::new(APP_NAME)
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        eprintln!("{} is already running!", APP_NAME);
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_directory);
    let mut settings = Settings::load_from(&data_dir);
    if let Some(url) = cli.releases_url {
        settings.releases_url = url;
    }
    if settings.debug_logging && !cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        enable_debug_logging(&filter_handle);
    }

    let (app_state, supervisor_events) =
        AppState::new(settings).context("Failed to initialize application state")?;
    info!(
        "Using data directory {:?} and instance list {:?}",
        app_state.data_directory(),
        app_state.registry_path()?
    );

    shell::run(app_state, supervisor_events).await?;

    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Initialize the logging system
///
/// Logs go to stderr so they never interleave with shell output on stdout.
fn init_logging(verbose: bool) -> FilterHandle {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

fn enable_debug_logging(handle: &FilterHandle) {
    if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(VERBOSE_FILTER)) {
        error!("Failed to enable debug logging: {}", e);
    }
}

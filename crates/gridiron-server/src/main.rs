// Gridiron service entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database, seed the default weight profile
// 4. Load slate files into the signal store
// 5. Bind the listener and serve until Ctrl+C

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use gridiron_core::config;
use gridiron_core::db::Database;
use gridiron_core::slate::import::load_slate_dir;
use gridiron_core::store::MemorySignalStore;
use gridiron_server::api::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Gridiron starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: standard cap ${}, captain cap ${}, max {} lineups",
        config.optimizer.standard.salary_cap,
        config.optimizer.captain.salary_cap,
        config.optimizer.max_lineups
    );

    // 3. Open database
    let db = Arc::new(Database::open(&config.database.path).context("failed to open database")?);
    info!("Database opened at {}", config.database.path);
    if !db
        .seed_default_profile(&config.default_profile)
        .context("failed to seed default weight profile")?
    {
        info!("Keeping existing default weight profile");
    }

    // 4. Load slates
    let slate_dir = Path::new(&config.data_paths.slates);
    let slates = if slate_dir.is_dir() {
        load_slate_dir(slate_dir).context("failed to load slate files")?
    } else {
        warn!("Slate directory {} not found; starting with no slates", slate_dir.display());
        Vec::new()
    };
    info!("Loaded {} slate files from {}", slates.len(), slate_dir.display());
    let signals = Arc::new(MemorySignalStore::from_slates(slates));

    let state = Arc::new(AppState::new(
        signals,
        config.scoring.allow_empty_pool,
        config.optimizer.clone(),
        db.clone(),
        db,
    ));

    // 5. Serve
    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let server = tokio::spawn(api::serve(listener, state));

    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP server error: {e:#}"),
            Err(e) => error!("HTTP server task failed: {e}"),
        },
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    info!("Gridiron shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/gridiron.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("gridiron.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridiron=info,gridiron_core=info,gridiron_server=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

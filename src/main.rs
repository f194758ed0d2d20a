use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vinyl_catalog_sync::config::{AppConfig, CliConfig, FileConfig};
use vinyl_catalog_sync::{
    CatalogSyncJob, DirectoryDumpSource, DumpSource, ImportRunStore, JobContext, Period,
    SqliteCatalogStore, SqliteImportRunStore, SyncError, SyncOutcome,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db and sync.db.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory containing the downloaded dump files.
    #[clap(long, global = true, value_parser = parse_path)]
    pub dump_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import the dumps of one period.
    Run {
        /// Period to import, as YYYY-MM. Defaults to the latest complete dump set.
        #[clap(long)]
        period: Option<Period>,

        /// Records decoded per batch.
        #[clap(long)]
        batch_size: Option<usize>,

        /// Fail runs left unfinished by a crashed process before starting.
        #[clap(long)]
        fail_stale_runs: bool,
    },

    /// Show the most recent import runs.
    Status {
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
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
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        dump_dir: cli_args.dump_dir.clone(),
        batch_size: match &cli_args.command {
            Command::Run { batch_size, .. } => *batch_size,
            Command::Status { .. } => None,
        },
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening import run database at {:?}...", app_config.sync_db_path());
    let import_runs = Arc::new(SqliteImportRunStore::new(
        app_config.sync_db_path(),
        app_config.db_op_timeout,
    )?);

    match cli_args.command {
        Command::Status { limit } => print_status(import_runs.as_ref(), limit),
        Command::Run {
            period,
            fail_stale_runs,
            ..
        } => run_import(&app_config, import_runs, period, fail_stale_runs).await,
    }
}

async fn run_import(
    app_config: &AppConfig,
    import_runs: Arc<SqliteImportRunStore>,
    period: Option<Period>,
    fail_stale_runs: bool,
) -> Result<()> {
    if fail_stale_runs {
        let failed = import_runs.fail_interrupted_runs("interrupted")?;
        if failed > 0 {
            warn!("Marked {} interrupted import run(s) as failed", failed);
        }
    }

    info!("Opening SQLite catalog database at {:?}...", app_config.catalog_db_path());
    let catalog_store = Arc::new(SqliteCatalogStore::new(
        app_config.catalog_db_path(),
        app_config.db_op_timeout,
    )?);
    let dump_source = Arc::new(DirectoryDumpSource::new(&app_config.dump_dir)?);

    let period = match period {
        Some(period) => period,
        None => dump_source
            .latest_period()?
            .with_context(|| format!("No complete dump set in {:?}", app_config.dump_dir))?,
    };

    let shutdown_token = CancellationToken::new();
    let ctx = JobContext::new(
        shutdown_token.clone(),
        catalog_store,
        import_runs,
        dump_source,
    );
    let job = CatalogSyncJob::new(app_config.sync.clone());
    let mut handle = tokio::task::spawn_blocking(move || job.run_period(&ctx, period));

    let result = tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, finishing the current batch");
            shutdown_token.cancel();
            handle.await
        }
    }
    .context("Import task panicked")?;

    match result {
        Ok(SyncOutcome::AlreadyCompleted { run_id }) => {
            info!(period = %period, run_id, "Nothing to do, period already imported");
            Ok(())
        }
        Ok(SyncOutcome::Completed { run_id, .. }) => {
            info!(period = %period, run_id, "Import finished");
            Ok(())
        }
        Err(err @ SyncError::Run(_)) if err.is_conflict() => {
            error!("Another import is in progress: {}", err);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_status(import_runs: &dyn ImportRunStore, limit: usize) -> Result<()> {
    let runs = import_runs.list_runs(limit)?;
    if runs.is_empty() {
        println!("No import runs recorded");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<5} {}  {:<22} started {}  {}",
            run.id,
            run.period,
            run.status.as_str(),
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.error_message.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

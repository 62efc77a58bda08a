#![forbid(unsafe_code)]

//! `import-sync` — follow or cancel a product import job from the terminal.
//!
//! `watch` streams the job's status until it finishes (or Ctrl-C), falling
//! back to polling when the event stream stalls. `cancel` asks the server
//! to abort the job.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use import_sync::channel::client::JobsClient;
use import_sync::{AppError, JobStatus, Result, SessionView, SyncConfig, SyncManager};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "import-sync", about = "Follow product import jobs", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the importer API base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow a job until it completes, fails, or Ctrl-C is pressed.
    Watch {
        /// Job id (UUID or task id).
        job_id: String,

        /// On Ctrl-C, also ask the server to cancel the job.
        #[arg(long)]
        cancel_on_interrupt: bool,
    },

    /// Ask the server to cancel a job.
    Cancel {
        /// Job id (UUID or task id).
        job_id: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => SyncConfig::load_from_path(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(url) = args.base_url {
        config.base_url = url;
        config.validate()?;
    }
    info!(base_url = %config.base_url, "configuration loaded");

    match args.command {
        Command::Watch {
            job_id,
            cancel_on_interrupt,
        } => watch(&config, &job_id, cancel_on_interrupt).await,
        Command::Cancel { job_id } => {
            JobsClient::new(&config)?.cancel_job(&job_id).await?;
            info!(job_id = %job_id, "cancel request sent");
            Ok(())
        }
    }
}

async fn watch(config: &SyncConfig, job_id: &str, cancel_on_interrupt: bool) -> Result<()> {
    let manager = SyncManager::from_config(config)?;
    let handle = manager.start(job_id)?;
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(%err, "ctrl-c signal handler failed");
                }
                info!(job_id, "interrupt received");
                if cancel_on_interrupt {
                    let client = JobsClient::new(config)?;
                    if let Err(err) = client.cancel_job(job_id).await {
                        warn!(job_id, %err, "cancel request failed");
                    }
                }
                manager.stop(job_id);
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                report(job_id, &view);
                if view.is_terminated() {
                    break;
                }
            }
        }
    }

    handle.closed().await;
    manager.shutdown();
    Ok(())
}

fn report(job_id: &str, view: &SessionView) {
    let snapshot = &view.snapshot;
    match snapshot.status {
        JobStatus::Failed => error!(
            job_id,
            error_message = snapshot.error_message.as_deref().unwrap_or("unknown error"),
            processed_rows = ?snapshot.processed_rows,
            total_rows = ?snapshot.total_rows,
            "import failed"
        ),
        JobStatus::Completed => info!(
            job_id,
            processed_rows = ?snapshot.processed_rows,
            total_rows = ?snapshot.total_rows,
            "import completed"
        ),
        status => info!(
            job_id,
            %status,
            progress = snapshot.progress,
            processed_rows = ?snapshot.processed_rows,
            total_rows = ?snapshot.total_rows,
            eta_seconds = ?snapshot.eta_seconds,
            phase = ?view.phase,
            "import progress"
        ),
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

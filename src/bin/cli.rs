//! Assignment Sync CLI
//!
//! Local execution entry point: one-off runs, the daily scheduler and the
//! settings dialogs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use assignment_sync::{
    config::{StoragePaths, load_all},
    error::Result,
    models::{LifecycleFlag, Source},
    pipeline::{self, DailyTrigger, Preflight, RunContext, RunSummary},
    services::{
        AuthDriver, AuthSession, ClassroomClient, CourseScanner, GoogleTasksClient,
        ReqwestTransport, SessionClient,
    },
    settings::{CLEANUP_DAYS, Credentials, TASK_LIST_NAME, TRIGGER_HOUR, TaskSettings},
    storage::{LocalStorage, load_records},
};
use chrono::Local;
use clap::{Parser, Subcommand};

/// Assignment Sync - portal and course-work assignments into one task list
#[derive(Parser, Debug)]
#[command(
    name = "assignment-sync",
    version,
    about = "Collects assignments into a task list"
)]
struct Cli {
    /// Path to storage directory holding config, settings and sheets
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass now
    Run {
        /// Write scans even if the circuit breaker would refuse them
        #[arg(long)]
        force: bool,
    },

    /// Keep running and sync once a day at the configured hour
    Schedule,

    /// Store portal credentials
    Auth {
        #[arg(long)]
        userid: String,

        #[arg(long, env = "ASSIGNMENT_SYNC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Try logging in before saving
        #[arg(long)]
        check: bool,
    },

    /// Choose the task list, trigger hour and cleanup period
    SetupTasks {
        #[arg(long)]
        list_name: Option<String>,

        #[arg(long)]
        trigger_hour: Option<u32>,

        #[arg(long)]
        cleanup_days: Option<i64>,
    },

    /// Forget all stored settings
    Reset,

    /// Validate configuration and settings
    Validate,

    /// Show sheet contents summary
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Build every collaborator from the storage directory and run one pass.
async fn execute_run(paths: &StoragePaths, force: bool) -> Result<RunSummary> {
    let (config, settings) = load_all(paths)?;
    let journal = paths.journal();

    let token = settings
        .access_token(&config.google.access_token_env)
        .inspect_err(|e| journal.failure(&format!("Run not started: {e}")))?;

    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let scanner = CourseScanner::new(SessionClient::new(transport, &config), &config);
    let classroom = ClassroomClient::new(&config, token.clone())?;
    let sink = GoogleTasksClient::new(&config, token)?;
    let storage = LocalStorage::new(paths.root());

    let ctx = RunContext {
        config: &config,
        settings: &settings,
        storage: &storage,
        scanner: &scanner,
        course_work: &classroom,
        sink: &sink,
        journal: &journal,
    };
    pipeline::run_daily(&ctx, Local::now().naive_local(), force).await
}

async fn scheduled_run(paths: Arc<StoragePaths>) {
    match execute_run(&paths, false).await {
        Ok(summary) => log::info!("{summary}"),
        Err(e) => log::error!("Scheduled run failed: {e}"),
    }
}

fn trigger_hour(paths: &StoragePaths) -> Result<u32> {
    let (config, settings) = load_all(paths)?;
    Ok(settings.get_number(TRIGGER_HOUR, config.sync.default_trigger_hour))
}

/// Re-read the trigger hour and move the job if it changed.
async fn refresh_trigger(trigger: &mut DailyTrigger, paths: &Arc<StoragePaths>) -> Result<()> {
    let hour = trigger_hour(paths)?;
    let job_paths = Arc::clone(paths);
    trigger
        .register(hour, move || scheduled_run(Arc::clone(&job_paths)))
        .await?;
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = StoragePaths::new(&cli.storage_dir);

    match cli.command {
        Command::Run { force } => {
            let summary = execute_run(&paths, force).await?;
            log::info!("{summary}");
            if summary.failures() > 0 {
                log::warn!("{} phase(s) failed; see the journal", summary.failures());
            }
        }

        Command::Schedule => {
            let paths = Arc::new(paths);
            let mut trigger = DailyTrigger::new().await?;
            refresh_trigger(&mut trigger, &paths).await?;
            trigger.start().await?;
            log::info!("Scheduler running; press Ctrl-C to stop");

            let mut settings_check = tokio::time::interval(Duration::from_secs(3600));
            settings_check.tick().await;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = settings_check.tick() => {
                        if let Err(e) = refresh_trigger(&mut trigger, &paths).await {
                            log::warn!("Could not refresh trigger: {e}");
                        }
                    }
                }
            }

            log::info!("Stopping scheduler...");
            trigger.shutdown().await?;
        }

        Command::Auth {
            userid,
            password,
            check,
        } => {
            let (config, mut settings) = load_all(&paths)?;
            let credentials = Credentials { userid, password };

            if check {
                let transport = Arc::new(ReqwestTransport::new(&config)?);
                let client = SessionClient::new(transport, &config);
                let mut session = AuthSession::new();
                let landing = AuthDriver::new(&client, &config)
                    .login(&mut session, &credentials)
                    .await?;
                log::info!("Login OK, landed on {landing}");
            }

            settings.save_auth(&credentials)?;
            log::info!("Credentials saved for {}", credentials.userid);
        }

        Command::SetupTasks {
            list_name,
            trigger_hour,
            cleanup_days,
        } => {
            let (config, mut settings) = load_all(&paths)?;
            let tasks = TaskSettings {
                task_list_name: list_name
                    .or_else(|| settings.get_setting(TASK_LIST_NAME))
                    .unwrap_or_else(|| config.sync.default_list_name.clone()),
                trigger_hour: trigger_hour.unwrap_or_else(|| {
                    settings.get_number(TRIGGER_HOUR, config.sync.default_trigger_hour)
                }),
                cleanup_days: cleanup_days.unwrap_or_else(|| {
                    settings.get_number(CLEANUP_DAYS, config.sync.default_cleanup_days)
                }),
            };

            let token = settings.access_token(&config.google.access_token_env)?;
            let sink = GoogleTasksClient::new(&config, token)?;
            let list = pipeline::setup_tasks(&sink, &mut settings, &tasks).await?;

            log::info!(
                "Task list '{}' bound; daily run at {}:00, rows kept {} days",
                list.title,
                tasks.trigger_hour,
                tasks.cleanup_days
            );
        }

        Command::Reset => {
            let (_, mut settings) = load_all(&paths)?;
            settings.reset_all()?;
            log::info!("All settings cleared");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            let (config, settings) = load_all(&paths).inspect_err(|e| {
                log::error!("Config validation failed: {}", e);
            })?;
            log::info!("✓ Config OK");

            match Preflight::check(&settings, &config) {
                Ok(preflight) => log::info!(
                    "✓ Settings OK (user {}, list {})",
                    preflight.credentials.userid,
                    preflight.list_id
                ),
                Err(e) => {
                    log::error!("Settings incomplete: {}", e);
                    return Err(e);
                }
            }
            if let Err(e) = settings.access_token(&config.google.access_token_env) {
                log::warn!("No API access token: {e}");
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", paths.root().display());
            let (_, settings) = load_all(&paths)?;
            log::info!(
                "Task list: {}",
                settings
                    .task_list_id()
                    .unwrap_or_else(|| "not set".to_string())
            );

            let storage = LocalStorage::new(paths.root());
            for source in Source::ALL {
                let records = load_records(&storage, source).await?;
                let count = |flag: LifecycleFlag| {
                    records.iter().filter(|r| r.lifecycle_flag == flag).count()
                };
                log::info!(
                    "{}: {} rows ({} open, {} registered, {} completed, {} deleted, {} expired, {} without date)",
                    source.sheet_name(),
                    records.len(),
                    count(LifecycleFlag::Empty),
                    count(LifecycleFlag::Registered),
                    count(LifecycleFlag::Completed),
                    count(LifecycleFlag::Deleted),
                    count(LifecycleFlag::Expired),
                    count(LifecycleFlag::SkippedNoDate)
                );
            }

            match paths.journal().entries()?.last() {
                Some(entry) => log::info!(
                    "Last journal entry ({}): {}",
                    entry.timestamp.format("%Y/%m/%d %H:%M"),
                    entry.message
                ),
                None => log::info!("Journal is empty."),
            }
        }
    }

    Ok(())
}

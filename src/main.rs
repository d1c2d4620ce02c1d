use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use kanbot::config::Config;
use kanbot::kan::KanClient;
use kanbot::ledger::ReminderLedger;
use kanbot::llm::{AnthropicClient, AnthropicConfig};
use kanbot::notify::TelegramNotifier;
use kanbot::scheduler::{Scheduler, SchedulerConfig};
use kanbot::sprint::SprintCalendar;
use kanbot::store::LinkStore;
use kanbot::vagueness::VaguenessEvaluator;

#[derive(Parser, Debug)]
#[command(name = "kanbot", version, about = "Task board hygiene reminders over Telegram")]
struct Cli {
    /// Run a single check tick and exit
    #[arg(long)]
    once: bool,

    /// Override the SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    if verbose {
        env_logger::Builder::from_default_env().init();
        return Ok(());
    }

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kanbot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("kanbot.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let source = Arc::new(
        KanClient::new(config.kan_base_url.clone(), config.kan_api_key.clone())
            .context("Failed to create Kan client")?,
    );

    let links = Arc::new(LinkStore::open(&config.db_path).context("Failed to open link store")?);
    let ledger =
        Arc::new(ReminderLedger::open(&config.db_path).context("Failed to open reminder ledger")?);

    let llm = Arc::new(
        AnthropicClient::new(AnthropicConfig::default())
            .context("Failed to create Anthropic client")?,
    );
    let evaluator = Arc::new(VaguenessEvaluator::new(llm));

    let notifier = Arc::new(
        TelegramNotifier::new(config.telegram_bot_token.clone())
            .context("Failed to create Telegram notifier")?,
    );

    Ok(Scheduler::new(
        source,
        links,
        ledger,
        evaluator,
        notifier,
        SprintCalendar::new(config.sprint_epoch),
        SchedulerConfig::from(config),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    info!("Starting kanbot (db: {})", config.db_path.display());

    let scheduler = Arc::new(build_scheduler(&config)?);

    if cli.once {
        println!("{}", "Running a single check...".cyan());
        let report = scheduler.tick().await;
        println!(
            "{} scanned {} workspace(s), sent {} reminder(s), {} on cooldown",
            "Done:".green(),
            report.workspaces_scanned,
            report.sent,
            report.skipped_cooldown
        );
        if report.errors > 0 {
            println!("{} {} error(s), see logs", "Warning:".yellow(), report.errors);
        }
        return Ok(());
    }

    println!(
        "{} checking every {}h (sprint epoch {})",
        "Kanbot running:".cyan(),
        config.reminder_interval_hours,
        config.sprint_epoch
    );
    scheduler.run().await;
    Ok(())
}

//! Runtime configuration.
//!
//! All settings come from environment variables, mirroring how the bot is
//! deployed. `Config::from_lookup` takes the variable resolver as a closure
//! so tests can inject values without touching the process environment.

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::error::{KanbotError, Result};

/// Default sprint epoch when SPRINT_START_DATE is unset or unparsable.
/// Jan 5, 2025 is a Sunday (sprint day 1).
pub const DEFAULT_SPRINT_EPOCH: &str = "2025-01-05";

/// Sprint cycle length: 13 sprint days plus one break day.
pub const SPRINT_CYCLE_DAYS: i64 = 14;

/// Runtime configuration for the reminder daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hours between scheduled scan ticks.
    pub reminder_interval_hours: u64,

    /// Days a card may sit in an in-progress list before it counts as stale.
    pub stale_days: i64,

    /// Ledger retention horizon in days for the daily prune.
    pub retention_days: i64,

    /// Sprint epoch: any past sprint start date, cycle position is computed
    /// from here.
    pub sprint_epoch: NaiveDate,

    /// Base URL of the Kan API.
    pub kan_base_url: String,

    /// Kan service API key.
    pub kan_api_key: String,

    /// Telegram bot token.
    pub telegram_bot_token: String,

    /// Path to the SQLite database holding links and the reminder ledger.
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using the given variable resolver.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let kan_api_key = lookup("KAN_API_KEY")
            .ok_or_else(|| KanbotError::Config("KAN_API_KEY not set".to_string()))?;
        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| KanbotError::Config("TELEGRAM_BOT_TOKEN not set".to_string()))?;

        let reminder_interval_hours = lookup("REMINDER_INTERVAL_HOURS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let stale_days = lookup("STALE_DAYS").and_then(|v| v.parse().ok()).unwrap_or(14);

        let retention_days = lookup("REMINDER_RETENTION_DAYS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        let sprint_epoch = parse_sprint_epoch(lookup("SPRINT_START_DATE").as_deref());

        let kan_base_url = lookup("KAN_BASE_URL")
            .unwrap_or_else(|| "https://tasks.xdeca.com".to_string());

        let db_path = lookup("KANBOT_DB")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let config = Self {
            reminder_interval_hours,
            stale_days,
            retention_days,
            sprint_epoch,
            kan_base_url,
            kan_api_key,
            telegram_bot_token,
            db_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.reminder_interval_hours == 0 {
            return Err(KanbotError::Config(
                "REMINDER_INTERVAL_HOURS must be > 0".to_string(),
            ));
        }
        if self.stale_days <= 0 {
            return Err(KanbotError::Config("STALE_DAYS must be > 0".to_string()));
        }
        if self.retention_days <= 0 {
            return Err(KanbotError::Config(
                "REMINDER_RETENTION_DAYS must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse the sprint epoch, silently falling back to the default.
/// A malformed date must never fault the scheduler.
pub fn parse_sprint_epoch(value: Option<&str>) -> NaiveDate {
    value
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        .unwrap_or_else(|| {
            NaiveDate::parse_from_str(DEFAULT_SPRINT_EPOCH, "%Y-%m-%d")
                .expect("default epoch is valid")
        })
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kanbot")
        .join("kanbot.db")
}

// ⚙️ Configuration - environment variables, with `.env` read first

use crate::dart::{self, DateRange, FetchMode};
use crate::error::{MonitorError, Result};
use crate::store::StoreBackend;
use crate::telegram;
use chrono::Local;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    // Credentials
    pub dart_api_key: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,

    // Endpoints
    pub dart_base_url: String,
    pub telegram_base_url: String,

    // Watch-list
    pub watchlist_path: PathBuf,
    pub target_industry: Option<String>,
    pub report_keywords: Vec<String>,

    // State
    pub state_backend: StoreBackend,
    pub state_path: PathBuf,
    pub retention_days: Option<u32>,
    pub run_log_path: PathBuf,

    // Schedule and fetch window
    pub check_interval_minutes: u64,
    pub target_year: Option<i32>,
    pub lookback_days: u32,
    pub fetch_mode: FetchMode,

    // Pacing
    pub api_delay: Duration,
    pub send_delay: Duration,
    pub http_timeout: Duration,
    pub summary_sample: usize,
}

impl Config {
    /// Read `.env` if present, then the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let required = |key: &str| {
            get(key).ok_or_else(|| {
                MonitorError::Configuration(format!("{} environment variable is required", key))
            })
        };

        let report_keywords = get("REPORT_KEYWORDS")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["감사보고서".to_string()]);

        let config = Config {
            dart_api_key: required("DART_API_KEY")?,
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,
            dart_base_url: get("DART_API_BASE_URL").unwrap_or_else(|| dart::DEFAULT_BASE_URL.to_string()),
            telegram_base_url: get("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|| telegram::DEFAULT_BASE_URL.to_string()),
            watchlist_path: PathBuf::from(get("WATCHLIST_PATH").unwrap_or_else(|| "companies.csv".to_string())),
            target_industry: get("TARGET_INDUSTRY"),
            report_keywords,
            state_backend: parse_or("STATE_BACKEND", get("STATE_BACKEND"), StoreBackend::Sqlite)?,
            state_path: PathBuf::from(get("STATE_PATH").unwrap_or_else(|| "data/audit-watch.db".to_string())),
            retention_days: parse_opt("RETENTION_DAYS", get("RETENTION_DAYS"))?,
            run_log_path: PathBuf::from(get("RUN_LOG_PATH").unwrap_or_else(|| "data/runs.jsonl".to_string())),
            check_interval_minutes: parse_or("CHECK_INTERVAL_MINUTES", get("CHECK_INTERVAL_MINUTES"), 60)?,
            target_year: parse_opt("TARGET_YEAR", get("TARGET_YEAR"))?,
            lookback_days: parse_or("LOOKBACK_DAYS", get("LOOKBACK_DAYS"), 1)?,
            fetch_mode: parse_or("FETCH_MODE", get("FETCH_MODE"), FetchMode::Auto)?,
            api_delay: Duration::from_millis(parse_or("API_DELAY_MS", get("API_DELAY_MS"), 500)?),
            send_delay: Duration::from_millis(parse_or("SEND_DELAY_MS", get("SEND_DELAY_MS"), 100)?),
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 10)?),
            summary_sample: parse_or(
                "SUMMARY_SAMPLE",
                get("SUMMARY_SAMPLE"),
                telegram::DEFAULT_SUMMARY_SAMPLE,
            )?,
        };

        if config.check_interval_minutes == 0 {
            return Err(MonitorError::Configuration(
                "CHECK_INTERVAL_MINUTES must be at least 1".to_string(),
            ));
        }

        // Fail at startup rather than on the first run
        DateRange::lookback(config.lookback_days, Local::now().date_naive())?;

        Ok(config)
    }

    /// Re-checked at the start of every run
    pub fn validate(&self) -> Result<()> {
        if self.dart_api_key.is_empty() {
            return Err(MonitorError::Configuration("DART_API_KEY is empty".to_string()));
        }
        if self.telegram_bot_token.is_empty() || self.telegram_chat_id.is_empty() {
            return Err(MonitorError::Configuration(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID are required".to_string(),
            ));
        }
        if !self.watchlist_path.exists() {
            return Err(MonitorError::Configuration(format!(
                "Watch-list file not found: {}",
                self.watchlist_path.display()
            )));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    /// Log the effective settings. Secrets only as previews.
    pub fn log_summary(&self) {
        let state = format!("{}:{}", self.state_backend.as_str(), self.state_path.display());
        info!(
            dart_api_key = %preview(&self.dart_api_key),
            telegram_bot_token = %preview(&self.telegram_bot_token),
            telegram_chat_id = %self.telegram_chat_id,
            watchlist = %self.watchlist_path.display(),
            industry = self.target_industry.as_deref().unwrap_or("(all)"),
            keywords = %self.report_keywords.join(","),
            state = %state,
            retention_days = ?self.retention_days,
            interval_minutes = self.check_interval_minutes,
            target_year = ?self.target_year,
            lookback_days = self.lookback_days,
            fetch_mode = ?self.fetch_mode,
            "Configuration loaded"
        );
    }
}

/// First four characters, then an ellipsis
pub fn preview(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let head: String = secret.chars().take(4).collect();
    format!("{}…", head)
}

fn parse_opt<T>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.parse::<T>().map_err(|e| {
            MonitorError::Configuration(format!("{} has an invalid value '{}': {}", key, value, e))
        })
    })
    .transpose()
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(key, raw)?.unwrap_or(default))
}

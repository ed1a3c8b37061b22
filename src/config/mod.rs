use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Page listing upcoming migrations.
    #[serde(default = "default_page_url")]
    pub page_url: String,
    /// Minutes between detection cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval_mins: u64,
    /// Ignore migrations further out than this many minutes.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_mins: f64,
    /// Upper bound on the page fetch; bounds the whole cycle.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Send a degraded notice after this many consecutive fetch failures.
    #[serde(default = "default_failure_notice_after")]
    pub failure_notice_after: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Snapshot file for fired-alert history.
    #[serde(default = "default_ledger_path")]
    pub path: String,
    /// Minimum minutes between two fires of the same (entity, tier).
    #[serde(default = "default_cooldown")]
    pub cooldown_mins: u64,
    /// Hours before a ledger entry is purged.
    #[serde(default = "default_retention")]
    pub retention_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint - loaded from env MIGWATCH_WEBHOOK_URL
    #[serde(default)]
    pub webhook_url: String,
    /// Delay between sends within one batch.
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_page_url() -> String {
    "https://migrations.example.com/upcoming".to_string()
}
fn default_check_interval() -> u64 {
    5
}
fn default_alert_threshold() -> f64 {
    30.0
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_failure_notice_after() -> u32 {
    3
}
fn default_ledger_path() -> String {
    "migwatch-ledger.json".to_string()
}
fn default_cooldown() -> u64 {
    10
}
fn default_retention() -> u64 {
    24
}
fn default_send_delay() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            check_interval_mins: default_check_interval(),
            alert_threshold_mins: default_alert_threshold(),
            fetch_timeout_secs: default_fetch_timeout(),
            failure_notice_after: default_failure_notice_after(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            cooldown_mins: default_cooldown(),
            retention_hours: default_retention(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            send_delay_ms: default_send_delay(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // Override the webhook from the environment (never store in config file)
        if let Ok(url) = std::env::var("MIGWATCH_WEBHOOK_URL") {
            config.notify.webhook_url = url;
        }

        Ok(config)
    }

    /// Load a default config with env-only secrets (no file needed).
    pub fn from_env() -> Self {
        Config {
            watcher: WatcherConfig {
                page_url: std::env::var("MIGWATCH_PAGE_URL")
                    .unwrap_or_else(|_| default_page_url()),
                ..WatcherConfig::default()
            },
            ledger: LedgerConfig::default(),
            notify: NotifyConfig {
                webhook_url: std::env::var("MIGWATCH_WEBHOOK_URL").unwrap_or_default(),
                ..NotifyConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    pub fn has_webhook(&self) -> bool {
        !self.notify.webhook_url.is_empty()
    }
}

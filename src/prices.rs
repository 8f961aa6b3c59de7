//! Price database refresh and the market-hours gate in front of it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Weekday};
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::config::{PriceRefreshConfig, ResolvedConfig};
use crate::error::Result;
use crate::process::Invocation;

/// Weekday trading window, in local hours of `timezone`.
///
/// A time is inside the window when its hour is strictly greater than
/// `open_hour` and strictly less than `close_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    pub timezone: Tz,
    pub open_hour: u32,
    pub close_hour: u32,
}

impl MarketHours {
    pub fn from_config(config: &PriceRefreshConfig) -> anyhow::Result<Self> {
        let timezone = Tz::from_str(&config.timezone)
            .map_err(|e| anyhow!("Unknown timezone {:?}: {e}", config.timezone))?;
        if config.open_hour >= config.close_hour || config.close_hour > 24 {
            anyhow::bail!(
                "Invalid market hours: open_hour ({}) must be below close_hour ({}) and close_hour at most 24",
                config.open_hour,
                config.close_hour
            );
        }

        Ok(Self {
            timezone,
            open_hour: config.open_hour,
            close_hour: config.close_hour,
        })
    }

    pub fn contains(&self, local: DateTime<Tz>) -> bool {
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let hour = local.hour();
        hour > self.open_hour && hour < self.close_hour
    }

    pub fn is_open(&self, clock: &dyn Clock) -> bool {
        self.contains(clock.local_now(self.timezone))
    }
}

/// Whether to refresh the price database this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Follow the configuration, including the market-hours gate.
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown refresh policy {other:?} (expected auto, always or never)")),
        }
    }
}

/// Decide whether the refresher should run.
pub fn refresh_due(
    config: &PriceRefreshConfig,
    hours: &MarketHours,
    policy: RefreshPolicy,
    clock: &dyn Clock,
) -> bool {
    match policy {
        RefreshPolicy::Always => true,
        RefreshPolicy::Never => false,
        RefreshPolicy::Auto => config.enabled && (!config.market_hours_only || hours.is_open(clock)),
    }
}

/// Rewrites the price database read by market value queries.
#[async_trait]
pub trait PriceRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Runs the configured quote fetcher as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandPriceRefresher {
    command: String,
    args: Vec<String>,
    current_dir: PathBuf,
    timeout: Duration,
}

impl CommandPriceRefresher {
    pub fn new(command: impl Into<String>, args: Vec<String>, current_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            current_dir,
            timeout,
        }
    }

    /// Build the refresher with `{ledger_file}`, `{price_db}` and
    /// `{ledger_binary}` substituted into the argument template.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let ledger_file = config.ledger.file.to_string_lossy();
        let price_db = config.ledger.price_db.to_string_lossy();
        let args = config
            .prices
            .args
            .iter()
            .map(|arg| {
                arg.replace("{ledger_file}", &ledger_file)
                    .replace("{price_db}", &price_db)
                    .replace("{ledger_binary}", &config.ledger.binary)
            })
            .collect();

        Self::new(
            config.prices.command.clone(),
            args,
            config.base_dir.clone(),
            config.prices.timeout,
        )
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl PriceRefresher for CommandPriceRefresher {
    async fn refresh(&self) -> Result<()> {
        let started = std::time::Instant::now();
        Invocation::new(&self.command, self.timeout)
            .args(&self.args)
            .current_dir(&self.current_dir)
            .stdout()
            .await?;
        tracing::info!(
            command = %self.command,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refreshed price database"
        );
        Ok(())
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::amount::AmountFormat;
use crate::duration::deserialize_duration;
use crate::prices::MarketHours;

fn default_ledger_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_git_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_price_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

/// How the ledger binary is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger executable; looked up on `PATH` unless it contains a separator.
    pub binary: String,

    /// Journal file inside the synced repository.
    pub file: PathBuf,

    /// Price database written by the price refresher and read by market
    /// value queries.
    pub price_db: PathBuf,

    /// How amounts are rendered in ledger output.
    pub amount_format: AmountFormat,

    /// Upper bound for a single ledger query.
    #[serde(
        default = "default_ledger_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            binary: "ledger".to_string(),
            file: PathBuf::from("repo/records.ldg"),
            price_db: PathBuf::from("prices.db"),
            amount_format: AmountFormat::default(),
            timeout: default_ledger_timeout(),
        }
    }
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_repo_path() -> PathBuf {
    PathBuf::from("repo")
}

/// Remote git repository holding the ledger journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub url: String,

    /// Local working copy. If relative, resolved from the config file location.
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(
        default = "default_git_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

/// A mandatory account: its report tag and its ledger account path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub account: String,
}

impl AccountConfig {
    pub fn new(name: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account: account.into(),
        }
    }
}

fn default_accounts() -> Vec<AccountConfig> {
    vec![
        AccountConfig::new("ira", "Assets:Investments:IRA"),
        AccountConfig::new("tax", "Assets:Investments:Fidelity"),
    ]
}

/// Per-security cost basis breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritiesConfig {
    pub enabled: bool,

    /// Account whose `--average-lot-prices` table lists the held securities.
    pub portfolio_account: String,

    /// Market values are queried at `<allocation_prefix>:<TICKER>`.
    pub allocation_prefix: String,
}

impl Default for SecuritiesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            portfolio_account: "Assets:Investments".to_string(),
            allocation_prefix: "Allocation:Equities".to_string(),
        }
    }
}

/// External quote fetcher that rewrites the price database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRefreshConfig {
    pub enabled: bool,

    pub command: String,

    /// Arguments; `{ledger_file}`, `{price_db}` and `{ledger_binary}` are
    /// substituted.
    pub args: Vec<String>,

    /// Only refresh on weekdays between `open_hour` and `close_hour`
    /// (exclusive) in `timezone`.
    pub market_hours_only: bool,

    pub timezone: String,

    pub open_hour: u32,

    pub close_hour: u32,

    #[serde(
        default = "default_price_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for PriceRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tdaLedgerUpdate".to_string(),
            args: [
                "-f",
                "{ledger_file}",
                "-p",
                "{price_db}",
                "-b",
                "{ledger_binary}",
                "-afile",
                "token",
            ]
            .map(String::from)
            .to_vec(),
            market_hours_only: true,
            timezone: "America/Los_Angeles".to_string(),
            open_hour: 1,
            close_hour: 17,
            timeout: default_price_timeout(),
        }
    }
}

/// InfluxDB v2 write target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,

    #[serde(
        default = "default_http_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            org: "primary".to_string(),
            bucket: "primary".to_string(),
            measurement: "balance".to_string(),
            timeout: default_http_timeout(),
        }
    }
}

/// Where fatal errors are forwarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Webhook receiving `{"text": ..., "source": "ledgerwatch"}`. Usually
    /// passed on the command line instead since it may embed a secret.
    pub webhook_url: Option<String>,

    #[serde(
        default = "default_http_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: default_http_timeout(),
        }
    }
}

/// Application configuration as written in `ledgerwatch.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,

    /// Ledger repository to sync before querying. Sync is skipped when unset.
    pub repository: Option<RepositoryConfig>,

    /// Mandatory accounts; any failure on these aborts the report.
    #[serde(default = "default_accounts")]
    pub accounts: Vec<AccountConfig>,

    pub securities: SecuritiesConfig,

    pub prices: PriceRefreshConfig,

    pub influx: InfluxConfig,

    pub alert: AlertConfig,

    /// Also emit a point summing all mandatory accounts.
    pub report_totals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            repository: None,
            accounts: default_accounts(),
            securities: SecuritiesConfig::default(),
            prices: PriceRefreshConfig::default(),
            influx: InfluxConfig::default(),
            alert: AlertConfig::default(),
            report_totals: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            anyhow::bail!("At least one account must be configured");
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if account.name.trim().is_empty() || account.account.trim().is_empty() {
                anyhow::bail!("Account #{} needs both a name and a ledger account", i + 1);
            }
            if self.accounts[..i].iter().any(|a| a.name == account.name) {
                anyhow::bail!("Duplicate account name: {}", account.name);
            }
        }
        Ok(())
    }

    /// Resolve relative paths against `base_dir` and parse derived settings.
    pub fn resolve(self, base_dir: &Path) -> Result<ResolvedConfig> {
        self.validate()?;

        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        };

        let mut ledger = self.ledger;
        ledger.file = resolve(&ledger.file);
        ledger.price_db = resolve(&ledger.price_db);
        if ledger.binary.contains(std::path::MAIN_SEPARATOR) {
            ledger.binary = resolve(Path::new(&ledger.binary))
                .to_string_lossy()
                .into_owned();
        }

        let repository = self.repository.map(|mut repo| {
            repo.path = resolve(&repo.path);
            repo
        });

        let market_hours = MarketHours::from_config(&self.prices)?;

        Ok(ResolvedConfig {
            base_dir: base_dir.to_path_buf(),
            ledger,
            repository,
            accounts: self.accounts,
            securities: self.securities,
            prices: self.prices,
            market_hours,
            influx: self.influx,
            alert: self.alert,
            report_totals: self.report_totals,
        })
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory relative paths were resolved against.
    pub base_dir: PathBuf,
    pub ledger: LedgerConfig,
    pub repository: Option<RepositoryConfig>,
    pub accounts: Vec<AccountConfig>,
    pub securities: SecuritiesConfig,
    pub prices: PriceRefreshConfig,
    pub market_hours: MarketHours,
    pub influx: InfluxConfig,
    pub alert: AlertConfig,
    pub report_totals: bool,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./ledgerwatch.toml` if it exists in current directory
/// 2. `~/.config/ledgerwatch/ledgerwatch.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("ledgerwatch.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("ledgerwatch").join("ledgerwatch.toml");
        if candidate.exists() {
            return candidate;
        }
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// Relative paths are resolved against the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        Config::load(&config_path)?.resolve(config_dir)
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file, relative paths resolve against the directory the
    /// config file would live in.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Config::default().resolve(config_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reporting_layout() {
        let config = Config::default();
        assert_eq!(config.ledger.binary, "ledger");
        assert_eq!(config.ledger.file, PathBuf::from("repo/records.ldg"));
        assert_eq!(config.ledger.price_db, PathBuf::from("prices.db"));
        assert_eq!(
            config.accounts,
            vec![
                AccountConfig::new("ira", "Assets:Investments:IRA"),
                AccountConfig::new("tax", "Assets:Investments:Fidelity"),
            ]
        );
        assert_eq!(config.securities.allocation_prefix, "Allocation:Equities");
        assert_eq!(config.influx.measurement, "balance");
        assert!(config.repository.is_none());
        assert!(!config.report_totals);
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ledgerwatch.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.ledger.timeout, Duration::from_secs(60));

        Ok(())
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ledgerwatch.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(
            file,
            r#"
report_totals = true

[ledger]
binary = "/usr/local/bin/ledger"
file = "books/main.ldg"
timeout = "15s"

[ledger.amount_format]
currency_symbol = "€"

[repository]
url = "https://example.com/books.git"
branch = "main"

[[accounts]]
name = "roth"
account = "Assets:Retirement:Roth"

[securities]
enabled = false

[prices]
market_hours_only = false
timezone = "America/New_York"
timeout = "2m"

[influx]
url = "http://influx:8086"
bucket = "finance"
"#
        )?;

        let config = Config::load(&config_path)?;
        assert!(config.report_totals);
        assert_eq!(config.ledger.timeout, Duration::from_secs(15));
        assert_eq!(config.ledger.amount_format.currency_symbol, '€');
        assert_eq!(config.ledger.amount_format.thousands_separator, ',');
        assert_eq!(config.ledger.price_db, PathBuf::from("prices.db"));
        let repo = config.repository.as_ref().expect("repository section");
        assert_eq!(repo.branch, "main");
        assert_eq!(repo.path, PathBuf::from("repo"));
        assert_eq!(repo.timeout, Duration::from_secs(120));
        assert_eq!(config.accounts, vec![AccountConfig::new("roth", "Assets:Retirement:Roth")]);
        assert!(!config.securities.enabled);
        assert_eq!(config.prices.timeout, Duration::from_secs(120));
        assert_eq!(config.prices.command, "tdaLedgerUpdate");
        assert_eq!(config.influx.bucket, "finance");
        assert_eq!(config.influx.org, "primary");

        Ok(())
    }

    #[test]
    fn test_resolve_relative_paths() -> Result<()> {
        let config = Config {
            repository: Some(RepositoryConfig {
                url: "https://example.com/books.git".to_string(),
                path: default_repo_path(),
                branch: default_branch(),
                timeout: default_git_timeout(),
            }),
            ..Default::default()
        };

        let resolved = config.resolve(Path::new("/srv/ledgerwatch"))?;
        assert_eq!(resolved.ledger.file, PathBuf::from("/srv/ledgerwatch/repo/records.ldg"));
        assert_eq!(resolved.ledger.price_db, PathBuf::from("/srv/ledgerwatch/prices.db"));
        assert_eq!(resolved.ledger.binary, "ledger");
        assert_eq!(
            resolved.repository.map(|r| r.path),
            Some(PathBuf::from("/srv/ledgerwatch/repo"))
        );

        Ok(())
    }

    #[test]
    fn test_resolve_rejects_bad_accounts() {
        let empty = Config {
            accounts: Vec::new(),
            ..Default::default()
        };
        assert!(empty.resolve(Path::new("/tmp")).is_err());

        let duplicate = Config {
            accounts: vec![
                AccountConfig::new("ira", "Assets:A"),
                AccountConfig::new("ira", "Assets:B"),
            ],
            ..Default::default()
        };
        assert!(duplicate.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_resolve_rejects_unknown_timezone() {
        let mut config = Config::default();
        config.prices.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("ledgerwatch.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.base_dir, dir.path());
        assert_eq!(resolved.ledger.price_db, dir.path().join("prices.db"));

        Ok(())
    }
}

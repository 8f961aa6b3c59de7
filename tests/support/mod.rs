#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ledgerwatch::clock::FixedClock;
use ledgerwatch::config::{Config, ResolvedConfig};
use ledgerwatch::ledger::{BalanceQuery, LedgerRunner};
use ledgerwatch::prices::PriceRefresher;
use ledgerwatch::Error;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn run_git(dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()?;
    Ok(output)
}

pub fn git_ok(dir: &Path, args: &[&str]) -> Result<String> {
    let output = run_git(dir, args)?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Initialise a repository on `master` with one committed journal file.
pub fn init_origin(dir: &Path, journal: &str) -> Result<()> {
    git_ok(dir, &["init"])?;
    git_ok(dir, &["symbolic-ref", "HEAD", "refs/heads/master"])?;
    git_ok(dir, &["config", "user.email", "test@example.com"])?;
    git_ok(dir, &["config", "user.name", "Ledgerwatch Test"])?;
    commit_journal(dir, journal, "initial")
}

pub fn commit_journal(dir: &Path, journal: &str, message: &str) -> Result<()> {
    std::fs::write(dir.join("records.ldg"), journal)?;
    git_ok(dir, &["add", "-A"])?;
    git_ok(dir, &["commit", "-m", message])?;
    Ok(())
}

pub const BOOKS_DIR: &str = "/books";

/// Default configuration resolved against [`BOOKS_DIR`].
pub fn resolved_config() -> ResolvedConfig {
    Config::default()
        .resolve(Path::new(BOOKS_DIR))
        .expect("default config resolves")
}

pub fn price_db() -> PathBuf {
    Path::new(BOOKS_DIR).join("prices.db")
}

/// Wednesday 2024-06-05 10:30 in Los Angeles.
pub fn market_open_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 5, 17, 30, 0).unwrap())
}

/// Saturday 2024-06-08 10:00 in Los Angeles.
pub fn weekend_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 8, 17, 0, 0).unwrap())
}

/// Shared, ordered record of what the fakes were asked to do.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Ledger report with a multi-line body and a total.
pub fn summary_report(account: &str, total: &str) -> String {
    format!(
        "{total:>20}  {account}\n{total:>20}    Holdings\n--------------------\n{total:>20}\n"
    )
}

pub fn single_line(account: &str, amount: &str) -> String {
    format!("{amount:>20}  {account}\n")
}

/// A ledger that answers from canned responses keyed by query arguments.
#[derive(Default)]
pub struct MockLedger {
    responses: HashMap<Vec<String>, Result<String, Error>>,
    log: EventLog,
}

impl MockLedger {
    pub fn new(log: EventLog) -> Self {
        Self {
            responses: HashMap::new(),
            log,
        }
    }

    pub fn with_output(mut self, query: BalanceQuery, output: impl Into<String>) -> Self {
        self.responses.insert(query.args(), Ok(output.into()));
        self
    }

    pub fn with_error(mut self, query: BalanceQuery, error: Error) -> Self {
        self.responses.insert(query.args(), Err(error));
        self
    }

    /// Basis and market responses for the two default accounts.
    pub fn with_default_accounts(self) -> Self {
        self.with_output(
            BalanceQuery::basis("Assets:Investments:IRA"),
            summary_report("Assets:Investments:IRA", "$10,000.00"),
        )
        .with_output(
            BalanceQuery::basis("Assets:Investments:Fidelity"),
            summary_report("Assets:Investments:Fidelity", "$5,000.00"),
        )
        .with_output(
            BalanceQuery::market("Assets:Investments:IRA", price_db()),
            summary_report("Assets:Investments:IRA", "$12,500.00"),
        )
        .with_output(
            BalanceQuery::market("Assets:Investments:Fidelity", price_db()),
            summary_report("Assets:Investments:Fidelity", "$4,750.00"),
        )
    }

    pub fn with_lot_table(self, table: impl Into<String>) -> Self {
        self.with_output(BalanceQuery::lot_prices("Assets:Investments"), table)
    }

    pub fn with_security_market(self, ticker: &str, amount: &str) -> Self {
        let account = format!("Allocation:Equities:{ticker}");
        let output = single_line(&account, amount);
        self.with_output(BalanceQuery::market(account, price_db()), output)
    }
}

#[async_trait]
impl LedgerRunner for MockLedger {
    async fn balance(&self, query: &BalanceQuery) -> ledgerwatch::Result<String> {
        let args = query.args();
        self.log.lock().unwrap().push(format!("ledger {}", args.join(" ")));
        match self.responses.get(&args) {
            Some(response) => response.clone(),
            None => Err(Error::ExternalProcess {
                program: "ledger".to_string(),
                message: format!("exit status 1: Error: no canned output for {args:?}"),
            }),
        }
    }
}

/// Price refresher that only logs, or fails when asked to.
pub struct RecordingRefresher {
    log: EventLog,
    failure: Option<Error>,
}

impl RecordingRefresher {
    pub fn new(log: EventLog) -> Self {
        Self { log, failure: None }
    }

    pub fn failing(log: EventLog, error: Error) -> Self {
        Self {
            log,
            failure: Some(error),
        }
    }
}

#[async_trait]
impl PriceRefresher for RecordingRefresher {
    async fn refresh(&self) -> ledgerwatch::Result<()> {
        self.log.lock().unwrap().push("refresh".to_string());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

//! Balance queries against the external `ledger` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LedgerConfig;
use crate::error::Result;
use crate::process::Invocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceMode {
    /// Cost basis (`-B`).
    Basis,
    /// Market value from a price database (`--price-db <db> -V`).
    Market { price_db: PathBuf },
    /// Per-security lots with their average cost (`--average-lot-prices`).
    LotPrices,
}

/// One `ledger bal` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceQuery {
    pub account: String,
    pub mode: BalanceMode,
}

impl BalanceQuery {
    pub fn basis(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            mode: BalanceMode::Basis,
        }
    }

    pub fn market(account: impl Into<String>, price_db: impl Into<PathBuf>) -> Self {
        Self {
            account: account.into(),
            mode: BalanceMode::Market {
                price_db: price_db.into(),
            },
        }
    }

    pub fn lot_prices(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            mode: BalanceMode::LotPrices,
        }
    }

    pub fn price_db(&self) -> Option<&Path> {
        match &self.mode {
            BalanceMode::Market { price_db } => Some(price_db),
            _ => None,
        }
    }

    /// Arguments that follow `bal`.
    pub fn args(&self) -> Vec<String> {
        match &self.mode {
            BalanceMode::Basis => vec!["-B".to_string(), self.account.clone()],
            BalanceMode::Market { price_db } => vec![
                "--price-db".to_string(),
                price_db.to_string_lossy().into_owned(),
                "-V".to_string(),
                self.account.clone(),
            ],
            BalanceMode::LotPrices => {
                vec![self.account.clone(), "--average-lot-prices".to_string()]
            }
        }
    }
}

/// Something that answers balance queries with ledger's textual report.
#[async_trait]
pub trait LedgerRunner: Send + Sync {
    async fn balance(&self, query: &BalanceQuery) -> Result<String>;
}

/// Runs `<binary> -f <file> bal <query args>` for each query.
#[derive(Debug, Clone)]
pub struct LedgerCli {
    binary: String,
    file: PathBuf,
    timeout: Duration,
}

impl LedgerCli {
    pub fn new(binary: impl Into<String>, file: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            file: file.into(),
            timeout,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.binary.clone(), config.file.clone(), config.timeout)
    }

    pub fn command_args(&self, query: &BalanceQuery) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.file.to_string_lossy().into_owned(),
            "bal".to_string(),
        ];
        args.extend(query.args());
        args
    }
}

#[async_trait]
impl LedgerRunner for LedgerCli {
    async fn balance(&self, query: &BalanceQuery) -> Result<String> {
        let args = self.command_args(query);
        Invocation::new(&self.binary, self.timeout)
            .args(&args)
            .stdout()
            .await
    }
}

//! Basis/market valuation of accounts and securities.

use std::path::PathBuf;

use crate::amount::AmountFormat;
use crate::config::{AccountConfig, SecuritiesConfig};
use crate::error::{Error, Result};
use crate::ledger::{BalanceQuery, LedgerRunner};
use crate::parse::{parse_cost_basis_table, parse_single_line, parse_summary_line};

/// Valuation of one mandatory account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub name: String,
    pub basis: f64,
    pub market: f64,
    pub gain: f64,
}

impl AccountRecord {
    pub fn new(name: impl Into<String>, basis: f64, market: f64) -> Self {
        Self {
            name: name.into(),
            basis,
            market,
            gain: market - basis,
        }
    }

    pub fn gain_percent(&self) -> Option<f64> {
        gain_percent(self.basis, self.market)
    }
}

/// Valuation of one security from the cost basis table.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityRecord {
    pub ticker: String,
    pub basis: f64,
    pub market: f64,
    pub gain: f64,
    /// `None` when the basis is zero, so no NaN or infinity is reported.
    pub gain_percent: Option<f64>,
}

impl SecurityRecord {
    pub fn new(ticker: impl Into<String>, basis: f64, market: f64) -> Self {
        Self {
            ticker: ticker.into(),
            basis,
            market,
            gain: market - basis,
            gain_percent: gain_percent(basis, market),
        }
    }
}

/// `(market - basis) / basis`, undefined for a zero basis.
pub fn gain_percent(basis: f64, market: f64) -> Option<f64> {
    if basis == 0.0 {
        return None;
    }
    let ratio = (market - basis) / basis;
    ratio.is_finite().then_some(ratio)
}

/// Sum over the mandatory accounts. The gain is always derived.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub basis: f64,
    pub market: f64,
}

impl Totals {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AccountRecord>) -> Self {
        records.into_iter().fold(Self::default(), |acc, r| Self {
            basis: acc.basis + r.basis,
            market: acc.market + r.market,
        })
    }

    pub fn gain(&self) -> f64 {
        self.market - self.basis
    }
}

/// A security whose market value could not be determined.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSecurity {
    pub ticker: String,
    pub error: Error,
}

/// Result of the per-security pass. Failures are collected, not raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityBreakdown {
    pub records: Vec<SecurityRecord>,
    pub skipped: Vec<SkippedSecurity>,
    /// Set when the cost basis table itself could not be fetched or parsed.
    pub table_error: Option<Error>,
}

/// Issues balance queries and parses them into values.
pub struct ValuationEngine<'a> {
    ledger: &'a dyn LedgerRunner,
    format: AmountFormat,
    price_db: PathBuf,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(ledger: &'a dyn LedgerRunner, format: AmountFormat, price_db: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            format,
            price_db: price_db.into(),
        }
    }

    /// Cost basis of an account's total.
    pub async fn basis(&self, account: &str) -> Result<f64> {
        let output = self.ledger.balance(&BalanceQuery::basis(account)).await?;
        parse_summary_line(&output, &self.format)
    }

    /// Market value of an account's total.
    pub async fn market(&self, account: &str) -> Result<f64> {
        let output = self
            .ledger
            .balance(&BalanceQuery::market(account, &self.price_db))
            .await?;
        parse_summary_line(&output, &self.format)
    }

    /// Bases of every mandatory account, in order. Stops at the first failure.
    pub async fn account_bases(&self, accounts: &[AccountConfig]) -> Result<Vec<f64>> {
        let mut bases = Vec::with_capacity(accounts.len());
        for account in accounts {
            let basis = self.basis(&account.account).await?;
            tracing::debug!(account = %account.name, basis, "read cost basis");
            bases.push(basis);
        }
        Ok(bases)
    }

    /// Combine previously read bases with fresh market values.
    ///
    /// `bases` must line up with `accounts`.
    pub async fn account_records(
        &self,
        accounts: &[AccountConfig],
        bases: &[f64],
    ) -> Result<Vec<AccountRecord>> {
        debug_assert_eq!(accounts.len(), bases.len());
        let mut records = Vec::with_capacity(accounts.len());
        for (account, &basis) in accounts.iter().zip(bases) {
            let market = self.market(&account.account).await?;
            let record = AccountRecord::new(account.name.clone(), basis, market);
            tracing::info!(
                account = %record.name,
                basis = record.basis,
                market = record.market,
                gain = record.gain,
                "valued account"
            );
            records.push(record);
        }
        Ok(records)
    }

    /// Market value of one security at `<prefix>:<TICKER>`.
    pub async fn security_market(&self, prefix: &str, ticker: &str) -> Result<f64> {
        let account = format!("{prefix}:{}", ticker.to_uppercase());
        let output = self
            .ledger
            .balance(&BalanceQuery::market(account, &self.price_db))
            .await?;
        parse_single_line(&output, &self.format)
    }

    /// Value every security in the portfolio's cost basis table.
    ///
    /// Nothing here is fatal: a ticker without a usable market value is
    /// skipped, and a missing table yields an empty breakdown.
    pub async fn securities(&self, config: &SecuritiesConfig) -> SecurityBreakdown {
        let table = match self.cost_basis_table(&config.portfolio_account).await {
            Ok(table) => table,
            Err(error) => {
                tracing::warn!(
                    account = %config.portfolio_account,
                    error = %error,
                    "skipping per-security breakdown"
                );
                return SecurityBreakdown {
                    table_error: Some(error),
                    ..Default::default()
                };
            }
        };

        let mut breakdown = SecurityBreakdown::default();
        for (ticker, basis) in table {
            match self.security_market(&config.allocation_prefix, &ticker).await {
                Ok(market) => breakdown.records.push(SecurityRecord::new(ticker, basis, market)),
                Err(error) => {
                    tracing::warn!(%ticker, error = %error, "skipping security without market value");
                    breakdown.skipped.push(SkippedSecurity { ticker, error });
                }
            }
        }
        breakdown
    }

    async fn cost_basis_table(&self, account: &str) -> Result<std::collections::BTreeMap<String, f64>> {
        let output = self.ledger.balance(&BalanceQuery::lot_prices(account)).await?;
        parse_cost_basis_table(&output, &self.format)
    }
}

//! One report cycle: value every account, then publish the points.

use crate::clock::Clock;
use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::ledger::LedgerRunner;
use crate::prices::{refresh_due, PriceRefresher, RefreshPolicy};
use crate::sink::{Fields, ReportSink, Tags};
use crate::valuation::{AccountRecord, SecurityBreakdown, SecurityRecord, Totals, ValuationEngine};

/// Tag value of the point summing all mandatory accounts.
pub const TOTAL_TAG: &str = "total";

/// Everything computed in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub accounts: Vec<AccountRecord>,
    /// `None` when the per-security breakdown is disabled.
    pub securities: Option<SecurityBreakdown>,
    pub totals: Option<Totals>,
    pub prices_refreshed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub accounts: usize,
    pub securities: usize,
    pub skipped_securities: usize,
    pub points_written: usize,
    pub prices_refreshed: bool,
}

pub struct ReportCycle<'a> {
    config: &'a ResolvedConfig,
    ledger: &'a dyn LedgerRunner,
    refresher: &'a dyn PriceRefresher,
    clock: &'a dyn Clock,
    refresh_policy: RefreshPolicy,
}

impl<'a> ReportCycle<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        ledger: &'a dyn LedgerRunner,
        refresher: &'a dyn PriceRefresher,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            config,
            ledger,
            refresher,
            clock,
            refresh_policy: RefreshPolicy::Auto,
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    /// Query and value everything without touching a sink.
    ///
    /// Bases are read before the price database is refreshed and market
    /// values after it. Any failure on a mandatory account aborts.
    pub async fn compute(&self) -> Result<Report> {
        let config = self.config;
        let engine = ValuationEngine::new(
            self.ledger,
            config.ledger.amount_format,
            &config.ledger.price_db,
        );

        let bases = engine.account_bases(&config.accounts).await?;

        let prices_refreshed =
            refresh_due(&config.prices, &config.market_hours, self.refresh_policy, self.clock);
        if prices_refreshed {
            self.refresher.refresh().await?;
        } else {
            tracing::info!(policy = ?self.refresh_policy, "price database refresh skipped");
        }

        let accounts = engine.account_records(&config.accounts, &bases).await?;

        let securities = if config.securities.enabled {
            Some(engine.securities(&config.securities).await)
        } else {
            None
        };

        let totals = config
            .report_totals
            .then(|| Totals::from_records(&accounts));

        Ok(Report {
            accounts,
            securities,
            totals,
            prices_refreshed,
        })
    }

    /// Compute the report and publish it. Nothing reaches the sink unless
    /// every mandatory account was valued.
    pub async fn run(&self, sink: &mut dyn ReportSink) -> Result<CycleSummary> {
        let report = self.compute().await?;
        let points_written = publish(&report, sink).await?;

        let (securities, skipped_securities) = report
            .securities
            .as_ref()
            .map(|b| (b.records.len(), b.skipped.len()))
            .unwrap_or_default();

        Ok(CycleSummary {
            accounts: report.accounts.len(),
            securities,
            skipped_securities,
            points_written,
            prices_refreshed: report.prices_refreshed,
        })
    }
}

fn account_tags(name: &str) -> Tags {
    Tags::from([("account".to_string(), name.to_string())])
}

fn account_fields(record: &AccountRecord) -> Fields {
    Fields::from([
        ("basis".to_string(), record.basis),
        ("market".to_string(), record.market),
        ("gain".to_string(), record.gain),
    ])
}

fn security_fields(record: &SecurityRecord) -> Fields {
    let mut fields = Fields::from([
        ("basis".to_string(), record.basis),
        ("market".to_string(), record.market),
        ("gain".to_string(), record.gain),
    ]);
    if let Some(percent) = record.gain_percent {
        fields.insert("gain-percent".to_string(), percent);
    }
    fields
}

/// Record every point of `report`, flush, and close the sink.
pub async fn publish(report: &Report, sink: &mut dyn ReportSink) -> Result<usize> {
    if let Some(breakdown) = &report.securities {
        for record in &breakdown.records {
            sink.record(account_tags(&record.ticker), security_fields(record));
        }
    }

    for record in &report.accounts {
        sink.record(account_tags(&record.name), account_fields(record));
    }

    if let Some(totals) = &report.totals {
        sink.record(
            account_tags(TOTAL_TAG),
            Fields::from([
                ("basis".to_string(), totals.basis),
                ("market".to_string(), totals.market),
                ("gain".to_string(), totals.gain()),
            ]),
        );
    }

    let written = sink.flush().await?;
    sink.close().await?;
    Ok(written)
}

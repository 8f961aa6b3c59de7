use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ledgerwatch::alert::{notify_failure, WebhookAlerter};
use ledgerwatch::clock::{Clock, SystemClock};
use ledgerwatch::config::{default_config_path, ResolvedConfig};
use ledgerwatch::git::{sync_repository, GitCredentials};
use ledgerwatch::ledger::LedgerCli;
use ledgerwatch::prices::{CommandPriceRefresher, RefreshPolicy};
use ledgerwatch::report::ReportCycle;
use ledgerwatch::sink::{InfluxSink, ReportSink, StdoutSink};
use secrecy::SecretString;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ledgerwatch")]
#[command(about = "Report ledger investment balances to InfluxDB")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger binary (overrides the config file)
    #[arg(short = 'b', long)]
    ledger_binary: Option<String>,

    /// Username for the ledger repository remote
    #[arg(short = 'u', long, env = "LEDGERWATCH_GIT_USERNAME")]
    git_username: Option<String>,

    /// Token for the ledger repository remote
    #[arg(short = 'a', long, env = "LEDGERWATCH_GIT_TOKEN", hide_env_values = true)]
    git_token: Option<String>,

    /// InfluxDB API token
    #[arg(long, env = "LEDGERWATCH_INFLUX_TOKEN", hide_env_values = true)]
    influx_token: Option<String>,

    /// Webhook notified with the error message when a cycle fails
    #[arg(long, env = "LEDGERWATCH_ALERT_WEBHOOK", hide_env_values = true)]
    alert_webhook: Option<String>,

    /// Use the existing working copy without pulling
    #[arg(long)]
    skip_sync: bool,

    /// Price database refresh: auto (market hours), always, or never
    #[arg(long, default_value = "auto")]
    refresh_prices: RefreshPolicy,

    /// Print line protocol to stdout instead of writing to InfluxDB
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn git_credentials(cli: &Cli) -> Result<Option<GitCredentials>> {
    match (&cli.git_username, &cli.git_token) {
        (Some(username), Some(token)) => Ok(Some(GitCredentials {
            username: username.clone(),
            token: SecretString::from(token.clone()),
        })),
        (None, None) => Ok(None),
        _ => anyhow::bail!("must provide both a git username and a git token, or neither"),
    }
}

async fn run(cli: &Cli, config: &ResolvedConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut sink: Box<dyn ReportSink> = if cli.dry_run {
        Box::new(StdoutSink::new(config.influx.measurement.clone(), clock.clone()))
    } else {
        let token = cli
            .influx_token
            .clone()
            .context("must provide an InfluxDB token (--influx-token) unless --dry-run")?;
        Box::new(InfluxSink::new(&config.influx, SecretString::from(token), clock.clone())?)
    };
    let credentials = git_credentials(cli)?;

    match (&config.repository, cli.skip_sync) {
        (Some(repo), false) => {
            let outcome = sync_repository(repo, credentials.as_ref(), repo.timeout).await?;
            info!(?outcome, "ledger repository synced");
        }
        (Some(_), true) => info!("repository sync skipped"),
        (None, _) => info!("no repository configured; using local ledger file"),
    }

    let ledger = LedgerCli::from_config(&config.ledger);
    let refresher = CommandPriceRefresher::from_config(config);
    let summary = ReportCycle::new(config, &ledger, &refresher, clock.as_ref())
        .with_refresh_policy(cli.refresh_prices)
        .run(sink.as_mut())
        .await?;

    info!(
        accounts = summary.accounts,
        securities = summary.securities,
        skipped_securities = summary.skipped_securities,
        points = summary.points_written,
        prices_refreshed = summary.prices_refreshed,
        "report cycle complete"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let loaded = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))
        .map(|mut config| {
            if let Some(binary) = &cli.ledger_binary {
                config.ledger.binary = binary.clone();
            }
            config
        });

    let alert_timeout = loaded
        .as_ref()
        .map(|c| c.alert.timeout)
        .unwrap_or(std::time::Duration::from_secs(30));
    let alert_url = cli
        .alert_webhook
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|c| c.alert.webhook_url.clone()));

    let result = match &loaded {
        Ok(config) => run(&cli, config).await,
        Err(err) => Err(anyhow::anyhow!("{err:#}")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format!("{err:#}");
            error!(error = %message, "report cycle failed");
            println!("{message}");

            let alerter = alert_url.and_then(|url| {
                WebhookAlerter::new(SecretString::from(url), alert_timeout)
                    .map_err(|e| error!(error = %format!("{e:#}"), "alerting unavailable"))
                    .ok()
            });
            notify_failure(alerter.as_ref(), &message).await;

            ExitCode::from(1)
        }
    }
}

#![cfg(unix)]

mod support;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ledgerwatch::config::Config;
use ledgerwatch::ledger::{BalanceQuery, LedgerCli, LedgerRunner};
use ledgerwatch::prices::CommandPriceRefresher;
use ledgerwatch::report::ReportCycle;
use ledgerwatch::sink::MemorySink;
use ledgerwatch::Error;
use support::market_open_clock;
use tempfile::TempDir;

const FAKE_LEDGER: &str = r#"#!/bin/sh
echo "ledger $*" >> "$(dirname "$0")/calls.log"
case "$*" in
  *"-B Assets:Investments:IRA")
    printf '%s\n' '  $10,000.00  Assets:Investments:IRA' '  $10,000.00    Holdings' '--------------------' '  $10,000.00' ;;
  *"-B Assets:Investments:Fidelity")
    printf '%s\n' '  $5,000.00  Assets:Investments:Fidelity' '  $5,000.00    Holdings' '--------------------' '  $5,000.00' ;;
  *"-V Assets:Investments:IRA")
    printf '%s\n' '  $12,500.00  Assets:Investments:IRA' '  $12,500.00    Holdings' '--------------------' '  $12,500.00' ;;
  *"-V Assets:Investments:Fidelity")
    printf '%s\n' '  $4,750.00  Assets:Investments:Fidelity' '  $4,750.00    Holdings' '--------------------' '  $4,750.00' ;;
  *"Assets:Investments --average-lot-prices")
    printf '%s\n' '10 AAPL {$150.00}  Assets:Investments' '--------------------' '$-1,500.00' '10 AAPL {$150.00}' ;;
  *"-V Allocation:Equities:AAPL")
    printf '%s\n' '  $1,800.00  Allocation:Equities:AAPL' ;;
  *)
    echo "Error: Unknown account" >&2
    exit 1 ;;
esac
"#;

const FAKE_REFRESHER: &str = r#"#!/bin/sh
echo "refresh $*" >> "$(dirname "$0")/calls.log"
"#;

const FAILING_LEDGER: &str = "#!/bin/sh\necho 'Error: Unable to parse records.ldg' >&2\nexit 3\n";

const SLOW_LEDGER: &str = "#!/bin/sh\nsleep 5\n";

fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, body)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn calls(dir: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(dir.join("calls.log"))?
        .lines()
        .map(str::to_string)
        .collect())
}

// All scenarios share one test so no script is executed while another
// thread still holds a freshly written one open.
#[tokio::test]
async fn ledger_cli_against_fake_binaries() -> Result<()> {
    let dir = TempDir::new()?;
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin)?;

    let ledger = write_script(&bin, "ledger", FAKE_LEDGER)?;
    let refresher = write_script(&bin, "tdaLedgerUpdate", FAKE_REFRESHER)?;
    let failing = write_script(&bin, "failing-ledger", FAILING_LEDGER)?;
    let slow = write_script(&bin, "slow-ledger", SLOW_LEDGER)?;

    // Direct queries.
    let cli = LedgerCli::new(
        ledger.to_string_lossy().into_owned(),
        dir.path().join("records.ldg"),
        Duration::from_secs(10),
    );
    let output = cli
        .balance(&BalanceQuery::basis("Assets:Investments:IRA"))
        .await?;
    assert!(output.ends_with("  $10,000.00\n"), "{output:?}");

    let err = cli
        .balance(&BalanceQuery::basis("Assets:Nope"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::ExternalProcess {
            program: "ledger".to_string(),
            message: "exit status 1: Error: Unknown account".to_string(),
        }
    );

    let failing_cli = LedgerCli::new(
        failing.to_string_lossy().into_owned(),
        "records.ldg",
        Duration::from_secs(10),
    );
    let err = failing_cli
        .balance(&BalanceQuery::basis("Assets"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "failing-ledger failed: exit status 3: Error: Unable to parse records.ldg"
    );

    let slow_cli = LedgerCli::new(
        slow.to_string_lossy().into_owned(),
        "records.ldg",
        Duration::from_millis(200),
    );
    let err = slow_cli
        .balance(&BalanceQuery::basis("Assets"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");

    let missing_cli = LedgerCli::new("ledgerwatch-no-such-ledger", "records.ldg", Duration::from_secs(1));
    let err = missing_cli
        .balance(&BalanceQuery::basis("Assets"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "ledgerwatch-no-such-ledger failed: not found in PATH"
    );

    std::fs::remove_file(bin.join("calls.log"))?;

    // A whole cycle through the real subprocess runners.
    let mut config = Config::default();
    config.ledger.binary = ledger.to_string_lossy().into_owned();
    config.prices.command = refresher.to_string_lossy().into_owned();
    let config = config.resolve(dir.path())?;

    let runner = LedgerCli::from_config(&config.ledger);
    let price_refresher = CommandPriceRefresher::from_config(&config);
    let clock = market_open_clock();
    let mut sink = MemorySink::new("balance", Arc::new(market_open_clock()));

    let summary = ReportCycle::new(&config, &runner, &price_refresher, &clock)
        .run(&mut sink)
        .await?;
    assert_eq!(summary.accounts, 2);
    assert_eq!(summary.securities, 1);
    assert_eq!(summary.points_written, 3);

    let journal = dir.path().join("repo/records.ldg");
    let price_db = dir.path().join("prices.db");
    let log = calls(&bin)?;
    assert_eq!(log.len(), 7, "{log:#?}");
    assert_eq!(
        log[0],
        format!("ledger -f {} bal -B Assets:Investments:IRA", journal.display())
    );
    assert!(log[2].starts_with("refresh -f "), "{}", log[2]);
    assert!(log[2].contains(&format!("-p {}", price_db.display())));
    assert_eq!(
        log[3],
        format!(
            "ledger -f {} bal --price-db {} -V Assets:Investments:IRA",
            journal.display(),
            price_db.display()
        )
    );
    assert_eq!(
        log[6],
        format!(
            "ledger -f {} bal --price-db {} -V Allocation:Equities:AAPL",
            journal.display(),
            price_db.display()
        )
    );

    let aapl = sink
        .flushed()
        .iter()
        .find(|p| p.tags["account"] == "AAPL")
        .expect("AAPL point");
    assert_eq!(aapl.fields["gain"], 300.0);
    Ok(())
}

//! Parsers for the text that `ledger bal` prints.
//!
//! All functions here are pure: the same input always yields the same
//! result, and failures are returned as [`Error::MalformedOutput`] or
//! [`Error::NumberFormat`] so callers can choose to skip or abort.

use std::collections::BTreeMap;

use crate::amount::AmountFormat;
use crate::error::{Error, Result};

/// Smallest line count of a balance report that carries a total: at least
/// one account row, the separator, the total, and the empty remainder after
/// the final newline.
pub const MIN_SUMMARY_LINES: usize = 4;

/// Length of the dash run that separates account rows from totals.
const SEPARATOR_MIN_DASHES: usize = 6;

/// Parse the running total out of a multi-line balance report.
///
/// The report is treated as newline-terminated text: trailing blank padding
/// collapses into the final terminator, so the last element of the split is
/// always the empty remainder and the total sits on the second-to-last line.
pub fn parse_summary_line(output: &str, format: &AmountFormat) -> Result<f64> {
    let body = output.trim_end();
    let mut lines: Vec<&str> = body.split('\n').collect();
    lines.push("");

    if body.is_empty() || lines.len() < MIN_SUMMARY_LINES {
        return Err(Error::malformed(format!(
            "expected at least {MIN_SUMMARY_LINES} lines, got {}",
            if body.is_empty() { 0 } else { lines.len() }
        )));
    }

    // Never blank: trailing whitespace was trimmed above.
    let total = lines[lines.len() - 2].trim();
    format.parse_amount(total)
}

/// Parse a one-line balance such as `   $1,500.00  Allocation:Equities:AAPL`.
pub fn parse_single_line(output: &str, format: &AmountFormat) -> Result<f64> {
    let token = output
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::malformed("balance output is empty"))?;

    format.parse_amount(token)
}

/// One row of the `--average-lot-prices` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CostBasisEntry {
    pub ticker: String,
    pub quantity: f64,
    pub unit_cost: f64,
}

impl CostBasisEntry {
    pub fn total_basis(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

/// Parse the per-security rows that follow the dash separator.
///
/// Rows look like `10 AAPL {$150.00}` or `10 AAPL @ $150.00`. Blank lines
/// and the currency-only total line are skipped; any other row that does
/// not parse fails the whole call.
pub fn parse_cost_basis_rows(output: &str, format: &AmountFormat) -> Result<Vec<CostBasisEntry>> {
    let mut lines = output.lines();
    if !lines.by_ref().any(is_separator) {
        return Err(Error::malformed("cost basis table has no separator line"));
    }

    let mut entries = Vec::new();
    for line in lines {
        let row = line.trim();
        if row.is_empty() || is_currency_total(row, format) {
            continue;
        }
        entries.push(parse_cost_basis_row(row, format)?);
    }

    Ok(entries)
}

/// Parse the cost-basis table into total basis per ticker.
///
/// A ticker that appears on more than one row keeps the value of the last
/// row.
pub fn parse_cost_basis_table(
    output: &str,
    format: &AmountFormat,
) -> Result<BTreeMap<String, f64>> {
    Ok(parse_cost_basis_rows(output, format)?
        .into_iter()
        .map(|entry| {
            let basis = entry.total_basis();
            (entry.ticker, basis)
        })
        .collect())
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    line.len() >= SEPARATOR_MIN_DASHES && line.chars().all(|c| c == '-')
}

/// A lone amount such as `$-4,000.00` or `0`; rows always carry a ticker.
fn is_currency_total(row: &str, format: &AmountFormat) -> bool {
    let mut tokens = row.split_whitespace();
    let (Some(only), None) = (tokens.next(), tokens.next()) else {
        return false;
    };
    let only = only.strip_prefix('-').unwrap_or(only);
    only == "0" || only.starts_with(format.currency_symbol)
}

fn parse_cost_basis_row(row: &str, format: &AmountFormat) -> Result<CostBasisEntry> {
    let tokens: Vec<&str> = row.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(Error::malformed(format!(
            "cost basis row {row:?} has {} fields, expected at least 3",
            tokens.len()
        )));
    }

    let cost_token = match tokens[2] {
        "@" => *tokens
            .get(3)
            .ok_or_else(|| Error::malformed(format!("cost basis row {row:?} has no price")))?,
        token => token,
    };
    let cost_token = cost_token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(cost_token);

    let quantity = format
        .parse_quantity(tokens[0])
        .map_err(|e| Error::malformed(format!("cost basis row {row:?}: {e}")))?;
    let unit_cost = format
        .parse_amount(cost_token)
        .map_err(|e| Error::malformed(format!("cost basis row {row:?}: {e}")))?;

    Ok(CostBasisEntry {
        ticker: tokens[1].trim_matches('"').to_string(),
        quantity,
        unit_cost,
    })
}

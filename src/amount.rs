//! Normalization of currency-prefixed amount tokens printed by ledger.
//!
//! Ledger renders commodity amounts like `$1,234.56` or `$-12.00`. The
//! assumptions made here are explicit and configurable through
//! [`AmountFormat`]:
//!
//! - the token carries exactly one leading currency symbol character
//!   (a minus sign may precede or follow it),
//! - thousands are grouped with a single separator character,
//! - the fractional part is introduced by a single decimal point character.
//!
//! A token that starts with any other symbol is rejected instead of being
//! silently misparsed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How amounts are rendered by the ledger binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountFormat {
    pub currency_symbol: char,
    pub thousands_separator: char,
    pub decimal_point: char,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            currency_symbol: '$',
            thousands_separator: ',',
            decimal_point: '.',
        }
    }
}

impl AmountFormat {
    /// Parse a currency-prefixed token such as `$1,234.56` into a number.
    ///
    /// The bare token `0` is accepted: ledger prints an empty balance
    /// without a commodity.
    pub fn parse_amount(&self, token: &str) -> Result<f64> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(Error::number(token, "empty amount"));
        }
        if trimmed == "0" {
            return Ok(0.0);
        }

        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let Some(rest) = rest.strip_prefix(self.currency_symbol) else {
            return Err(Error::number(
                token,
                format!("expected leading currency symbol {:?}", self.currency_symbol),
            ));
        };

        if negative && rest.starts_with(['-', '+']) {
            return Err(Error::number(token, "sign given twice"));
        }

        let value = self.parse_number(rest).map_err(|reason| Error::number(token, reason))?;
        Ok(if negative { -value } else { value })
    }

    /// Parse a plain number (no currency symbol) that may carry thousands
    /// separators, such as a lot quantity.
    pub fn parse_quantity(&self, token: &str) -> Result<f64> {
        self.parse_number(token.trim())
            .map_err(|reason| Error::number(token, reason))
    }

    /// `[sign] int [point frac]`, where a grouped integer part is one to
    /// three leading digits followed by groups of exactly three.
    fn parse_number(&self, digits: &str) -> Result<f64, String> {
        let (sign, unsigned) = match digits.strip_prefix(['-', '+']) {
            Some(rest) => (&digits[..1], rest),
            None => ("", digits),
        };
        let (int, frac) = match unsigned.split_once(self.decimal_point) {
            Some((int, frac)) => (int, Some(frac)),
            None => (unsigned, None),
        };

        let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if let Some(bad) = unsigned
            .chars()
            .find(|&c| !c.is_ascii_digit() && c != self.thousands_separator && c != self.decimal_point)
        {
            return Err(format!("unexpected character {bad:?}"));
        }
        if frac.is_some_and(|frac| !is_digits(frac)) {
            return Err("misplaced separator after the decimal point".to_string());
        }

        let mut groups = int.split(self.thousands_separator);
        let head = groups.next().unwrap_or_default();
        let mut whole = head.to_string();
        let grouped = int.contains(self.thousands_separator);
        if grouped && !(1..=3).contains(&head.len()) {
            return Err(format!("bad digit grouping in {digits:?}"));
        }
        for group in groups {
            if group.len() != 3 || !is_digits(group) {
                return Err(format!("bad digit grouping in {digits:?}"));
            }
            whole.push_str(group);
        }

        let frac = frac.unwrap_or_default();
        if whole.is_empty() && frac.is_empty() {
            return Err("no digits".to_string());
        }

        let normalized = format!(
            "{sign}{}.{}",
            if whole.is_empty() { "0" } else { &whole },
            if frac.is_empty() { "0" } else { frac }
        );
        normalized
            .parse::<f64>()
            .map_err(|e| e.to_string())
            .and_then(|value| {
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err("amount is not finite".to_string())
                }
            })
    }
}

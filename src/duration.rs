//! Human-readable durations for timeouts, e.g. "60s", "5m", "1500ms".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "1500ms", "60s", "5m", "2h".
///
/// Supported units are `ms`, `s`, `m`, `h` and `d`. Input is trimmed and
/// case-insensitive.
///
/// ```
/// use ledgerwatch::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num, millis_per_unit): (&str, u64) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60 * 1_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60 * 1_000)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, 24 * 60 * 60 * 1_000)
    } else {
        anyhow::bail!("Duration must end with ms, s, m, h, or d");
    };

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = num
        .checked_mul(millis_per_unit)
        .context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Render a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();

    const MINUTE: u128 = 60 * 1_000;
    const HOUR: u128 = 60 * MINUTE;

    if millis == 0 {
        "0s".to_string()
    } else if millis % HOUR == 0 {
        format!("{}h", millis / HOUR)
    } else if millis % MINUTE == 0 {
        format!("{}m", millis / MINUTE)
    } else if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{millis}ms")
    }
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

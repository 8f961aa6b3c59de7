//! Investment balance reporting on top of the `ledger` CLI.
//!
//! A report cycle syncs the ledger repository, reads cost basis and market
//! value for a fixed set of accounts (plus an optional per-security
//! breakdown) and writes the results as time-series points.

pub mod alert;
pub mod amount;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod git;
pub mod ledger;
pub mod parse;
pub mod prices;
pub mod process;
pub mod report;
pub mod sink;
pub mod valuation;

pub use error::{Error, Result};

use std::time::Duration;

/// Errors produced while syncing, querying, parsing and publishing a report.
///
/// Parsing errors (`MalformedOutput`, `NumberFormat`) are plain values so the
/// caller can decide whether a failure skips one security or aborts the cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The shape of the ledger output did not match what the parser expects.
    #[error("malformed ledger output: {0}")]
    MalformedOutput(String),

    /// A numeric token could not be parsed.
    #[error("invalid amount {token:?}: {reason}")]
    NumberFormat { token: String, reason: String },

    /// An external program could not be started or exited unsuccessfully.
    #[error("{program} failed: {message}")]
    ExternalProcess { program: String, message: String },

    /// An external program did not finish within its time limit.
    #[error("{program} timed out after {}", crate::duration::format_duration(*after))]
    Timeout { program: String, after: Duration },

    /// Cloning or pulling the ledger repository failed.
    #[error("repository sync failed: {0}")]
    Sync(String),

    /// The metrics sink rejected or failed to receive points.
    #[error("metrics sink: {0}")]
    Sink(String),
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    pub(crate) fn number(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NumberFormat {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that come from the shape or content of ledger output.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::MalformedOutput(_) | Self::NumberFormat { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

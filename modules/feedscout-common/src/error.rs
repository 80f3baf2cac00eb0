use thiserror::Error;

/// Outcome classification for a single fetch attempt.
///
/// Transient failures (timeouts, rate limits, 5xx) consume a retry attempt;
/// permanent failures (missing source, access denied) never do.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Content was fetched but could not be turned into messages.
///
/// Never retried: the same content would reparse identically.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("parsed message has empty text")]
    EmptyText,

    #[error("invalid content: {0}")]
    Invalid(String),
}

/// Run-level failure. Surfaced only when zero sources succeeded;
/// partial success is reported via statistics, not as an error.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("all {failed} sources failed")]
    AllSourcesFailed { failed: usize },
}

/// Caller error on the narrow keyword-search entry point.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("at least one keyword required")]
    EmptyKeywordList,
}

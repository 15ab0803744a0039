use thiserror::Error;

use crate::domain::MatchId;

/// Failure classes the web layer is expected to match on. Data-less matches
/// and rejected ballots are ordinary outcomes here, not bugs, so they get
/// their own variants instead of being folded into a string.
#[derive(Debug, Error)]
pub enum Error {
    /// The match exists but has no present-player stats yet, so there is
    /// nothing to rate.
    #[error("no stats recorded for match {0}")]
    NoStats(MatchId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A ballot failed validation before anything was persisted.
    #[error("vote rejected: {0}")]
    VoteRejected(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("malformed stored payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

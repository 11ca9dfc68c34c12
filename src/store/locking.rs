//! Row-lock discipline for claiming work.

use serde::{Deserialize, Serialize};

/// How a claim treats rows already locked by another unit of work.
///
/// [`ClaimLocking::Wait`] is the default: a claimer blocks on overlapping rows
/// until the holder commits or rolls back, so under heavy contention claims
/// run one after another. [`ClaimLocking::SkipLocked`] lets claimers pass over
/// locked rows and take whatever is free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimLocking {
    /// Block on rows locked by another unit of work.
    #[default]
    Wait,
    /// Skip rows locked by another unit of work.
    SkipLocked,
}

impl ClaimLocking {
    /// Returns the locking clause appended to claim queries.
    #[must_use]
    pub const fn clause(self) -> &'static str {
        match self {
            Self::Wait => "FOR UPDATE",
            Self::SkipLocked => "FOR UPDATE SKIP LOCKED",
        }
    }
}

//! Error types for the feed engine.

use chainfeed_core::{Address, CodecError, RejectReason, SessionError, SignError};
use thiserror::Error;

/// Result type for feed engine operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors that can occur while reading, appending to or following a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The address has no backing data.
    #[error("no record at {0}")]
    NotFound(Address),

    /// Data exists but is not a record.
    #[error("corrupt record at {address}: {detail}")]
    CorruptRecord { address: Address, detail: String },

    /// Network, timeout or busy.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The program refused the transaction.
    #[error("post against {predecessor} rejected: {reason}")]
    Rejected {
        predecessor: Address,
        reason: RejectReason,
    },

    /// Transient failures exhausted the retry budget.
    #[error("post failed after {attempts} attempts: {last}")]
    PostFailed { attempts: u32, last: String },

    /// The tail hint no longer has backing data.
    #[error("tail hint {0} has no data")]
    StaleHint(Address),

    /// A `next` pointer leads to an address with no data.
    #[error("record {from} links to missing record {to}")]
    BrokenLink { from: Address, to: Address },

    /// The nil sentinel was passed where a record address is required.
    #[error("the nil address does not name a record")]
    NilAddress,

    /// The text cannot be stored in a record.
    #[error("invalid text: {0}")]
    InvalidText(#[from] CodecError),

    /// A transaction could not be signed.
    #[error("could not sign transaction: {0}")]
    Signing(String),

    /// The monitor task panicked or was aborted.
    #[error("monitor task failed: {0}")]
    TaskFailed(String),
}

impl FeedError {
    /// The tail moved under us; re-resolve and post again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                reason: RejectReason::NextRecordExists,
                ..
            }
        )
    }

    /// Whether the failure is worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the caller should re-resolve the tail before trying again.
    pub fn needs_tail_refresh(&self) -> bool {
        self.is_conflict() || matches!(self, Self::PostFailed { .. } | Self::StaleHint(_))
    }

    pub(crate) fn signing(err: SignError) -> Self {
        Self::Signing(err.to_string())
    }

    pub(crate) fn corrupt(address: Address, detail: impl ToString) -> Self {
        Self::CorruptRecord {
            address,
            detail: detail.to_string(),
        }
    }

    /// Map a session error raised while posting against `predecessor`.
    pub(crate) fn from_session(err: SessionError, predecessor: Address) -> Self {
        match err {
            SessionError::Transient(message) => Self::Transient(message),
            SessionError::Rejected(reason) => Self::Rejected {
                predecessor,
                reason,
            },
        }
    }
}

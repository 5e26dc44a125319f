//! Error types for chainfeed-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

/// Failure to encode or decode a fixed-layout record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Payload shorter than the fixed part of the layout.
    #[error("payload too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    /// The text field runs to the end of the payload without a terminator.
    #[error("text field has no terminator")]
    MissingTerminator,

    /// The text field is not UTF-8.
    #[error("text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Text containing NUL cannot be terminated unambiguously.
    #[error("text contains an interior NUL byte")]
    InteriorNul,

    /// The encoded record would exceed the platform maximum.
    #[error("encoded record of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    /// The destination slot is too small for the encoded record.
    #[error("slot of {len} bytes cannot hold {needed} bytes")]
    SlotTooSmall { len: usize, needed: usize },

    /// A boolean flag byte held something other than 0 or 1.
    #[error("invalid flag byte {0:#04x}")]
    InvalidFlag(u8),
}

/// Why the remote program refused a transaction.
///
/// Rejections are semantic: resubmitting the same transaction will not help.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The predecessor already links to a successor (stale tail).
    #[error("predecessor already has a next record")]
    NextRecordExists,

    /// The author has been revoked from the feed.
    #[error("participant {participant} is revoked")]
    BannedParticipant { participant: Address },

    /// The author does not belong to the feed being extended.
    #[error("participant does not belong to this feed")]
    CreatorMismatch,

    /// A required signer did not sign.
    #[error("missing signature from {signer}")]
    MissingSignature { signer: Address },

    /// A signature did not verify.
    #[error("invalid signature from {signer}")]
    InvalidSignature { signer: Address },

    /// Attempt to create a slot that already exists.
    #[error("account {account} already exists")]
    AccountExists { account: Address },

    /// A referenced slot does not exist.
    #[error("account {account} does not exist")]
    AccountMissing { account: Address },

    /// The payer cannot cover the slot's minimum balance.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// A slot's contents could not be interpreted.
    #[error("account {account} has invalid data: {detail}")]
    InvalidAccountData { account: Address, detail: String },

    /// A slot is not owned by the program addressed.
    #[error("account {account} is not owned by the program")]
    WrongOwner { account: Address },

    /// No program is deployed at the given id.
    #[error("unknown program {program}")]
    UnknownProgram { program: Address },

    /// This exact transaction was already applied.
    #[error("transaction already processed")]
    DuplicateTransaction,

    /// The transaction could not be decoded or hashed.
    #[error("malformed transaction: {detail}")]
    MalformedTransaction { detail: String },

    /// The text payload is empty or unencodable.
    #[error("invalid text: {detail}")]
    InvalidText { detail: String },
}

/// Errors returned by a network session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Network, timeout or busy; safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote program refused the transaction.
    #[error("rejected: {0}")]
    Rejected(#[from] RejectReason),
}

impl SessionError {
    /// Whether this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure to build or sign a transaction.
#[derive(Debug, Error)]
pub enum SignError {
    /// A required signer's keypair was not supplied.
    #[error("no keypair supplied for required signer {0}")]
    MissingSigner(Address),

    /// The message could not be encoded for hashing.
    #[error("message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

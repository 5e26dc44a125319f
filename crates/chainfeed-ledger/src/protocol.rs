//! Line-delimited JSON protocol spoken over the ledger socket.
//!
//! Every request is one JSON object on its own line, tagged by `op`; every
//! response is one object tagged by `status`. A `subscribe` request turns the
//! connection into a notification channel: the server acknowledges with
//! `subscribed`, sends exactly one `changed` (or `error`) line, and closes.

use chainfeed_core::{Account, Address, ProgramId, RejectReason, SessionError, Signature, Transaction};
use serde::{Deserialize, Serialize};

/// Request sent to the ledger node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Read a slot
    FetchAccount { address: Address },
    /// Apply a signed transaction
    Submit { transaction: Transaction },
    /// Arm a one-shot change notification
    Subscribe { address: Address },
    /// Credit lamports to an address
    Airdrop { to: Address, lamports: u64 },
    /// Read an address's balance
    Balance { address: Address },
    /// Make sure the feed program is deployed
    EnsureProgram { known: Option<ProgramId> },
}

/// Response from the ledger node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Account { account: Option<Account> },
    Signature { signature: Signature },
    Subscribed,
    Changed { account: Account },
    Balance { lamports: u64 },
    Program { program: ProgramId },
    Ok,
    Error { error: WireError },
}

/// A [`SessionError`] as it travels over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireError {
    Transient { message: String },
    Rejected { rejection: RejectReason },
}

impl From<SessionError> for WireError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transient(message) => WireError::Transient { message },
            SessionError::Rejected(rejection) => WireError::Rejected { rejection },
        }
    }
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Transient { message } => SessionError::Transient(message),
            WireError::Rejected { rejection } => SessionError::Rejected(rejection),
        }
    }
}

impl Response {
    /// Wrap a session error.
    pub fn error(err: SessionError) -> Self {
        Response::Error { error: err.into() }
    }
}

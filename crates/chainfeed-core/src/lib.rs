//! Chainfeed Core - records, identities and collaborator interfaces
//!
//! A chainfeed is an append-only, singly-linked list of short text records.
//! Each record lives in its own ledger slot and points at its successor; the
//! last record (the tail) points at the nil sentinel.
//!
//! This crate holds everything the feed engine and the ledger agree on:
//!
//! - **Addresses and keys**: [`Address`], [`Keypair`], [`Signature`]
//! - **Record codec**: the fixed layout of a record slot ([`RecordData`]) and
//!   of a participant slot ([`UserData`])
//! - **Transactions**: [`Instruction`]s applied atomically, signed by every
//!   participant they touch
//! - **Collaborators**: the [`Session`], [`FundingProvider`] and
//!   [`ProgramLoader`] traits the engine is written against
//! - **Naming**: [`display_name`] for presenting identities
//!
//! # Example
//!
//! ```
//! use chainfeed_core::{Address, RecordData};
//!
//! let author = Address::from_bytes([7u8; 32]);
//! let bytes = RecordData::new("hello", author).encode().unwrap();
//! let decoded = RecordData::decode(&bytes).unwrap();
//! assert_eq!(decoded.text, "hello");
//! assert!(decoded.next.is_nil());
//! ```

pub mod address;
pub mod error;
pub mod naming;
pub mod record;
pub mod session;
pub mod transaction;
pub mod user;

pub use address::{Address, Keypair, ProgramId, Signature, ADDRESS_LEN};
pub use error::{CodecError, RejectReason, SessionError, SignError};
pub use naming::display_name;
pub use record::{Record, RecordData, MAX_RECORD_LEN, MIN_RECORD_LEN, RECORD_HEADER_LEN};
pub use session::{
    minimum_balance, Account, FundingProvider, Notification, Notifier, ProgramLoader, Session,
    Subscription,
};
pub use transaction::{Instruction, Message, SignatureEntry, Transaction};
pub use user::{UserData, USER_RECORD_LEN};

/// Text of the record that opens every feed.
pub const FIRST_POST: &str = "First post! 💫";

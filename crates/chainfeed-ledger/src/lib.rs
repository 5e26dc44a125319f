//! Chainfeed Ledger - a single-node ledger that runs the feed program
//!
//! [`LocalLedger`] keeps every slot in memory and applies transactions
//! atomically, one at a time. It implements the [`Session`],
//! [`FundingProvider`] and [`ProgramLoader`] interfaces directly, so tests can
//! drive the feed engine without any IO.
//!
//! [`LedgerServer`] exposes a ledger over a Unix socket using a line-delimited
//! JSON protocol ([`protocol`]); [`RemoteSession`] is the matching client.
//!
//! [`Session`]: chainfeed_core::Session
//! [`FundingProvider`]: chainfeed_core::FundingProvider
//! [`ProgramLoader`]: chainfeed_core::ProgramLoader

pub mod error;
pub mod ledger;
mod program;
pub mod protocol;
pub mod remote;
pub mod server;

pub use error::{Error, Result};
pub use ledger::LocalLedger;
pub use remote::RemoteSession;
pub use server::LedgerServer;

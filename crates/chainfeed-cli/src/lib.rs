//! Chainfeed CLI - client-side plumbing for the `chainfeed` binary
//!
//! - [`config`]: environment configuration
//! - [`store`]: the local key store and persisted settings
//! - [`client`]: bootstrap and the commands' feed operations

pub mod client;
pub mod config;
pub mod store;

pub use client::{format_record, FeedClient};
pub use config::CliConfig;
pub use store::{FileKeyStore, Settings};

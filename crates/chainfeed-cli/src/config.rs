//! Client configuration from the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Default ledger socket path.
pub const DEFAULT_SOCKET: &str = "./chainfeed-data/ledger.sock";

/// Default directory for keys and settings.
pub const DEFAULT_STORE: &str = "./chainfeed-data/store";

/// Default lamports requested when topping up the payer.
pub const DEFAULT_AIRDROP: u64 = 1_000_000;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "chainfeed=info,chainfeed_cli=info,chainfeed_engine=info";

/// Where the client finds the ledger and its own files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Ledger node socket.
    pub socket_path: PathBuf,
    /// Directory holding key files and `config.json`.
    pub store_dir: PathBuf,
    /// Lamports requested when the payer runs low.
    pub airdrop_lamports: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET),
            store_dir: PathBuf::from(DEFAULT_STORE),
            airdrop_lamports: DEFAULT_AIRDROP,
        }
    }
}

impl CliConfig {
    /// Read `CHAINFEED_SOCKET`, `CHAINFEED_STORE` and `CHAINFEED_AIRDROP`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(socket) = lookup("CHAINFEED_SOCKET") {
            config.socket_path = PathBuf::from(socket);
        }
        if let Some(store) = lookup("CHAINFEED_STORE") {
            config.store_dir = PathBuf::from(store);
        }
        if let Some(airdrop) = lookup("CHAINFEED_AIRDROP") {
            config.airdrop_lamports = airdrop
                .parse()
                .with_context(|| format!("CHAINFEED_AIRDROP is not a number: {airdrop:?}"))?;
        }
        Ok(config)
    }
}

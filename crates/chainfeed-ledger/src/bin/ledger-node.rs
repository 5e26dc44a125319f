//! Ledger node binary
//!
//! Runs an in-memory ledger with the feed program and serves it on a Unix
//! socket.
//!
//! Environment:
//!   CHAINFEED_SOCKET  Path to the ledger socket (default: ./chainfeed-data/ledger.sock)

use std::path::PathBuf;
use std::sync::Arc;

use chainfeed_ledger::{LedgerServer, LocalLedger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn get_socket_path() -> PathBuf {
    std::env::var("CHAINFEED_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./chainfeed-data/ledger.sock"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_node=info,chainfeed_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ledger node");

    let ledger = Arc::new(LocalLedger::new());
    let server = LedgerServer::new(ledger, get_socket_path());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            let _ = std::fs::remove_file(server.socket_path());
        }
    }

    Ok(())
}

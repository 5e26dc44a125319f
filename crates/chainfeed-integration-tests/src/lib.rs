//! Shared setup for the end-to-end tests: a ledger node on a Unix socket in a
//! temporary directory, and a funded engine talking to it.

use std::sync::{Arc, Once};

use chainfeed_core::{Address, FundingProvider, Keypair, ProgramId, ProgramLoader};
use chainfeed_engine::{ChainFeed, FeedConfig, RetryConfig};
use chainfeed_ledger::{LedgerServer, LocalLedger, RemoteSession};
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A running ledger node and a client session to it.
pub struct Node {
    pub dir: TempDir,
    pub ledger: Arc<LocalLedger>,
    pub session: Arc<RemoteSession>,
}

impl Node {
    /// Start a node listening in a fresh temporary directory.
    pub fn start() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.sock");
        let ledger = Arc::new(LocalLedger::new());
        let server = LedgerServer::new(Arc::clone(&ledger), &path);
        let listener = server.bind().expect("bind ledger socket");
        tokio::spawn(async move { server.serve(listener).await });
        Self {
            dir,
            session: Arc::new(RemoteSession::new(path)),
            ledger,
        }
    }

    /// Engine config with no pause between retries.
    pub fn config() -> FeedConfig {
        FeedConfig::default().with_retry(RetryConfig::immediate())
    }

    /// A funded engine over the socket.
    pub async fn engine(&self) -> ChainFeed<RemoteSession> {
        let payer = Keypair::generate();
        self.session
            .airdrop(&payer.address(), 10_000_000)
            .await
            .expect("airdrop");
        ChainFeed::new(Arc::clone(&self.session), payer, Self::config())
    }

    /// Deploy the program and create a feed. Returns (program, feed key,
    /// founder, first record).
    pub async fn feed(&self, engine: &ChainFeed<RemoteSession>) -> (ProgramId, Keypair, Keypair, Address) {
        let program = self.session.ensure_program(None).await.expect("program");
        let feed_key = Keypair::generate();
        let founder = Keypair::generate();
        let first = engine
            .create_feed(program, &feed_key, &founder)
            .await
            .expect("create feed");
        (program, feed_key, founder, first)
    }
}

//! Shared fixture: a local ledger holding one feed with one participant.

use std::sync::Arc;

use chainfeed_core::{Address, FundingProvider, Keypair, ProgramId};
use chainfeed_ledger::LocalLedger;

use crate::config::{FeedConfig, RetryConfig};
use crate::error::Result;
use crate::reader::FeedReader;
use crate::tail::TailLocator;
use crate::writer::FeedWriter;

pub(crate) struct Harness {
    pub ledger: Arc<LocalLedger>,
    pub config: FeedConfig,
    pub program: ProgramId,
    pub payer: Address,
    payer_secret: [u8; 32],
    pub feed_key: Keypair,
    pub first: Address,
    pub user: Keypair,
}

impl Harness {
    pub async fn new() -> Self {
        let ledger = Arc::new(LocalLedger::new());
        let program = ledger.deploy_program().await;
        let payer = Keypair::generate();
        ledger.airdrop(&payer.address(), 10_000_000).await.unwrap();

        let config = FeedConfig::default().with_retry(RetryConfig::immediate());
        let feed_key = Keypair::generate();
        let user = Keypair::generate();
        let payer_secret = payer.secret_bytes();
        let writer = FeedWriter::new(ledger.clone(), payer, config);
        let first = writer.create_feed(program, &feed_key, &user).await.unwrap();

        Self {
            payer: writer.payer(),
            ledger,
            config,
            program,
            payer_secret,
            feed_key,
            first,
            user,
        }
    }

    pub fn reader(&self) -> FeedReader<LocalLedger> {
        FeedReader::new(self.ledger.clone(), self.config)
    }

    pub fn locator(&self) -> TailLocator<LocalLedger> {
        TailLocator::new(self.reader())
    }

    pub fn writer(&self) -> FeedWriter<LocalLedger> {
        FeedWriter::new(self.ledger.clone(), self.payer_keypair(), self.config)
    }

    /// The funded payer, for writers over some other session.
    pub fn payer_keypair(&self) -> Keypair {
        Keypair::from_secret_bytes(&self.payer_secret)
    }

    /// Post `text` as the fixture's participant.
    pub async fn post(&self, text: &str, predecessor: Address) -> Result<Address> {
        self.writer().post(&self.user, text, predecessor, None).await
    }
}

//! The client's view of its one feed.

use std::sync::Arc;

use anyhow::{Context, Result};
use chainfeed_core::{
    display_name, Address, FundingProvider, Keypair, ProgramLoader, Record, Session,
};
use chainfeed_engine::{ChainFeed, FeedConfig, FeedError, MonitorHandle};
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::store::FileKeyStore;

/// Times `post` re-resolves the tail after losing a race before giving up.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// Render a record as `name: text (address)`.
pub fn format_record(record: &Record) -> String {
    format!(
        "{}: {} ({})",
        display_name(&record.author),
        record.text,
        record.address
    )
}

/// A feed and the participant posting to it.
pub struct FeedClient<S: Session> {
    feed: ChainFeed<S>,
    user: Keypair,
    first: Address,
}

impl<S> FeedClient<S>
where
    S: Session + FundingProvider + ProgramLoader + 'static,
{
    /// Make sure the payer is funded, the program deployed, and the feed and
    /// participant exist, creating whatever is missing.
    pub async fn bootstrap(
        session: Arc<S>,
        store: &FileKeyStore,
        airdrop_lamports: u64,
        config: FeedConfig,
    ) -> Result<Self> {
        let payer = store.ensure_exists("payer")?;
        let balance = session.balance(&payer.address()).await?;
        if balance < airdrop_lamports / 2 {
            session
                .airdrop(&payer.address(), airdrop_lamports)
                .await
                .context("failed to fund payer")?;
            info!(payer = %payer.address().short(), airdrop_lamports, "funded payer");
        }

        let mut settings = store.settings()?;
        let program = session
            .ensure_program(settings.program)
            .await
            .context("failed to deploy feed program")?;
        if settings.program != Some(program) {
            settings.program = Some(program);
            store.save_settings(&settings)?;
        }

        let feed_key = store.ensure_exists("feed")?;
        let mut user = store.ensure_exists("user")?;
        let first = feed_key.address();
        let feed = ChainFeed::new(Arc::clone(&session), payer, config);

        if session.fetch_account(&first).await?.is_none() {
            if session.fetch_account(&user.address()).await?.is_some() {
                // Participant slots are bound to one feed for good.
                user = Keypair::generate();
                store.save("user", &user)?;
            }
            feed.create_feed(program, &feed_key, &user)
                .await
                .context("failed to create feed")?;
        } else if session.fetch_account(&user.address()).await?.is_none() {
            feed.writer()
                .register_user(program, &user, &feed_key)
                .await
                .context("failed to register participant")?;
        }

        Ok(Self { feed, user, first })
    }

    /// First record of the feed.
    pub fn first(&self) -> Address {
        self.first
    }

    /// This client's participant identity.
    pub fn user(&self) -> Address {
        self.user.address()
    }

    /// Every record, first to tail.
    pub async fn records(&self) -> Result<Vec<Record>> {
        let records: Vec<Record> = self.feed.enumerate(self.first).try_collect().await?;
        Ok(records)
    }

    /// Current tail, walking from `hint` or from the first record if the
    /// hint is gone.
    pub async fn resolve_tail(&self, hint: Address) -> Result<Address> {
        match self.feed.resolve_tail(hint, |_| {}).await {
            Err(FeedError::StaleHint(stale)) if stale != self.first => {
                warn!(hint = %stale.short(), "tail hint vanished, walking from the first record");
                Ok(self.feed.resolve_tail(self.first, |_| {}).await?)
            }
            result => Ok(result?),
        }
    }

    /// Post `text`, re-resolving the tail and trying again when another
    /// writer gets there first.
    pub async fn post(
        &self,
        text: &str,
        revoke: Option<Address>,
        hint: Option<Address>,
    ) -> Result<Address> {
        let mut hint = hint.unwrap_or(self.first);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let tail = self.resolve_tail(hint).await?;
            match self.feed.post(&self.user, text, tail, revoke).await {
                Ok(address) => return Ok(address),
                Err(e) if e.needs_tail_refresh() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(attempt, error = %e, "re-resolving tail");
                    hint = tail;
                }
                Err(e) => return Err(e).context("failed to post"),
            }
        }
    }

    /// Follow the feed from `hint`, calling `on_record` for each new record.
    pub fn watch<F>(&self, hint: Address, on_record: F) -> MonitorHandle
    where
        F: FnMut(&Record) + Send + 'static,
    {
        self.feed.monitor(hint, on_record)
    }
}

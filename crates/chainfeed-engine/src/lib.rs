//! Chainfeed Engine - reading, appending to and following a feed
//!
//! A feed is a chain of records on a ledger, each pointing at its successor.
//! The engine is written against the [`Session`] trait and never owns a
//! connection itself.
//!
//! - [`FeedReader`]: fetch one record, or lazily enumerate a chain
//! - [`FeedWriter`]: append a record after the tail, bootstrap feeds and
//!   participants; transient failures are retried, conflicts are not
//! - [`TailLocator`]: walk forward from a stale hint to the current tail
//! - [`LiveMonitor`]: follow a feed, delivering each new record in order
//!
//! [`ChainFeed`] bundles all four behind one handle.

pub mod config;
pub mod error;
pub mod monitor;
pub mod reader;
pub mod tail;
pub mod writer;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use chainfeed_core::{Address, Keypair, ProgramId, Record, Session};
use futures::Stream;

pub use config::{FeedConfig, RetryConfig};
pub use error::{FeedError, Result};
pub use monitor::{LiveMonitor, MonitorHandle, MonitorState};
pub use reader::FeedReader;
pub use tail::TailLocator;
pub use writer::FeedWriter;

/// The feed engine over one session.
pub struct ChainFeed<S: Session + ?Sized> {
    session: Arc<S>,
    config: FeedConfig,
    reader: FeedReader<S>,
    locator: TailLocator<S>,
    writer: FeedWriter<S>,
}

impl<S: Session + ?Sized + 'static> ChainFeed<S> {
    /// Create an engine whose writes are paid for by `payer`.
    pub fn new(session: Arc<S>, payer: Keypair, config: FeedConfig) -> Self {
        let reader = FeedReader::new(Arc::clone(&session), config);
        Self {
            locator: TailLocator::new(reader.clone()),
            writer: FeedWriter::new(Arc::clone(&session), payer, config),
            reader,
            session,
            config,
        }
    }

    pub fn reader(&self) -> &FeedReader<S> {
        &self.reader
    }

    pub fn locator(&self) -> &TailLocator<S> {
        &self.locator
    }

    pub fn writer(&self) -> &FeedWriter<S> {
        &self.writer
    }

    /// Create a feed; see [`FeedWriter::create_feed`].
    pub async fn create_feed(
        &self,
        program: ProgramId,
        first: &Keypair,
        founder: &Keypair,
    ) -> Result<Address> {
        self.writer.create_feed(program, first, founder).await
    }

    /// Append a record; see [`FeedWriter::post`].
    pub async fn post(
        &self,
        author: &Keypair,
        text: &str,
        tail: Address,
        revoke: Option<Address>,
    ) -> Result<Address> {
        self.writer.post(author, text, tail, revoke).await
    }

    /// Walk the chain from `start`; see [`FeedReader::enumerate`].
    pub fn enumerate(&self, start: Address) -> impl Stream<Item = Result<Record>> + Send + 'static {
        self.reader.enumerate(start)
    }

    /// Find the tail from `hint`; see [`TailLocator::resolve_tail`].
    pub async fn resolve_tail<F>(&self, hint: Address, on_record: F) -> Result<Address>
    where
        F: FnMut(&Record),
    {
        self.locator.resolve_tail(hint, on_record).await
    }

    /// Start following the feed from `hint` on a background task.
    pub fn monitor<F>(&self, hint: Address, on_record: F) -> MonitorHandle
    where
        F: FnMut(&Record) + Send + 'static,
    {
        LiveMonitor::new(Arc::clone(&self.session), self.config, hint).spawn(on_record)
    }
}

//! Feed Reader: fetch single records and walk the chain.

use std::collections::HashSet;
use std::sync::Arc;

use chainfeed_core::{Address, Record, Session};
use futures::stream::{self, Stream};
use tracing::trace;

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};

/// Guards a traversal against cycles and runaway chains.
#[derive(Debug)]
pub(crate) struct Walk {
    visited: HashSet<Address>,
    max_steps: usize,
}

impl Walk {
    pub(crate) fn new(max_steps: usize) -> Self {
        Self {
            visited: HashSet::new(),
            max_steps,
        }
    }

    /// Record a hop onto `address`.
    pub(crate) fn visit(&mut self, address: Address) -> Result<()> {
        if !self.visited.insert(address) {
            return Err(FeedError::corrupt(address, "cycle in next pointers"));
        }
        if self.visited.len() > self.max_steps {
            return Err(FeedError::corrupt(
                address,
                format!("chain longer than {} records", self.max_steps),
            ));
        }
        Ok(())
    }
}

/// Reads records through a [`Session`].
pub struct FeedReader<S: Session + ?Sized> {
    session: Arc<S>,
    config: FeedConfig,
}

impl<S: Session + ?Sized> Clone for FeedReader<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            config: self.config,
        }
    }
}

impl<S: Session + ?Sized> FeedReader<S> {
    /// Create a reader.
    pub fn new(session: Arc<S>, config: FeedConfig) -> Self {
        Self { session, config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Fetch and decode the record at `address`.
    ///
    /// Fails with [`FeedError::NilAddress`] for the nil sentinel,
    /// [`FeedError::NotFound`] if nothing is stored there and
    /// [`FeedError::CorruptRecord`] if the data is not a record.
    pub async fn read_record(&self, address: &Address) -> Result<Record> {
        if address.is_nil() {
            return Err(FeedError::NilAddress);
        }
        let account = self
            .session
            .fetch_account(address)
            .await
            .map_err(|e| FeedError::from_session(e, *address))?
            .ok_or(FeedError::NotFound(*address))?;
        let record =
            Record::from_account(*address, &account).map_err(|e| FeedError::corrupt(*address, e))?;
        trace!(address = %address.short(), next = %record.next.short(), "read record");
        Ok(record)
    }
}

/// Position of an enumeration between fetches.
struct Cursor {
    from: Option<Address>,
    to: Address,
}

impl<S: Session + ?Sized + 'static> FeedReader<S> {
    /// Lazily walk the chain from `start` until a record whose `next` is nil.
    ///
    /// Each element costs exactly one fetch and reflects the chain as it is
    /// when that fetch happens. A nil or empty `start` yields nothing; a
    /// `next` pointer to a missing record yields [`FeedError::BrokenLink`].
    /// The stream ends after the first error.
    pub fn enumerate(&self, start: Address) -> impl Stream<Item = Result<Record>> + Send + 'static {
        let walk = Walk::new(self.config.max_walk_steps);
        let cursor = Cursor {
            from: None,
            to: start,
        };
        stream::try_unfold(
            (self.clone(), walk, cursor),
            |(reader, mut walk, cursor)| async move {
                if cursor.to.is_nil() {
                    return Ok(None);
                }
                walk.visit(cursor.to)?;
                let record = match reader.read_record(&cursor.to).await {
                    Ok(record) => record,
                    Err(FeedError::NotFound(to)) => {
                        return match cursor.from {
                            Some(from) => Err(FeedError::BrokenLink { from, to }),
                            None => Ok(None),
                        };
                    }
                    Err(e) => return Err(e),
                };
                let next = Cursor {
                    from: Some(record.address),
                    to: record.next,
                };
                Ok::<_, FeedError>(Some((record, (reader, walk, next))))
            },
        )
    }
}

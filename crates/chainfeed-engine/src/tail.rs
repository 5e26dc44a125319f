//! Tail Locator: find the current tail from a possibly stale hint.

use std::pin::pin;

use chainfeed_core::{Address, Record, Session};
use futures::TryStreamExt;
use tracing::debug;

use crate::error::{FeedError, Result};
use crate::reader::FeedReader;

/// Resolves the tail of a feed by walking forward from a hint.
pub struct TailLocator<S: Session + ?Sized> {
    reader: FeedReader<S>,
}

impl<S: Session + ?Sized> Clone for TailLocator<S> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<S: Session + ?Sized + 'static> TailLocator<S> {
    /// Create a locator reading through `reader`.
    pub fn new(reader: FeedReader<S>) -> Self {
        Self { reader }
    }

    /// Walk forward from `hint` and return the address of the tail.
    ///
    /// `on_record` sees every record strictly after the hint, in chain order.
    /// A hint that is already the tail costs one fetch and no callbacks. A hint
    /// with no data fails with [`FeedError::StaleHint`].
    pub async fn resolve_tail<F>(&self, hint: Address, mut on_record: F) -> Result<Address>
    where
        F: FnMut(&Record),
    {
        if hint.is_nil() {
            return Err(FeedError::NilAddress);
        }

        let mut records = pin!(self.reader.enumerate(hint));
        let mut tail = None;
        let mut walked = 0usize;
        while let Some(record) = records.try_next().await? {
            if tail.is_some() {
                on_record(&record);
                walked += 1;
            }
            tail = Some(record.address);
        }

        let tail = tail.ok_or(FeedError::StaleHint(hint))?;
        debug!(hint = %hint.short(), tail = %tail.short(), walked, "resolved tail");
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Harness;

    #[tokio::test]
    async fn hint_at_tail_has_no_callbacks() {
        let h = Harness::new().await;
        let tail = h.post("a", h.first).await.unwrap();
        let mut seen = Vec::new();
        let resolved = h
            .locator()
            .resolve_tail(tail, |r| seen.push(r.address))
            .await
            .unwrap();
        assert_eq!(resolved, tail);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn first_record_hint_walks_everything() {
        let h = Harness::new().await;
        let a = h.post("a", h.first).await.unwrap();
        let b = h.post("b", a).await.unwrap();
        let mut seen = Vec::new();
        let resolved = h
            .locator()
            .resolve_tail(h.first, |r| seen.push(r.address))
            .await
            .unwrap();
        assert_eq!(resolved, b);
        assert_eq!(seen, vec![a, b]);
    }

    #[tokio::test]
    async fn idempotent_without_writes() {
        let h = Harness::new().await;
        let a = h.post("a", h.first).await.unwrap();
        h.post("b", a).await.unwrap();
        let locator = h.locator();

        let mut first_pass = Vec::new();
        let t1 = locator
            .resolve_tail(h.first, |r| first_pass.push(r.clone()))
            .await
            .unwrap();
        let mut second_pass = Vec::new();
        let t2 = locator
            .resolve_tail(h.first, |r| second_pass.push(r.clone()))
            .await
            .unwrap();
        assert_eq!(t1, t2);
        assert_eq!(first_pass, second_pass);
    }

    #[tokio::test]
    async fn missing_hint_is_stale() {
        let h = Harness::new().await;
        let missing = Address::from_bytes([3u8; 32]);
        let err = h.locator().resolve_tail(missing, |_| {}).await.unwrap_err();
        assert_eq!(err, FeedError::StaleHint(missing));
        assert!(err.needs_tail_refresh());
    }

    #[tokio::test]
    async fn nil_hint_is_caller_error() {
        let h = Harness::new().await;
        let err = h.locator().resolve_tail(Address::NIL, |_| {}).await.unwrap_err();
        assert_eq!(err, FeedError::NilAddress);
    }
}

//! Live Monitor: follow a feed as records are appended.
//!
//! The monitor alternates between two states. In [`MonitorState::Resolving`]
//! it walks forward from a hint with the [`TailLocator`], delivering every
//! record it passes. In [`MonitorState::Subscribed`] it holds a one-shot
//! change subscription on the tail; when the tail's `next` pointer is set it
//! delivers the new record and subscribes to that one instead.
//!
//! Subscriptions are armed before the tail is re-read, so an append that
//! lands between resolving and arming is caught up rather than missed.

use std::sync::Arc;

use chainfeed_core::{Address, Record, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::reader::FeedReader;
use crate::tail::TailLocator;

/// Where the monitor is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Walking forward from a hint to find the tail.
    Resolving(Address),
    /// Waiting for the record at this address to gain a successor.
    Subscribed(Address),
}

/// Follows one feed, invoking a callback for each new record in chain order.
pub struct LiveMonitor<S: Session + ?Sized> {
    session: Arc<S>,
    reader: FeedReader<S>,
    locator: TailLocator<S>,
    state: MonitorState,
    tail: watch::Sender<Address>,
    cancel: CancellationToken,
}

impl<S: Session + ?Sized + 'static> LiveMonitor<S> {
    /// Create a monitor that starts by resolving the tail from `hint`.
    ///
    /// Records after `hint` are delivered; `hint` itself is not.
    pub fn new(session: Arc<S>, config: FeedConfig, hint: Address) -> Self {
        let reader = FeedReader::new(Arc::clone(&session), config);
        let (tail, _) = watch::channel(hint);
        Self {
            session,
            locator: TailLocator::new(reader.clone()),
            reader,
            state: MonitorState::Resolving(hint),
            tail,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop the monitor instead of a private token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Token that stops the monitor at its next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver for the monitor's last known tail.
    pub fn tail_updates(&self) -> watch::Receiver<Address> {
        self.tail.subscribe()
    }

    fn advance(&mut self, tail: Address) {
        self.tail.send_replace(tail);
        self.state = MonitorState::Subscribed(tail);
    }

    /// Run one transition. Returns `false` once cancelled.
    pub async fn step<F>(&mut self, on_record: &mut F) -> Result<bool>
    where
        F: FnMut(&Record),
    {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        match self.state {
            MonitorState::Resolving(hint) => {
                let tail = self.locator.resolve_tail(hint, &mut *on_record).await?;
                self.advance(tail);
                Ok(true)
            }
            MonitorState::Subscribed(address) => {
                let subscription = self
                    .session
                    .subscribe(&address)
                    .await
                    .map_err(|e| FeedError::from_session(e, address))?;

                let current = self.reader.read_record(&address).await?;
                if !current.is_tail() {
                    trace!(address = %address.short(), "tail moved before subscription armed");
                    self.state = MonitorState::Resolving(address);
                    return Ok(true);
                }

                let account = tokio::select! {
                    changed = subscription.changed() => {
                        changed.map_err(|e| FeedError::from_session(e, address))?
                    }
                    _ = self.cancel.cancelled() => return Ok(false),
                };

                let updated = Record::from_account(address, &account)
                    .map_err(|e| FeedError::corrupt(address, e))?;
                if updated.is_tail() {
                    // Some other field of the slot changed; keep waiting.
                    return Ok(true);
                }

                let record = match self.reader.read_record(&updated.next).await {
                    Ok(record) => record,
                    Err(FeedError::NotFound(to)) => {
                        return Err(FeedError::BrokenLink { from: address, to })
                    }
                    Err(e) => return Err(e),
                };
                debug!(record = %record.address.short(), "new record");
                on_record(&record);
                self.advance(record.address);
                Ok(true)
            }
        }
    }

    /// Follow the feed until cancelled or an error occurs.
    pub async fn run<F>(mut self, mut on_record: F) -> Result<()>
    where
        F: FnMut(&Record),
    {
        info!(state = ?self.state, "monitor started");
        let result = loop {
            match self.step(&mut on_record).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        match &result {
            Ok(()) => info!("monitor stopped"),
            Err(e) => warn!(error = %e, "monitor failed"),
        }
        result
    }

    /// Run the monitor on its own task.
    pub fn spawn<F>(self, on_record: F) -> MonitorHandle
    where
        F: FnMut(&Record) + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let tail = self.tail_updates();
        let task = tokio::spawn(self.run(on_record));
        MonitorHandle { cancel, tail, task }
    }
}

/// Handle to a monitor running on its own task.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    tail: watch::Receiver<Address>,
    task: JoinHandle<Result<()>>,
}

impl MonitorHandle {
    /// Ask the monitor to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the monitor; usable after the handle is consumed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The most recent tail the monitor has seen. Advisory only.
    pub fn last_known_tail(&self) -> Address {
        *self.tail.borrow()
    }

    /// Receiver that observes every tail update.
    pub fn tail_updates(&self) -> watch::Receiver<Address> {
        self.tail.clone()
    }

    /// Whether the monitor has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor to stop and return how it ended.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| FeedError::TaskFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Harness;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collector() -> (impl FnMut(&Record) + Send + 'static, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |r: &Record| drop(tx.send(r.clone())), rx)
    }

    async fn wait_subscribed(rx: &mut watch::Receiver<Address>, tail: Address) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|t| *t == tail))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_appends_in_order() {
        let h = Harness::new().await;
        let (on_record, mut rx) = collector();
        let monitor = LiveMonitor::new(h.ledger.clone(), h.config, h.first);
        let handle = monitor.spawn(on_record);

        let a1 = h.post("A1", h.first).await.unwrap();
        let a2 = h.post("A2", a1).await.unwrap();
        let a3 = h.post("A3", a2).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(record.address);
        }
        assert_eq!(seen, vec![a1, a2, a3]);

        let mut tail = handle.tail_updates();
        wait_subscribed(&mut tail, a3).await;
        assert_eq!(handle.last_known_tail(), a3);

        handle.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn stale_hint_catches_up() {
        let h = Harness::new().await;
        let a = h.post("a", h.first).await.unwrap();
        let b = h.post("b", a).await.unwrap();

        let mut monitor = LiveMonitor::new(h.ledger.clone(), h.config, h.first);
        let mut seen = Vec::new();
        assert!(monitor.step(&mut |r: &Record| seen.push(r.address)).await.unwrap());
        assert_eq!(seen, vec![a, b]);
        assert_eq!(monitor.state(), MonitorState::Subscribed(b));
    }

    #[tokio::test]
    async fn append_before_arming_is_not_missed() {
        let h = Harness::new().await;
        let mut monitor = LiveMonitor::new(h.ledger.clone(), h.config, h.first);
        let mut seen = Vec::new();
        monitor.step(&mut |r: &Record| seen.push(r.address)).await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Subscribed(h.first));

        // Lands while the monitor is between states.
        let a = h.post("a", h.first).await.unwrap();

        monitor.step(&mut |r: &Record| seen.push(r.address)).await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Resolving(h.first));
        monitor.step(&mut |r: &Record| seen.push(r.address)).await.unwrap();
        assert_eq!(seen, vec![a]);
        assert_eq!(monitor.state(), MonitorState::Subscribed(a));
    }

    #[tokio::test]
    async fn cancel_stops_idle_monitor() {
        let h = Harness::new().await;
        let (on_record, _rx) = collector();
        let monitor = LiveMonitor::new(h.ledger.clone(), h.config, h.first);
        let mut tail = monitor.tail_updates();
        let handle = monitor.spawn(on_record);
        wait_subscribed(&mut tail, h.first).await;

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let h = Harness::new().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut monitor =
            LiveMonitor::new(h.ledger.clone(), h.config, h.first).with_cancellation(cancel);
        let mut calls = 0;
        assert!(!monitor.step(&mut |_: &Record| calls += 1).await.unwrap());
        assert_eq!(calls, 0);
        assert_eq!(monitor.state(), MonitorState::Resolving(h.first));
    }

    #[tokio::test]
    async fn transient_failure_propagates() {
        let h = Harness::new().await;
        h.ledger.fail_next_fetches(1).await;
        let (on_record, _rx) = collector();
        let handle = LiveMonitor::new(h.ledger.clone(), h.config, h.first).spawn(on_record);
        let err = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn stale_hint_stops_monitor() {
        let h = Harness::new().await;
        let missing = Address::from_bytes([4u8; 32]);
        let (on_record, _rx) = collector();
        let handle = LiveMonitor::new(h.ledger.clone(), h.config, missing).spawn(on_record);
        assert_eq!(handle.join().await, Err(FeedError::StaleHint(missing)));
    }
}

//! Interfaces of the external collaborators the feed engine talks to.
//!
//! The engine never opens connections itself; it is handed something that
//! implements [`Session`] (and, for bootstrap, [`FundingProvider`] and
//! [`ProgramLoader`]).
//!
//! Change notifications are one-shot: [`Session::subscribe`] returns a
//! [`Subscription`] that resolves once, with the account's state after the
//! next committed write. Callers that want to keep following an address must
//! subscribe again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::address::{Address, ProgramId, Signature};
use crate::error::SessionError;
use crate::transaction::Transaction;

/// Per-slot bookkeeping overhead charged on top of the data size.
pub const ACCOUNT_OVERHEAD: u64 = 128;

/// Lamports charged per byte of slot.
pub const LAMPORTS_PER_BYTE: u64 = 10;

/// Balance a payer must provide to allocate a slot of `space` bytes.
pub fn minimum_balance(space: usize) -> u64 {
    (space as u64 + ACCOUNT_OVERHEAD) * LAMPORTS_PER_BYTE
}

/// Raw contents of a ledger slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Program governing the slot.
    pub owner: ProgramId,
    /// Lamports held by the slot.
    pub lamports: u64,
    /// Slot bytes.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Result delivered through a subscription.
pub type Notification = Result<Account, SessionError>;

/// Sending half of a one-shot change notification.
#[derive(Debug)]
pub struct Notifier(oneshot::Sender<Notification>);

impl Notifier {
    /// Deliver the notification. Returns false if the subscriber went away.
    pub fn notify(self, notification: Notification) -> bool {
        self.0.send(notification).is_ok()
    }

    /// Whether the subscriber has dropped its [`Subscription`].
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Resolves once the subscriber drops its [`Subscription`].
    pub async fn closed(&mut self) {
        self.0.closed().await
    }
}

/// Receiving half of a one-shot change notification.
#[derive(Debug)]
pub struct Subscription {
    address: Address,
    rx: oneshot::Receiver<Notification>,
}

impl Subscription {
    /// Create a linked notifier/subscription pair for `address`.
    pub fn channel(address: Address) -> (Notifier, Subscription) {
        let (tx, rx) = oneshot::channel();
        (Notifier(tx), Subscription { address, rx })
    }

    /// The address being watched.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Wait for the next change to the watched address.
    pub async fn changed(self) -> Notification {
        match self.rx.await {
            Ok(notification) => notification,
            Err(_) => Err(SessionError::Transient(format!(
                "subscription to {} closed before delivery",
                self.address.short()
            ))),
        }
    }
}

/// A connection to the ledger.
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch a slot. `Ok(None)` means the address has no backing data.
    async fn fetch_account(&self, address: &Address) -> Result<Option<Account>, SessionError>;

    /// Submit a signed transaction and wait for it to be applied.
    async fn submit(&self, tx: Transaction) -> Result<Signature, SessionError>;

    /// Arm a one-shot change notification for `address`.
    ///
    /// The subscription is armed by the time this returns: any write committed
    /// afterwards will be delivered.
    async fn subscribe(&self, address: &Address) -> Result<Subscription, SessionError>;
}

/// Supplies spendable balance to identities.
#[async_trait]
pub trait FundingProvider: Send + Sync {
    /// Credit `lamports` to `to`.
    async fn airdrop(&self, to: &Address, lamports: u64) -> Result<(), SessionError>;

    /// Current balance of `address`.
    async fn balance(&self, address: &Address) -> Result<u64, SessionError>;
}

/// Makes sure the feed program is deployed.
#[async_trait]
pub trait ProgramLoader: Send + Sync {
    /// Return `known` if it names a deployed program, otherwise deploy one.
    async fn ensure_program(&self, known: Option<ProgramId>) -> Result<ProgramId, SessionError>;
}

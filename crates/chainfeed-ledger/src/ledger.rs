//! In-memory ledger.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chainfeed_core::{
    Account, Address, FundingProvider, Keypair, Notifier, ProgramId, ProgramLoader, RejectReason,
    Session, SessionError, Signature, Subscription, Transaction,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::program;

/// Counters for injected failures.
#[derive(Debug, Default)]
struct Faults {
    failed_submits: usize,
    dropped_responses: usize,
    failed_fetches: usize,
}

impl Faults {
    fn take(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    programs: HashSet<ProgramId>,
    processed: HashSet<Signature>,
    watchers: HashMap<Address, Vec<Notifier>>,
    faults: Faults,
}

impl LedgerState {
    fn commit(&mut self, changes: HashMap<Address, Account>) {
        for (address, account) in changes {
            if let Some(watchers) = self.watchers.remove(&address) {
                for notifier in watchers {
                    notifier.notify(Ok(account.clone()));
                }
            }
            self.accounts.insert(address, account);
        }
    }

    /// Drop notifiers whose subscription has gone away, on every address.
    fn prune_watchers(&mut self) {
        self.watchers.retain(|_, watchers| {
            watchers.retain(|n| !n.is_closed());
            !watchers.is_empty()
        });
    }
}

/// A single-node ledger holding every slot in memory.
///
/// Transactions are applied one at a time under a lock, so two posts racing
/// for the same predecessor are serialized and exactly one wins.
#[derive(Debug, Default)]
pub struct LocalLedger {
    state: Mutex<LedgerState>,
}

impl LocalLedger {
    /// Create an empty ledger with no programs deployed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a fresh copy of the feed program.
    pub async fn deploy_program(&self) -> ProgramId {
        let program = Keypair::generate().address();
        self.state.lock().await.programs.insert(program);
        info!(program = %program, "deployed feed program");
        program
    }

    /// Fail the next `n` submissions with a transient error before they run.
    pub async fn fail_next_submits(&self, n: usize) {
        self.state.lock().await.faults.failed_submits = n;
    }

    /// Apply the next `n` submissions but report a transient error to the caller.
    pub async fn drop_next_responses(&self, n: usize) {
        self.state.lock().await.faults.dropped_responses = n;
    }

    /// Fail the next `n` fetches with a transient error.
    pub async fn fail_next_fetches(&self, n: usize) {
        self.state.lock().await.faults.failed_fetches = n;
    }

    /// Number of slots on the ledger.
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }
}

#[async_trait]
impl Session for LocalLedger {
    async fn fetch_account(&self, address: &Address) -> Result<Option<Account>, SessionError> {
        let mut state = self.state.lock().await;
        if Faults::take(&mut state.faults.failed_fetches) {
            return Err(SessionError::Transient("injected fetch failure".into()));
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn submit(&self, tx: Transaction) -> Result<Signature, SessionError> {
        let mut state = self.state.lock().await;
        if Faults::take(&mut state.faults.failed_submits) {
            return Err(SessionError::Transient("injected submit failure".into()));
        }

        tx.verify()?;
        let id = tx.id().ok_or(RejectReason::MalformedTransaction {
            detail: "transaction is unsigned".into(),
        })?;
        if state.processed.contains(&id) {
            return Err(RejectReason::DuplicateTransaction.into());
        }

        let changes = match program::execute(&state.accounts, &state.programs, &tx) {
            Ok(changes) => changes,
            Err(reason) => {
                debug!(%id, %reason, "transaction rejected");
                return Err(reason.into());
            }
        };
        debug!(%id, slots = changes.len(), "transaction applied");
        state.processed.insert(id);
        state.commit(changes);

        if Faults::take(&mut state.faults.dropped_responses) {
            warn!(%id, "dropping response for applied transaction");
            return Err(SessionError::Transient("response lost".into()));
        }
        Ok(id)
    }

    async fn subscribe(&self, address: &Address) -> Result<Subscription, SessionError> {
        let (notifier, subscription) = Subscription::channel(*address);
        let mut state = self.state.lock().await;
        state.prune_watchers();
        state.watchers.entry(*address).or_default().push(notifier);
        Ok(subscription)
    }
}

#[async_trait]
impl FundingProvider for LocalLedger {
    async fn airdrop(&self, to: &Address, lamports: u64) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let mut account = state.accounts.get(to).cloned().unwrap_or(Account {
            owner: Address::NIL,
            lamports: 0,
            data: Vec::new(),
        });
        account.lamports = account.lamports.saturating_add(lamports);
        state.commit(HashMap::from([(*to, account)]));
        debug!(to = %to.short(), lamports, "airdrop");
        Ok(())
    }

    async fn balance(&self, address: &Address) -> Result<u64, SessionError> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(address).map_or(0, |a| a.lamports))
    }
}

#[async_trait]
impl ProgramLoader for LocalLedger {
    async fn ensure_program(&self, known: Option<ProgramId>) -> Result<ProgramId, SessionError> {
        if let Some(program) = known {
            if self.state.lock().await.programs.contains(&program) {
                return Ok(program);
            }
            warn!(program = %program, "configured program is not deployed");
        }
        Ok(self.deploy_program().await)
    }
}

//! Feed Writer: append records and bootstrap feeds and participants.

use std::sync::Arc;

use chainfeed_core::{
    Address, Instruction, Keypair, ProgramId, Record, RecordData, RejectReason, Session,
    SessionError, Transaction, FIRST_POST, USER_RECORD_LEN,
};
use tracing::{debug, info, warn};

use crate::config::{FeedConfig, RetryConfig};
use crate::error::{FeedError, Result};
use crate::reader::FeedReader;

/// What a retry found out about an earlier attempt that may have landed.
enum Landing {
    Landed,
    Pending,
    Conflict,
}

/// Builds and submits feed transactions, paying for new slots with `payer`.
pub struct FeedWriter<S: Session + ?Sized> {
    session: Arc<S>,
    reader: FeedReader<S>,
    payer: Keypair,
    retry: RetryConfig,
}

impl<S: Session + ?Sized> FeedWriter<S> {
    /// Create a writer.
    pub fn new(session: Arc<S>, payer: Keypair, config: FeedConfig) -> Self {
        Self {
            reader: FeedReader::new(Arc::clone(&session), config),
            session,
            payer,
            retry: config.retry,
        }
    }

    /// Address paying for new slots.
    pub fn payer(&self) -> Address {
        self.payer.address()
    }

    /// Append `text` by `author` after `predecessor` and return the new
    /// record's address.
    ///
    /// `predecessor` must be the current tail. If it is not, or another
    /// writer extends it first, the call fails with a conflict
    /// ([`FeedError::is_conflict`]) and the caller should re-resolve the tail.
    /// If `revoke` is given, that participant is barred from posting in the
    /// same transaction.
    pub async fn post(
        &self,
        author: &Keypair,
        text: &str,
        predecessor: Address,
        revoke: Option<Address>,
    ) -> Result<Address> {
        if predecessor.is_nil() {
            return Err(FeedError::NilAddress);
        }
        RecordData::validate_text(text)?;

        let prev = self.read_predecessor(predecessor).await?;
        if !prev.is_tail() {
            warn!(predecessor = %predecessor.short(), "predecessor is no longer the tail");
            return Err(FeedError::Rejected {
                predecessor,
                reason: RejectReason::NextRecordExists,
            });
        }

        let record = Keypair::generate();
        let tx = Transaction::new(vec![
            Instruction::CreateAccount {
                payer: self.payer.address(),
                new_account: record.address(),
                space: RecordData::encoded_len(text) as u64,
                owner: prev.program,
            },
            Instruction::Post {
                program: prev.program,
                user: author.address(),
                record: record.address(),
                predecessor: Some(predecessor),
                revoke,
                text: text.to_string(),
            },
        ])
        .sign(&[&self.payer, author, &record])
        .map_err(FeedError::signing)?;

        self.submit_with_retry(tx, record.address(), Some(predecessor))
            .await?;
        debug!(
            record = %record.address().short(),
            predecessor = %predecessor.short(),
            "posted record"
        );
        Ok(record.address())
    }

    /// Create a feed whose first record lives at `first`, with `founder` as
    /// its first participant. Returns the first record's address.
    pub async fn create_feed(
        &self,
        program: ProgramId,
        first: &Keypair,
        founder: &Keypair,
    ) -> Result<Address> {
        let tx = Transaction::new(vec![
            Instruction::CreateAccount {
                payer: self.payer.address(),
                new_account: founder.address(),
                space: USER_RECORD_LEN as u64,
                owner: program,
            },
            Instruction::RegisterUser {
                program,
                user: founder.address(),
                feed: first.address(),
            },
            Instruction::CreateAccount {
                payer: self.payer.address(),
                new_account: first.address(),
                space: RecordData::encoded_len(FIRST_POST) as u64,
                owner: program,
            },
            Instruction::Post {
                program,
                user: founder.address(),
                record: first.address(),
                predecessor: None,
                revoke: None,
                text: FIRST_POST.to_string(),
            },
        ])
        .sign(&[&self.payer, founder, first])
        .map_err(FeedError::signing)?;

        self.submit_with_retry(tx, first.address(), None).await?;
        info!(feed = %first.address(), founder = %founder.address().short(), "created feed");
        Ok(first.address())
    }

    /// Create a participant slot for `user` bound to the feed whose first
    /// record key is `feed`.
    pub async fn register_user(
        &self,
        program: ProgramId,
        user: &Keypair,
        feed: &Keypair,
    ) -> Result<()> {
        let tx = Transaction::new(vec![
            Instruction::CreateAccount {
                payer: self.payer.address(),
                new_account: user.address(),
                space: USER_RECORD_LEN as u64,
                owner: program,
            },
            Instruction::RegisterUser {
                program,
                user: user.address(),
                feed: feed.address(),
            },
        ])
        .sign(&[&self.payer, user, feed])
        .map_err(FeedError::signing)?;

        self.submit_with_retry(tx, user.address(), None).await?;
        info!(user = %user.address().short(), feed = %feed.address().short(), "registered user");
        Ok(())
    }

    /// Read the predecessor, retrying transient fetch failures with the
    /// submit policy. Exhaustion is reported as [`FeedError::PostFailed`]
    /// with no submissions made.
    async fn read_predecessor(&self, predecessor: Address) -> Result<Record> {
        let mut last = String::new();
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
            }
            match self.reader.read_record(&predecessor).await {
                Ok(record) => return Ok(record),
                Err(FeedError::Transient(message)) => {
                    warn!(attempt, %message, "transient failure reading predecessor");
                    last = message;
                }
                Err(e) => return Err(e),
            }
        }
        Err(FeedError::PostFailed { attempts: 0, last })
    }

    /// Submit `tx`, retrying transient failures.
    ///
    /// `created` is a slot the transaction allocates. Before each resubmission
    /// the predecessor (or, without one, `created`) is checked to learn
    /// whether an earlier attempt landed or someone else extended the tail.
    /// Only submissions count against the retry budget; failed checks have a
    /// budget of their own.
    async fn submit_with_retry(
        &self,
        tx: Transaction,
        created: Address,
        predecessor: Option<Address>,
    ) -> Result<()> {
        let at = predecessor.unwrap_or(created);
        let mut last = String::new();
        let mut attempts = 0;
        let mut failed_checks = 0;

        while attempts < self.retry.max_attempts {
            if attempts > 0 {
                tokio::time::sleep(self.retry.delay).await;
                match self.check_landing(created, predecessor).await {
                    Ok(Landing::Landed) => {
                        debug!(attempts, "earlier attempt landed");
                        return Ok(());
                    }
                    Ok(Landing::Conflict) => {
                        warn!(predecessor = %at.short(), "tail moved while retrying");
                        return Err(FeedError::Rejected {
                            predecessor: at,
                            reason: RejectReason::NextRecordExists,
                        });
                    }
                    Ok(Landing::Pending) => {}
                    Err(FeedError::Transient(message)) => {
                        warn!(attempts, %message, "could not check earlier attempt");
                        last = message;
                        failed_checks += 1;
                        if failed_checks >= self.retry.max_attempts {
                            break;
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            attempts += 1;
            match self.session.submit(tx.clone()).await {
                Ok(signature) => {
                    debug!(attempts, %signature, "transaction applied");
                    return Ok(());
                }
                Err(SessionError::Rejected(RejectReason::DuplicateTransaction)) if attempts > 1 => {
                    debug!(attempts, "transaction already applied");
                    return Ok(());
                }
                Err(SessionError::Transient(message)) => {
                    warn!(attempts, max = self.retry.max_attempts, %message, "transient submit failure");
                    last = message;
                }
                Err(SessionError::Rejected(reason)) => {
                    if reason == RejectReason::NextRecordExists {
                        warn!(predecessor = %at.short(), "post lost the race for the tail");
                    }
                    return Err(FeedError::Rejected {
                        predecessor: at,
                        reason,
                    });
                }
            }
        }

        Err(FeedError::PostFailed { attempts, last })
    }

    /// Learn the fate of earlier attempts from a single read of the
    /// predecessor. Falls back to looking for `created` when there is no
    /// predecessor or it cannot be found.
    async fn check_landing(
        &self,
        created: Address,
        predecessor: Option<Address>,
    ) -> Result<Landing> {
        if let Some(predecessor) = predecessor {
            match self.reader.read_record(&predecessor).await {
                Ok(prev) if prev.next == created => return Ok(Landing::Landed),
                Ok(prev) if !prev.is_tail() => return Ok(Landing::Conflict),
                Ok(_) => return Ok(Landing::Pending),
                Err(FeedError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let existing = self
            .session
            .fetch_account(&created)
            .await
            .map_err(|e| FeedError::from_session(e, created))?;
        Ok(if existing.is_some() {
            Landing::Landed
        } else {
            Landing::Pending
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Harness;
    use chainfeed_core::{FundingProvider, UserData};
    use chainfeed_ledger::LocalLedger;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn stale_predecessor_is_conflict() {
        let h = Harness::new().await;
        let a = h.post("hello", h.first).await.unwrap();

        let err = h.post("again", h.first).await.unwrap_err();
        assert!(err.is_conflict());

        let records: Vec<_> = h.reader().enumerate(h.first).try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].address, a);
    }

    #[tokio::test]
    async fn concurrent_posts_exactly_one_wins() {
        let h = Harness::new().await;
        let writer_a = h.writer();
        let writer_b = h.writer();
        let (ra, rb) = tokio::join!(
            writer_a.post(&h.user, "from a", h.first, None),
            writer_b.post(&h.user, "from b", h.first, None),
        );
        assert!(ra.is_ok() != rb.is_ok());
        let loser = ra.as_ref().err().or(rb.as_ref().err()).unwrap();
        assert!(loser.is_conflict());

        let winner = ra.or(rb).unwrap();
        let records: Vec<_> = h.reader().enumerate(h.first).try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].next, winner);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let h = Harness::new().await;
        h.ledger.fail_next_submits(2).await;
        let a = h.post("persistent", h.first).await.unwrap();
        assert_eq!(h.reader().read_record(&a).await.unwrap().text, "persistent");
    }

    #[tokio::test]
    async fn retry_budget_exhausted() {
        let h = Harness::new().await;
        h.ledger.fail_next_submits(3).await;
        let err = h.post("never", h.first).await.unwrap_err();
        assert!(matches!(err, FeedError::PostFailed { attempts: 3, .. }));
        assert!(err.needs_tail_refresh());
        assert!(h.reader().read_record(&h.first).await.unwrap().is_tail());
    }

    #[tokio::test]
    async fn lost_response_is_not_posted_twice() {
        let h = Harness::new().await;
        h.ledger.drop_next_responses(1).await;
        let a = h.post("once", h.first).await.unwrap();

        let records: Vec<_> = h.reader().enumerate(h.first).try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].address, a);
    }

    #[tokio::test]
    async fn transient_predecessor_read_is_retried() {
        let h = Harness::new().await;
        h.ledger.fail_next_fetches(1).await;
        let a = h.post("x", h.first).await.unwrap();

        let records: Vec<_> = h.reader().enumerate(h.first).try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].address, a);
    }

    #[tokio::test]
    async fn unreadable_predecessor_fails_without_submitting() {
        let h = Harness::new().await;
        h.ledger.fail_next_fetches(3).await;
        let err = h.post("x", h.first).await.unwrap_err();
        assert!(matches!(err, FeedError::PostFailed { attempts: 0, .. }));
        assert!(err.needs_tail_refresh());
        assert!(h.reader().read_record(&h.first).await.unwrap().is_tail());
    }

    /// Loses the first submission, then applies it right after the next read
    /// completes, so a retry's check sees the chain before the write lands.
    struct LateLanding {
        inner: Arc<LocalLedger>,
        held: tokio::sync::Mutex<Option<Transaction>>,
        lost: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl Session for LateLanding {
        async fn fetch_account(
            &self,
            address: &Address,
        ) -> std::result::Result<Option<chainfeed_core::Account>, SessionError> {
            let result = self.inner.fetch_account(address).await;
            if let Some(tx) = self.held.lock().await.take() {
                self.inner.submit(tx).await?;
            }
            result
        }

        async fn submit(
            &self,
            tx: Transaction,
        ) -> std::result::Result<chainfeed_core::Signature, SessionError> {
            if !self.lost.swap(true, std::sync::atomic::Ordering::SeqCst) {
                *self.held.lock().await = Some(tx);
                return Err(SessionError::Transient("response lost".into()));
            }
            self.inner.submit(tx).await
        }

        async fn subscribe(
            &self,
            address: &Address,
        ) -> std::result::Result<chainfeed_core::Subscription, SessionError> {
            self.inner.subscribe(address).await
        }
    }

    #[tokio::test]
    async fn attempt_landing_during_retry_check_is_success() {
        let h = Harness::new().await;
        let session = Arc::new(LateLanding {
            inner: h.ledger.clone(),
            held: tokio::sync::Mutex::new(None),
            lost: std::sync::atomic::AtomicBool::new(false),
        });
        let writer = FeedWriter::new(session, h.payer_keypair(), h.config);

        let a = writer.post(&h.user, "late", h.first, None).await.unwrap();

        let records: Vec<_> = h.reader().enumerate(h.first).try_collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].next, a);
        assert_eq!(records[1].text, "late");
    }

    #[tokio::test]
    async fn revoke_bars_participant() {
        let h = Harness::new().await;
        let other = Keypair::generate();
        h.writer()
            .register_user(h.program, &other, &h.feed_key)
            .await
            .unwrap();
        let a = h.post("welcome", h.first).await.unwrap();
        let b = h
            .writer()
            .post(&h.user, "goodbye", a, Some(other.address()))
            .await
            .unwrap();

        let err = h.writer().post(&other, "hi", b, None).await.unwrap_err();
        assert_eq!(
            err,
            FeedError::Rejected {
                predecessor: b,
                reason: RejectReason::BannedParticipant {
                    participant: other.address()
                },
            }
        );
        assert!(!err.is_conflict());

        let slot = h.ledger.fetch_account(&other.address()).await.unwrap().unwrap();
        assert!(UserData::decode(&slot.data).unwrap().revoked);
    }

    #[tokio::test]
    async fn invalid_text_fails_locally() {
        let h = Harness::new().await;
        let err = h.post("a\0b", h.first).await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidText(_)));
    }

    #[tokio::test]
    async fn outsider_is_rejected() {
        let h = Harness::new().await;
        let outsider = Keypair::generate();
        let err = h.writer().post(&outsider, "hi", h.first, None).await.unwrap_err();
        assert!(matches!(
            err,
            FeedError::Rejected {
                reason: RejectReason::AccountMissing { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn payer_is_charged() {
        let h = Harness::new().await;
        let before = h.ledger.balance(&h.payer).await.unwrap();
        h.post("x", h.first).await.unwrap();
        let after = h.ledger.balance(&h.payer).await.unwrap();
        assert_eq!(
            before - after,
            chainfeed_core::minimum_balance(RecordData::encoded_len("x"))
        );
    }
}

//! The feed program: how instructions change ledger slots.
//!
//! Instructions run against an [`Overlay`] on top of the committed accounts.
//! Nothing touches committed state until every instruction of a transaction
//! has succeeded, so a rejected transaction leaves no trace.

use std::collections::{HashMap, HashSet};

use chainfeed_core::{
    minimum_balance, Account, Address, Instruction, ProgramId, RecordData, RejectReason,
    Transaction, UserData, MAX_RECORD_LEN,
};
use tracing::trace;

/// Copy-on-write view of the account table.
pub(crate) struct Overlay<'a> {
    base: &'a HashMap<Address, Account>,
    changed: HashMap<Address, Account>,
}

impl<'a> Overlay<'a> {
    pub(crate) fn new(base: &'a HashMap<Address, Account>) -> Self {
        Self {
            base,
            changed: HashMap::new(),
        }
    }

    fn get(&self, address: &Address) -> Option<&Account> {
        self.changed.get(address).or_else(|| self.base.get(address))
    }

    fn get_mut(&mut self, address: &Address) -> Option<&mut Account> {
        if !self.changed.contains_key(address) {
            let account = self.base.get(address)?.clone();
            self.changed.insert(*address, account);
        }
        self.changed.get_mut(address)
    }

    fn insert(&mut self, address: Address, account: Account) {
        self.changed.insert(address, account);
    }

    /// Slots written by the transaction, ready to commit.
    pub(crate) fn into_changes(self) -> HashMap<Address, Account> {
        self.changed
    }

    /// Mutable access to a slot that must be owned by `program`.
    fn owned_mut(&mut self, address: &Address, program: &ProgramId) -> Result<&mut Account, RejectReason> {
        let account = self
            .get_mut(address)
            .ok_or(RejectReason::AccountMissing { account: *address })?;
        if account.owner != *program {
            return Err(RejectReason::WrongOwner { account: *address });
        }
        Ok(account)
    }

    fn read_user(&mut self, address: &Address, program: &ProgramId) -> Result<UserData, RejectReason> {
        let account = self.owned_mut(address, program)?;
        UserData::decode(&account.data).map_err(|e| invalid_data(address, e))
    }

    fn write_user(&mut self, address: &Address, program: &ProgramId, user: &UserData) -> Result<(), RejectReason> {
        let account = self.owned_mut(address, program)?;
        user.encode_into(&mut account.data)
            .map_err(|e| invalid_data(address, e))
    }
}

fn invalid_data(account: &Address, detail: impl ToString) -> RejectReason {
    RejectReason::InvalidAccountData {
        account: *account,
        detail: detail.to_string(),
    }
}

/// Run every instruction of `tx` and return the slots it would write.
pub(crate) fn execute(
    accounts: &HashMap<Address, Account>,
    programs: &HashSet<ProgramId>,
    tx: &Transaction,
) -> Result<HashMap<Address, Account>, RejectReason> {
    if tx.message.instructions.is_empty() {
        return Err(RejectReason::MalformedTransaction {
            detail: "no instructions".into(),
        });
    }

    let mut overlay = Overlay::new(accounts);
    for instruction in &tx.message.instructions {
        apply(&mut overlay, programs, instruction)?;
    }
    Ok(overlay.into_changes())
}

fn ensure_program(programs: &HashSet<ProgramId>, program: &ProgramId) -> Result<(), RejectReason> {
    if programs.contains(program) {
        Ok(())
    } else {
        Err(RejectReason::UnknownProgram { program: *program })
    }
}

fn apply(
    overlay: &mut Overlay<'_>,
    programs: &HashSet<ProgramId>,
    instruction: &Instruction,
) -> Result<(), RejectReason> {
    match instruction {
        Instruction::CreateAccount {
            payer,
            new_account,
            space,
            owner,
        } => {
            ensure_program(programs, owner)?;
            let space = usize::try_from(*space)
                .ok()
                .filter(|s| *s <= MAX_RECORD_LEN)
                .ok_or_else(|| invalid_data(new_account, "requested slot is too large"))?;
            if overlay.get(new_account).is_some() {
                return Err(RejectReason::AccountExists {
                    account: *new_account,
                });
            }

            let needed = minimum_balance(space);
            let payer_account = overlay
                .get_mut(payer)
                .ok_or(RejectReason::AccountMissing { account: *payer })?;
            if payer_account.lamports < needed {
                return Err(RejectReason::InsufficientFunds {
                    needed,
                    available: payer_account.lamports,
                });
            }
            payer_account.lamports -= needed;

            overlay.insert(
                *new_account,
                Account {
                    owner: *owner,
                    lamports: needed,
                    data: vec![0u8; space],
                },
            );
            trace!(account = %new_account.short(), space, "created account");
            Ok(())
        }

        Instruction::RegisterUser { program, user, feed } => {
            ensure_program(programs, program)?;
            let mut data = overlay.read_user(user, program)?;
            data.creator = *feed;
            overlay.write_user(user, program, &data)?;
            trace!(user = %user.short(), feed = %feed.short(), "registered user");
            Ok(())
        }

        Instruction::Post {
            program,
            user,
            record,
            predecessor,
            revoke,
            text,
        } => {
            ensure_program(programs, program)?;
            if text.is_empty() {
                return Err(RejectReason::InvalidText {
                    detail: "empty text".into(),
                });
            }
            RecordData::validate_text(text).map_err(|e| RejectReason::InvalidText {
                detail: e.to_string(),
            })?;

            let author = overlay.read_user(user, program)?;
            if author.revoked {
                return Err(RejectReason::BannedParticipant { participant: *user });
            }

            let creator = match predecessor {
                Some(predecessor) => {
                    let account = overlay.owned_mut(predecessor, program)?;
                    let mut prev = RecordData::decode(&account.data)
                        .map_err(|e| invalid_data(predecessor, e))?;
                    if !prev.next.is_nil() {
                        return Err(RejectReason::NextRecordExists);
                    }
                    prev.next = *record;
                    prev.encode_into(&mut account.data)
                        .map_err(|e| invalid_data(predecessor, e))?;

                    if let Some(revoked) = revoke {
                        let mut target = overlay.read_user(revoked, program)?;
                        target.revoked = true;
                        overlay.write_user(revoked, program, &target)?;
                        trace!(participant = %revoked.short(), "revoked participant");
                    }
                    prev.creator
                }
                // A record without predecessor opens a new feed and names it.
                None => *record,
            };

            if author.creator != creator {
                return Err(RejectReason::CreatorMismatch);
            }

            let account = overlay.owned_mut(record, program)?;
            if account.data.iter().any(|&b| b != 0) {
                return Err(invalid_data(record, "record already written"));
            }
            let data = RecordData {
                next: Address::NIL,
                author: *user,
                creator,
                text: text.clone(),
            };
            data.encode_into(&mut account.data)
                .map_err(|e| invalid_data(record, e))?;
            trace!(record = %record.short(), "wrote record");
            Ok(())
        }
    }
}

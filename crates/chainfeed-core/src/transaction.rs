//! Transactions and signing.
//!
//! A [`Transaction`] is an ordered list of [`Instruction`]s that the ledger
//! applies all-or-nothing. Every instruction names the addresses that must
//! sign it; the transaction carries one signature per distinct signer over
//! the blake3 hash of the JSON-encoded [`Message`].

use serde::{Deserialize, Serialize};

use crate::address::{Address, Keypair, ProgramId, Signature};
use crate::error::{RejectReason, SignError};

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Allocate a zero-filled slot owned by `owner`, paid for by `payer`.
    CreateAccount {
        payer: Address,
        new_account: Address,
        space: u64,
        owner: ProgramId,
    },
    /// Bind a participant slot to the feed whose first record is `feed`.
    RegisterUser {
        program: ProgramId,
        user: Address,
        feed: Address,
    },
    /// Write `text` into `record` and link it from `predecessor`.
    Post {
        program: ProgramId,
        user: Address,
        record: Address,
        predecessor: Option<Address>,
        revoke: Option<Address>,
        text: String,
    },
}

impl Instruction {
    /// Addresses that must sign a transaction containing this instruction.
    pub fn signers(&self) -> [Address; 2] {
        match self {
            Self::CreateAccount {
                payer, new_account, ..
            } => [*payer, *new_account],
            Self::RegisterUser { user, feed, .. } => [*user, *feed],
            Self::Post { user, record, .. } => [*user, *record],
        }
    }
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Random value so identical instruction lists hash differently.
    pub nonce: u64,
    pub instructions: Vec<Instruction>,
}

impl Message {
    /// Hash signed by every signer.
    pub fn hash(&self) -> Result<[u8; 32], SignError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }

    /// Distinct required signers, in first-appearance order.
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = Vec::new();
        for signer in self.instructions.iter().flat_map(Instruction::signers) {
            if !signers.contains(&signer) {
                signers.push(signer);
            }
        }
        signers
    }
}

/// A signature attached to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer: Address,
    pub signature: Signature,
}

/// A message plus its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub message: Message,
    pub signatures: Vec<SignatureEntry>,
}

impl Transaction {
    /// Build an unsigned transaction.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            message: Message {
                nonce: rand::random(),
                instructions,
            },
            signatures: Vec::new(),
        }
    }

    /// Sign with every required signer, picking keys from `keys`.
    ///
    /// Keys that are not required are ignored.
    pub fn sign(mut self, keys: &[&Keypair]) -> Result<Self, SignError> {
        let hash = self.message.hash()?;
        let mut signatures = Vec::new();
        for signer in self.message.required_signers() {
            let key = keys
                .iter()
                .find(|k| k.address() == signer)
                .ok_or(SignError::MissingSigner(signer))?;
            signatures.push(SignatureEntry {
                signer,
                signature: key.sign(&hash),
            });
        }
        self.signatures = signatures;
        Ok(self)
    }

    /// Identifier of the transaction: the first signature.
    pub fn id(&self) -> Option<Signature> {
        self.signatures.first().map(|s| s.signature)
    }

    /// Check that every required signer has a valid signature.
    pub fn verify(&self) -> Result<(), RejectReason> {
        let hash = self
            .message
            .hash()
            .map_err(|e| RejectReason::MalformedTransaction {
                detail: e.to_string(),
            })?;
        for signer in self.message.required_signers() {
            let entry = self
                .signatures
                .iter()
                .find(|s| s.signer == signer)
                .ok_or(RejectReason::MissingSignature { signer })?;
            if !signer.verify(&hash, &entry.signature) {
                return Err(RejectReason::InvalidSignature { signer });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(user: &Keypair, record: &Keypair) -> Instruction {
        Instruction::Post {
            program: Address::from_bytes([9u8; 32]),
            user: user.address(),
            record: record.address(),
            predecessor: None,
            revoke: None,
            text: "hello".into(),
        }
    }

    #[test]
    fn required_signers_deduplicated() {
        let payer = Keypair::generate();
        let record = Keypair::generate();
        let user = Keypair::generate();
        let tx = Transaction::new(vec![
            Instruction::CreateAccount {
                payer: payer.address(),
                new_account: record.address(),
                space: 128,
                owner: Address::from_bytes([9u8; 32]),
            },
            post(&user, &record),
        ]);
        assert_eq!(
            tx.message.required_signers(),
            vec![payer.address(), record.address(), user.address()]
        );
    }

    #[test]
    fn sign_and_verify() {
        let user = Keypair::generate();
        let record = Keypair::generate();
        let tx = Transaction::new(vec![post(&user, &record)])
            .sign(&[&user, &record])
            .unwrap();
        assert_eq!(tx.signatures.len(), 2);
        assert!(tx.verify().is_ok());
        assert_eq!(tx.id(), Some(tx.signatures[0].signature));
    }

    #[test]
    fn missing_signer() {
        let user = Keypair::generate();
        let record = Keypair::generate();
        let err = Transaction::new(vec![post(&user, &record)])
            .sign(&[&user])
            .unwrap_err();
        assert!(matches!(err, SignError::MissingSigner(a) if a == record.address()));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let user = Keypair::generate();
        let record = Keypair::generate();
        let mut tx = Transaction::new(vec![post(&user, &record)])
            .sign(&[&user, &record])
            .unwrap();
        if let Instruction::Post { text, .. } = &mut tx.message.instructions[0] {
            *text = "goodbye".into();
        }
        assert!(matches!(
            tx.verify(),
            Err(RejectReason::InvalidSignature { .. })
        ));
    }

    #[test]
    fn json_roundtrip() {
        let user = Keypair::generate();
        let record = Keypair::generate();
        let tx = Transaction::new(vec![post(&user, &record)])
            .sign(&[&user, &record])
            .unwrap();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify().is_ok());
    }
}

//! Feed record layout.
//!
//! A record slot holds a fixed-width header followed by NUL-terminated text:
//!
//! ```text
//! offset  size  field
//! 0       32    next     address of the successor, or nil
//! 32      32    author   participant that posted the record
//! 64      32    creator  first record of the feed this record belongs to
//! 96      n     text     UTF-8, no interior NUL
//! 96+n    1     0x00     terminator
//! ```
//!
//! Bytes after the terminator are ignored, so a slot may be larger than
//! the record it holds.

use crate::address::{Address, ProgramId, ADDRESS_LEN};
use crate::error::CodecError;
use crate::session::Account;

/// Size of the fixed header (next, author, creator).
pub const RECORD_HEADER_LEN: usize = 3 * ADDRESS_LEN;

/// Smallest valid record: header plus the terminator of an empty text.
pub const MIN_RECORD_LEN: usize = RECORD_HEADER_LEN + 1;

/// Largest slot the ledger will allocate.
pub const MAX_RECORD_LEN: usize = 10 * 1024 * 1024;

const NEXT_OFFSET: usize = 0;
const AUTHOR_OFFSET: usize = ADDRESS_LEN;
const CREATOR_OFFSET: usize = 2 * ADDRESS_LEN;

/// The decoded payload of a record slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordData {
    pub next: Address,
    pub author: Address,
    pub creator: Address,
    pub text: String,
}

impl RecordData {
    /// A fresh tail record with no creator assigned yet.
    pub fn new(text: impl Into<String>, author: Address) -> Self {
        Self {
            next: Address::NIL,
            author,
            creator: Address::NIL,
            text: text.into(),
        }
    }

    /// Number of bytes `text` occupies once encoded.
    pub fn encoded_len(text: &str) -> usize {
        RECORD_HEADER_LEN + text.len() + 1
    }

    /// Check that `text` can be encoded.
    pub fn validate_text(text: &str) -> Result<(), CodecError> {
        if text.as_bytes().contains(&0) {
            return Err(CodecError::InteriorNul);
        }
        let len = Self::encoded_len(text);
        if len > MAX_RECORD_LEN {
            return Err(CodecError::TooLarge {
                len,
                max: MAX_RECORD_LEN,
            });
        }
        Ok(())
    }

    /// Encode into a freshly allocated buffer of exactly [`Self::encoded_len`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![0u8; Self::encoded_len(&self.text)];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode into an existing slot, zeroing whatever follows the terminator.
    pub fn encode_into(&self, slot: &mut [u8]) -> Result<(), CodecError> {
        Self::validate_text(&self.text)?;
        let needed = Self::encoded_len(&self.text);
        if slot.len() < needed {
            return Err(CodecError::SlotTooSmall {
                len: slot.len(),
                needed,
            });
        }

        slot[NEXT_OFFSET..AUTHOR_OFFSET].copy_from_slice(self.next.as_bytes());
        slot[AUTHOR_OFFSET..CREATOR_OFFSET].copy_from_slice(self.author.as_bytes());
        slot[CREATOR_OFFSET..RECORD_HEADER_LEN].copy_from_slice(self.creator.as_bytes());

        let text = self.text.as_bytes();
        slot[RECORD_HEADER_LEN..RECORD_HEADER_LEN + text.len()].copy_from_slice(text);
        slot[RECORD_HEADER_LEN + text.len()..].fill(0);
        Ok(())
    }

    /// Decode a record slot.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < MIN_RECORD_LEN {
            return Err(CodecError::Truncated {
                len: data.len(),
                min: MIN_RECORD_LEN,
            });
        }

        let body = &data[RECORD_HEADER_LEN..];
        let end = body
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::MissingTerminator)?;
        let text = std::str::from_utf8(&body[..end])?.to_owned();

        Ok(Self {
            next: Address::read(&data[NEXT_OFFSET..]),
            author: Address::read(&data[AUTHOR_OFFSET..]),
            creator: Address::read(&data[CREATOR_OFFSET..]),
            text,
        })
    }
}

/// A record as seen by a reader: its payload plus where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Slot holding this record.
    pub address: Address,
    /// Program governing the slot.
    pub program: ProgramId,
    /// Successor, or nil at the tail.
    pub next: Address,
    /// Participant that posted it.
    pub author: Address,
    /// First record of the feed.
    pub creator: Address,
    /// Message text.
    pub text: String,
}

impl Record {
    /// Decode the record stored in `account` at `address`.
    pub fn from_account(address: Address, account: &Account) -> Result<Self, CodecError> {
        let data = RecordData::decode(&account.data)?;
        Ok(Self {
            address,
            program: account.owner,
            next: data.next,
            author: data.author,
            creator: data.creator,
            text: data.text,
        })
    }

    /// Whether this record is currently the tail of its feed.
    pub fn is_tail(&self) -> bool {
        self.next.is_nil()
    }
}

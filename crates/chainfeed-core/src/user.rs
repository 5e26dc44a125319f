//! Participant record layout: a revoked flag followed by the feed it belongs to.

use crate::address::{Address, ADDRESS_LEN};
use crate::error::CodecError;

/// Size of a participant slot.
pub const USER_RECORD_LEN: usize = 1 + ADDRESS_LEN;

/// Decoded participant slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserData {
    /// Set once the participant may no longer post.
    pub revoked: bool,
    /// First record of the feed this participant may post to.
    pub creator: Address,
}

impl UserData {
    /// Encode into a fixed-size buffer.
    pub fn encode(&self) -> [u8; USER_RECORD_LEN] {
        let mut buf = [0u8; USER_RECORD_LEN];
        buf[0] = u8::from(self.revoked);
        buf[1..].copy_from_slice(self.creator.as_bytes());
        buf
    }

    /// Encode into the head of an existing slot.
    pub fn encode_into(&self, slot: &mut [u8]) -> Result<(), CodecError> {
        if slot.len() < USER_RECORD_LEN {
            return Err(CodecError::SlotTooSmall {
                len: slot.len(),
                needed: USER_RECORD_LEN,
            });
        }
        slot[..USER_RECORD_LEN].copy_from_slice(&self.encode());
        Ok(())
    }

    /// Decode a participant slot.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < USER_RECORD_LEN {
            return Err(CodecError::Truncated {
                len: data.len(),
                min: USER_RECORD_LEN,
            });
        }
        let revoked = match data[0] {
            0 => false,
            1 => true,
            other => return Err(CodecError::InvalidFlag(other)),
        };
        Ok(Self {
            revoked,
            creator: Address::read(&data[1..]),
        })
    }
}

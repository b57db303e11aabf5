//! Inbox messages.
//!
//! A message is constructed by deserializing a canonical value of the
//! shape `(Int sender, Int block_height, payload)`. Deserialization either
//! fully succeeds or the message is rejected; there is no partial accept.

use crate::error::{Result, VmError};
use crate::value::hash::{chain, Digest32, EMPTY_CHAIN};
use crate::value::{self, Tuple, Value};
use ethnum::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Onchain = 0,
    Offchain = 1,
}

impl Origin {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Origin::Onchain),
            1 => Some(Origin::Offchain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: U256,
    pub block_height: u64,
    pub origin: Origin,
    pub payload: Value,
}

impl Message {
    /// Validates the message shape of a decoded value. The origin comes
    /// from the ingestion path, never from the payload itself.
    pub fn from_value(value: Value, origin: Origin) -> Result<Self> {
        let Value::Tuple(tuple) = value else {
            return Err(VmError::InvalidMessage("message must be a 3-tuple"));
        };
        match tuple.elements() {
            [Value::Int(sender), Value::Int(block), payload] => {
                if *block > U256::from(u64::MAX) {
                    return Err(VmError::InvalidMessage("block height out of range"));
                }
                Ok(Message {
                    sender: *sender,
                    block_height: block.as_u64(),
                    origin,
                    payload: payload.clone(),
                })
            }
            _ => Err(VmError::InvalidMessage("message must be a 3-tuple")),
        }
    }

    /// Decodes a canonical payload into a message.
    pub fn decode(bytes: &[u8], origin: Origin) -> Result<Self> {
        Message::from_value(value::decode(bytes)?, origin)
    }

    /// The value the machine's inbox instruction pushes for this message.
    pub fn to_value(&self) -> Value {
        Value::Tuple(Tuple::new_unchecked(vec![
            Value::Int(self.sender),
            Value::from_u64(self.block_height),
            self.payload.clone(),
        ]))
    }

    /// Writes the framed binary form used by snapshots and proofs:
    /// 32-byte sender, u64 block height, origin byte, length-prefixed
    /// canonical payload. All big-endian.
    pub(crate) fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sender.to_be_bytes());
        out.extend_from_slice(&self.block_height.to_be_bytes());
        out.push(self.origin.as_u8());
        crate::value::encode::write_length_prefixed(&self.payload, out);
    }

    /// Reads the framed binary form written by [`Message::write_into`].
    pub(crate) fn read_from(rdr: &mut std::io::Cursor<&[u8]>) -> Result<Self> {
        use byteorder::{BigEndian, ReadBytesExt};

        let mut sender = [0u8; 32];
        std::io::Read::read_exact(rdr, &mut sender)?;
        let block_height = rdr.read_u64::<BigEndian>()?;
        let raw_origin = rdr.read_u8()?;
        let origin = Origin::from_u8(raw_origin)
            .ok_or(VmError::InvalidMessage("unknown origin byte"))?;
        let payload = crate::value::decode::read_length_prefixed(rdr)?;
        Ok(Message {
            sender: U256::from_be_bytes(sender),
            block_height,
            origin,
            payload,
        })
    }

    pub fn hash(&self) -> Digest32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.sender.to_be_bytes());
        hasher.update(&self.block_height.to_be_bytes());
        hasher.update(&[self.origin.as_u8()]);
        hasher.update(&self.payload.hash());
        hasher.finalize().into()
    }
}

/// Chained digest over an ordered message sequence.
pub fn chain_messages(messages: &[Message]) -> Digest32 {
    let mut acc = EMPTY_CHAIN;
    for message in messages {
        acc = chain(&acc, &message.hash());
    }
    acc
}

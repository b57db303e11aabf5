//! Snapshot encoding.
//!
//! Layout (big-endian):
//!   [4]   magic "VMSN"
//!   [u32] format version
//!   [u32 + bytes] program image
//!   [u64] pc
//!   [u8]  status
//!   [u64] step count
//!   [u64] inbox read cursor
//!   [u32 + values] stack, bottom first, length-prefixed canonical values
//!   [u32 + values] auxiliary area, bottom first
//!   [u32 + messages] delivered messages, framed
//!   [u32 + messages] pending messages, framed
//!   [u8]  last block reason tag, plus the awaited value when inbox-blocked

use crate::error::Result;
use crate::machine::{BlockReason, Machine};
use crate::message::Message;
use crate::value::{encode, Value};
use byteorder::{BigEndian, WriteBytesExt};

pub(crate) const REASON_NOT_BLOCKED: u8 = 0;
pub(crate) const REASON_HALTED: u8 = 1;
pub(crate) const REASON_ERROR: u8 = 2;
pub(crate) const REASON_BREAKPOINT: u8 = 3;
pub(crate) const REASON_INBOX: u8 = 4;

pub fn serialize(machine: &Machine) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(super::MAGIC);
    out.write_u32::<BigEndian>(super::FORMAT_V1)?;

    let image = machine.program.image();
    out.write_u32::<BigEndian>(image.len() as u32)?;
    out.extend_from_slice(image);

    out.write_u64::<BigEndian>(machine.pc)?;
    out.write_u8(machine.status.as_u8())?;
    out.write_u64::<BigEndian>(machine.step_count)?;
    out.write_u64::<BigEndian>(machine.inbox.read_cursor())?;

    write_values(&machine.stack, &mut out)?;
    write_values(&machine.aux, &mut out)?;
    write_messages(machine.inbox.delivered(), &mut out)?;
    write_messages(machine.inbox.pending(), &mut out)?;

    match &machine.last_reason {
        BlockReason::NotBlocked => out.write_u8(REASON_NOT_BLOCKED)?,
        BlockReason::Halted => out.write_u8(REASON_HALTED)?,
        BlockReason::Error => out.write_u8(REASON_ERROR)?,
        BlockReason::Breakpoint => out.write_u8(REASON_BREAKPOINT)?,
        BlockReason::InboxBlocked(awaited) => {
            out.write_u8(REASON_INBOX)?;
            encode::write_length_prefixed(awaited, &mut out);
        }
    }

    Ok(out)
}

fn write_values(values: &[Value], out: &mut Vec<u8>) -> Result<()> {
    out.write_u32::<BigEndian>(values.len() as u32)?;
    for value in values {
        encode::write_length_prefixed(value, out);
    }
    Ok(())
}

fn write_messages(messages: &[Message], out: &mut Vec<u8>) -> Result<()> {
    out.write_u32::<BigEndian>(messages.len() as u32)?;
    for message in messages {
        message.write_into(out);
    }
    Ok(())
}

//! Snapshot decoding with strict validation.
//!
//! Every tag byte is checked, the read cursor must not run past the
//! delivered segment, and trailing bytes fail the whole decode. A failed
//! decode never yields a machine.

use super::encode::{
    REASON_BREAKPOINT, REASON_ERROR, REASON_HALTED, REASON_INBOX, REASON_NOT_BLOCKED,
};
use crate::error::{Result, VmError};
use crate::inbox::Inbox;
use crate::machine::{BlockReason, Machine, Status};
use crate::message::Message;
use crate::program::Program;
use crate::value::{decode, Value};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

pub fn deserialize(bytes: &[u8]) -> Result<Machine> {
    if bytes.len() < super::MAGIC.len() || &bytes[..super::MAGIC.len()] != super::MAGIC {
        return Err(VmError::InvalidSnapshot("bad magic".to_string()));
    }
    let mut rdr = Cursor::new(&bytes[super::MAGIC.len()..]);

    let version = rdr.read_u32::<BigEndian>()?;
    if version != super::FORMAT_V1 {
        return Err(VmError::InvalidSnapshot(format!(
            "unsupported snapshot version: {version}"
        )));
    }

    let image_len = rdr.read_u32::<BigEndian>()? as usize;
    let start = rdr.position() as usize;
    let buf = *rdr.get_ref();
    if start + image_len > buf.len() {
        return Err(VmError::InvalidSnapshot("truncated program image".to_string()));
    }
    let program = Program::from_image(&buf[start..start + image_len])?;
    rdr.set_position((start + image_len) as u64);

    let pc = rdr.read_u64::<BigEndian>()?;
    let raw_status = rdr.read_u8()?;
    let status = Status::from_u8(raw_status).ok_or_else(|| {
        VmError::InvalidSnapshot(format!("unknown status byte: {raw_status:#04x}"))
    })?;
    let step_count = rdr.read_u64::<BigEndian>()?;
    let read_cursor = rdr.read_u64::<BigEndian>()?;

    let stack = read_values(&mut rdr)?;
    let aux = read_values(&mut rdr)?;
    let delivered = read_messages(&mut rdr)?;
    let pending = read_messages(&mut rdr)?;

    if read_cursor > delivered.len() as u64 {
        return Err(VmError::InvalidSnapshot(format!(
            "read cursor {read_cursor} past delivered count {}",
            delivered.len()
        )));
    }

    let raw_reason = rdr.read_u8()?;
    let last_reason = match raw_reason {
        REASON_NOT_BLOCKED => BlockReason::NotBlocked,
        REASON_HALTED => BlockReason::Halted,
        REASON_ERROR => BlockReason::Error,
        REASON_BREAKPOINT => BlockReason::Breakpoint,
        REASON_INBOX => BlockReason::InboxBlocked(decode::read_length_prefixed(&mut rdr)?),
        b => {
            return Err(VmError::InvalidSnapshot(format!(
                "unknown block reason byte: {b:#04x}"
            )))
        }
    };

    let consumed = super::MAGIC.len() + rdr.position() as usize;
    if consumed != bytes.len() {
        return Err(VmError::InvalidSnapshot(format!(
            "{} trailing bytes after snapshot",
            bytes.len() - consumed
        )));
    }

    Ok(Machine::from_parts(
        program,
        pc,
        stack,
        aux,
        Inbox::from_parts(delivered, pending, read_cursor),
        status,
        step_count,
        last_reason,
    ))
}

fn read_values(rdr: &mut Cursor<&[u8]>) -> Result<Vec<Value>> {
    let count = rdr.read_u32::<BigEndian>()? as usize;
    let mut values = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        values.push(decode::read_length_prefixed(rdr)?);
    }
    Ok(values)
}

fn read_messages(rdr: &mut Cursor<&[u8]>) -> Result<Vec<Message>> {
    let count = rdr.read_u32::<BigEndian>()? as usize;
    let mut messages = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        messages.push(Message::read_from(rdr)?);
    }
    Ok(messages)
}

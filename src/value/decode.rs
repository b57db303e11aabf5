//! Canonical value decoding.
//!
//! Decoding either fully succeeds or fails: unknown tags, over-arity
//! tuples, truncated input and trailing bytes are all rejected.

use super::encode::{TAG_CODEPOINT, TAG_INT, TAG_TUPLE_BASE};
use super::{CodePoint, Tuple, Value, MAX_TUPLE_ARITY};
use crate::error::{Result, VmError};
use ethnum::U256;

/// Decodes a single canonical value occupying the whole input.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut offset = 0;
    let value = decode_at(bytes, &mut offset)?;
    if offset != bytes.len() {
        return Err(VmError::TrailingBytes(bytes.len() - offset));
    }
    Ok(value)
}

/// Decodes one value starting at `offset`, advancing it past the encoding.
pub(crate) fn decode_at(bytes: &[u8], offset: &mut usize) -> Result<Value> {
    let tag = read_u8(bytes, offset)?;
    match tag {
        TAG_INT => {
            let raw = read_array::<32>(bytes, offset)?;
            Ok(Value::Int(U256::from_be_bytes(raw)))
        }
        TAG_CODEPOINT => {
            let pc = u64::from_be_bytes(read_array::<8>(bytes, offset)?);
            let opcode = read_u8(bytes, offset)?;
            Ok(Value::CodePoint(CodePoint { pc, opcode }))
        }
        t if t >= TAG_TUPLE_BASE && t <= TAG_TUPLE_BASE + MAX_TUPLE_ARITY as u8 => {
            let arity = (t - TAG_TUPLE_BASE) as usize;
            let mut elements = Vec::with_capacity(arity);
            for _ in 0..arity {
                elements.push(decode_at(bytes, offset)?);
            }
            Ok(Value::Tuple(Tuple::new(elements)?))
        }
        t => Err(VmError::UnknownTag(t)),
    }
}

/// Reads a value written by [`super::encode::write_length_prefixed`].
pub(crate) fn read_length_prefixed(rdr: &mut std::io::Cursor<&[u8]>) -> Result<Value> {
    use byteorder::{BigEndian, ReadBytesExt};

    let len = rdr.read_u32::<BigEndian>()? as usize;
    let start = rdr.position() as usize;
    let buf = *rdr.get_ref();
    if start + len > buf.len() {
        return Err(VmError::Truncated);
    }
    let value = decode(&buf[start..start + len])?;
    rdr.set_position((start + len) as u64);
    Ok(value)
}

fn read_u8(bytes: &[u8], offset: &mut usize) -> Result<u8> {
    let b = *bytes.get(*offset).ok_or(VmError::Truncated)?;
    *offset += 1;
    Ok(b)
}

fn read_array<const N: usize>(bytes: &[u8], offset: &mut usize) -> Result<[u8; N]> {
    if *offset + N > bytes.len() {
        return Err(VmError::Truncated);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[*offset..*offset + N]);
    *offset += N;
    Ok(out)
}

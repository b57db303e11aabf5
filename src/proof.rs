//! One-step proof marshalling.
//!
//! The proof is the minimal witness a third party needs to verify the next
//! single step without the full machine: the next instruction, the operands
//! it reads, chained digests of everything underneath them, and the inbox
//! commitment. Recombining the witness yields the full machine hash, which
//! keeps the proof consistent with the hashing scheme by construction.
//!
//! Layout (big-endian):
//!   [u8]  proof format version
//!   [32]  program hash
//!   [u64] pc
//!   [u8]  status
//!   [u8]  instruction present; if 1: [u8] opcode, [u8] immediate flag,
//!         optional length-prefixed immediate
//!   [u8]  stack operand count, then length-prefixed operands (top first)
//!   [32]  chained digest of the stack below the operands
//!   [u8]  aux operand count, then length-prefixed operands (top first)
//!   [32]  chained digest of the aux area below the operands
//!   [u8]  inbox message witness present; if 1: framed message
//!   [32]  delivered inbox digest
//!   [32]  pending queue digest
//!   [u64] read cursor

use crate::error::{Result, VmError};
use crate::machine::{compose_state_hash, Machine, Status};
use crate::message::Message;
use crate::program::Opcode;
use crate::value::hash::{chain, Digest32};
use crate::value::{decode, encode, Value};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub const PROOF_V1: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProof {
    pub program_hash: Digest32,
    pub pc: u64,
    pub status: Status,
    pub instruction: Option<(Opcode, Option<Value>)>,
    /// Stack operands the next instruction reads, top first.
    pub stack_operands: Vec<Value>,
    /// Chained digest of the stack below the operands.
    pub stack_rest_hash: Digest32,
    /// Aux operands the next instruction reads, top first.
    pub aux_operands: Vec<Value>,
    pub aux_rest_hash: Digest32,
    /// The message an `Inbox` instruction would consume, when available.
    pub inbox_witness: Option<Message>,
    pub delivered_hash: Digest32,
    pub pending_hash: Digest32,
    pub read_cursor: u64,
}

/// Canonical encoding of the minimal state needed to verify the next step.
/// Pure: derives everything from the current machine state.
pub fn marshal_for_proof(machine: &Machine) -> Vec<u8> {
    let instruction = machine.program.instruction(machine.pc);
    let (stack_reads, aux_reads) = match instruction {
        Some(i) => (i.opcode.stack_reads(), i.opcode.aux_reads()),
        None => (0, 0),
    };
    let stack_reads = stack_reads.min(machine.stack.len());
    let aux_reads = aux_reads.min(machine.aux.len());

    let mut out = Vec::new();
    out.push(PROOF_V1);
    out.extend_from_slice(&machine.program.image_hash());
    out.extend_from_slice(&machine.pc.to_be_bytes());
    out.push(machine.status.as_u8());

    match instruction {
        Some(i) => {
            out.push(1);
            out.push(i.opcode.as_u8());
            match &i.immediate {
                Some(imm) => {
                    out.push(1);
                    encode::write_length_prefixed(imm, &mut out);
                }
                None => out.push(0),
            }
        }
        None => out.push(0),
    }

    write_operands(&machine.stack, stack_reads, &mut out);
    write_operands(&machine.aux, aux_reads, &mut out);

    let witness = match instruction.map(|i| i.opcode) {
        Some(Opcode::Inbox) => machine.inbox.next_unread(),
        _ => None,
    };
    match witness {
        Some(message) => {
            out.push(1);
            message.write_into(&mut out);
        }
        None => out.push(0),
    }

    out.extend_from_slice(&machine.inbox.hash());
    out.extend_from_slice(&machine.inbox.pending_hash());
    out.extend_from_slice(&machine.inbox.read_cursor().to_be_bytes());
    out
}

impl StepProof {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(bytes);

        let version = rdr.read_u8()?;
        if version != PROOF_V1 {
            return Err(VmError::InvalidSnapshot(format!(
                "unsupported proof version: {version}"
            )));
        }
        let program_hash = read_digest(&mut rdr)?;
        let pc = rdr.read_u64::<BigEndian>()?;
        let raw_status = rdr.read_u8()?;
        let status = Status::from_u8(raw_status).ok_or_else(|| {
            VmError::InvalidSnapshot(format!("unknown status byte: {raw_status:#04x}"))
        })?;

        let instruction = match rdr.read_u8()? {
            0 => None,
            1 => {
                let raw = rdr.read_u8()?;
                let opcode = Opcode::from_u8(raw).ok_or(VmError::UnknownOpcode(raw))?;
                let immediate = match rdr.read_u8()? {
                    0 => None,
                    1 => Some(decode::read_length_prefixed(&mut rdr)?),
                    b => {
                        return Err(VmError::InvalidSnapshot(format!(
                            "bad immediate flag: {b:#04x}"
                        )))
                    }
                };
                Some((opcode, immediate))
            }
            b => return Err(VmError::InvalidSnapshot(format!("bad presence flag: {b:#04x}"))),
        };

        let stack_operands = read_operands(&mut rdr)?;
        let stack_rest_hash = read_digest(&mut rdr)?;
        let aux_operands = read_operands(&mut rdr)?;
        let aux_rest_hash = read_digest(&mut rdr)?;

        let inbox_witness = match rdr.read_u8()? {
            0 => None,
            1 => Some(Message::read_from(&mut rdr)?),
            b => return Err(VmError::InvalidSnapshot(format!("bad presence flag: {b:#04x}"))),
        };

        let delivered_hash = read_digest(&mut rdr)?;
        let pending_hash = read_digest(&mut rdr)?;
        let read_cursor = rdr.read_u64::<BigEndian>()?;

        if rdr.position() as usize != bytes.len() {
            return Err(VmError::InvalidSnapshot(
                "trailing bytes after proof".to_string(),
            ));
        }

        Ok(StepProof {
            program_hash,
            pc,
            status,
            instruction,
            stack_operands,
            stack_rest_hash,
            aux_operands,
            aux_rest_hash,
            inbox_witness,
            delivered_hash,
            pending_hash,
            read_cursor,
        })
    }

    /// Recombines the witness into the full machine hash. A verifier checks
    /// this digest against the `hash` reported for the machine.
    pub fn state_hash(&self) -> Digest32 {
        let stack_hash = recombine(&self.stack_rest_hash, &self.stack_operands);
        let aux_hash = recombine(&self.aux_rest_hash, &self.aux_operands);
        compose_state_hash(
            &self.program_hash,
            self.pc,
            &stack_hash,
            &aux_hash,
            self.status,
            &self.delivered_hash,
            &self.pending_hash,
            self.read_cursor,
        )
    }
}

/// Writes `count` operands from the top of `values`, top first.
fn write_operands(values: &[Value], count: usize, out: &mut Vec<u8>) {
    out.push(count as u8);
    for value in values.iter().rev().take(count) {
        encode::write_length_prefixed(value, out);
    }
    let rest = &values[..values.len() - count];
    out.extend_from_slice(&crate::value::chain_values(rest));
}

fn read_operands(rdr: &mut Cursor<&[u8]>) -> Result<Vec<Value>> {
    let count = rdr.read_u8()? as usize;
    let mut operands = Vec::with_capacity(count);
    for _ in 0..count {
        operands.push(decode::read_length_prefixed(rdr)?);
    }
    Ok(operands)
}

fn read_digest(rdr: &mut Cursor<&[u8]>) -> Result<Digest32> {
    let mut digest = [0u8; 32];
    rdr.read_exact(&mut digest)?;
    Ok(digest)
}

/// Rebuilds a full chained digest from the below-operands digest and the
/// operands (top first).
fn recombine(rest: &Digest32, operands_top_first: &[Value]) -> Digest32 {
    let mut acc = *rest;
    for value in operands_top_first.iter().rev() {
        acc = chain(&acc, &value.hash());
    }
    acc
}

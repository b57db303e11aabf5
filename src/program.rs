//! Program images.
//!
//! A program is loaded once from an immutable image and shared between
//! machine clones. The image format is strict and all-or-nothing: a
//! structurally invalid image never yields a partially constructed program.
//!
//! Image layout (big-endian):
//!   [4]  magic "VPRG"
//!   [u32] format version
//!   [u32] instruction count
//!   per instruction:
//!     [u8] opcode
//!     [u8] immediate flag (must match the opcode's requirement)
//!     [u32 + bytes] canonical immediate value, when flagged

use crate::error::{Result, VmError};
use crate::value::{self, Digest32, Value};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub const MAGIC: &[u8; 4] = b"VPRG";
pub const FORMAT_V1: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Halt = 0x00,
    Nop = 0x01,
    Push = 0x02,
    Pop = 0x03,
    Dup = 0x04,
    Swap = 0x05,
    Add = 0x06,
    ToAux = 0x07,
    FromAux = 0x08,
    Jump = 0x09,
    Cjump = 0x0a,
    Inbox = 0x0b,
    Send = 0x0c,
    Log = 0x0d,
    Breakpoint = 0x0e,
    Fault = 0x0f,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Opcode::Halt),
            0x01 => Some(Opcode::Nop),
            0x02 => Some(Opcode::Push),
            0x03 => Some(Opcode::Pop),
            0x04 => Some(Opcode::Dup),
            0x05 => Some(Opcode::Swap),
            0x06 => Some(Opcode::Add),
            0x07 => Some(Opcode::ToAux),
            0x08 => Some(Opcode::FromAux),
            0x09 => Some(Opcode::Jump),
            0x0a => Some(Opcode::Cjump),
            0x0b => Some(Opcode::Inbox),
            0x0c => Some(Opcode::Send),
            0x0d => Some(Opcode::Log),
            0x0e => Some(Opcode::Breakpoint),
            0x0f => Some(Opcode::Fault),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn needs_immediate(self) -> bool {
        matches!(self, Opcode::Push | Opcode::Jump | Opcode::Cjump)
    }

    /// How many stack operands the opcode reads.
    pub fn stack_reads(self) -> usize {
        match self {
            Opcode::Pop | Opcode::Dup | Opcode::ToAux | Opcode::Cjump | Opcode::Send
            | Opcode::Log => 1,
            Opcode::Swap | Opcode::Add => 2,
            Opcode::Halt | Opcode::Nop | Opcode::Push | Opcode::FromAux | Opcode::Jump
            | Opcode::Inbox | Opcode::Breakpoint | Opcode::Fault => 0,
        }
    }

    /// How many auxiliary-area operands the opcode reads.
    pub fn aux_reads(self) -> usize {
        match self {
            Opcode::FromAux => 1,
            Opcode::Halt | Opcode::Nop | Opcode::Push | Opcode::Pop | Opcode::Dup
            | Opcode::Swap | Opcode::Add | Opcode::ToAux | Opcode::Jump | Opcode::Cjump
            | Opcode::Inbox | Opcode::Send | Opcode::Log | Opcode::Breakpoint
            | Opcode::Fault => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub immediate: Option<Value>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Program {
    image: Vec<u8>,
    instructions: Vec<Instruction>,
    image_hash: Digest32,
}

impl Program {
    /// Parses an image. All-or-nothing: any structural defect fails the
    /// whole load.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        if image.len() < MAGIC.len() || &image[..MAGIC.len()] != MAGIC {
            return Err(VmError::InvalidImage("bad magic".to_string()));
        }
        let mut rdr = Cursor::new(&image[MAGIC.len()..]);

        let version = rdr.read_u32::<BigEndian>()?;
        if version != FORMAT_V1 {
            return Err(VmError::InvalidImage(format!(
                "unsupported format version: {version}"
            )));
        }

        let count = rdr.read_u32::<BigEndian>()? as usize;
        let mut instructions = Vec::with_capacity(count);
        for index in 0..count {
            let raw = rdr.read_u8()?;
            let opcode = Opcode::from_u8(raw).ok_or(VmError::UnknownOpcode(raw))?;
            let flag = rdr.read_u8()?;
            let immediate = match (flag, opcode.needs_immediate()) {
                (1, true) => Some(value::decode::read_length_prefixed(&mut rdr)?),
                (0, false) => None,
                _ => {
                    return Err(VmError::InvalidImage(format!(
                        "instruction {index}: immediate flag does not match opcode"
                    )))
                }
            };
            instructions.push(Instruction { opcode, immediate });
        }

        let consumed = MAGIC.len() + rdr.position() as usize;
        if consumed != image.len() {
            return Err(VmError::InvalidImage(format!(
                "{} trailing bytes after instructions",
                image.len() - consumed
            )));
        }

        Ok(Program {
            image: image.to_vec(),
            instructions,
            image_hash: blake3::hash(image).into(),
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, pc: u64) -> Option<&Instruction> {
        usize::try_from(pc).ok().and_then(|i| self.instructions.get(i))
    }

    /// Program identity: the hash of the image it was loaded from.
    pub fn image_hash(&self) -> Digest32 {
        self.image_hash
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }
}

/// Builds program images in the canonical format.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    instructions: Vec<Instruction>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, opcode: Opcode) -> Self {
        debug_assert!(!opcode.needs_immediate());
        self.instructions.push(Instruction {
            opcode,
            immediate: None,
        });
        self
    }

    pub fn op_imm(mut self, opcode: Opcode, immediate: Value) -> Self {
        debug_assert!(opcode.needs_immediate());
        self.instructions.push(Instruction {
            opcode,
            immediate: Some(immediate),
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        // Writes into a Vec cannot fail.
        out.write_u32::<BigEndian>(FORMAT_V1).unwrap();
        out.write_u32::<BigEndian>(self.instructions.len() as u32)
            .unwrap();
        for instruction in &self.instructions {
            out.write_u8(instruction.opcode.as_u8()).unwrap();
            match &instruction.immediate {
                Some(value) => {
                    out.write_u8(1).unwrap();
                    value::encode::write_length_prefixed(value, &mut out);
                }
                None => out.write_u8(0).unwrap(),
            }
        }
        out
    }
}

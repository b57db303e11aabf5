//! Canonical value encoding.
//!
//! The encoding is a strict function of the tag and contents: tag byte,
//! then big-endian contents. Distinct values always encode to distinct
//! byte sequences.
//!
//! Layout:
//!   0x00            32-byte big-endian integer
//!   0x01            8-byte big-endian pc, 1-byte opcode
//!   0x03 + arity    the elements' encodings in order (arity 0..=8)

use super::Value;

pub const TAG_INT: u8 = 0x00;
pub const TAG_CODEPOINT: u8 = 0x01;
pub const TAG_TUPLE_BASE: u8 = 0x03;

impl Value {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::CodePoint(cp) => {
                out.push(TAG_CODEPOINT);
                out.extend_from_slice(&cp.pc.to_be_bytes());
                out.push(cp.opcode);
            }
            Value::Tuple(t) => {
                // Arity is bounded at construction, so the tag never
                // collides with another variant's tag.
                out.push(TAG_TUPLE_BASE + t.arity() as u8);
                for element in t.elements() {
                    element.encode_into(out);
                }
            }
        }
    }
}

/// Writes a value with a u32 big-endian length prefix, for embedding in
/// framed formats (program images, snapshots, proofs).
pub(crate) fn write_length_prefixed(value: &Value, out: &mut Vec<u8>) {
    let encoded = value.encode();
    out.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
    out.extend_from_slice(&encoded);
}

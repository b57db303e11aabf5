//! The value model: typed, immutable values with a canonical byte encoding.
//!
//! Hashing, persistence and messages are all defined over the canonical
//! encoding of values, never over in-memory layout.

pub mod decode;
pub mod encode;
pub mod hash;

use crate::error::{Result, VmError};
use ethnum::U256;

pub use decode::decode;
pub use hash::{chain_values, Digest32, EMPTY_CHAIN};

/// Maximum number of elements a tuple may hold.
pub const MAX_TUPLE_ARITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// 256-bit unsigned integer with wrapping arithmetic.
    Int(U256),
    /// Bounded-arity sequence of values.
    Tuple(Tuple),
    /// A program location together with the opcode found there.
    CodePoint(CodePoint),
}

/// A tuple of at most [`MAX_TUPLE_ARITY`] values. The bound is enforced at
/// construction, which keeps the canonical encoding total over all
/// constructible values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple(Vec<Value>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePoint {
    pub pc: u64,
    pub opcode: u8,
}

impl Tuple {
    pub fn new(elements: Vec<Value>) -> Result<Self> {
        if elements.len() > MAX_TUPLE_ARITY {
            return Err(VmError::TupleTooLarge(elements.len()));
        }
        Ok(Tuple(elements))
    }

    /// Constructor for call sites where the arity is statically within bound.
    pub(crate) fn new_unchecked(elements: Vec<Value>) -> Self {
        debug_assert!(elements.len() <= MAX_TUPLE_ARITY);
        Tuple(elements)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn elements(&self) -> &[Value] {
        &self.0
    }

    pub fn into_elements(self) -> Vec<Value> {
        self.0
    }
}

impl Value {
    /// The empty tuple.
    pub fn unit() -> Self {
        Value::Tuple(Tuple::default())
    }

    pub fn from_u64(v: u64) -> Self {
        Value::Int(U256::from(v))
    }

    pub fn tuple(elements: Vec<Value>) -> Result<Self> {
        Ok(Value::Tuple(Tuple::new(elements)?))
    }

    pub fn as_int(&self) -> Option<U256> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Tuple(_) | Value::CodePoint(_) => None,
        }
    }
}

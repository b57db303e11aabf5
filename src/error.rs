use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmError {
    #[error("invalid program image: {0}")]
    InvalidImage(String),

    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unknown value tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("tuple arity {0} exceeds maximum of {max}", max = crate::value::MAX_TUPLE_ARITY)]
    TupleTooLarge(usize),

    #[error("truncated value encoding")]
    Truncated,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VmError>;

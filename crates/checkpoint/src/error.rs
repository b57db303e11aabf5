use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,

    #[error("Unsupported checkpoint version: {0}")]
    UnsupportedVersion(u32),

    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch { expected: u64, found: u64 },

    #[error("Snapshot does not match the state hash recorded in the header")]
    StateHashMismatch,

    #[error("No checkpoint named {0:?}")]
    NotFound(String),

    #[error("Invalid checkpoint name {0:?}")]
    InvalidName(String),

    #[error("Kernel error: {0}")]
    Kernel(#[from] verdict_vm::VmError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

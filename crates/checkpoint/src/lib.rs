//! verdict-checkpoint: a persistent, named store of machine snapshots.
//!
//! Each checkpoint is one file: an integrity header (magic, version, state
//! hash, CRC64) followed by the canonical machine snapshot. Writes are
//! atomic (temp file + rename) and restores are all-or-nothing: a failed
//! restore leaves the target machine exactly as it was.

pub mod error;
pub mod idx;
pub mod store;

pub use error::{Result, StorageError};
pub use store::CheckpointStore;

//! Machine snapshots.
//!
//! A snapshot is the canonical byte encoding of full machine state —
//! program image, stacks, inbox, status, step count — sufficient to
//! reconstruct a machine with an identical hash. Decoding is strict and
//! all-or-nothing.

pub mod decode;
pub mod encode;

pub use decode::deserialize;
pub use encode::serialize;

pub const MAGIC: &[u8; 4] = b"VMSN";
pub const FORMAT_V1: u32 = 1;

//! verdict-vm: a deterministic stack-machine execution engine.
//!
//! Every state transition is byte-for-byte reproducible and every piece of
//! visible machine state is hashable over a canonical encoding, so two
//! independent executions of the same program over the same inputs can be
//! compared, checkpointed and disputed without trusting either party.

pub mod assertion;
pub mod error;
pub mod inbox;
pub mod machine;
pub mod message;
pub mod program;
pub mod proof;
pub mod snapshot;
pub mod value;

pub use assertion::{Assertion, Effects};
pub use error::{Result, VmError};
pub use machine::{BlockReason, Machine, Status, StepOutcome};
pub use value::{Digest32, Value};

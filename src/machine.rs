//! The execution core.
//!
//! A machine owns its stack, auxiliary area, inbox and status exclusively;
//! cloning produces a fully independent machine with an identical hash.
//! Execution is strictly sequential and every transition is a pure function
//! of the visible state.

use crate::assertion::Effects;
use crate::error::Result;
use crate::inbox::Inbox;
use crate::program::{Opcode, Program};
use crate::value::hash::Digest32;
use crate::value::{self, Value};
use ethnum::U256;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The machine may still execute further steps.
    Extensive,
    /// The program terminated normally. Terminal.
    Halted,
    /// The program terminated abnormally. Terminal.
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        match self {
            Status::Extensive => false,
            Status::Halted | Status::Error => true,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Status::Extensive => 0,
            Status::Halted => 1,
            Status::Error => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Status::Extensive),
            1 => Some(Status::Halted),
            2 => Some(Status::Error),
            _ => None,
        }
    }
}

/// Why the most recent run attempt stopped making progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    NotBlocked,
    Halted,
    Error,
    Breakpoint,
    /// Waiting on the inbox; the payload describes exactly what is awaited
    /// (the sequence number of the next message the program will read).
    InboxBlocked(Value),
}

/// Outcome of a single step attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// One instruction executed; the step counter advanced by one.
    Executed,
    /// No instruction executed; the machine reports why.
    Blocked(BlockReason),
}

#[derive(Debug, Clone)]
pub struct Machine {
    pub(crate) program: Arc<Program>,
    pub(crate) pc: u64,
    pub(crate) stack: Vec<Value>,
    pub(crate) aux: Vec<Value>,
    pub(crate) inbox: Inbox,
    pub(crate) status: Status,
    pub(crate) step_count: u64,
    pub(crate) last_reason: BlockReason,
}

impl Machine {
    /// Loads a program image and constructs a fresh machine. All-or-nothing:
    /// an invalid image yields no machine.
    pub fn construct(image: &[u8]) -> Result<Self> {
        let program = Program::from_image(image)?;
        Ok(Machine {
            program: Arc::new(program),
            pc: 0,
            stack: Vec::new(),
            aux: Vec::new(),
            inbox: Inbox::new(),
            status: Status::Extensive,
            step_count: 0,
            last_reason: BlockReason::NotBlocked,
        })
    }

    pub fn current_status(&self) -> Status {
        self.status
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Why the most recent run attempt stopped, with terminal statuses
    /// taking precedence over whatever the last attempt recorded.
    pub fn last_block_reason(&self) -> BlockReason {
        match self.status {
            Status::Halted => BlockReason::Halted,
            Status::Error => BlockReason::Error,
            Status::Extensive => self.last_reason.clone(),
        }
    }

    pub fn pending_message_count(&self) -> u64 {
        self.inbox.pending_count()
    }

    pub fn send_onchain_message(&mut self, payload: &[u8]) -> Result<()> {
        self.inbox.send_onchain(payload)
    }

    pub fn deliver_onchain_messages(&mut self) {
        self.inbox.deliver_onchain();
    }

    pub fn send_offchain_messages<B: AsRef<[u8]>>(&mut self, payloads: &[B]) -> Result<()> {
        self.inbox.send_offchain(payloads)
    }

    /// Canonical hash of the delivered inbox segment.
    pub fn inbox_hash(&self) -> Digest32 {
        self.inbox.hash()
    }

    /// Canonical encoding of the minimal state a third party needs to
    /// verify the next single step. See [`crate::proof`].
    pub fn marshal_for_proof(&self) -> Vec<u8> {
        crate::proof::marshal_for_proof(self)
    }

    /// Pure hash of the full visible machine state.
    pub fn hash(&self) -> Digest32 {
        compose_state_hash(
            &self.program.image_hash(),
            self.pc,
            &value::chain_values(&self.stack),
            &value::chain_values(&self.aux),
            self.status,
            &self.inbox.hash(),
            &self.inbox.pending_hash(),
            self.inbox.read_cursor(),
        )
    }

    /// Executes exactly one instruction if the machine is extensive and not
    /// blocked; otherwise reports the current block reason without touching
    /// any state.
    pub fn step(&mut self, effects: &mut Effects) -> StepOutcome {
        match self.status {
            Status::Halted => return StepOutcome::Blocked(BlockReason::Halted),
            Status::Error => return StepOutcome::Blocked(BlockReason::Error),
            Status::Extensive => {}
        }

        let instruction = match self.program.instruction(self.pc) {
            Some(i) => i.clone(),
            None => return self.fault("program counter past end of program"),
        };

        let mut next_pc = self.pc + 1;
        match instruction.opcode {
            Opcode::Halt => {
                self.status = Status::Halted;
                self.last_reason = BlockReason::Halted;
                self.pc = next_pc;
                self.step_count += 1;
                tracing::debug!(steps = self.step_count, "machine halted");
                return StepOutcome::Executed;
            }
            Opcode::Fault => {
                self.status = Status::Error;
                self.last_reason = BlockReason::Error;
                self.pc = next_pc;
                self.step_count += 1;
                tracing::debug!(steps = self.step_count, "machine stopped with an error");
                return StepOutcome::Executed;
            }
            Opcode::Breakpoint => {
                self.pc = next_pc;
                self.step_count += 1;
                self.last_reason = BlockReason::Breakpoint;
                return StepOutcome::Executed;
            }
            Opcode::Nop => {}
            Opcode::Push => {
                let Some(immediate) = instruction.immediate else {
                    return self.fault("push without immediate");
                };
                self.stack.push(immediate);
            }
            Opcode::Pop => {
                if self.stack.pop().is_none() {
                    return self.fault("stack underflow");
                }
            }
            Opcode::Dup => match self.stack.last() {
                Some(top) => {
                    let copy = top.clone();
                    self.stack.push(copy);
                }
                None => return self.fault("stack underflow"),
            },
            Opcode::Swap => {
                let depth = self.stack.len();
                if depth < 2 {
                    return self.fault("stack underflow");
                }
                self.stack.swap(depth - 1, depth - 2);
            }
            Opcode::Add => {
                // Validate both operands in place; a faulting add must not
                // consume anything.
                let depth = self.stack.len();
                if depth < 2 {
                    return self.fault("stack underflow");
                }
                let (Value::Int(a), Value::Int(b)) =
                    (&self.stack[depth - 2], &self.stack[depth - 1])
                else {
                    return self.fault("add expects two integers");
                };
                let sum = a.wrapping_add(*b);
                self.stack.truncate(depth - 2);
                self.stack.push(Value::Int(sum));
            }
            Opcode::ToAux => match self.stack.pop() {
                Some(v) => self.aux.push(v),
                None => return self.fault("stack underflow"),
            },
            Opcode::FromAux => match self.aux.pop() {
                Some(v) => self.stack.push(v),
                None => return self.fault("auxiliary area underflow"),
            },
            Opcode::Jump => {
                let Some(target) = jump_target(&instruction.immediate) else {
                    return self.fault("jump requires an in-range integer target");
                };
                next_pc = target;
            }
            Opcode::Cjump => {
                // The condition is popped only after the whole instruction
                // is known to succeed.
                let condition = match self.stack.last() {
                    Some(Value::Int(v)) => *v,
                    Some(_) => return self.fault("cjump expects an integer condition"),
                    None => return self.fault("stack underflow"),
                };
                if condition != U256::ZERO {
                    let Some(target) = jump_target(&instruction.immediate) else {
                        return self.fault("cjump requires an in-range integer target");
                    };
                    next_pc = target;
                }
                self.stack.pop();
            }
            Opcode::Inbox => {
                let message = match self.inbox.next_unread() {
                    Some(m) => m.clone(),
                    None => {
                        let awaited = Value::from_u64(self.inbox.read_cursor());
                        self.last_reason = BlockReason::InboxBlocked(awaited.clone());
                        return StepOutcome::Blocked(BlockReason::InboxBlocked(awaited));
                    }
                };
                self.inbox.advance_read();
                self.stack.push(message.to_value());
            }
            Opcode::Send => match self.stack.pop() {
                Some(v) => effects.out_messages.push(v),
                None => return self.fault("stack underflow"),
            },
            Opcode::Log => match self.stack.pop() {
                Some(v) => effects.logs.push(v),
                None => return self.fault("stack underflow"),
            },
        }

        self.pc = next_pc;
        self.step_count += 1;
        self.last_reason = BlockReason::NotBlocked;
        StepOutcome::Executed
    }

    /// Transitions into the terminal error status. The failed attempt does
    /// not count as a step and must not have consumed any operands: every
    /// opcode arm validates in place before popping.
    fn fault(&mut self, cause: &'static str) -> StepOutcome {
        tracing::debug!(pc = self.pc, cause, "machine entered error status");
        self.status = Status::Error;
        self.last_reason = BlockReason::Error;
        StepOutcome::Blocked(BlockReason::Error)
    }

    pub(crate) fn from_parts(
        program: Program,
        pc: u64,
        stack: Vec<Value>,
        aux: Vec<Value>,
        inbox: Inbox,
        status: Status,
        step_count: u64,
        last_reason: BlockReason,
    ) -> Self {
        Machine {
            program: Arc::new(program),
            pc,
            stack,
            aux,
            inbox,
            status,
            step_count,
            last_reason,
        }
    }
}

/// Combines the state components into the machine hash. Kept as a free
/// function so the one-step proof can recompute the identical digest.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compose_state_hash(
    program_hash: &Digest32,
    pc: u64,
    stack_hash: &Digest32,
    aux_hash: &Digest32,
    status: Status,
    delivered_hash: &Digest32,
    pending_hash: &Digest32,
    read_cursor: u64,
) -> Digest32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"verdict-machine-v1");
    hasher.update(program_hash);
    hasher.update(&pc.to_be_bytes());
    hasher.update(stack_hash);
    hasher.update(aux_hash);
    hasher.update(&[status.as_u8()]);
    hasher.update(delivered_hash);
    hasher.update(pending_hash);
    hasher.update(&read_cursor.to_be_bytes());
    hasher.finalize().into()
}

fn jump_target(immediate: &Option<Value>) -> Option<u64> {
    match immediate {
        Some(Value::Int(v)) if *v <= U256::from(u64::MAX) => Some(v.as_u64()),
        _ => None,
    }
}

//! Bounded execution runs.
//!
//! A run drives the machine until a step bound, a blocking condition or a
//! time budget stops it, and packages everything the executed instructions
//! produced. The time budget is logical (one tick per step over the window
//! `timebound_end - timebound_start`), checked only at step boundaries, so
//! identical bounds always truncate identically on every implementation.

use crate::machine::{BlockReason, Machine, StepOutcome};
use crate::value::Value;

/// The caller-owned output of one bounded run. Never part of persistent
/// machine state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assertion {
    pub out_messages: Vec<Value>,
    pub logs: Vec<Value>,
    pub step_count: u64,
}

/// Sink for output messages and log records emitted by executed
/// instructions, in execution order.
#[derive(Debug, Default)]
pub struct Effects {
    pub out_messages: Vec<Value>,
    pub logs: Vec<Value>,
}

impl Machine {
    /// Runs until `max_steps` steps have executed, the block reason turns
    /// into anything other than `NotBlocked`, or the logical time budget is
    /// exhausted. An inverted window (`timebound_end < timebound_start`)
    /// executes zero steps and mutates nothing.
    pub fn run(&mut self, max_steps: u64, timebound_start: u64, timebound_end: u64) -> Assertion {
        if timebound_end < timebound_start {
            tracing::debug!(timebound_start, timebound_end, "inverted time window");
            return Assertion::default();
        }
        let budget = timebound_end - timebound_start;
        let allowed = max_steps.min(budget);

        let mut effects = Effects::default();
        let mut steps = 0u64;
        while steps < allowed {
            match self.step(&mut effects) {
                StepOutcome::Executed => {
                    steps += 1;
                    if !matches!(self.last_block_reason(), BlockReason::NotBlocked) {
                        break;
                    }
                }
                StepOutcome::Blocked(reason) => {
                    tracing::debug!(?reason, steps, "run blocked");
                    break;
                }
            }
        }
        tracing::debug!(
            steps,
            out_messages = effects.out_messages.len(),
            logs = effects.logs.len(),
            "run finished"
        );
        Assertion {
            out_messages: effects.out_messages,
            logs: effects.logs,
            step_count: steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Status;
    use crate::program::{ImageBuilder, Opcode};

    fn nops(n: usize) -> Machine {
        let mut builder = ImageBuilder::new();
        for _ in 0..n {
            builder = builder.op(Opcode::Nop);
        }
        Machine::construct(&builder.op(Opcode::Halt).build()).unwrap()
    }

    #[test]
    fn test_step_count_never_exceeds_max_steps() {
        let mut m = nops(50);
        let assertion = m.run(3, 0, 1_000);
        assert_eq!(assertion.step_count, 3);
        assert_eq!(m.current_status(), Status::Extensive);
    }

    #[test]
    fn test_inverted_window_runs_zero_steps_without_mutation() {
        let mut m = nops(5);
        let before = m.hash();
        let assertion = m.run(100, 1_000, 0);
        assert_eq!(assertion, Assertion::default());
        assert_eq!(m.hash(), before);
        assert_eq!(m.step_count(), 0);
    }

    #[test]
    fn test_time_budget_truncates_at_step_boundaries() {
        let mut m = nops(50);
        let assertion = m.run(100, 10, 15);
        assert_eq!(assertion.step_count, 5);
        assert_eq!(m.current_status(), Status::Extensive);
    }

    #[test]
    fn test_halt_scenario() {
        let mut m = Machine::construct(&ImageBuilder::new().op(Opcode::Halt).build()).unwrap();
        let assertion = m.run(100, 0, 1_000);
        assert_eq!(assertion.step_count, 1);
        assert_eq!(m.current_status(), Status::Halted);
        assert_eq!(m.last_block_reason(), BlockReason::Halted);

        // A terminal machine runs zero further steps.
        let again = m.run(100, 0, 1_000);
        assert_eq!(again.step_count, 0);
    }

    #[test]
    fn test_run_collects_outputs_in_execution_order() {
        let image = ImageBuilder::new()
            .op_imm(Opcode::Push, Value::from_u64(1))
            .op(Opcode::Log)
            .op_imm(Opcode::Push, Value::from_u64(2))
            .op(Opcode::Send)
            .op(Opcode::Halt)
            .build();
        let mut m = Machine::construct(&image).unwrap();
        let assertion = m.run(100, 0, 1_000);
        assert_eq!(assertion.step_count, 5);
        assert_eq!(assertion.logs, vec![Value::from_u64(1)]);
        assert_eq!(assertion.out_messages, vec![Value::from_u64(2)]);
    }

    #[test]
    fn test_run_stops_at_breakpoint_after_counting_it() {
        let image = ImageBuilder::new()
            .op(Opcode::Nop)
            .op(Opcode::Breakpoint)
            .op(Opcode::Halt)
            .build();
        let mut m = Machine::construct(&image).unwrap();
        let assertion = m.run(100, 0, 1_000);
        assert_eq!(assertion.step_count, 2);
        assert_eq!(m.last_block_reason(), BlockReason::Breakpoint);

        // Resumes past the breakpoint on the next run.
        let next = m.run(100, 0, 1_000);
        assert_eq!(next.step_count, 1);
        assert_eq!(m.current_status(), Status::Halted);
    }
}

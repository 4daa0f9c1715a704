use pio_sm::{AsmError, PioError, StallReason};
use thiserror::Error;

use crate::micro_op::MicroOp;

pub type Result<T> = std::result::Result<T, InterpError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error(transparent)]
    Pio(#[from] PioError),

    #[error("dispatch program failed to assemble: {0}")]
    Asm(#[from] AsmError),

    #[error("unsupported variant: {0}")]
    UnsupportedVariant(&'static str),

    #[error("{op} is not available in the {variant} variant")]
    CommandNotSupported { op: MicroOp, variant: &'static str },

    #[error("value {value:#x} does not fit in {bits} bits")]
    ImmediateOutOfRange { value: u32, bits: u8 },

    #[error("{count} fields do not fit in one command word (max {max})")]
    TooManyFields { count: usize, max: usize },

    #[error("{0} consumes the rest of the command word and must come last")]
    FieldNotLast(MicroOp),

    #[error("interpreter did not return to dispatch within {cycles} cycles")]
    CycleLimit { cycles: u64 },

    #[error("interpreter stalled outside dispatch ({0:?})")]
    Stuck(StallReason),

    #[error("unmatched `{bracket}` at {pos}")]
    UnmatchedBracket { bracket: char, pos: usize },

    #[error("program did not finish within {0} steps")]
    StepLimit(u64),

    #[error("command queue is full")]
    CommandQueueFull,

    #[error("device thread has stopped")]
    DeviceStopped,

    #[error("device thread panicked")]
    DevicePanicked,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

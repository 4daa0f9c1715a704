use thiserror::Error;

pub type Result<T> = std::result::Result<T, PioError>;

/// Errors surfaced to the host when configuring or accessing a PIO block.
///
/// The emulated hardware itself never faults: empty/full FIFOs and unavailable pins are
/// reported as stalls by [`crate::StateMachine::step`]. Only host-side accesses that the real
/// SDK would reject (or silently drop) are errors here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PioError {
    #[error("state machine index {0} out of range")]
    InvalidStateMachine(usize),

    #[error("program of {len} instructions does not fit in instruction memory")]
    ProgramTooLarge { len: usize },

    #[error("no free space for a program of {len} instructions")]
    NoSpace { len: usize },

    #[error("program must be loaded at offset {origin}, requested {offset}")]
    OriginMismatch { origin: u8, offset: u8 },

    #[error("instruction slots {offset}..{end} are already in use")]
    SlotsInUse { offset: u8, end: u8 },

    #[error("TX FIFO is full")]
    TxFull,

    #[error("RX FIFO is empty")]
    RxEmpty,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A 16-bit word that does not correspond to any PIO instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot decode {word:#06x}: {reason}")]
pub struct DecodeError {
    pub word: u16,
    pub reason: &'static str,
}

/// A pioasm source parse failure, with a 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {msg}")]
pub struct AsmError {
    pub line: usize,
    pub msg: String,
}

impl AsmError {
    pub(crate) fn new(line: usize, msg: impl Into<String>) -> Self {
        Self {
            line,
            msg: msg.into(),
        }
    }
}

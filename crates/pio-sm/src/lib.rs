//! Cycle-stepped emulation of an RP2040-style programmable I/O (PIO) block.
//!
//! A [`Pio`] owns a 32-slot instruction memory shared by four [`StateMachine`]s. Each state
//! machine has its own program counter, `X`/`Y` scratch registers, input/output shift registers
//! and a pair of bounded FIFOs towards the host. Pins are not owned by the block; every step takes
//! a [`PinChannel`] so callers can plug in ideal GPIO ([`GpioBank`]) or a bounded bit-serial link
//! ([`SerialLink`]) that stalls when full/empty.
//!
//! Programs are built either with the [`Assembler`] builder or parsed from pioasm-style text with
//! [`pioasm::parse_program`].

pub mod assembler;
pub mod config;
mod dispatch;
pub mod error;
pub mod fifo;
pub mod instruction;
pub mod pins;
pub mod pio;
pub mod pioasm;
pub mod program;
pub mod shift;
pub mod sm;

pub use assembler::{Assembler, Label};
pub use config::{FifoJoin, ShiftDirection, SmConfig, StatusSource};
pub use error::{AsmError, DecodeError, PioError, Result};
pub use fifo::{Fifo, PopError, PushError};
pub use instruction::{
    InSource, Instruction, InstructionOperands, IrqIndex, JmpCondition, MovDestination,
    MovOperation, MovSource, OutDestination, SetDestination, WaitSource,
};
pub use pins::{GpioBank, PinChannel, PinPoll, SerialLink};
pub use pio::{Pio, RunExit};
pub use program::{Program, Wrap};
pub use shift::ShiftRegister;
pub use sm::{StallReason, StateMachine, StepOutcome};

/// Number of instruction slots in a PIO block.
pub const INSTRUCTION_MEMORY_SIZE: usize = 32;

/// Number of state machines in a PIO block.
pub const NUM_STATE_MACHINES: usize = 4;

/// Depth of each TX/RX FIFO when not joined.
pub const FIFO_DEPTH: usize = 4;

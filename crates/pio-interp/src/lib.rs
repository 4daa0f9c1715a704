//! A command-dispatch micro-interpreter running on an emulated PIO state machine.
//!
//! The dispatch program sits on a `pull`, takes a command word from the TX FIFO and jumps into
//! one of its handlers with `out pc, N`. Handlers operate on X and Y, shift X or Y out on a
//! one-bit pin channel, sample bits into X, execute an instruction carried in the command word,
//! or return part of the word through the RX FIFO. Then they jump back to the `pull`.
//!
//! ```
//! use pio_interp::{Command, Interpreter, Variant};
//! use pio_sm::GpioBank;
//!
//! let mut interp = Interpreter::new(Variant::full(), 0, GpioBank::new())?;
//! interp.send(&Command::LoadX(41))?;
//! interp.send(&Command::NegateX)?;
//! interp.send(&Command::DecrementX)?;
//! interp.send(&Command::NegateX)?;
//! interp.run_until_idle(1_000)?;
//! assert_eq!(interp.x(), 42);
//! # Ok::<(), pio_interp::InterpError>(())
//! ```

pub mod bf;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod micro_op;
pub mod programs;
pub mod variant;

pub use command::{encode_packed, response_tag, Command};
pub use config::InterpreterConfig;
pub use error::{InterpError, Result};
pub use host::{spawn, DeviceHandle};
pub use interpreter::{Interpreter, Registers};
pub use micro_op::{DispatchTable, MicroOp};
pub use programs::{build, InterpreterProgram};
pub use variant::{Capabilities, FieldWidth, Variant, VariantKind};

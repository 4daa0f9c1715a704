//! Brainfuck front end for the full variant.
//!
//! The device holds a single cell in X and uses Y as a pointer counter; there is no tape, so
//! `>` and `<` only move Y. Cell arithmetic saturates at both ends instead of wrapping.
//!
//! Control flow stays on the host. Each bracket injects `jmp !x, <early exit>` tagged with the
//! index of the matching bracket, and a response means the cell is zero.
//!
//! Every word uses the ordinary 4-bit command layout from [`crate::command`], so an encoded
//! listing can be replayed with `exec` as-is. Words do not carry a 28-bit op address. The only
//! address on the wire is the jump target in a zero test's 12-bit tag, which limits a program with
//! loops to 4096 ops; a bracket past that fails to encode with
//! [`InterpError::ImmediateOutOfRange`].

use std::collections::VecDeque;

use pio_sm::{Pio, SerialLink};
use tracing::{debug, trace};

use crate::command::{response_tag, Command, TAG_MASK};
use crate::config::InterpreterConfig;
use crate::error::{InterpError, Result};
use crate::interpreter::Interpreter;
use crate::programs::InterpreterProgram;
use crate::variant::{Capabilities, Variant};

const COMMANDS: &str = "><+-[].,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BfOp {
    Right,
    Left,
    Inc,
    Dec,
    Out,
    In,
    LoopStart { end: usize },
    LoopEnd { start: usize },
}

/// Drops everything but the eight command characters.
pub fn clean(src: &str) -> String {
    src.chars().filter(|c| COMMANDS.contains(*c)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfProgram {
    ops: Vec<BfOp>,
}

/// Bracket positions in errors are indices into the cleaned source.
pub fn parse(src: &str) -> Result<BfProgram> {
    let mut ops = Vec::new();
    let mut open = Vec::new();
    for (pos, c) in clean(src).chars().enumerate() {
        let op = match c {
            '>' => BfOp::Right,
            '<' => BfOp::Left,
            '+' => BfOp::Inc,
            '-' => BfOp::Dec,
            '.' => BfOp::Out,
            ',' => BfOp::In,
            '[' => {
                open.push(pos);
                BfOp::LoopStart { end: 0 }
            }
            ']' => {
                let start = open.pop().ok_or(InterpError::UnmatchedBracket { bracket: ']', pos })?;
                ops[start] = BfOp::LoopStart { end: pos };
                BfOp::LoopEnd { start }
            }
            _ => continue,
        };
        ops.push(op);
    }
    if let Some(&pos) = open.last() {
        return Err(InterpError::UnmatchedBracket { bracket: '[', pos });
    }
    Ok(BfProgram { ops })
}

impl BfProgram {
    pub fn ops(&self) -> &[BfOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Every op's command words, in program order.
    pub fn encode(&self, layout: &InterpreterProgram) -> Result<Vec<u32>> {
        let early_exit = layout.early_exit_slot.ok_or(InterpError::UnsupportedVariant(
            "brainfuck needs the inject and early-exit handlers",
        ))?;
        let variant = layout.variant.name();
        let mut words = Vec::new();
        for &op in &self.ops {
            for command in lower(op, early_exit)? {
                words.push(command.encode(&layout.table, variant)?);
            }
        }
        Ok(words)
    }
}

/// Commands sent for one op.
pub fn lower(op: BfOp, early_exit_slot: u8) -> Result<Vec<Command>> {
    let zero_test = |target: usize| -> Result<Command> {
        if target > TAG_MASK as usize {
            return Err(InterpError::ImmediateOutOfRange {
                value: target as u32,
                bits: 12,
            });
        }
        Ok(Command::zero_test(early_exit_slot, target as u16))
    };
    Ok(match op {
        BfOp::Inc => vec![Command::NegateX, Command::DecrementX, Command::NegateX],
        BfOp::Dec => vec![Command::DecrementX],
        BfOp::Right => vec![Command::NegateY, Command::DecrementY, Command::NegateY],
        BfOp::Left => vec![Command::DecrementY],
        BfOp::Out => vec![Command::SerializeX],
        BfOp::In => vec![Command::LoadX(8), Command::DeserializeX],
        BfOp::LoopStart { end } => vec![zero_test(end)?],
        BfOp::LoopEnd { start } => vec![zero_test(start)?],
    })
}

/// One `0xXXXXXXXX` line per word.
pub fn hex_listing(words: &[u32]) -> String {
    words.iter().map(|w| format!("0x{w:08X}\n")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfOutcome {
    pub output: Vec<u8>,
    /// Brainfuck ops executed.
    pub steps: u64,
    pub x: u32,
    pub y: u32,
}

/// Drives a full-variant interpreter through a [`BfProgram`] over a [`SerialLink`].
pub struct BfRunner {
    interp: Interpreter<SerialLink>,
    step_limit: u64,
    max_cycles: u64,
}

impl BfRunner {
    pub fn new(interp: Interpreter<SerialLink>) -> Result<Self> {
        if !interp.variant().supports(Capabilities::all()) {
            return Err(InterpError::UnsupportedVariant(
                "brainfuck needs the inject and early-exit handlers",
            ));
        }
        if interp.pins().is_loopback() {
            return Err(InterpError::InvalidConfig(
                "brainfuck output cannot use a loopback link".to_string(),
            ));
        }
        let defaults = InterpreterConfig::default();
        Ok(Self {
            interp,
            step_limit: defaults.step_limit,
            max_cycles: defaults.max_cycles,
        })
    }

    pub fn from_config(config: &InterpreterConfig) -> Result<Self> {
        config.validate()?;
        let link = if config.loopback {
            SerialLink::loopback(config.link_capacity)
        } else {
            SerialLink::new(config.link_capacity)
        };
        let interp = Interpreter::init(
            Pio::new(),
            config.sm,
            config.offset,
            config.pin,
            Variant::from(config.variant),
            link,
        )?;
        Ok(Self::new(interp)?
            .with_step_limit(config.step_limit)
            .with_max_cycles(config.max_cycles))
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Cycle budget for a single op.
    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn interpreter(&self) -> &Interpreter<SerialLink> {
        &self.interp
    }

    pub fn into_interpreter(self) -> Interpreter<SerialLink> {
        self.interp
    }

    /// Runs from a freshly reset interpreter. Reads past the end of `input` yield 0.
    pub fn run(&mut self, program: &BfProgram, input: &[u8]) -> Result<BfOutcome> {
        self.interp.reset()?;
        let early_exit = self.interp.early_exit_pc().ok_or(InterpError::UnsupportedVariant(
            "brainfuck needs the inject and early-exit handlers",
        ))?;
        let mut input = input.iter().copied();
        let mut output = Vec::new();
        let mut steps = 0u64;
        let mut ip = 0usize;

        while ip < program.len() {
            if steps >= self.step_limit {
                return Err(InterpError::StepLimit(self.step_limit));
            }
            steps += 1;
            let op = program.ops()[ip];
            trace!(ip, ?op, "bf step");
            for command in lower(op, early_exit)? {
                self.interp.send(&command)?;
            }
            ip = match op {
                BfOp::Out => {
                    output.push(self.collect_output()?);
                    ip + 1
                }
                BfOp::In => {
                    self.feed_input(input.next().unwrap_or(0))?;
                    ip + 1
                }
                BfOp::LoopStart { end } => {
                    if self.cell_is_zero(end)? {
                        end + 1
                    } else {
                        ip + 1
                    }
                }
                BfOp::LoopEnd { start } => {
                    if self.cell_is_zero(start)? {
                        ip + 1
                    } else {
                        start + 1
                    }
                }
                _ => {
                    self.settle()?;
                    ip + 1
                }
            };
        }

        debug!(steps, bytes = output.len(), "brainfuck program finished");
        Ok(BfOutcome {
            output,
            steps,
            x: self.interp.x(),
            y: self.interp.y(),
        })
    }

    /// Runs until the dispatcher is waiting again. Any other stall is fatal here.
    fn settle(&mut self) -> Result<()> {
        self.interp.run_until_idle(self.max_cycles)?;
        if self.interp.is_idle() {
            return Ok(());
        }
        Err(self.stuck())
    }

    fn stuck(&self) -> InterpError {
        match self.interp.stall_reason() {
            Some(reason) => InterpError::Stuck(reason),
            None => InterpError::CycleLimit {
                cycles: self.max_cycles,
            },
        }
    }

    fn cell_is_zero(&mut self, tag: usize) -> Result<bool> {
        self.settle()?;
        Ok(matches!(self.interp.try_recv(), Some(r) if response_tag(r) as usize == tag))
    }

    /// Drains the 32 serialized bits as they appear and keeps the low byte.
    fn collect_output(&mut self) -> Result<u8> {
        let mut bits: Vec<bool> = Vec::with_capacity(32);
        loop {
            self.interp.run_until_idle(self.max_cycles)?;
            bits.extend(self.interp.pins_mut().take_output());
            if self.interp.is_idle() {
                break;
            }
            if bits.len() >= 32 {
                return Err(self.stuck());
            }
        }
        let word = bits.iter().fold(0u32, |word, &bit| (word << 1) | bit as u32);
        Ok(word as u8)
    }

    /// Feeds `byte` MSB first, as fast as the link accepts it.
    fn feed_input(&mut self, byte: u8) -> Result<()> {
        let mut pending: VecDeque<bool> = (0..8).rev().map(|i| byte & (1 << i) != 0).collect();
        loop {
            while let Some(&bit) = pending.front() {
                if !self.interp.pins_mut().feed_bit(bit) {
                    break;
                }
                pending.pop_front();
            }
            self.interp.run_until_idle(self.max_cycles)?;
            if self.interp.is_idle() {
                return Ok(());
            }
            if pending.is_empty() {
                return Err(self.stuck());
            }
        }
    }
}

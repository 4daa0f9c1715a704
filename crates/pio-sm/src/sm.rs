use serde::Serialize;
use tracing::{trace, warn};

use crate::config::SmConfig;
use crate::dispatch::{DispatchTable, ExecContext, Next};
use crate::error::{PioError, Result};
use crate::fifo::Fifo;
use crate::instruction::Instruction;
use crate::pins::PinChannel;
use crate::shift::ShiftRegister;
use crate::INSTRUCTION_MEMORY_SIZE;

/// Why a state machine could not complete its current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// `pull block` or autopull with nothing in the TX FIFO.
    TxEmpty,
    /// `push block` or autopush with the RX FIFO full.
    RxFull,
    /// The pin channel has no input to sample.
    PinsEmpty,
    /// The pin channel cannot accept more output.
    PinsFull,
    /// `wait` condition not met.
    Wait,
    /// `irq wait` flag still set.
    Irq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed {
        /// PC the instruction was fetched from (or the PC at the time, for an exec'd one).
        pc: u8,
        instruction: Instruction,
        /// Came from `out exec`, `mov exec` or [`StateMachine::exec`] rather than memory.
        injected: bool,
    },
    /// Nothing was committed; the same instruction is retried next cycle.
    Stalled(StallReason),
    /// Burning delay cycles, or skipped by the clock divider.
    Delayed,
    Disabled,
}

pub struct StateMachine {
    pub(crate) index: usize,
    pub(crate) config: SmConfig,
    pub(crate) enabled: bool,
    pub(crate) pc: u8,
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) isr: ShiftRegister,
    pub(crate) osr: ShiftRegister,
    pub(crate) tx: Fifo,
    pub(crate) rx: Fifo,
    delay: u8,
    divider_count: u16,
    pub(crate) pending_exec: Option<u16>,
    /// IRQ flag this machine is blocked on after `irq wait`.
    pub(crate) irq_wait: Option<u8>,
    stall: Option<StallReason>,
    cycles: u64,
    executed: u64,
}

impl StateMachine {
    pub(crate) fn new(index: usize) -> Self {
        let config = SmConfig::default();
        let (tx_depth, rx_depth) = config.fifo_join.depths();
        let mut osr = ShiftRegister::default();
        osr.drain();
        Self {
            index,
            config,
            enabled: false,
            pc: 0,
            x: 0,
            y: 0,
            isr: ShiftRegister::default(),
            osr,
            tx: Fifo::new(tx_depth),
            rx: Fifo::new(rx_depth),
            delay: 0,
            divider_count: 0,
            pending_exec: None,
            irq_wait: None,
            stall: None,
            cycles: 0,
            executed: 0,
        }
    }

    /// Applies `config`, clears both FIFOs, restarts and puts the PC at `initial_pc`. The machine
    /// is left disabled, as `pio_sm_init` does.
    pub fn init(&mut self, initial_pc: u8, config: &SmConfig) -> Result<()> {
        config.validate()?;
        if initial_pc as usize >= INSTRUCTION_MEMORY_SIZE {
            return Err(PioError::InvalidConfig("initial pc out of range"));
        }
        self.enabled = false;
        self.set_config(config)?;
        self.restart();
        self.pc = initial_pc;
        Ok(())
    }

    /// Applies `config`. The FIFOs are resized (and cleared) only if the join mode changes.
    pub fn set_config(&mut self, config: &SmConfig) -> Result<()> {
        config.validate()?;
        let (tx_depth, rx_depth) = config.fifo_join.depths();
        if tx_depth != self.tx.capacity() || rx_depth != self.rx.capacity() {
            self.tx.set_capacity(tx_depth);
            self.rx.set_capacity(rx_depth);
        }
        self.config = config.clone();
        Ok(())
    }

    /// Clears shift counters, delay, pending exec and wait state. Registers, FIFO contents and the
    /// PC are kept.
    pub fn restart(&mut self) {
        self.isr.count = 0;
        self.osr.drain();
        self.delay = 0;
        self.divider_count = 0;
        self.pending_exec = None;
        self.irq_wait = None;
        self.stall = None;
    }

    pub fn clear_fifos(&mut self) {
        self.tx.clear();
        self.rx.clear();
    }

    /// Zeroes X, Y and the ISR, and leaves the OSR empty.
    pub fn clear_registers(&mut self) {
        self.x = 0;
        self.y = 0;
        self.isr.clear();
        self.osr.clear();
        self.osr.drain();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &SmConfig {
        &self.config
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u8) {
        self.pc = pc % INSTRUCTION_MEMORY_SIZE as u8;
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn set_x(&mut self, value: u32) {
        self.x = value;
    }

    pub fn set_y(&mut self, value: u32) {
        self.y = value;
    }

    pub fn isr(&self) -> ShiftRegister {
        self.isr
    }

    pub fn osr(&self) -> ShiftRegister {
        self.osr
    }

    pub fn tx(&self) -> &Fifo {
        &self.tx
    }

    pub fn rx(&self) -> &Fifo {
        &self.rx
    }

    /// Instruction queued to run on the next cycle instead of the one at the PC.
    pub fn pending_exec(&self) -> Option<u16> {
        self.pending_exec
    }

    /// Reason the most recent cycle stalled, cleared by the next completed instruction.
    pub fn stall_reason(&self) -> Option<StallReason> {
        self.stall
    }

    /// Cycles this machine has been clocked while enabled.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions completed, injected ones included.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Host write to the TX FIFO (`pio_sm_put`).
    pub fn put(&mut self, word: u32) -> Result<()> {
        self.tx.try_push(word).map_err(|_| PioError::TxFull)
    }

    /// Host read from the RX FIFO (`pio_sm_get`).
    pub fn get(&mut self) -> Result<u32> {
        self.rx.try_pop().map_err(|_| PioError::RxEmpty)
    }

    /// Queues `instruction` to execute on the next cycle (`pio_sm_exec`).
    pub fn exec(&mut self, instruction: Instruction) {
        self.pending_exec = Some(instruction.encode());
    }

    fn advance_pc(&mut self) {
        self.pc = if self.pc == self.config.wrap_top {
            self.config.wrap_target
        } else {
            (self.pc + 1) % INSTRUCTION_MEMORY_SIZE as u8
        };
    }

    /// Clocks the machine for one cycle.
    pub fn step(
        &mut self,
        memory: &[u16; INSTRUCTION_MEMORY_SIZE],
        irq: &mut u8,
        pins: &mut dyn PinChannel,
    ) -> StepOutcome {
        if !self.enabled {
            return StepOutcome::Disabled;
        }

        self.divider_count += 1;
        if self.divider_count < self.config.clock_divider {
            return StepOutcome::Delayed;
        }
        self.divider_count = 0;
        self.cycles += 1;

        if self.delay > 0 {
            self.delay -= 1;
            return StepOutcome::Delayed;
        }

        let pc = self.pc;
        let (word, injected) = match self.pending_exec {
            Some(word) => (word, true),
            None => (memory[pc as usize], false),
        };
        let instruction = match Instruction::decode(word) {
            Ok(instruction) => instruction,
            Err(err) => {
                warn!(sm = self.index, pc, %err, "reserved encoding executed as nop");
                Instruction::nop().with_delay(((word >> 8) & 0x1f) as u8)
            }
        };

        let handler = DispatchTable::TABLE[instruction.major()];
        let mut ctx = ExecContext { irq, pins };
        let next = handler(self, &instruction, &mut ctx);

        if let Next::Stall(reason) = next {
            if self.stall != Some(reason) {
                trace!(sm = self.index, pc, ?reason, "stall");
            }
            self.stall = Some(reason);
            return StepOutcome::Stalled(reason);
        }

        self.stall = None;
        if injected {
            self.pending_exec = None;
        }
        self.apply_next(next, injected);
        if !matches!(next, Next::Exec(_)) {
            self.delay = instruction.delay;
        }
        self.executed += 1;
        trace!(sm = self.index, pc, injected, %instruction, "exec");

        StepOutcome::Executed {
            pc,
            instruction,
            injected,
        }
    }

    fn apply_next(&mut self, next: Next, injected: bool) {
        match next {
            Next::Continue => {
                if !injected {
                    self.advance_pc();
                }
            }
            Next::Jump(target) => self.pc = target % INSTRUCTION_MEMORY_SIZE as u8,
            Next::Exec(word) => {
                if !injected {
                    self.advance_pc();
                }
                self.pending_exec = Some(word);
            }
            Next::Stall(_) => {}
        }
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("index", &self.index)
            .field("enabled", &self.enabled)
            .field("pc", &self.pc)
            .field("x", &format_args!("{:#010x}", self.x))
            .field("y", &format_args!("{:#010x}", self.y))
            .field("isr", &self.isr)
            .field("osr", &self.osr)
            .field("tx", &self.tx.len())
            .field("rx", &self.rx.len())
            .finish()
    }
}

use pio_sm::{PinChannel, Pio, RunExit, StallReason, StateMachine};
use serde::Serialize;
use tracing::debug;

use crate::command::{encode_packed, Command};
use crate::error::{InterpError, Result};
use crate::micro_op::{DispatchTable, MicroOp};
use crate::programs::{build, InterpreterProgram};
use crate::variant::Variant;

/// Register snapshot of the interpreter's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub pc: u8,
    pub x: u32,
    pub y: u32,
    pub isr: u32,
    pub isr_count: u8,
    pub osr: u32,
    pub osr_count: u8,
    pub tx_level: usize,
    pub rx_level: usize,
    pub stall: Option<StallReason>,
}

/// A dispatch program loaded into one state machine of a [`Pio`], with the pin channel it drives.
pub struct Interpreter<P: PinChannel> {
    pio: Pio,
    sm: usize,
    offset: u8,
    layout: InterpreterProgram,
    pins: P,
}

impl<P: PinChannel> Interpreter<P> {
    /// State machine 0 of a fresh block, program at offset 0.
    pub fn new(variant: Variant, pin: u8, pins: P) -> Result<Self> {
        Self::init(Pio::new(), 0, 0, pin, variant, pins)
    }

    /// Loads the dispatch program at `offset`, maps the OUT and IN pins (and the JMP pin) to
    /// `pin`, makes `pin` an output, points the PC at the dispatcher and enables the machine.
    pub fn init(
        mut pio: Pio,
        sm: usize,
        offset: u8,
        pin: u8,
        variant: Variant,
        mut pins: P,
    ) -> Result<Self> {
        let layout = build(variant)?;
        pio.sm(sm)?;
        pio.add_program_at(&layout.program, offset)?;

        let mut config = layout.config.clone();
        let (wrap_target, wrap_top) = layout.program.wrap_at(offset);
        config
            .set_wrap(wrap_target, wrap_top)
            .set_out_pins(pin, 1)
            .set_in_pins(pin)
            .set_jmp_pin(pin);
        pins.set_pindirs(pin, 1, 1);

        pio.sm_init(sm, offset + layout.fetch_slot, &config)?;
        pio.sm_set_enabled(sm, true)?;
        debug!(sm, offset, pin, variant = variant.name(), "interpreter started");

        Ok(Self {
            pio,
            sm,
            offset,
            layout,
            pins,
        })
    }

    pub fn variant(&self) -> Variant {
        self.layout.variant
    }

    pub fn table(&self) -> &DispatchTable {
        &self.layout.table
    }

    pub fn layout(&self) -> &InterpreterProgram {
        &self.layout
    }

    pub fn pio(&self) -> &Pio {
        &self.pio
    }

    pub fn pio_mut(&mut self) -> &mut Pio {
        &mut self.pio
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    pub fn into_parts(self) -> (Pio, P) {
        (self.pio, self.pins)
    }

    fn machine(&self) -> &StateMachine {
        &self.pio.state_machines()[self.sm]
    }

    fn machine_mut(&mut self) -> Result<&mut StateMachine> {
        Ok(self.pio.sm_mut(self.sm)?)
    }

    /// Absolute slot of the dispatcher's `pull`.
    pub fn fetch_pc(&self) -> u8 {
        self.offset + self.layout.fetch_slot
    }

    /// Absolute slot of the early-exit handler, for variants that have one.
    pub fn early_exit_pc(&self) -> Option<u8> {
        self.layout.early_exit_slot.map(|slot| self.offset + slot)
    }

    /// Queues a raw command word. Fails with [`pio_sm::PioError::TxFull`] if the TX FIFO is full.
    pub fn submit(&mut self, word: u32) -> Result<()> {
        self.machine_mut()?.put(word)?;
        Ok(())
    }

    pub fn send(&mut self, command: &Command) -> Result<()> {
        let word = command.encode(&self.layout.table, self.variant().name())?;
        debug!(?command, "send {word:#010x}");
        self.submit(word)
    }

    /// Minimal variant: packs `ops` into one word and queues it.
    pub fn send_packed(&mut self, ops: &[MicroOp]) -> Result<()> {
        let word = encode_packed(ops, &self.layout.table, self.variant().name())?;
        debug!(?ops, "send packed {word:#010x}");
        self.submit(word)
    }

    /// Takes one response word from the RX FIFO.
    pub fn try_recv(&mut self) -> Option<u32> {
        self.machine_mut().ok()?.get().ok()
    }

    pub fn run_slice(&mut self, max_cycles: u64) -> RunExit {
        self.pio.run_slice(max_cycles, &mut self.pins)
    }

    /// Runs until the machine stalls. That is either the dispatcher waiting for a command
    /// ([`Interpreter::is_idle`]) or a handler waiting on the pin channel or the RX FIFO.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<RunExit> {
        match self.run_slice(max_cycles) {
            RunExit::Completed { cycles } => Err(InterpError::CycleLimit { cycles }),
            exit => Ok(exit),
        }
    }

    /// Parked on the dispatcher's `pull` with no command queued.
    pub fn is_idle(&self) -> bool {
        let sm = self.machine();
        sm.pc() == self.fetch_pc() && sm.tx().is_empty() && sm.pending_exec().is_none()
    }

    /// The stall the last executed cycle ended in, if any.
    pub fn stall_reason(&self) -> Option<StallReason> {
        self.machine().stall_reason()
    }

    pub fn registers(&self) -> Registers {
        let sm = self.machine();
        Registers {
            pc: sm.pc(),
            x: sm.x(),
            y: sm.y(),
            isr: sm.isr().value,
            isr_count: sm.isr().count,
            osr: sm.osr().value,
            osr_count: sm.osr().count,
            tx_level: sm.tx().len(),
            rx_level: sm.rx().len(),
            stall: sm.stall_reason(),
        }
    }

    pub fn x(&self) -> u32 {
        self.machine().x()
    }

    pub fn y(&self) -> u32 {
        self.machine().y()
    }

    /// Host restart: registers zeroed, both FIFOs emptied, PC back at the dispatcher.
    pub fn reset(&mut self) -> Result<()> {
        let fetch = self.fetch_pc();
        let sm = self.machine_mut()?;
        sm.clear_registers();
        sm.clear_fifos();
        sm.restart();
        sm.set_pc(fetch);
        debug!("interpreter reset");
        Ok(())
    }
}

use tracing::debug;

use crate::config::SmConfig;
use crate::error::{PioError, Result};
use crate::pins::PinChannel;
use crate::program::Program;
use crate::sm::{StateMachine, StepOutcome};
use crate::{INSTRUCTION_MEMORY_SIZE, NUM_STATE_MACHINES};

/// A [`Pio::run_slice`] result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The slice ran for the full `max_cycles`.
    Completed { cycles: u64 },
    /// Every enabled state machine stalled (or none is enabled). Nothing changes until the host
    /// feeds a FIFO or a pin channel.
    Stalled { cycles: u64 },
}

impl RunExit {
    /// Block cycles consumed by this slice, including the final stalled one.
    pub fn cycles(&self) -> u64 {
        match *self {
            RunExit::Completed { cycles } | RunExit::Stalled { cycles } => cycles,
        }
    }
}

/// One PIO block: shared instruction memory, four state machines and eight IRQ flags.
pub struct Pio {
    memory: [u16; INSTRUCTION_MEMORY_SIZE],
    /// Bit `n` set when slot `n` holds a loaded program.
    used: u32,
    sms: [StateMachine; NUM_STATE_MACHINES],
    irq: u8,
    cycles: u64,
}

impl Default for Pio {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_mask(offset: usize, len: usize) -> u32 {
    if len >= 32 {
        u32::MAX
    } else {
        ((1u32 << len) - 1) << offset
    }
}

impl Pio {
    pub fn new() -> Self {
        Self {
            memory: [0; INSTRUCTION_MEMORY_SIZE],
            used: 0,
            sms: std::array::from_fn(StateMachine::new),
            irq: 0,
            cycles: 0,
        }
    }

    pub fn memory(&self) -> &[u16; INSTRUCTION_MEMORY_SIZE] {
        &self.memory
    }

    pub fn used_slots(&self) -> u32 {
        self.used
    }

    pub fn irq_flags(&self) -> u8 {
        self.irq
    }

    pub fn clear_irq(&mut self, flag: u8) {
        self.irq &= !(1 << (flag & 7));
    }

    /// Block cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn find_offset(&self, program: &Program) -> Result<u8> {
        let len = program.len();
        if len > INSTRUCTION_MEMORY_SIZE {
            return Err(PioError::ProgramTooLarge { len });
        }
        if let Some(origin) = program.origin {
            return Ok(origin);
        }
        // Like the SDK, prefer the top of memory.
        (0..=INSTRUCTION_MEMORY_SIZE - len)
            .rev()
            .find(|&offset| self.used & slot_mask(offset, len) == 0)
            .map(|offset| offset as u8)
            .ok_or(PioError::NoSpace { len })
    }

    pub fn can_add_program(&self, program: &Program) -> bool {
        self.find_offset(program)
            .and_then(|offset| self.check_slots(program, offset))
            .is_ok()
    }

    fn check_slots(&self, program: &Program, offset: u8) -> Result<()> {
        let len = program.len();
        if len > INSTRUCTION_MEMORY_SIZE {
            return Err(PioError::ProgramTooLarge { len });
        }
        if let Some(origin) = program.origin {
            if origin != offset {
                return Err(PioError::OriginMismatch { origin, offset });
            }
        }
        if offset as usize + len > INSTRUCTION_MEMORY_SIZE {
            return Err(PioError::NoSpace { len });
        }
        if self.used & slot_mask(offset as usize, len) != 0 {
            return Err(PioError::SlotsInUse {
                offset,
                end: offset + len as u8,
            });
        }
        Ok(())
    }

    /// Loads `program` into free instruction memory and returns its offset.
    pub fn add_program(&mut self, program: &Program) -> Result<u8> {
        let offset = self.find_offset(program)?;
        self.add_program_at(program, offset)?;
        Ok(offset)
    }

    /// Loads `program` at a fixed `offset`, relocating its jumps.
    pub fn add_program_at(&mut self, program: &Program, offset: u8) -> Result<()> {
        self.check_slots(program, offset)?;
        let start = offset as usize;
        for (slot, word) in self.memory[start..]
            .iter_mut()
            .zip(program.relocated(offset))
        {
            *slot = word;
        }
        self.used |= slot_mask(start, program.len());
        debug!(
            name = program.name.as_deref().unwrap_or("<anonymous>"),
            offset,
            len = program.len(),
            "loaded program"
        );
        Ok(())
    }

    pub fn remove_program(&mut self, program: &Program, offset: u8) {
        self.used &= !slot_mask(offset as usize, program.len());
    }

    pub fn clear_instruction_memory(&mut self) {
        self.used = 0;
        self.memory = [0; INSTRUCTION_MEMORY_SIZE];
    }

    pub fn sm(&self, index: usize) -> Result<&StateMachine> {
        self.sms
            .get(index)
            .ok_or(PioError::InvalidStateMachine(index))
    }

    pub fn sm_mut(&mut self, index: usize) -> Result<&mut StateMachine> {
        self.sms
            .get_mut(index)
            .ok_or(PioError::InvalidStateMachine(index))
    }

    pub fn state_machines(&self) -> &[StateMachine; NUM_STATE_MACHINES] {
        &self.sms
    }

    /// `pio_sm_init`: configure `index` to start at `initial_pc`. The machine stays disabled.
    pub fn sm_init(&mut self, index: usize, initial_pc: u8, config: &SmConfig) -> Result<()> {
        self.sm_mut(index)?.init(initial_pc, config)
    }

    pub fn sm_set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.sm_mut(index)?.set_enabled(enabled);
        Ok(())
    }

    /// Clocks every state machine once, in index order.
    pub fn step(&mut self, pins: &mut dyn PinChannel) -> [StepOutcome; NUM_STATE_MACHINES] {
        self.cycles += 1;
        let mut outcomes = [StepOutcome::Disabled; NUM_STATE_MACHINES];
        for (sm, outcome) in self.sms.iter_mut().zip(outcomes.iter_mut()) {
            *outcome = sm.step(&self.memory, &mut self.irq, pins);
        }
        outcomes
    }

    /// Runs up to `max_cycles`, returning early once no enabled state machine can make progress.
    pub fn run_slice(&mut self, max_cycles: u64, pins: &mut dyn PinChannel) -> RunExit {
        let mut cycles = 0;
        while cycles < max_cycles {
            let outcomes = self.step(pins);
            cycles += 1;
            let idle = outcomes
                .iter()
                .all(|o| matches!(o, StepOutcome::Stalled(_) | StepOutcome::Disabled));
            if idle {
                return RunExit::Stalled { cycles };
            }
        }
        RunExit::Completed { cycles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(len: usize) -> Program {
        Program::new(vec![0xa042; len])
    }

    #[test]
    fn programs_fill_from_the_top() {
        let mut pio = Pio::new();
        assert_eq!(pio.add_program(&program(4)), Ok(28));
        assert_eq!(pio.add_program(&program(4)), Ok(24));
        assert_eq!(pio.used_slots(), 0xff00_0000);
    }

    #[test]
    fn origin_is_honoured() {
        let mut pio = Pio::new();
        let mut fixed = program(20);
        fixed.origin = Some(0);
        assert_eq!(pio.add_program(&fixed), Ok(0));
        assert_eq!(
            pio.add_program(&fixed),
            Err(PioError::SlotsInUse { offset: 0, end: 20 })
        );
        assert_eq!(
            pio.add_program_at(&fixed, 4),
            Err(PioError::OriginMismatch { origin: 0, offset: 4 })
        );
        assert_eq!(pio.add_program(&program(13)), Err(PioError::NoSpace { len: 13 }));
        assert_eq!(pio.add_program(&program(12)), Ok(20));
    }

    #[test]
    fn jumps_are_relocated_on_load() {
        let mut pio = Pio::new();
        // jmp 1; jmp 0
        let p = Program::new(vec![0x0001, 0x0000]);
        let offset = pio.add_program(&p).unwrap();
        assert_eq!(offset, 30);
        assert_eq!(pio.memory()[30], 0x001f);
        assert_eq!(pio.memory()[31], 0x001e);
    }

    #[test]
    fn removed_programs_free_their_slots() {
        let mut pio = Pio::new();
        let big = program(24);
        let offset = pio.add_program(&big).unwrap();
        assert_eq!(offset, 8);
        assert!(!pio.can_add_program(&program(9)));
        assert!(pio.can_add_program(&program(8)));

        pio.remove_program(&big, offset);
        assert_eq!(pio.used_slots(), 0);
        assert!(pio.can_add_program(&program(32)));
        // Reloading lands in the same place.
        assert_eq!(pio.add_program(&big), Ok(8));

        pio.clear_instruction_memory();
        assert_eq!(pio.used_slots(), 0);
        assert!(pio.memory().iter().all(|&word| word == 0));
    }

    #[test]
    fn invalid_sm_index() {
        let pio = Pio::new();
        assert!(matches!(pio.sm(4), Err(PioError::InvalidStateMachine(4))));
    }

    #[test]
    fn nothing_enabled_is_idle() {
        let mut pio = Pio::new();
        let mut pins = crate::GpioBank::new();
        assert_eq!(pio.run_slice(100, &mut pins), RunExit::Stalled { cycles: 1 });
    }
}

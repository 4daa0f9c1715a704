//! Programmatic PIO assembler.
//!
//! ```
//! use pio_sm::{Assembler, JmpCondition, OutDestination};
//!
//! let mut a = Assembler::<32>::new();
//! let mut top = a.label();
//! a.bind(&mut top);
//! a.pull(false, true);
//! a.out(OutDestination::Pins, 1);
//! a.jmp(JmpCondition::Always, &mut top);
//! let program = a.assemble_program();
//! assert_eq!(program.code, vec![0x80a0, 0x6001, 0x0000]);
//! ```

use std::collections::BTreeMap;

use crate::instruction::{
    InSource, Instruction, InstructionOperands, IrqIndex, JmpCondition, MovDestination,
    MovOperation, MovSource, OutDestination, SetDestination, WaitSource, MAX_DELAY,
};
use crate::program::{Program, Wrap};

/// A jump target. Forward references are patched when the label is bound.
#[derive(Debug, Default)]
pub struct Label {
    bound: Option<u8>,
    pending: Vec<usize>,
}

impl Label {
    pub fn offset(&self) -> Option<u8> {
        self.bound
    }
}

pub struct Assembler<const N: usize> {
    instructions: Vec<Instruction>,
    origin: Option<u8>,
    names: BTreeMap<String, u8>,
    unresolved: usize,
}

impl<const N: usize> Default for Assembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Assembler<N> {
    pub fn new() -> Self {
        Self {
            instructions: Vec::with_capacity(N),
            origin: None,
            names: BTreeMap::new(),
            unresolved: 0,
        }
    }

    /// Requires the program to be loaded at `origin`.
    pub fn set_origin(&mut self, origin: u8) {
        self.origin = Some(origin);
    }

    /// Address of the next instruction.
    pub fn offset(&self) -> u8 {
        self.instructions.len() as u8
    }

    pub fn label(&mut self) -> Label {
        Label::default()
    }

    /// Binds `label` to the next instruction.
    ///
    /// # Panics
    ///
    /// If the label is already bound.
    pub fn bind(&mut self, label: &mut Label) {
        assert!(label.bound.is_none(), "label bound twice");
        let here = self.offset();
        for index in label.pending.drain(..) {
            if let InstructionOperands::Jmp { address, .. } =
                &mut self.instructions[index].operands
            {
                *address = here;
            }
            self.unresolved -= 1;
        }
        label.bound = Some(here);
    }

    /// Like [`Assembler::bind`], also recording `name` in the program's label table.
    pub fn bind_named(&mut self, label: &mut Label, name: &str) {
        self.bind(label);
        self.names.insert(name.to_string(), self.offset());
    }

    /// Appends a raw instruction.
    ///
    /// # Panics
    ///
    /// If the program already holds `N` instructions.
    pub fn instruction(&mut self, instruction: Instruction) {
        assert!(self.instructions.len() < N, "program exceeds {N} instructions");
        self.instructions.push(instruction);
    }

    /// Sets the delay of the most recently added instruction.
    pub fn delay(&mut self, cycles: u8) {
        if let Some(last) = self.instructions.last_mut() {
            last.delay = cycles.min(MAX_DELAY);
        }
    }

    fn op(&mut self, operands: InstructionOperands) {
        self.instruction(Instruction::new(operands));
    }

    pub fn jmp(&mut self, condition: JmpCondition, label: &mut Label) {
        let address = match label.bound {
            Some(address) => address,
            None => {
                label.pending.push(self.instructions.len());
                self.unresolved += 1;
                0
            }
        };
        self.op(InstructionOperands::Jmp { condition, address });
    }

    /// Jump to an absolute, program-relative address.
    pub fn jmp_to(&mut self, condition: JmpCondition, address: u8) {
        self.op(InstructionOperands::Jmp {
            condition,
            address: address & 0x1f,
        });
    }

    pub fn wait(&mut self, polarity: bool, source: WaitSource) {
        self.op(InstructionOperands::Wait { polarity, source });
    }

    pub fn r#in(&mut self, source: InSource, bit_count: u8) {
        self.op(InstructionOperands::In {
            source,
            bit_count: bit_count.clamp(1, 32),
        });
    }

    pub fn out(&mut self, destination: OutDestination, bit_count: u8) {
        self.op(InstructionOperands::Out {
            destination,
            bit_count: bit_count.clamp(1, 32),
        });
    }

    pub fn push(&mut self, if_full: bool, block: bool) {
        self.op(InstructionOperands::Push { if_full, block });
    }

    pub fn pull(&mut self, if_empty: bool, block: bool) {
        self.op(InstructionOperands::Pull { if_empty, block });
    }

    pub fn mov(&mut self, destination: MovDestination, op: MovOperation, source: MovSource) {
        self.op(InstructionOperands::Mov {
            destination,
            op,
            source,
        });
    }

    pub fn irq(&mut self, clear: bool, wait: bool, index: IrqIndex) {
        self.op(InstructionOperands::Irq { clear, wait, index });
    }

    pub fn set(&mut self, destination: SetDestination, data: u8) {
        self.op(InstructionOperands::Set {
            destination,
            data: data & 0x1f,
        });
    }

    pub fn nop(&mut self) {
        self.instruction(Instruction::nop());
    }

    /// Assembles, wrapping from the last instruction back to the first.
    ///
    /// # Panics
    ///
    /// If a jump refers to a label that was never bound.
    pub fn assemble_program(self) -> Program {
        let source = self.offset().saturating_sub(1);
        self.finish(Wrap { source, target: 0 })
    }

    /// Assembles with explicit wrap points. `source` is bound just past the last instruction of
    /// the loop, `target` at its first instruction.
    ///
    /// # Panics
    ///
    /// If either wrap label, or any jump target, is unbound.
    pub fn assemble_with_wrap(self, source: Label, target: Label) -> Program {
        let (Some(source), Some(target)) = (source.bound, target.bound) else {
            panic!("wrap label not bound");
        };
        self.finish(Wrap {
            source: source.saturating_sub(1),
            target,
        })
    }

    fn finish(self, wrap: Wrap) -> Program {
        assert!(self.unresolved == 0, "jump to unbound label");
        Program {
            name: None,
            code: self.instructions.iter().map(Instruction::encode).collect(),
            origin: self.origin,
            wrap,
            labels: self.names,
        }
    }
}

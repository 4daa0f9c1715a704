//! PIO instruction encoding.
//!
//! Every instruction is 16 bits:
//!
//! ```text
//!  15  13 12     8 7            0
//! +------+--------+--------------+
//! |  op  | delay  |   operands   |
//! +------+--------+--------------+
//! ```
//!
//! Side-set is not modelled, so all five bits of the middle field are delay cycles.

use core::fmt;

use crate::error::DecodeError;

pub const MAX_DELAY: u8 = 31;

const OP_JMP: u16 = 0b000;
const OP_WAIT: u16 = 0b001;
const OP_IN: u16 = 0b010;
const OP_OUT: u16 = 0b011;
const OP_PUSH_PULL: u16 = 0b100;
const OP_MOV: u16 = 0b101;
const OP_IRQ: u16 = 0b110;
const OP_SET: u16 = 0b111;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JmpCondition {
    Always = 0,
    /// `!x`
    XIsZero = 1,
    /// `x--`: taken when X is non-zero before the decrement.
    XDecNonZero = 2,
    /// `!y`
    YIsZero = 3,
    /// `y--`
    YDecNonZero = 4,
    /// `x!=y`
    XNotEqualY = 5,
    /// `pin`: the EXECCTRL jump pin is high.
    PinHigh = 6,
    /// `!osre`: the output shift counter has not reached the pull threshold.
    OsrNotEmpty = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InSource {
    Pins = 0,
    X = 1,
    Y = 2,
    Null = 3,
    Isr = 6,
    Osr = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    Null = 3,
    PinDirs = 4,
    Pc = 5,
    Isr = 6,
    Exec = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    Exec = 4,
    Pc = 5,
    Isr = 6,
    Osr = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovOperation {
    None = 0,
    Invert = 1,
    BitReverse = 2,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovSource {
    Pins = 0,
    X = 1,
    Y = 2,
    Null = 3,
    Status = 5,
    Isr = 6,
    Osr = 7,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    PinDirs = 4,
}

/// IRQ flag selector used by `irq` and `wait irq`.
///
/// With `relative` set, the state machine index is added (modulo 4) to the low two bits of
/// `index`, so the same program can address a per-state-machine flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqIndex {
    pub index: u8,
    pub relative: bool,
}

impl IrqIndex {
    pub const fn new(index: u8) -> Self {
        Self {
            index: index & 0b111,
            relative: false,
        }
    }

    pub const fn relative(index: u8) -> Self {
        Self {
            index: index & 0b111,
            relative: true,
        }
    }

    /// Resolves the flag number (0..8) for state machine `sm`.
    pub fn resolve(self, sm: usize) -> u8 {
        if self.relative {
            (self.index & 0b100) | ((self.index as usize + sm) as u8 & 0b011)
        } else {
            self.index
        }
    }

    fn to_bits(self) -> u16 {
        ((self.relative as u16) << 4) | (self.index as u16 & 0b111)
    }

    fn from_bits(word: u16, bits: u16) -> Result<Self, DecodeError> {
        if bits & 0b01000 != 0 {
            return Err(DecodeError {
                word,
                reason: "reserved irq index bit",
            });
        }
        Ok(Self {
            index: (bits & 0b111) as u8,
            relative: bits & 0b10000 != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitSource {
    /// Absolute GPIO number.
    Gpio(u8),
    /// Pin relative to the IN pin base.
    Pin(u8),
    Irq(IrqIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionOperands {
    Jmp {
        condition: JmpCondition,
        address: u8,
    },
    Wait {
        polarity: bool,
        source: WaitSource,
    },
    In {
        source: InSource,
        /// 1..=32
        bit_count: u8,
    },
    Out {
        destination: OutDestination,
        /// 1..=32
        bit_count: u8,
    },
    Push {
        if_full: bool,
        block: bool,
    },
    Pull {
        if_empty: bool,
        block: bool,
    },
    Mov {
        destination: MovDestination,
        op: MovOperation,
        source: MovSource,
    },
    Irq {
        clear: bool,
        wait: bool,
        index: IrqIndex,
    },
    Set {
        destination: SetDestination,
        /// 5-bit immediate.
        data: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub operands: InstructionOperands,
    pub delay: u8,
}

impl Instruction {
    pub const fn new(operands: InstructionOperands) -> Self {
        Self { operands, delay: 0 }
    }

    /// `mov y, y`, the canonical encoding of `nop`.
    pub const fn nop() -> Self {
        Self::new(InstructionOperands::Mov {
            destination: MovDestination::Y,
            op: MovOperation::None,
            source: MovSource::Y,
        })
    }

    pub const fn jmp(condition: JmpCondition, address: u8) -> Self {
        Self::new(InstructionOperands::Jmp {
            condition,
            address: address & 0x1f,
        })
    }

    pub fn with_delay(mut self, delay: u8) -> Self {
        self.delay = delay.min(MAX_DELAY);
        self
    }

    /// The 3-bit major opcode, used to index the execution dispatch table.
    pub(crate) fn major(&self) -> usize {
        match self.operands {
            InstructionOperands::Jmp { .. } => 0,
            InstructionOperands::Wait { .. } => 1,
            InstructionOperands::In { .. } => 2,
            InstructionOperands::Out { .. } => 3,
            InstructionOperands::Push { .. } | InstructionOperands::Pull { .. } => 4,
            InstructionOperands::Mov { .. } => 5,
            InstructionOperands::Irq { .. } => 6,
            InstructionOperands::Set { .. } => 7,
        }
    }

    pub fn encode(&self) -> u16 {
        let (op, operands) = match self.operands {
            InstructionOperands::Jmp { condition, address } => {
                (OP_JMP, ((condition as u16) << 5) | (address as u16 & 0x1f))
            }
            InstructionOperands::Wait { polarity, source } => {
                let (src, index) = match source {
                    WaitSource::Gpio(n) => (0b00, n as u16 & 0x1f),
                    WaitSource::Pin(n) => (0b01, n as u16 & 0x1f),
                    WaitSource::Irq(irq) => (0b10, irq.to_bits()),
                };
                (OP_WAIT, ((polarity as u16) << 7) | (src << 5) | index)
            }
            InstructionOperands::In { source, bit_count } => {
                (OP_IN, ((source as u16) << 5) | encode_bit_count(bit_count))
            }
            InstructionOperands::Out {
                destination,
                bit_count,
            } => (OP_OUT, ((destination as u16) << 5) | encode_bit_count(bit_count)),
            InstructionOperands::Push { if_full, block } => (
                OP_PUSH_PULL,
                ((if_full as u16) << 6) | ((block as u16) << 5),
            ),
            InstructionOperands::Pull { if_empty, block } => (
                OP_PUSH_PULL,
                (1 << 7) | ((if_empty as u16) << 6) | ((block as u16) << 5),
            ),
            InstructionOperands::Mov {
                destination,
                op,
                source,
            } => (
                OP_MOV,
                ((destination as u16) << 5) | ((op as u16) << 3) | source as u16,
            ),
            InstructionOperands::Irq { clear, wait, index } => (
                OP_IRQ,
                ((clear as u16) << 6) | ((wait as u16) << 5) | index.to_bits(),
            ),
            InstructionOperands::Set { destination, data } => {
                (OP_SET, ((destination as u16) << 5) | (data as u16 & 0x1f))
            }
        };
        (op << 13) | ((self.delay.min(MAX_DELAY) as u16) << 8) | operands
    }

    pub fn decode(word: u16) -> Result<Self, DecodeError> {
        let delay = ((word >> 8) & 0x1f) as u8;
        let field = (word >> 5) & 0b111;
        let low = word & 0x1f;
        let err = |reason| DecodeError { word, reason };

        let operands = match word >> 13 {
            OP_JMP => InstructionOperands::Jmp {
                condition: match field {
                    0 => JmpCondition::Always,
                    1 => JmpCondition::XIsZero,
                    2 => JmpCondition::XDecNonZero,
                    3 => JmpCondition::YIsZero,
                    4 => JmpCondition::YDecNonZero,
                    5 => JmpCondition::XNotEqualY,
                    6 => JmpCondition::PinHigh,
                    _ => JmpCondition::OsrNotEmpty,
                },
                address: low as u8,
            },
            OP_WAIT => {
                let polarity = word & (1 << 7) != 0;
                let source = match (word >> 5) & 0b11 {
                    0b00 => WaitSource::Gpio(low as u8),
                    0b01 => WaitSource::Pin(low as u8),
                    0b10 => WaitSource::Irq(IrqIndex::from_bits(word, low)?),
                    _ => return Err(err("reserved wait source")),
                };
                InstructionOperands::Wait { polarity, source }
            }
            OP_IN => InstructionOperands::In {
                source: match field {
                    0 => InSource::Pins,
                    1 => InSource::X,
                    2 => InSource::Y,
                    3 => InSource::Null,
                    6 => InSource::Isr,
                    7 => InSource::Osr,
                    _ => return Err(err("reserved in source")),
                },
                bit_count: decode_bit_count(low),
            },
            OP_OUT => InstructionOperands::Out {
                destination: match field {
                    0 => OutDestination::Pins,
                    1 => OutDestination::X,
                    2 => OutDestination::Y,
                    3 => OutDestination::Null,
                    4 => OutDestination::PinDirs,
                    5 => OutDestination::Pc,
                    6 => OutDestination::Isr,
                    _ => OutDestination::Exec,
                },
                bit_count: decode_bit_count(low),
            },
            OP_PUSH_PULL => {
                if low != 0 {
                    return Err(err("reserved push/pull bits"));
                }
                let flag = word & (1 << 6) != 0;
                let block = word & (1 << 5) != 0;
                if word & (1 << 7) == 0 {
                    InstructionOperands::Push {
                        if_full: flag,
                        block,
                    }
                } else {
                    InstructionOperands::Pull {
                        if_empty: flag,
                        block,
                    }
                }
            }
            OP_MOV => InstructionOperands::Mov {
                destination: match field {
                    0 => MovDestination::Pins,
                    1 => MovDestination::X,
                    2 => MovDestination::Y,
                    4 => MovDestination::Exec,
                    5 => MovDestination::Pc,
                    6 => MovDestination::Isr,
                    7 => MovDestination::Osr,
                    _ => return Err(err("reserved mov destination")),
                },
                op: match (word >> 3) & 0b11 {
                    0 => MovOperation::None,
                    1 => MovOperation::Invert,
                    2 => MovOperation::BitReverse,
                    _ => return Err(err("reserved mov operation")),
                },
                source: match word & 0b111 {
                    0 => MovSource::Pins,
                    1 => MovSource::X,
                    2 => MovSource::Y,
                    3 => MovSource::Null,
                    5 => MovSource::Status,
                    6 => MovSource::Isr,
                    7 => MovSource::Osr,
                    _ => return Err(err("reserved mov source")),
                },
            },
            OP_IRQ => {
                if word & (1 << 7) != 0 {
                    return Err(err("reserved irq bit"));
                }
                InstructionOperands::Irq {
                    clear: word & (1 << 6) != 0,
                    wait: word & (1 << 5) != 0,
                    index: IrqIndex::from_bits(word, low)?,
                }
            }
            _ => InstructionOperands::Set {
                destination: match field {
                    0 => SetDestination::Pins,
                    1 => SetDestination::X,
                    2 => SetDestination::Y,
                    4 => SetDestination::PinDirs,
                    _ => return Err(err("reserved set destination")),
                },
                data: low as u8,
            },
        };

        Ok(Self { operands, delay })
    }

    /// Returns a copy with a JMP target moved by `offset` (mod 32). Other instructions are
    /// returned unchanged.
    pub fn relocated(mut self, offset: u8) -> Self {
        if let InstructionOperands::Jmp { address, .. } = &mut self.operands {
            *address = address.wrapping_add(offset) & 0x1f;
        }
        self
    }
}

fn encode_bit_count(bit_count: u8) -> u16 {
    // 32 is encoded as 0.
    (bit_count as u16) & 0x1f
}

fn decode_bit_count(bits: u16) -> u8 {
    if bits == 0 {
        32
    } else {
        bits as u8
    }
}

impl fmt::Display for JmpCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JmpCondition::Always => "",
            JmpCondition::XIsZero => "!x",
            JmpCondition::XDecNonZero => "x--",
            JmpCondition::YIsZero => "!y",
            JmpCondition::YDecNonZero => "y--",
            JmpCondition::XNotEqualY => "x!=y",
            JmpCondition::PinHigh => "pin",
            JmpCondition::OsrNotEmpty => "!osre",
        })
    }
}

impl fmt::Display for InSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InSource::Pins => "pins",
            InSource::X => "x",
            InSource::Y => "y",
            InSource::Null => "null",
            InSource::Isr => "isr",
            InSource::Osr => "osr",
        })
    }
}

impl fmt::Display for OutDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutDestination::Pins => "pins",
            OutDestination::X => "x",
            OutDestination::Y => "y",
            OutDestination::Null => "null",
            OutDestination::PinDirs => "pindirs",
            OutDestination::Pc => "pc",
            OutDestination::Isr => "isr",
            OutDestination::Exec => "exec",
        })
    }
}

impl fmt::Display for MovDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovDestination::Pins => "pins",
            MovDestination::X => "x",
            MovDestination::Y => "y",
            MovDestination::Exec => "exec",
            MovDestination::Pc => "pc",
            MovDestination::Isr => "isr",
            MovDestination::Osr => "osr",
        })
    }
}

impl fmt::Display for MovSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovSource::Pins => "pins",
            MovSource::X => "x",
            MovSource::Y => "y",
            MovSource::Null => "null",
            MovSource::Status => "status",
            MovSource::Isr => "isr",
            MovSource::Osr => "osr",
        })
    }
}

impl fmt::Display for SetDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetDestination::Pins => "pins",
            SetDestination::X => "x",
            SetDestination::Y => "y",
            SetDestination::PinDirs => "pindirs",
        })
    }
}

impl fmt::Display for IrqIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)?;
        if self.relative {
            f.write_str(" rel")?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operands {
            InstructionOperands::Jmp {
                condition: JmpCondition::Always,
                address,
            } => write!(f, "jmp {address}")?,
            InstructionOperands::Jmp { condition, address } => {
                write!(f, "jmp {condition}, {address}")?
            }
            InstructionOperands::Wait { polarity, source } => {
                let polarity = polarity as u8;
                match source {
                    WaitSource::Gpio(n) => write!(f, "wait {polarity} gpio {n}")?,
                    WaitSource::Pin(n) => write!(f, "wait {polarity} pin {n}")?,
                    WaitSource::Irq(irq) => write!(f, "wait {polarity} irq {irq}")?,
                }
            }
            InstructionOperands::In { source, bit_count } => {
                write!(f, "in {source}, {bit_count}")?
            }
            InstructionOperands::Out {
                destination,
                bit_count,
            } => write!(f, "out {destination}, {bit_count}")?,
            InstructionOperands::Push { if_full, block } => {
                f.write_str("push")?;
                if if_full {
                    f.write_str(" iffull")?;
                }
                f.write_str(if block { " block" } else { " noblock" })?;
            }
            InstructionOperands::Pull { if_empty, block } => {
                f.write_str("pull")?;
                if if_empty {
                    f.write_str(" ifempty")?;
                }
                f.write_str(if block { " block" } else { " noblock" })?;
            }
            InstructionOperands::Mov {
                destination,
                op,
                source,
            } => {
                let op = match op {
                    MovOperation::None => "",
                    MovOperation::Invert => "~",
                    MovOperation::BitReverse => "::",
                };
                write!(f, "mov {destination}, {op}{source}")?
            }
            InstructionOperands::Irq { clear, wait, index } => {
                let mode = match (clear, wait) {
                    (true, _) => "clear",
                    (false, true) => "wait",
                    (false, false) => "set",
                };
                write!(f, "irq {mode} {index}")?
            }
            InstructionOperands::Set { destination, data } => {
                write!(f, "set {destination}, {data}")?
            }
        }
        if self.delay > 0 {
            write!(f, " [{}]", self.delay)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        // Values cross-checked against pioasm output.
        assert_eq!(Instruction::jmp(JmpCondition::Always, 0).encode(), 0x0000);
        assert_eq!(Instruction::jmp(JmpCondition::XIsZero, 16).encode(), 0x0030);
        assert_eq!(Instruction::jmp(JmpCondition::OsrNotEmpty, 16).encode(), 0x00f0);
        let pull = Instruction::new(InstructionOperands::Pull {
            if_empty: false,
            block: true,
        });
        assert_eq!(pull.encode(), 0x80a0);
        let push = Instruction::new(InstructionOperands::Push {
            if_full: false,
            block: true,
        });
        assert_eq!(push.encode(), 0x8020);
        let out_pc = Instruction::new(InstructionOperands::Out {
            destination: OutDestination::Pc,
            bit_count: 5,
        });
        assert_eq!(out_pc.encode(), 0x60a5);
        let out_pins = Instruction::new(InstructionOperands::Out {
            destination: OutDestination::Pins,
            bit_count: 1,
        });
        assert_eq!(out_pins.encode(), 0x6001);
        let mov_not_x = Instruction::new(InstructionOperands::Mov {
            destination: MovDestination::X,
            op: MovOperation::Invert,
            source: MovSource::X,
        });
        assert_eq!(mov_not_x.encode(), 0xa029);
        assert_eq!(Instruction::nop().encode(), 0xa042);
    }

    #[test]
    fn bit_count_32_is_encoded_as_zero() {
        let inst = Instruction::new(InstructionOperands::In {
            source: InSource::Osr,
            bit_count: 32,
        });
        assert_eq!(inst.encode() & 0x1f, 0);
        assert_eq!(Instruction::decode(inst.encode()).unwrap(), inst);
    }

    #[test]
    fn reserved_encodings_are_rejected() {
        // in <reserved 4>, 1
        assert!(Instruction::decode(0x4081).is_err());
        // mov <reserved dest 3>, x
        assert!(Instruction::decode(0xa061).is_err());
        // set <reserved dest 3>, 1
        assert!(Instruction::decode(0xe061).is_err());
        // push with non-zero low bits
        assert!(Instruction::decode(0x8001).is_err());
    }

    #[test]
    fn every_valid_word_reencodes_identically() {
        for word in 0..=u16::MAX {
            if let Ok(inst) = Instruction::decode(word) {
                assert_eq!(inst.encode(), word, "{inst}");
            }
        }
    }

    #[test]
    fn relative_irq_wraps_within_low_bits() {
        let irq = IrqIndex::relative(3);
        assert_eq!(irq.resolve(0), 3);
        assert_eq!(irq.resolve(1), 0);
        assert_eq!(IrqIndex::relative(6).resolve(3), 5);
    }

    #[test]
    fn display_matches_pioasm_syntax() {
        assert_eq!(
            Instruction::jmp(JmpCondition::XDecNonZero, 4).to_string(),
            "jmp x--, 4"
        );
        let mov = Instruction::new(InstructionOperands::Mov {
            destination: MovDestination::Isr,
            op: MovOperation::BitReverse,
            source: MovSource::Osr,
        })
        .with_delay(3);
        assert_eq!(mov.to_string(), "mov isr, ::osr [3]");
    }
}

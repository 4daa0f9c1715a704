//! Host-side command word encoding.
//!
//! 4-bit variants take one command per word:
//!
//! ```text
//!  31    28 27            12 11         0
//! +--------+----------------+------------+
//! | opcode |   immediate    |    tag     |
//! +--------+----------------+------------+
//! ```
//!
//! `LoadX`/`LoadY` put their value in the immediate field and `Inject` its instruction; the tag
//! is ignored by the device except after an injected jump to the early-exit handler, which
//! returns `tag << 16`. `EarlyExit` uses all 28 bits below the opcode as its payload.
//!
//! The minimal variant packs several 5-bit fields per word, least significant first, ending with
//! a fetch field.

use pio_sm::{Instruction, JmpCondition};
use tracing::trace;

use crate::error::{InterpError, Result};
use crate::micro_op::{DispatchTable, MicroOp};
use crate::variant::FieldWidth;

pub const EARLY_EXIT_PAYLOAD_MASK: u32 = 0x0fff_ffff;
pub const TAG_MASK: u16 = 0x0fff;

/// Fields that fit in one minimal-variant word besides the terminating fetch.
pub const MAX_PACKED_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Fetch,
    NegateX,
    NegateY,
    DecrementX,
    DecrementY,
    LoadX(u16),
    LoadY(u16),
    Inject { instruction: Instruction, tag: u16 },
    SerializeX,
    SerializeY,
    DeserializeX,
    /// Payload bits above 28 are dropped.
    EarlyExit(u32),
}

impl Command {
    pub fn micro_op(&self) -> MicroOp {
        match self {
            Command::Fetch => MicroOp::Fetch,
            Command::NegateX => MicroOp::NegateX,
            Command::NegateY => MicroOp::NegateY,
            Command::DecrementX => MicroOp::DecrementX,
            Command::DecrementY => MicroOp::DecrementY,
            Command::LoadX(_) => MicroOp::LoadX,
            Command::LoadY(_) => MicroOp::LoadY,
            Command::Inject { .. } => MicroOp::Inject,
            Command::SerializeX => MicroOp::SerializeX,
            Command::SerializeY => MicroOp::SerializeY,
            Command::DeserializeX => MicroOp::DeserializeX,
            Command::EarlyExit(_) => MicroOp::EarlyExit,
        }
    }

    /// Injects `jmp !x, <early exit>`: the device answers with `tag << 16` only if X is zero.
    pub fn zero_test(early_exit_slot: u8, tag: u16) -> Self {
        Command::Inject {
            instruction: Instruction::jmp(JmpCondition::XIsZero, early_exit_slot),
            tag,
        }
    }

    /// Encodes against a 4-bit dispatch table.
    pub fn encode(&self, table: &DispatchTable, variant: &'static str) -> Result<u32> {
        let op = self.micro_op();
        let unsupported = || InterpError::CommandNotSupported { op, variant };
        if table.width() != FieldWidth::Four {
            return Err(unsupported());
        }
        let opcode = (table.opcode_of(op).ok_or_else(unsupported)? as u32) << 28;
        let word = match *self {
            Command::LoadX(value) | Command::LoadY(value) => opcode | (value as u32) << 12,
            Command::Inject { instruction, tag } => {
                if tag > TAG_MASK {
                    return Err(InterpError::ImmediateOutOfRange {
                        value: tag as u32,
                        bits: 12,
                    });
                }
                opcode | (instruction.encode() as u32) << 12 | tag as u32
            }
            Command::EarlyExit(payload) => opcode | (payload & EARLY_EXIT_PAYLOAD_MASK),
            _ => opcode,
        };
        trace!(%op, "encoded command {word:#010x}");
        Ok(word)
    }
}

/// Response to a [`Command::zero_test`].
pub fn response_tag(response: u32) -> u16 {
    (response >> 16) as u16 & TAG_MASK
}

/// Packs minimal-variant fields, least significant first, terminated by a fetch.
///
/// An op that consumes the rest of the word ([`MicroOp::consumes_word`]) must come last; it gets
/// no terminator, and the zero bits above it are what it shifts out.
pub fn encode_packed(ops: &[MicroOp], table: &DispatchTable, variant: &'static str) -> Result<u32> {
    if table.width() != FieldWidth::Five {
        if let Some(&op) = ops.first() {
            return Err(InterpError::CommandNotSupported { op, variant });
        }
    }
    if ops.len() > MAX_PACKED_FIELDS {
        return Err(InterpError::TooManyFields {
            count: ops.len(),
            max: MAX_PACKED_FIELDS,
        });
    }
    let bits = table.width().bits() as u32;
    let mut word = 0u32;
    let mut terminated = false;
    for (i, &op) in ops.iter().enumerate() {
        if terminated {
            return Err(InterpError::FieldNotLast(ops[i - 1]));
        }
        let field = table
            .opcode_of(op)
            .ok_or(InterpError::CommandNotSupported { op, variant })?;
        word |= (field as u32) << (bits * i as u32);
        terminated = op.consumes_word() || op == MicroOp::Fetch;
    }
    if !terminated {
        let fetch = table
            .opcode_of(MicroOp::Fetch)
            .ok_or(InterpError::CommandNotSupported {
                op: MicroOp::Fetch,
                variant,
            })?;
        word |= (fetch as u32) << (bits * ops.len() as u32);
    }
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::build;
    use crate::variant::Variant;

    #[test]
    fn four_bit_layout() {
        let layout = build(Variant::full()).unwrap();
        let t = &layout.table;
        assert_eq!(Command::LoadX(0xBEEF).encode(t, "full"), Ok(0x5BEE_F000));
        assert_eq!(Command::DecrementY.encode(t, "full"), Ok(0xE000_0000));
        assert_eq!(Command::EarlyExit(0xFFFF_FFFF).encode(t, "full"), Ok(0xAFFF_FFFF));
        let inject = Command::zero_test(10, 0x123);
        assert_eq!(inject.encode(t, "full"), Ok(0x7002_A123));
    }

    #[test]
    fn oversized_tag_is_rejected() {
        let layout = build(Variant::full()).unwrap();
        let err = Command::zero_test(10, 0x1000).encode(&layout.table, "full");
        assert_eq!(
            err,
            Err(InterpError::ImmediateOutOfRange {
                value: 0x1000,
                bits: 12
            })
        );
    }

    #[test]
    fn standard_has_no_inject() {
        let layout = build(Variant::standard()).unwrap();
        assert_eq!(
            Command::EarlyExit(1).encode(&layout.table, "standard"),
            Err(InterpError::CommandNotSupported {
                op: MicroOp::EarlyExit,
                variant: "standard"
            })
        );
    }

    #[test]
    fn packed_fields_end_with_fetch() {
        let layout = build(Variant::minimal()).unwrap();
        let t = &layout.table;
        let word = encode_packed(
            &[MicroOp::NegateX, MicroOp::DecrementX, MicroOp::NegateX],
            t,
            "minimal",
        )
        .unwrap();
        assert_eq!(word, 3 | 2 << 5 | 3 << 10 | 18 << 15);
        assert_eq!(encode_packed(&[], t, "minimal"), Ok(18));
        assert_eq!(encode_packed(&[MicroOp::SerializeOut], t, "minimal"), Ok(0));
        assert_eq!(
            encode_packed(&[MicroOp::SerializeOut, MicroOp::NegateX], t, "minimal"),
            Err(InterpError::FieldNotLast(MicroOp::SerializeOut))
        );
        assert!(matches!(
            encode_packed(&[MicroOp::NegateX; 6], t, "minimal"),
            Err(InterpError::TooManyFields { count: 6, .. })
        ));
        assert!(Command::NegateX.encode(t, "minimal").is_err());
    }

    #[test]
    fn response_tag_roundtrip() {
        assert_eq!(response_tag(0x0123_0000), 0x123);
    }
}

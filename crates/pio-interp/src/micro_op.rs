use core::fmt;

use serde::Serialize;

use crate::variant::FieldWidth;

/// What a dispatch field value does once `out pc, N` lands on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroOp {
    /// Back to `pull`: the rest of the command word is discarded.
    Fetch,
    /// Dispatch on the next field of the same word.
    Redispatch,
    /// Saturating: zero stays zero.
    DecrementX,
    NegateX,
    DecrementY,
    NegateY,
    /// X = next 16 bits of the command word.
    LoadX,
    LoadY,
    /// Execute the next 16 bits of the command word as an instruction.
    Inject,
    /// Shift X out on the pin, MSB first.
    SerializeX,
    SerializeY,
    /// Sample X pins bits into the ISR, then move the result to X.
    DeserializeX,
    /// Push the remaining 28 bits of the command word to the RX FIFO.
    EarlyExit,
    /// Copy the next 16 bits of the OSR (without consuming them) into the ISR.
    CaptureImmediate,
    LoadXFromIsr,
    LoadYFromIsr,
    /// Shift the ISR by one of its own bits.
    RotateIsr,
    /// Shift the rest of the OSR out on the pin, LSB first.
    SerializeOut,
    /// Like [`MicroOp::SerializeOut`], but fetch immediately if the OSR is already empty.
    DrainOut,
}

impl MicroOp {
    pub fn name(self) -> &'static str {
        match self {
            MicroOp::Fetch => "fetch",
            MicroOp::Redispatch => "redispatch",
            MicroOp::DecrementX => "decrement-x",
            MicroOp::NegateX => "negate-x",
            MicroOp::DecrementY => "decrement-y",
            MicroOp::NegateY => "negate-y",
            MicroOp::LoadX => "load-x",
            MicroOp::LoadY => "load-y",
            MicroOp::Inject => "inject",
            MicroOp::SerializeX => "serialize-x",
            MicroOp::SerializeY => "serialize-y",
            MicroOp::DeserializeX => "deserialize-x",
            MicroOp::EarlyExit => "early-exit",
            MicroOp::CaptureImmediate => "capture-immediate",
            MicroOp::LoadXFromIsr => "load-x-from-isr",
            MicroOp::LoadYFromIsr => "load-y-from-isr",
            MicroOp::RotateIsr => "rotate-isr",
            MicroOp::SerializeOut => "serialize-out",
            MicroOp::DrainOut => "drain-out",
        }
    }

    /// Ops that run until the OSR is empty, so nothing may follow them in a packed word.
    pub fn consumes_word(self) -> bool {
        matches!(self, MicroOp::SerializeOut | MicroOp::DrainOut)
    }
}

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps every dispatch field value to the micro-op its instruction slot performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    width: FieldWidth,
    entries: Vec<MicroOp>,
}

impl DispatchTable {
    /// `entries` is padded with [`MicroOp::Fetch`] (or truncated) to cover every field value.
    pub(crate) fn new(width: FieldWidth, mut entries: Vec<MicroOp>) -> Self {
        entries.resize(width.slots(), MicroOp::Fetch);
        Self { width, entries }
    }

    pub fn width(&self) -> FieldWidth {
        self.width
    }

    pub fn lookup(&self, field: u8) -> MicroOp {
        self.entries[field as usize & (self.entries.len() - 1)]
    }

    /// Lowest field value that performs `op`.
    pub fn opcode_of(&self, op: MicroOp) -> Option<u8> {
        self.entries.iter().position(|&e| e == op).map(|i| i as u8)
    }

    pub fn entries(&self) -> &[MicroOp] {
        &self.entries
    }

    /// Splits a command word into the fields the dispatcher would read, up to and including the
    /// first one that does not re-dispatch.
    pub fn fields(&self, word: u32) -> Vec<(u8, MicroOp)> {
        let bits = self.width.bits() as u32;
        let mask = (1u32 << bits) - 1;
        let mut out = Vec::new();
        for i in 0..32 / bits {
            let field = match self.width {
                FieldWidth::Four => (word >> (32 - bits * (i + 1))) & mask,
                FieldWidth::Five => (word >> (bits * i)) & mask,
            } as u8;
            let op = self.lookup(field);
            out.push((field, op));
            let continues = match self.width {
                // 4-bit handlers return to `pull`; only slot 1 reads another nibble.
                FieldWidth::Four => op == MicroOp::Redispatch,
                FieldWidth::Five => !matches!(op, MicroOp::Fetch) && !op.consumes_word(),
            };
            if !continues {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::encode_packed;
    use crate::programs::build;
    use crate::variant::Variant;

    #[test]
    fn short_tables_are_padded_with_fetch() {
        let table = DispatchTable::new(FieldWidth::Four, vec![MicroOp::NegateX]);
        assert_eq!(table.entries().len(), 16);
        assert_eq!(table.lookup(0), MicroOp::NegateX);
        assert_eq!(table.lookup(15), MicroOp::Fetch);
        assert_eq!(table.lookup(16), MicroOp::NegateX);
        assert_eq!(table.opcode_of(MicroOp::Fetch), Some(1));
        assert_eq!(table.opcode_of(MicroOp::Inject), None);
    }

    #[test]
    fn four_bit_fields_follow_redispatch() {
        let layout = build(Variant::full()).unwrap();
        let t = &layout.table;
        assert_eq!(t.fields(0x5BEE_F000), vec![(5, MicroOp::LoadX)]);
        assert_eq!(
            t.fields(0x1120_0000),
            vec![
                (1, MicroOp::Redispatch),
                (1, MicroOp::Redispatch),
                (2, MicroOp::DecrementX)
            ]
        );
        // Eight nibbles and no handler: the word runs out.
        assert_eq!(t.fields(0x1111_1111), vec![(1, MicroOp::Redispatch); 8]);
    }

    #[test]
    fn five_bit_fields_stop_at_fetch_or_drain() {
        let layout = build(Variant::minimal()).unwrap();
        let t = &layout.table;
        let word = encode_packed(
            &[MicroOp::NegateX, MicroOp::DecrementX, MicroOp::NegateX],
            t,
            "minimal",
        )
        .unwrap();
        assert_eq!(
            t.fields(word),
            vec![
                (3, MicroOp::NegateX),
                (2, MicroOp::DecrementX),
                (3, MicroOp::NegateX),
                (18, MicroOp::Fetch)
            ]
        );
        assert_eq!(
            t.fields(3 | 17 << 5 | 3 << 10),
            vec![(3, MicroOp::NegateX), (17, MicroOp::DrainOut)]
        );
        assert_eq!(t.fields(0), vec![(0, MicroOp::SerializeOut)]);
    }
}
